//! Shared setup for tests against the in-memory mock host.

#![allow(dead_code)]

use std::time::Duration;

use hoststream_client::{ClientConfig, HostSystem};
use hoststream_core::Credentials;
use hoststream_harness::{DuplexTransport, MockHost, SimEnv};

pub const USER: &str = "bob";
pub const PASSWORD: &str = "Secret1";

pub type MockSystem = HostSystem<DuplexTransport, SimEnv>;

/// Host with one user profile.
pub fn host() -> MockHost {
    MockHost::new().with_user(USER, PASSWORD)
}

pub fn config() -> ClientConfig {
    let mut config = ClientConfig::new("mockhost");
    config.request_timeout = Duration::from_secs(5);
    config.retry.initial_backoff = Duration::from_millis(1);
    config.retry.max_backoff = Duration::from_millis(5);
    config
}

pub fn system(host: &MockHost) -> MockSystem {
    system_with(host, config(), PASSWORD)
}

pub fn system_with(host: &MockHost, config: ClientConfig, password: &str) -> MockSystem {
    HostSystem::new(DuplexTransport::new(host.clone()), SimEnv::with_seed(7), config, Credentials::new(USER, password))
        .unwrap()
}

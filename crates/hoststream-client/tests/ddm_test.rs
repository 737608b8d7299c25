//! DDM security exchange against the mock listener.

mod common;

use hoststream_harness::Endpoint;
use hoststream_proto::{ErrorKind, SecurityFailure, ServerId, ddm::cp};

use crate::common::{PASSWORD, config, host, system, system_with};

#[tokio::test]
async fn authenticates_with_user_and_password() {
    let host = host();
    let ddm = system(&host).ddm().await.unwrap();

    let attributes = ddm.server_attributes().unwrap();
    assert_eq!(attributes.server_name, "MOCKHOST");
    assert_eq!(attributes.server_class, "QAS");

    assert_eq!(host.connections(Endpoint::Ddm), 1);
    assert_eq!(host.requests(ServerId::Database, cp::SECCHK), 1);
    // DDM does not go through the signon server.
    assert_eq!(host.connections(Endpoint::Server(ServerId::Signon)), 0);
}

#[tokio::test]
async fn wrong_password_fails_the_security_check() {
    let host = host();
    let err = system_with(&host, config(), "nope").ddm().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Security(SecurityFailure::PasswordIncorrect)));
}

#[tokio::test]
async fn every_call_opens_a_new_conversation() {
    let host = host();
    let system = system_with(&host, config(), PASSWORD);
    system.ddm().await.unwrap();
    system.ddm().await.unwrap();
    assert_eq!(host.connections(Endpoint::Ddm), 2);
    assert_eq!(host.requests(ServerId::Database, cp::EXCSAT), 2);
}

//! Signon and service-server handshakes against the mock host.

mod common;

use hoststream_client::ClientError;
use hoststream_core::SessionError;
use hoststream_harness::{Endpoint, MockHost};
use hoststream_proto::{ErrorKind, SecurityFailure, ServerId, signon};

use crate::common::{PASSWORD, config, host, system, system_with};

#[tokio::test]
async fn signon_learns_password_level_and_ccsid() {
    let host = host().with_password_level(3);
    let system = system(&host);

    let info = system.signon().await.unwrap();
    assert_eq!(info.user_id, "BOB");
    assert_eq!(info.password_level, 3);
    assert_eq!(info.server_ccsid, Some(37));
    assert!(info.job_name.as_deref().unwrap().ends_with("QZSOSIGN"));
    let details = info.signon.unwrap();
    assert_eq!(details.invalid_attempts, Some(0));
    assert!(details.current_signon.is_some());

    // Cached: no second signon connection
    system.signon().await.unwrap();
    assert_eq!(host.connections(Endpoint::Server(ServerId::Signon)), 1);
}

#[tokio::test]
async fn signon_client_signs_on_every_time() {
    let host = host();
    let client = system(&host).signon_client();
    client.sign_on().await.unwrap();
    assert_eq!(client.password_level().await.unwrap(), 2);
    assert_eq!(client.signon_info().await.unwrap().server_ccsid, Some(37));
    assert_eq!(host.connections(Endpoint::Server(ServerId::Signon)), 3);
}

#[tokio::test]
async fn wrong_password_is_a_security_failure() {
    let host = host();
    let system = system_with(&host, config(), "wrong");
    let err = system.signon().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Security(SecurityFailure::PasswordIncorrect)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn unknown_user_is_reported() {
    let host = MockHost::new().with_user("alice", PASSWORD);
    let err = system(&host).signon().await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Security(SecurityFailure::UserIdUnknown)));
}

#[tokio::test]
async fn des_password_levels_are_refused() {
    let host = host().with_password_level(1);
    let err = system(&host).signon().await.unwrap_err();
    assert!(matches!(err, ClientError::Session(SessionError::UnsupportedPasswordLevel(1))));
}

#[tokio::test]
async fn service_servers_start_after_signon() {
    let host = host();
    let system = system(&host);

    let info = system.session_info(ServerId::Central).await.unwrap();
    assert_eq!(info.server, Some(ServerId::Central));
    assert_eq!(info.server_ccsid, Some(37));
    assert!(info.job_name.as_deref().unwrap().ends_with("QZSCSRVS"));

    assert_eq!(host.requests(ServerId::Signon, signon::id::SIGNON_INFO), 1);
    assert_eq!(host.requests(ServerId::Central, signon::id::EXCHANGE_SEEDS), 1);
    assert_eq!(host.requests(ServerId::Central, signon::id::START_SERVER), 1);
}

#[tokio::test]
async fn pooled_connections_are_reused_until_closed() {
    let host = host();
    let system = system(&host);
    let central = Endpoint::Server(ServerId::Central);

    let first = system.connection(ServerId::Central).await.unwrap();
    let second = system.connection(ServerId::Central).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(host.connections(central), 1);

    system.close().await;
    assert!(first.is_closed());
    let third = system.connection(ServerId::Central).await.unwrap();
    assert!(!third.is_closed());
    assert_eq!(host.connections(central), 2);
}

#[tokio::test]
async fn concurrent_first_use_opens_one_connection() {
    let host = host();
    let system = system(&host);
    let (a, b, c) = tokio::join!(system.ifs(), system.ifs(), system.data_queues());
    a.unwrap();
    b.unwrap();
    c.unwrap();
    assert_eq!(host.connections(Endpoint::Server(ServerId::File)), 1);
    assert_eq!(host.connections(Endpoint::Server(ServerId::Signon)), 1);
}

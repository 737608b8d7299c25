//! Conversion-table downloads: caching, retries on a busy or dropping
//! central server, and fallback to a fresh connection.

mod common;

use hoststream_client::ClientError;
use hoststream_core::TableFetchError;
use hoststream_harness::{Endpoint, MockHost, TableFault};
use hoststream_proto::{CodePage, ServerId, central::id};

use crate::common::{PASSWORD, config, host, system, system_with};

const GERMAN: u16 = 273;

fn host_with_table() -> MockHost {
    host().with_conversion_table(GERMAN, CodePage::cp037().to_unicode_table())
}

fn retrievals(host: &MockHost) -> usize {
    host.requests(ServerId::Central, id::RETRIEVE_CONVERSION_MAP)
}

#[tokio::test]
async fn builtin_ccsids_need_no_download() {
    let host = host();
    let codec = system(&host).codec(37).await.unwrap();
    assert_eq!(codec.decode(&[0xC8, 0xC9]).unwrap(), "HI");
    assert_eq!(host.connections(Endpoint::Server(ServerId::Central)), 0);
}

#[tokio::test]
async fn downloaded_tables_are_cached() {
    let host = host_with_table();
    let system = system(&host);

    let codec = system.codec(GERMAN).await.unwrap();
    assert_eq!(codec.decode(&[0xC1, 0x40, 0xF1]).unwrap(), "A 1");
    system.codec(GERMAN).await.unwrap();

    assert_eq!(retrievals(&host), 1);
    assert_eq!(host.connections(Endpoint::Server(ServerId::Central)), 1);
}

#[tokio::test]
async fn busy_host_is_retried_on_the_same_connection() {
    let host = host_with_table();
    host.push_table_fault(TableFault::Busy);
    host.push_table_fault(TableFault::Busy);
    let system = system(&host);

    system.codec(GERMAN).await.unwrap();
    assert_eq!(retrievals(&host), 3);
    assert_eq!(host.connections(Endpoint::Server(ServerId::Central)), 1);
}

#[tokio::test]
async fn dropped_connection_is_replaced_on_retry() {
    let host = host_with_table();
    host.push_table_fault(TableFault::Disconnect);
    let system = system(&host);

    system.codec(GERMAN).await.unwrap();
    assert_eq!(retrievals(&host), 2);
    assert_eq!(host.connections(Endpoint::Server(ServerId::Central)), 2);
}

#[tokio::test]
async fn fresh_connection_is_the_fallback() {
    let host = host_with_table();
    host.push_table_fault(TableFault::Disconnect);
    let mut config = config();
    config.retry.max_attempts = 1;
    let system = system_with(&host, config, PASSWORD);

    system.codec(GERMAN).await.unwrap();
    assert_eq!(retrievals(&host), 2);
    assert_eq!(host.connections(Endpoint::Server(ServerId::Central)), 2);
}

#[tokio::test]
async fn missing_table_is_unavailable_after_every_source() {
    let host = host();
    let system = system(&host);

    let err = system.codec(500).await.unwrap_err();
    let ClientError::Conversion(TableFetchError::Unavailable { ccsid, .. }) = err else {
        panic!("expected an unavailable table, got {err:?}");
    };
    assert_eq!(ccsid, 500);
    // One attempt per source: permanent failures are not retried.
    assert_eq!(retrievals(&host), 2);
}

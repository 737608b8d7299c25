//! Spooled file listing and control against the mock host.

mod common;

use hoststream_harness::MockHost;
use hoststream_proto::{
    ErrorKind,
    print::{SpooledFile, SpooledFileAttributes, SpooledFileId},
};

use crate::common::{host, system};

fn spooled(user: &str, number: &str, queue: &str, pages: u32) -> SpooledFile {
    SpooledFile {
        id: SpooledFileId {
            job_name: "PAYROLL".into(),
            job_user: user.into(),
            job_number: number.into(),
            file_name: "QSYSPRT".into(),
            file_number: 1,
        },
        attributes: SpooledFileAttributes {
            status: "*READY".into(),
            total_pages: pages,
            output_queue: queue.into(),
            user_data: String::new(),
        },
    }
}

fn spooling_host() -> MockHost {
    host()
        .with_spooled_file(spooled("BOB", "000101", "PRT01", 3))
        .with_spooled_file(spooled("BOB", "000102", "PRT02", 1))
        .with_spooled_file(spooled("ALICE", "000103", "PRT01", 12))
}

#[tokio::test]
async fn listing_filters_by_user_and_queue() {
    let host = spooling_host();
    let print = system(&host).print().await.unwrap();

    assert_eq!(print.list(None, None).await.unwrap().len(), 3);

    let bobs = print.list(Some("BOB"), None).await.unwrap();
    assert_eq!(bobs.len(), 2);
    assert!(bobs.iter().all(|f| f.id.job_user == "BOB"));

    let on_prt01 = print.list(None, Some("PRT01")).await.unwrap();
    let numbers: Vec<_> = on_prt01.iter().map(|f| f.id.job_number.as_str()).collect();
    assert_eq!(numbers, ["000101", "000103"]);

    assert!(print.list(Some("ALICE"), Some("PRT02")).await.unwrap().is_empty());
}

#[tokio::test]
async fn hold_release_and_delete() {
    let host = spooling_host();
    let print = system(&host).print().await.unwrap();
    let id = spooled("BOB", "000101", "PRT01", 3).id;

    let attributes = print.attributes(&id).await.unwrap();
    assert_eq!(attributes.status, "*READY");
    assert_eq!(attributes.total_pages, 3);

    // Only held files can be released.
    let err = print.release(&id).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));

    print.hold(&id).await.unwrap();
    assert_eq!(print.attributes(&id).await.unwrap().status, "*HELD");
    print.release(&id).await.unwrap();
    assert_eq!(print.attributes(&id).await.unwrap().status, "*READY");

    print.delete(&id).await.unwrap();
    assert_eq!(host.spooled_files().len(), 2);
    let err = print.attributes(&id).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ObjectNotFound));
}

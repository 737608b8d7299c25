//! Data queue operations against the mock host.

mod common;

use bytes::Bytes;
use hoststream_client::Wait;
use hoststream_proto::{
    ErrorKind,
    dataqueue::{Authority, KeySearch, QueueAttributes, QueueName, QueueType},
};

use crate::common::{host, system};

fn keyed() -> QueueAttributes {
    QueueAttributes { queue_type: QueueType::Keyed, key_length: 4, ..QueueAttributes::default() }
}

#[tokio::test]
async fn fifo_queue_preserves_order() {
    let host = host();
    let dq = system(&host).data_queues().await.unwrap();
    let queue = QueueName::new("orders", "qgpl");

    dq.create(&queue, QueueAttributes::default(), Authority::All).await.unwrap();
    for entry in ["first", "second", "third"] {
        dq.write(&queue, Bytes::from(entry), None).await.unwrap();
    }
    assert_eq!(host.queue_depth(&queue), Some(3));

    let peeked = dq.peek(&queue, Wait::NoWait).await.unwrap().unwrap();
    assert_eq!(peeked.entry, Bytes::from("first"));
    assert_eq!(host.queue_depth(&queue), Some(3));

    for expected in ["first", "second", "third"] {
        let entry = dq.read(&queue, Wait::Seconds(5)).await.unwrap().unwrap();
        assert_eq!(entry.entry, Bytes::from(expected));
        assert!(entry.sender.is_none());
    }
    assert!(dq.read(&queue, Wait::NoWait).await.unwrap().is_none());
}

#[tokio::test]
async fn lifo_queue_reads_newest_first() {
    let host = host();
    let dq = system(&host).data_queues().await.unwrap();
    let queue = QueueName::new("STACK", "QGPL");
    let attributes = QueueAttributes { queue_type: QueueType::Lifo, ..QueueAttributes::default() };
    dq.create(&queue, attributes, Authority::Use).await.unwrap();
    dq.write(&queue, Bytes::from("old"), None).await.unwrap();
    dq.write(&queue, Bytes::from("new"), None).await.unwrap();
    assert_eq!(dq.read(&queue, Wait::NoWait).await.unwrap().unwrap().entry, Bytes::from("new"));
}

#[tokio::test]
async fn keyed_reads_and_clears() {
    let host = host();
    let dq = system(&host).data_queues().await.unwrap();
    let queue = QueueName::new("KEYED", "QGPL");
    dq.create(&queue, keyed(), Authority::All).await.unwrap();

    for (key, data) in [("0003", "c"), ("0001", "a"), ("0002", "b"), ("0001", "a2")] {
        dq.write(&queue, Bytes::from(data), Some(Bytes::from(key))).await.unwrap();
    }

    let entry = dq.read_keyed(&queue, KeySearch::Gt, Bytes::from("0001"), Wait::NoWait).await.unwrap().unwrap();
    assert_eq!(entry.entry, Bytes::from("c"));
    assert_eq!(entry.key, Some(Bytes::from("0003")));

    let missing = dq.read_keyed(&queue, KeySearch::Eq, Bytes::from("0009"), Wait::NoWait).await.unwrap();
    assert!(missing.is_none());

    dq.clear(&queue, Some(Bytes::from("0001"))).await.unwrap();
    assert_eq!(host.queue_depth(&queue), Some(1));

    let err = dq.write(&queue, Bytes::from("x"), None).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));
}

#[tokio::test]
async fn sender_information_is_saved_on_request() {
    let host = host();
    let dq = system(&host).data_queues().await.unwrap();
    let queue = QueueName::new("AUDIT", "QGPL");
    let attributes = QueueAttributes { save_sender: true, ..QueueAttributes::default() };
    dq.create(&queue, attributes, Authority::All).await.unwrap();
    dq.write(&queue, Bytes::from("x"), None).await.unwrap();

    let sender = dq.read(&queue, Wait::NoWait).await.unwrap().unwrap().sender.unwrap();
    assert_eq!(sender.current_user, "BOB");
}

#[tokio::test]
async fn attributes_clear_and_delete() {
    let host = host().with_library("APPLIB");
    let dq = system(&host).data_queues().await.unwrap();
    let queue = QueueName::new("WORK", "APPLIB");
    let attributes =
        QueueAttributes { max_entry_length: 16, description: "work items".into(), ..QueueAttributes::default() };
    dq.create(&queue, attributes.clone(), Authority::Change).await.unwrap();
    assert_eq!(dq.attributes(&queue).await.unwrap(), attributes);

    let err = dq.write(&queue, Bytes::from(vec![0u8; 17]), None).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::InvalidRequest));

    dq.write(&queue, Bytes::from("a"), None).await.unwrap();
    dq.clear(&queue, None).await.unwrap();
    assert_eq!(host.queue_depth(&queue), Some(0));

    let err = dq.create(&queue, QueueAttributes::default(), Authority::All).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::AlreadyExists));

    dq.delete(&queue).await.unwrap();
    assert_eq!(host.queue_depth(&queue), None);
}

#[tokio::test]
async fn missing_queues_and_libraries() {
    let host = host();
    let dq = system(&host).data_queues().await.unwrap();

    let err = dq.read(&QueueName::new("NOPE", "QGPL"), Wait::NoWait).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::ObjectNotFound));
    assert!(!err.is_transient());

    let err = dq.attributes(&QueueName::new("NOPE", "NOLIB")).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::PathNotFound));
}

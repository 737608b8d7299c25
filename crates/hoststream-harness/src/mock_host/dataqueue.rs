//! Data queue server. Reads never block: an empty queue answers "no entry"
//! at once, whatever wait the client asked for.

use std::collections::VecDeque;

use bytes::Bytes;
use hoststream_proto::{
    DataStream, ProtocolError, ServerId,
    dataqueue::{
        ClearRequest, CommonReply, CreateRequest, DeleteRequest, ExchangeAttributesReply,
        QueryAttributesReply, QueryAttributesRequest, QueueAttributes, QueueName, QueueType, ReadReply, ReadRequest,
        SenderInfo, WriteRequest, id, rc,
    },
};

use super::{Conn, HostState, Outcome};

const SERVER_VERSION: u32 = 0x0007_0500;

/// Largest entry a queue may be created for.
const MAX_ENTRY_LENGTH: u32 = 64_512;

#[derive(Debug, Clone)]
pub(crate) struct StoredEntry {
    data: Bytes,
    key: Option<Bytes>,
    sender: Option<SenderInfo>,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredQueue {
    attributes: QueueAttributes,
    pub(crate) entries: VecDeque<StoredEntry>,
}

fn failed(return_code: u16, message: impl Into<String>) -> Result<Outcome, ProtocolError> {
    Outcome::one(ServerId::DataQueue, &CommonReply::failed(return_code, message))
}

fn ok() -> Result<Outcome, ProtocolError> {
    Outcome::one(ServerId::DataQueue, &CommonReply::ok())
}

/// The queue, or the reply explaining why it is not there.
fn lookup<'a>(
    state: &'a mut HostState,
    queue: &QueueName,
) -> Result<&'a mut StoredQueue, Result<Outcome, ProtocolError>> {
    if !state.libraries.contains(&queue.library) {
        return Err(failed(rc::LIBRARY_NOT_FOUND, format!("library {} not found", queue.library)));
    }
    state
        .queues
        .get_mut(queue)
        .ok_or_else(|| failed(rc::QUEUE_NOT_FOUND, format!("data queue {queue} not found")))
}

pub(crate) fn handle(state: &mut HostState, conn: &Conn, request: &DataStream) -> Result<Outcome, ProtocolError> {
    match request.request_id() {
        id::EXCHANGE_ATTRIBUTES => {
            Outcome::one(ServerId::DataQueue, &ExchangeAttributesReply { server_version: SERVER_VERSION })
        },
        id::CREATE => create(state, CreateRequest::parse(request)?),
        id::QUERY_ATTRIBUTES => {
            let req = QueryAttributesRequest::parse(request)?;
            match lookup(state, &req.queue) {
                Ok(queue) => {
                    let reply = QueryAttributesReply { attributes: queue.attributes.clone() };
                    Outcome::one(ServerId::DataQueue, &reply)
                },
                Err(reply) => reply,
            }
        },
        id::DELETE => {
            let req = DeleteRequest::parse(request)?;
            if let Err(reply) = lookup(state, &req.queue) {
                return reply;
            }
            state.queues.remove(&req.queue);
            ok()
        },
        id::WRITE => {
            let req = WriteRequest::parse(request)?;
            let sender = SenderInfo {
                job_name: "QZHQSSRV".into(),
                job_user: "QUSER".into(),
                job_number: format!("{:06}", state.jobs_started),
                current_user: conn.user.clone().unwrap_or_default(),
            };
            let queue = match lookup(state, &req.queue) {
                Ok(queue) => queue,
                Err(reply) => return reply,
            };
            let attributes = &queue.attributes;
            if req.entry.len() > attributes.max_entry_length as usize {
                return failed(rc::ENTRY_TOO_LONG, "entry longer than the queue allows");
            }
            let key_ok = match (&attributes.queue_type, &req.key) {
                (QueueType::Keyed, Some(key)) => key.len() == usize::from(attributes.key_length),
                (QueueType::Keyed, None) | (_, Some(_)) => false,
                (_, None) => true,
            };
            if !key_ok {
                return failed(rc::INVALID_KEY, "key does not match the queue");
            }
            let sender = attributes.save_sender.then_some(sender);
            queue.entries.push_back(StoredEntry { data: req.entry, key: req.key, sender });
            ok()
        },
        id::CLEAR => {
            let req = ClearRequest::parse(request)?;
            let queue = match lookup(state, &req.queue) {
                Ok(queue) => queue,
                Err(reply) => return reply,
            };
            match (&queue.attributes.queue_type, &req.key) {
                (QueueType::Keyed, Some(key)) => queue.entries.retain(|e| e.key.as_ref() != Some(key)),
                (_, Some(_)) => return failed(rc::INVALID_KEY, "queue is not keyed"),
                (_, None) => queue.entries.clear(),
            }
            ok()
        },
        id::READ => read(state, &ReadRequest::parse(request)?),
        _ => failed(rc::INVALID_REQUEST, format!("request 0x{:04X} not supported", request.request_id())),
    }
}

fn create(state: &mut HostState, req: CreateRequest) -> Result<Outcome, ProtocolError> {
    if !state.libraries.contains(&req.queue.library) {
        return failed(rc::LIBRARY_NOT_FOUND, format!("library {} not found", req.queue.library));
    }
    if state.queues.contains_key(&req.queue) {
        return failed(rc::ALREADY_EXISTS, format!("data queue {} already exists", req.queue));
    }
    let attributes = &req.attributes;
    if attributes.max_entry_length == 0 || attributes.max_entry_length > MAX_ENTRY_LENGTH {
        return failed(rc::INVALID_REQUEST, "maximum entry length out of range");
    }
    if (attributes.queue_type == QueueType::Keyed) != (attributes.key_length > 0) {
        return failed(rc::INVALID_KEY, "key length must be set for keyed queues only");
    }
    state.queues.insert(
        req.queue,
        StoredQueue { attributes: req.attributes, entries: VecDeque::new() },
    );
    ok()
}

fn read(state: &mut HostState, req: &ReadRequest) -> Result<Outcome, ProtocolError> {
    let queue = match lookup(state, &req.queue) {
        Ok(queue) => queue,
        Err(reply) => return reply,
    };
    let position = match (&queue.attributes.queue_type, &req.key) {
        (QueueType::Keyed, Some((search, wanted))) => queue
            .entries
            .iter()
            .position(|e| e.key.as_ref().is_some_and(|key| search.matches(key, wanted))),
        (QueueType::Keyed, None) | (_, Some(_)) => {
            return failed(rc::INVALID_KEY, "key search does not match the queue");
        },
        (QueueType::Fifo, None) => (!queue.entries.is_empty()).then_some(0),
        (QueueType::Lifo, None) => queue.entries.len().checked_sub(1),
    };
    let Some(position) = position else {
        return failed(rc::NO_ENTRY, "no entry available");
    };
    let entry = if req.peek { queue.entries.get(position).cloned() } else { queue.entries.remove(position) };
    let Some(entry) = entry else {
        return failed(rc::NO_ENTRY, "no entry available");
    };
    Outcome::one(ServerId::DataQueue, &ReadReply { sender: entry.sender, entry: entry.data, key: entry.key })
}

use hoststream_proto::{
    DataStream, ProtocolError, ServerId,
    print::{Action, ListSpooledFilesRequest, ObjectType, PrintReply, SpooledFileRequest, parse_request_kind, rc},
};

use super::{HostState, Outcome};

const READY: &str = "*READY";
const HELD: &str = "*HELD";

fn reply(reply: &PrintReply) -> Result<Outcome, ProtocolError> {
    Outcome::one(ServerId::NetPrint, reply)
}

fn code(return_code: u16) -> Result<Outcome, ProtocolError> {
    reply(&PrintReply::with_return_code(return_code))
}

pub(crate) fn handle(state: &mut HostState, request: &DataStream) -> Result<Outcome, ProtocolError> {
    let Ok(kind) = parse_request_kind(request) else {
        return code(rc::INVALID_DATASTREAM);
    };
    match kind {
        (ObjectType::Server, Action::ExchangeAttributes) => code(rc::OK),
        (ObjectType::SpooledFile, Action::List) => {
            let req = ListSpooledFilesRequest::parse(request)?;
            let entries = state
                .spool
                .iter()
                .filter(|f| req.user.as_ref().is_none_or(|u| *u == f.id.job_user))
                .filter(|f| req.output_queue.as_ref().is_none_or(|q| *q == f.attributes.output_queue))
                .cloned()
                .collect();
            reply(&PrintReply { return_code: rc::OK, entries, attributes: None })
        },
        (ObjectType::SpooledFile, action) => {
            let req = SpooledFileRequest::parse(request)?;
            let Some(index) = state.spool.iter().position(|f| f.id == req.id) else {
                return code(rc::NOT_FOUND);
            };
            let file = &mut state.spool[index];
            match action {
                Action::RetrieveAttributes => {
                    let attributes = Some(file.attributes.clone());
                    reply(&PrintReply { return_code: rc::OK, entries: Vec::new(), attributes })
                },
                Action::Hold => {
                    file.attributes.status = HELD.to_string();
                    code(rc::OK)
                },
                Action::Release if file.attributes.status == HELD => {
                    file.attributes.status = READY.to_string();
                    code(rc::OK)
                },
                Action::Delete => {
                    state.spool.remove(index);
                    code(rc::OK)
                },
                _ => code(rc::INVALID_ACTION),
            }
        },
        (ObjectType::Server, _) => code(rc::INVALID_ACTION),
    }
}

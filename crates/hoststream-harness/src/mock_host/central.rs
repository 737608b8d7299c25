use hoststream_proto::{
    DataStream, ProtocolError, ServerId,
    central::{
        ExchangeAttributesReply, ExchangeAttributesRequest, RetrieveConversionMapReply,
        RetrieveConversionMapRequest, id, rc,
    },
};

use super::{HostState, Outcome, TableFault};

pub(crate) fn handle(state: &mut HostState, request: &DataStream) -> Result<Outcome, ProtocolError> {
    match request.request_id() {
        id::EXCHANGE_ATTRIBUTES => {
            let req = ExchangeAttributesRequest::parse(request)?;
            let reply =
                ExchangeAttributesReply { return_code: rc::OK, server_ccsid: state.host_ccsid, server_nlv: req.nlv };
            Outcome::one(ServerId::Central, &reply)
        },
        id::RETRIEVE_CONVERSION_MAP => {
            let req = RetrieveConversionMapRequest::parse(request)?;
            let reply = match state.table_faults.pop_front() {
                Some(TableFault::Disconnect) => return Ok(Outcome::Disconnect),
                Some(TableFault::Busy) => RetrieveConversionMapReply { return_code: rc::RESOURCE_LIMIT, table: None },
                None => match state.tables.get(&req.source_ccsid) {
                    Some(table) => RetrieveConversionMapReply { return_code: rc::OK, table: Some(table.clone()) },
                    None => RetrieveConversionMapReply { return_code: rc::TABLE_NOT_AVAILABLE, table: None },
                },
            };
            Outcome::one(ServerId::Central, &reply)
        },
        _ => Ok(Outcome::Disconnect),
    }
}

//! Signon server operations.

use std::sync::Arc;

use hoststream_core::{Environment, SessionInfo, Transport};
use hoststream_proto::{
    ProtocolError, ServerId,
    signon::{self, SignonInfoReply},
};

use crate::{
    error::Result,
    system::Connector,
};

/// Signs on over a fresh signon-server connection per call.
pub struct SignonClient<T: Transport, E> {
    connector: Arc<Connector<T, E>>,
}

impl<T: Transport, E: Environment> SignonClient<T, E> {
    pub(crate) fn new(connector: Arc<Connector<T, E>>) -> Self {
        Self { connector }
    }

    /// Run a complete signon exchange and return what the host reported.
    ///
    /// Unlike [`HostSystem::signon`](crate::HostSystem::signon) this always
    /// contacts the host, so it also verifies the credentials again.
    pub async fn sign_on(&self) -> Result<SessionInfo> {
        let established = self.connector.open(ServerId::Signon, None).await?;
        established.connection.close("signon complete");
        Ok(established.info)
    }

    /// Signon details: last signon, password expiration, server CCSID.
    pub async fn signon_info(&self) -> Result<SignonInfoReply> {
        let info = self.sign_on().await?;
        let reply = info.signon.ok_or(ProtocolError::UnexpectedReplyId {
            server: ServerId::Signon,
            reply_id: signon::id::SIGNON_INFO_REPLY,
        })?;
        Ok(reply)
    }

    /// Host password level, learned on the first signon.
    pub async fn password_level(&self) -> Result<u8> {
        Ok(self.connector.signon_info().await?.password_level)
    }
}

//! DDM security exchange over a DSS connection.
//!
//! DDM requests are strictly sequential: each segment carries its own
//! correlation id and the reply must echo it before the next request goes
//! out, so the client owns the stream outright instead of sharing a reader
//! task. A reply may span several chained segments under the same
//! correlation id; their objects are joined before decoding.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use hoststream_core::{CorrelationError, Credentials};
use hoststream_proto::{
    ErrorKind, HostError, SecurityFailure, ServerId,
    ddm::{
        self, AccessSecurity, AccessSecurityReply, DdmMessage, ExchangeServerAttributes,
        ExchangeServerAttributesReply, SecurityCheck, SecurityCheckReply, SecurityMechanism,
    },
    dss::DssSegment,
};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    error::{ClientError, Result},
    io::{read_dss, write_dss},
};

/// Client attributes announced in EXCSAT.
pub fn client_attributes() -> ExchangeServerAttributes {
    ExchangeServerAttributes {
        external_name: "hoststream".to_string(),
        server_class: "QDB2/RUST".to_string(),
        server_name: "hoststream".to_string(),
        release_level: concat!("V", env!("CARGO_PKG_VERSION_MAJOR"), "R", env!("CARGO_PKG_VERSION_MINOR"))
            .to_string(),
        manager_levels: ddm::default_manager_levels(),
    }
}

/// One DDM connection.
#[derive(Debug)]
pub struct DdmClient<S> {
    stream: S,
    next_correlation: u16,
    timeout: Duration,
    server_attributes: Option<ExchangeServerAttributesReply>,
}

impl<S> DdmClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap a connected stream. `timeout` bounds each request.
    pub fn new(stream: S, timeout: Duration) -> Self {
        Self { stream, next_correlation: 1, timeout, server_attributes: None }
    }

    /// Server attributes from the last EXCSAT.
    pub fn server_attributes(&self) -> Option<&ExchangeServerAttributesReply> {
        self.server_attributes.as_ref()
    }

    /// EXCSAT: exchange server attributes.
    pub async fn exchange_server_attributes(
        &mut self,
        attributes: &ExchangeServerAttributes,
    ) -> Result<ExchangeServerAttributesReply> {
        let reply: ExchangeServerAttributesReply = self.call(attributes).await?;
        tracing::debug!(server = %reply.server_name, release = %reply.release_level, "EXCSAT");
        self.server_attributes = Some(reply.clone());
        Ok(reply)
    }

    /// ACCSEC: propose a security mechanism.
    pub async fn access_security(
        &mut self,
        mechanism: SecurityMechanism,
        rdb_name: Option<String>,
    ) -> Result<AccessSecurityReply> {
        self.call(&AccessSecurity { mechanism, rdb_name }).await
    }

    /// SECCHK: present the user id (and password). The returned reply has
    /// already been checked.
    pub async fn security_check(&mut self, check: &SecurityCheck) -> Result<SecurityCheckReply> {
        let reply: SecurityCheckReply = self.call(check).await?;
        ddm::check_secchk(reply.check_code)?;
        Ok(reply)
    }

    /// EXCSAT, ACCSEC and SECCHK with user id and password.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        self.exchange_server_attributes(&client_attributes()).await?;
        let mechanism = SecurityMechanism::UserIdPassword;
        let offered = self.access_security(mechanism, None).await?;
        if !offered.accepts(mechanism) {
            tracing::warn!(mechanisms = ?offered.mechanisms, "host refused user id and password security");
            return Err(ClientError::Host(
                HostError::new(ServerId::Database, 0, ErrorKind::Security(SecurityFailure::Other))
                    .with_message(format!("offered mechanisms {:?}", offered.mechanisms)),
            ));
        }
        let check = SecurityCheck {
            mechanism,
            user: credentials.user().to_string(),
            password: Some(credentials.password().to_string()),
        };
        self.security_check(&check).await?;
        tracing::info!(user = credentials.user(), "DDM security check passed");
        Ok(())
    }

    async fn call<Req: DdmMessage, Rep: DdmMessage>(&mut self, request: &Req) -> Result<Rep> {
        let correlation_id = self.next_correlation;
        self.next_correlation = self.next_correlation.checked_add(1).unwrap_or(1);
        let segment = DssSegment::request(correlation_id, request.encode()?);

        let exchange = async {
            write_dss(&mut self.stream, &segment).await?;
            read_reply_chain(&mut self.stream, correlation_id).await
        };
        let payload = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(payload) => payload?,
            Err(_) => return Err(ClientError::Timeout { server: ServerId::Database, operation: "DDM request" }),
        };
        Ok(Rep::decode(payload)?)
    }
}

/// Objects of every reply segment up to the first one without the chained bit.
async fn read_reply_chain<S>(stream: &mut S, correlation_id: u16) -> Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut payload = BytesMut::new();
    loop {
        let segment = read_dss(stream).await?;
        if segment.correlation_id != correlation_id {
            return Err(CorrelationError::UnknownCorrelation(u32::from(segment.correlation_id)).into());
        }
        payload.extend_from_slice(&segment.payload);
        if !segment.is_chained() {
            return Ok(payload.freeze());
        }
    }
}

#[cfg(test)]
mod tests {
    use hoststream_proto::{
        ddm::{DdmBuilder, cp, secchkcd},
        dss::DssFlags,
    };

    use super::*;

    async fn answer<Req: DdmMessage, Rep: DdmMessage>(
        host: &mut tokio::io::DuplexStream,
        reply: &Rep,
    ) -> Req {
        let segment = read_dss(host).await.unwrap();
        let request = Req::decode(segment.payload).unwrap();
        write_dss(host, &DssSegment::reply(segment.correlation_id, reply.encode().unwrap())).await.unwrap();
        request
    }

    #[tokio::test]
    async fn authenticate_runs_the_three_exchanges() {
        let (client, mut host) = tokio::io::duplex(4096);
        let host_task = tokio::spawn(async move {
            let excsat: ExchangeServerAttributes =
                answer(&mut host, &ExchangeServerAttributesReply::default()).await;
            let accsec: AccessSecurity =
                answer(&mut host, &AccessSecurityReply { mechanisms: vec![3] }).await;
            let secchk: SecurityCheck =
                answer(&mut host, &SecurityCheckReply { severity: 0, check_code: secchkcd::OK }).await;
            (excsat, accsec, secchk)
        });

        let mut ddm = DdmClient::new(client, Duration::from_secs(5));
        ddm.authenticate(&Credentials::new("qsecofr", "secret")).await.unwrap();

        let (excsat, accsec, secchk) = host_task.await.unwrap();
        assert_eq!(excsat.external_name, "hoststream");
        assert_eq!(accsec.mechanism, SecurityMechanism::UserIdPassword);
        assert_eq!(secchk.user, "QSECOFR");
        assert_eq!(secchk.password.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn failed_security_check_is_classified() {
        let (client, mut host) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _: SecurityCheck = answer(
                &mut host,
                &SecurityCheckReply { severity: 8, check_code: secchkcd::PASSWORD_INVALID },
            )
            .await;
        });
        let mut ddm = DdmClient::new(client, Duration::from_secs(5));
        let check = SecurityCheck {
            mechanism: SecurityMechanism::UserIdPassword,
            user: "U".into(),
            password: Some("bad".into()),
        };
        let err = ddm.security_check(&check).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Security(SecurityFailure::PasswordIncorrect)));
    }

    #[tokio::test]
    async fn refused_mechanism_fails_before_secchk() {
        let (client, mut host) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _: ExchangeServerAttributes =
                answer(&mut host, &ExchangeServerAttributesReply::default()).await;
            let _: AccessSecurity = answer(&mut host, &AccessSecurityReply { mechanisms: vec![4] }).await;
        });
        let mut ddm = DdmClient::new(client, Duration::from_secs(5));
        let err = ddm.authenticate(&Credentials::new("u", "p")).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Security(SecurityFailure::Other)));
    }

    #[tokio::test]
    async fn mismatched_correlation_is_rejected() {
        let (client, mut host) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let segment = read_dss(&mut host).await.unwrap();
            let reply = AccessSecurityReply { mechanisms: vec![3] }.encode().unwrap();
            write_dss(&mut host, &DssSegment::reply(segment.correlation_id + 1, reply)).await.unwrap();
        });
        let mut ddm = DdmClient::new(client, Duration::from_secs(5));
        let err = ddm.access_security(SecurityMechanism::UserIdPassword, None).await.unwrap_err();
        assert!(matches!(err, ClientError::Correlation(CorrelationError::UnknownCorrelation(2))));
    }

    #[tokio::test]
    async fn chained_reply_segments_are_joined() {
        let (client, mut host) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            for _ in 0..2 {
                let segment = read_dss(&mut host).await.unwrap();
                let mut notice = DdmBuilder::new(cp::SECCHKRM);
                notice.u16(cp::SVRCOD, 0).unwrap();
                let reply = AccessSecurityReply { mechanisms: vec![3] }.encode().unwrap();
                let chained = DssFlags::CHAINED | DssFlags::SAME_CORRELATOR;
                let first = DssSegment::reply(segment.correlation_id, notice.finish().unwrap())
                    .with_flags(chained);
                write_dss(&mut host, &first).await.unwrap();
                write_dss(&mut host, &DssSegment::reply(segment.correlation_id, reply)).await.unwrap();
            }
        });
        let mut ddm = DdmClient::new(client, Duration::from_secs(5));
        for _ in 0..2 {
            let reply = ddm.access_security(SecurityMechanism::UserIdPassword, None).await.unwrap();
            assert!(reply.accepts(SecurityMechanism::UserIdPassword));
        }
    }
}

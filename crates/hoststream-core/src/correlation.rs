//! Correlation ids and reply matching.
//!
//! Every request on a connection carries a correlation id in its header and
//! the server echoes it in the reply. The [`Correlator`] hands out ids, keeps
//! the outstanding requests and decides for each incoming data stream which
//! request it answers and whether more replies follow.
//!
//! # Invariants
//!
//! - Ids start at 1, are never 0 and never collide with an outstanding id.
//!   After `u32::MAX` the counter wraps back to 1.
//! - A reply must come from the server the request went to and carry one of
//!   the reply ids the request declared.
//! - A request is removed once its final reply has been matched, once it is
//!   abandoned with [`Correlator::complete`], or once it expires.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use hoststream_proto::{DataStream, ReplyMode, ServerId};
use serde::{Deserialize, Serialize};

use crate::error::CorrelationError;

/// Correlator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// How long a request may wait for its final reply
    pub request_timeout: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(30) }
    }
}

/// What a matched reply means for its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyDisposition {
    /// Request the reply answers
    pub correlation_id: u32,
    /// Whether this is the last reply for the request
    pub last: bool,
}

#[derive(Debug, Clone)]
struct Pending {
    server: ServerId,
    request_id: u16,
    reply_ids: &'static [u16],
    mode: ReplyMode,
    deadline: Instant,
}

/// Outstanding requests of one connection.
#[derive(Debug, Clone)]
pub struct Correlator {
    config: CorrelatorConfig,
    next_id: u32,
    pending: HashMap<u32, Pending>,
}

impl Correlator {
    /// Correlator whose requests expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self::with_config(CorrelatorConfig { request_timeout: timeout })
    }

    /// Correlator from a full configuration.
    pub fn with_config(config: CorrelatorConfig) -> Self {
        Self { config, next_id: 1, pending: HashMap::new() }
    }

    /// Record an outgoing request and return the correlation id to put in
    /// its header.
    pub fn register(
        &mut self,
        server: ServerId,
        request_id: u16,
        reply_ids: &'static [u16],
        mode: ReplyMode,
        now: Instant,
    ) -> u32 {
        let id = self.allocate();
        let deadline = now + self.config.request_timeout;
        self.pending.insert(id, Pending { server, request_id, reply_ids, mode, deadline });
        id
    }

    fn allocate(&mut self) -> u32 {
        loop {
            let id = self.next_id;
            self.next_id = if id == u32::MAX { 1 } else { id + 1 };
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Match an incoming data stream to its request.
    ///
    /// The request is forgotten when the reply is its last one, and also when
    /// the reply turns out not to answer it (the request cannot complete
    /// after that).
    pub fn match_reply(&mut self, ds: &DataStream) -> Result<ReplyDisposition, CorrelationError> {
        let correlation_id = ds.correlation_id();
        let pending = self
            .pending
            .get(&correlation_id)
            .ok_or(CorrelationError::UnknownCorrelation(correlation_id))?;

        if pending.server != ds.server() || !pending.reply_ids.contains(&ds.request_id()) {
            let expected = pending.server;
            tracing::warn!(
                correlation_id,
                request_id = pending.request_id,
                reply_id = ds.request_id(),
                "reply does not answer pending request"
            );
            self.pending.remove(&correlation_id);
            return Err(CorrelationError::UnexpectedReply {
                correlation_id,
                expected,
                server: ds.server(),
                reply_id: ds.request_id(),
            });
        }

        let last = match pending.mode {
            ReplyMode::Single => true,
            ReplyMode::Chained => ds.chain_indicator() != Some(1),
        };
        if last {
            self.pending.remove(&correlation_id);
        }
        Ok(ReplyDisposition { correlation_id, last })
    }

    /// Forget a request without a reply. Returns whether it was pending.
    pub fn complete(&mut self, correlation_id: u32) -> bool {
        self.pending.remove(&correlation_id).is_some()
    }

    /// Remove and return every request whose deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Vec<u32> {
        let mut expired: Vec<u32> =
            self.pending.iter().filter(|(_, p)| p.deadline <= now).map(|(id, _)| *id).collect();
        expired.sort_unstable();
        for id in &expired {
            self.pending.remove(id);
        }
        expired
    }

    /// Remove and return every outstanding request.
    pub fn drain(&mut self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.pending.drain().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of outstanding requests.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Earliest deadline among outstanding requests.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }
}

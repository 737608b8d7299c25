//! Conversion-table cache.
//!
//! Text in a CCSID without a built-in codec needs the host's 512-byte
//! Unicode table. Tables come from an ordered list of [`TableSource`]s (in
//! the client: the central server over the shared connection, then over a
//! fresh one). Each source is retried on transient failures with exponential
//! backoff; a permanent failure moves on to the next source.
//!
//! Loaded tables are kept for the lifetime of the cache and concurrent
//! callers asking for the same CCSID wait on a single load. Failures are not
//! cached, so a later call tries the sources again.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use hoststream_proto::{Ccsid, CodePage, TextCodec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::env::Environment;

/// Retry schedule for one table source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per source, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Growth factor between delays
    pub multiplier: u32,
    /// Upper bound on any delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            multiplier: 2,
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (starting at 1).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Why a table could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableFetchError {
    /// Worth retrying the same source (I/O failure, timeout, host busy)
    #[error("transient: {0}")]
    Transient(String),

    /// The source cannot supply this table
    #[error("permanent: {0}")]
    Permanent(String),

    /// Every source failed
    #[error("no conversion table for CCSID {ccsid}: {reason}")]
    Unavailable {
        /// Requested CCSID
        ccsid: Ccsid,
        /// Last failure seen
        reason: String,
    },
}

/// Somewhere conversion tables can be downloaded from.
#[async_trait]
pub trait TableSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// The 512-byte Unicode table of a single-byte `ccsid`.
    async fn fetch(&self, ccsid: Ccsid) -> Result<Bytes, TableFetchError>;
}

/// Per-CCSID codec cache in front of a list of table sources.
pub struct ConversionTableCache<E> {
    env: E,
    policy: RetryPolicy,
    sources: Vec<Arc<dyn TableSource>>,
    tables: Mutex<HashMap<Ccsid, Arc<OnceCell<TextCodec>>>>,
}

impl<E: Environment> ConversionTableCache<E> {
    /// Cache trying `sources` in order.
    pub fn new(env: E, policy: RetryPolicy, sources: Vec<Arc<dyn TableSource>>) -> Self {
        Self { env, policy, sources, tables: Mutex::new(HashMap::new()) }
    }

    /// Codec for `ccsid`, downloading its table on first use.
    pub async fn codec(&self, ccsid: Ccsid) -> Result<TextCodec, TableFetchError> {
        if let Some(codec) = TextCodec::builtin(ccsid) {
            return Ok(codec);
        }
        let cell = self.cell(ccsid);
        cell.get_or_try_init(|| self.load(ccsid)).await.cloned()
    }

    /// Whether a downloaded table for `ccsid` is held.
    pub fn is_cached(&self, ccsid: Ccsid) -> bool {
        self.tables
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ccsid)
            .is_some_and(|cell| cell.initialized())
    }

    fn cell(&self, ccsid: Ccsid) -> Arc<OnceCell<TextCodec>> {
        let mut tables = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(tables.entry(ccsid).or_default())
    }

    async fn load(&self, ccsid: Ccsid) -> Result<TextCodec, TableFetchError> {
        let mut last = TableFetchError::Permanent("no table sources configured".to_string());
        for source in &self.sources {
            match self.fetch_with_retry(source.as_ref(), ccsid).await {
                Ok(table) => match CodePage::from_unicode_table(ccsid, &table) {
                    Ok(page) => {
                        tracing::debug!(ccsid, source = source.name(), "conversion table loaded");
                        return Ok(TextCodec::SingleByte(Arc::new(page)));
                    },
                    Err(err) => {
                        tracing::warn!(ccsid, source = source.name(), error = %err, "bad conversion table");
                        last = TableFetchError::Permanent(err.to_string());
                    },
                },
                Err(err) => last = err,
            }
        }
        Err(TableFetchError::Unavailable { ccsid, reason: last.to_string() })
    }

    async fn fetch_with_retry(
        &self,
        source: &dyn TableSource,
        ccsid: Ccsid,
    ) -> Result<Bytes, TableFetchError> {
        let mut attempt = 1;
        loop {
            match source.fetch(ccsid).await {
                Ok(table) => return Ok(table),
                Err(TableFetchError::Transient(reason)) if attempt < self.policy.max_attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        ccsid,
                        source = source.name(),
                        attempt,
                        ?delay,
                        %reason,
                        "conversion table fetch failed, retrying"
                    );
                    self.env.sleep(delay).await;
                    attempt += 1;
                },
                Err(err) => {
                    tracing::warn!(ccsid, source = source.name(), error = %err, "table source gave up");
                    return Err(err);
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
        time::Instant,
    };

    use super::*;

    #[derive(Clone, Default)]
    struct RecordingEnv {
        sleeps: Arc<Mutex<Vec<Duration>>>,
    }

    impl RecordingEnv {
        fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().unwrap().clone()
        }
    }

    impl Environment for RecordingEnv {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.sleeps.lock().unwrap().push(duration);
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            buffer.fill(0x5A);
        }
    }

    struct ScriptedSource {
        name: &'static str,
        script: Mutex<VecDeque<Result<Bytes, TableFetchError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(name: &'static str, script: Vec<Result<Bytes, TableFetchError>>) -> Arc<Self> {
            Arc::new(Self { name, script: Mutex::new(script.into()), calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TableSource for ScriptedSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, _ccsid: Ccsid) -> Result<Bytes, TableFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TableFetchError::Permanent("script exhausted".into())))
        }
    }

    fn table() -> Bytes {
        Bytes::from(CodePage::cp037().to_unicode_table())
    }

    fn transient() -> Result<Bytes, TableFetchError> {
        Err(TableFetchError::Transient("connection reset".into()))
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_secs(2));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn builtin_pages_skip_sources() {
        let source = ScriptedSource::new("central", vec![]);
        let cache = ConversionTableCache::new(
            RecordingEnv::default(),
            RetryPolicy::default(),
            vec![source.clone() as Arc<dyn TableSource>],
        );
        assert_eq!(cache.codec(37).await.unwrap().ccsid(), 37);
        assert_eq!(cache.codec(13488).await.unwrap().ccsid(), 13488);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_with_backoff() {
        let env = RecordingEnv::default();
        let source = ScriptedSource::new("central", vec![transient(), transient(), Ok(table())]);
        let cache = ConversionTableCache::new(
            env.clone(),
            RetryPolicy::default(),
            vec![source.clone() as Arc<dyn TableSource>],
        );

        let codec = cache.codec(500).await.unwrap();
        assert_eq!(codec.ccsid(), 500);
        assert_eq!(codec.decode(&[0xC1]).unwrap(), "A");
        assert_eq!(source.calls(), 3);
        assert_eq!(env.sleeps(), vec![Duration::from_millis(100), Duration::from_millis(200)]);
        assert!(cache.is_cached(500));

        cache.codec(500).await.unwrap();
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_moves_to_next_source() {
        let env = RecordingEnv::default();
        let first = ScriptedSource::new("shared", vec![Err(TableFetchError::Permanent("nope".into()))]);
        let second = ScriptedSource::new("fresh", vec![Ok(table())]);
        let cache = ConversionTableCache::new(
            env.clone(),
            RetryPolicy::default(),
            vec![first.clone() as Arc<dyn TableSource>, second.clone() as Arc<dyn TableSource>],
        );

        cache.codec(273).await.unwrap();
        assert_eq!((first.calls(), second.calls()), (1, 1));
        assert!(env.sleeps().is_empty());
    }

    #[tokio::test]
    async fn malformed_table_counts_as_source_failure() {
        let first = ScriptedSource::new("shared", vec![Ok(Bytes::from_static(&[0u8; 10]))]);
        let second = ScriptedSource::new("fresh", vec![Ok(table())]);
        let cache = ConversionTableCache::new(
            RecordingEnv::default(),
            RetryPolicy::default(),
            vec![first as Arc<dyn TableSource>, second.clone() as Arc<dyn TableSource>],
        );
        cache.codec(285).await.unwrap();
        assert_eq!(second.calls(), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let source = ScriptedSource::new(
            "central",
            vec![transient(), transient(), transient(), Ok(table())],
        );
        let cache = ConversionTableCache::new(
            RecordingEnv::default(),
            RetryPolicy::default(),
            vec![source.clone() as Arc<dyn TableSource>],
        );

        let err = cache.codec(500).await.unwrap_err();
        assert!(matches!(err, TableFetchError::Unavailable { ccsid: 500, .. }));
        assert_eq!(source.calls(), 3);
        assert!(!cache.is_cached(500));

        cache.codec(500).await.unwrap();
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_load() {
        let source = ScriptedSource::new("central", vec![Ok(table())]);
        let cache = ConversionTableCache::new(
            RecordingEnv::default(),
            RetryPolicy::default(),
            vec![source.clone() as Arc<dyn TableSource>],
        );

        let (a, b, c) = tokio::join!(cache.codec(500), cache.codec(500), cache.codec(500));
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn no_sources_is_unavailable() {
        let cache =
            ConversionTableCache::new(RecordingEnv::default(), RetryPolicy::default(), Vec::new());
        assert!(matches!(
            cache.codec(500).await,
            Err(TableFetchError::Unavailable { ccsid: 500, .. })
        ));
    }
}

//! Journal owner
//!
//! A `Rank` is the daemon-side owner of a journal: it holds the owning lock,
//! the finisher that runs completions, the live configuration and the
//! cluster map. Everything outside the journal core (the CLI, tests, an
//! embedding service) drives the journal through a rank.
//!
//! The blocking helpers (`create_and_wait`, `flush_and_wait`, ...) release
//! the owning lock before they wait, so completions that re-acquire it can
//! run.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::completion::{CompletionSignal, Finisher, Status};
use crate::config::{ClusterMap, ConfigStore};
use crate::journal::JournalBackend;
use crate::mdlog::{BoundarySource, LogContext, MdLog, SegmentExpirer, SharedLog};
use crate::observability::MetricsRegistry;

/// Default bound for the blocking helpers.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(10);

/// Builder for a [`Rank`].
pub struct RankBuilder {
    backend: Arc<dyn JournalBackend>,
    config: Option<Arc<ConfigStore>>,
    expirer: Option<Arc<dyn SegmentExpirer>>,
    boundary_source: Option<Arc<dyn BoundarySource>>,
}

impl RankBuilder {
    pub fn config(mut self, config: Arc<ConfigStore>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn expirer(mut self, expirer: Arc<dyn SegmentExpirer>) -> Self {
        self.expirer = Some(expirer);
        self
    }

    pub fn boundary_source(mut self, source: Arc<dyn BoundarySource>) -> Self {
        self.boundary_source = Some(source);
        self
    }

    /// Start the finisher and build the journal. The journal still needs
    /// `create` or `open`.
    pub fn build(self) -> Rank {
        let finisher = Finisher::start("mdlog-finisher");
        let config = self.config.unwrap_or_else(|| Arc::new(ConfigStore::new()));
        let metrics = Arc::new(MetricsRegistry::new());

        let mut ctx = LogContext::new(finisher.clone(), self.backend)
            .with_config(Arc::clone(&config))
            .with_metrics(Arc::clone(&metrics));
        if let Some(expirer) = self.expirer {
            ctx = ctx.with_expirer(expirer);
        }
        if let Some(source) = self.boundary_source {
            ctx = ctx.with_boundary_source(source);
        }

        Rank {
            log: MdLog::new(ctx),
            finisher,
            config,
            metrics,
            cluster_map: Mutex::new(ClusterMap::default()),
        }
    }
}

/// Owner of a journal, its lock and its finisher.
pub struct Rank {
    log: SharedLog,
    finisher: Finisher,
    config: Arc<ConfigStore>,
    metrics: Arc<MetricsRegistry>,
    cluster_map: Mutex<ClusterMap>,
}

impl Rank {
    pub fn builder(backend: Arc<dyn JournalBackend>) -> RankBuilder {
        RankBuilder {
            backend,
            config: None,
            expirer: None,
            boundary_source: None,
        }
    }

    /// Rank with default collaborators.
    pub fn new(backend: Arc<dyn JournalBackend>) -> Self {
        Self::builder(backend).build()
    }

    /// Acquire the owning lock.
    pub fn lock(&self) -> MutexGuard<'_, MdLog> {
        self.log.lock()
    }

    pub fn log(&self) -> &SharedLog {
        &self.log
    }

    pub fn finisher(&self) -> &Finisher {
        &self.finisher
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn cluster_map(&self) -> ClusterMap {
        *self.cluster_map.lock()
    }

    /// Publish a new cluster map epoch and let the journal pick up
    /// `changed_keys` from the config store.
    pub fn apply_config<S: AsRef<str>>(&self, changed_keys: &[S]) {
        let map = {
            let mut current = self.cluster_map.lock();
            *current = current.next();
            *current
        };
        self.lock().handle_conf_change(changed_keys, &map);
    }

    fn wait(signal: &CompletionSignal, timeout: Duration) -> Status {
        signal.wait_for(timeout).unwrap_or(Status::ETIMEDOUT)
    }

    /// Create an empty journal and wait for it to be ready.
    pub fn create_and_wait(&self, timeout: Duration) -> Status {
        let (signal, completion) = CompletionSignal::new();
        self.lock().create(completion);
        Self::wait(&signal, timeout)
    }

    /// Open and replay an existing journal.
    pub fn open_and_wait(&self, timeout: Duration) -> Status {
        let (signal, completion) = CompletionSignal::new();
        self.lock().open(completion);
        Self::wait(&signal, timeout)
    }

    /// Flush and wait until everything submitted so far is durable.
    pub fn flush_and_wait(&self, timeout: Duration) -> Status {
        let (signal, completion) = CompletionSignal::new();
        {
            let mut log = self.lock();
            log.wait_for_safe(completion);
            log.flush();
        }
        Self::wait(&signal, timeout)
    }

    /// Wait for every segment expiring now. `OK` if none are.
    pub fn await_expirations(&self, timeout: Duration) -> Status {
        let (signal, completion) = CompletionSignal::new();
        if !self.lock().await_expiring_segments(completion) {
            return Status::OK;
        }
        Self::wait(&signal, timeout)
    }

    /// Shut the journal down and stop the finisher once it has run every
    /// queued completion. Safe to call more than once.
    pub fn shutdown(&self) {
        self.lock().shutdown();
        self.finisher.wait_for_empty();
        self.finisher.stop();
    }
}

impl Drop for Rank {
    fn drop(&mut self) {
        self.shutdown();
    }
}

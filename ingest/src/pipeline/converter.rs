//! Conversion worker pool.
//!
//! ```text
//!             ┌──────────┐
//!  batch() ──►│   work   ├──┬──► worker 0 ──┐
//!             └──────────┘  ├──► worker 1 ──┼──► output ──► consumer
//!                           └──► worker N ──┘
//! ```
//!
//! Both channels are handoff channels. `batch` returns only once an idle
//! worker has taken the slice whole, and a worker's send returns only once
//! the consumer has taken the group. The worker converts every entry, groups
//! the records by resource, and emits one `ResourceGroup` per distinct
//! resource in the slice. Workers share nothing mutable, so a resource that
//! appears in two slices produces two groups.

use super::handoff::{self, HandoffReceiver, HandoffSender};
use super::{Component, PipelineError};
use crate::config::PipelineConfig;
use crate::convert::convert;
use crate::models::{Entry, ResourceGroup};
use crate::plugin::PluginRegistry;
use crate::resource::ResourceId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Initial capacity of a worker's resource map.
const GROUPS_INITIAL_CAPACITY: usize = 200;

enum State {
    Created {
        work_rx: HandoffReceiver<Vec<Entry>>,
        out_tx: HandoffSender<ResourceGroup>,
    },
    Running(Vec<JoinHandle<()>>),
    Stopped,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Running(_) => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Converts entry slices into resource groups on a pool of workers.
///
/// # Example
///
/// ```
/// use ingest::config::PipelineConfig;
/// use ingest::models::Entry;
/// use ingest::pipeline::LogConverter;
///
/// # tokio_test::block_on(async {
/// let (converter, mut groups) = LogConverter::new(&PipelineConfig::default().with_worker_count(1));
/// converter.start().await.unwrap();
///
/// let entries = vec![Entry::new("a").with_resource("host", "a"), Entry::new("b").with_resource("host", "a")];
/// converter.batch(entries).await.unwrap();
///
/// let group = groups.recv().await.unwrap();
/// assert_eq!(group.len(), 2);
/// converter.stop().await;
/// # });
/// ```
pub struct LogConverter {
    worker_count: usize,
    plugins: Option<Arc<PluginRegistry>>,
    work_tx: Mutex<Option<HandoffSender<Vec<Entry>>>>,
    shutdown: CancellationToken,
    state: tokio::sync::Mutex<State>,
}

impl LogConverter {
    /// Creates a converter and the receiving end of its output channel.
    ///
    /// The output channel is closed once `stop` returns.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> (Self, HandoffReceiver<ResourceGroup>) {
        let (work_tx, work_rx) = handoff::channel();
        let (out_tx, out_rx) = handoff::channel();

        let converter = Self {
            worker_count: config.worker_count(),
            plugins: None,
            work_tx: Mutex::new(Some(work_tx)),
            shutdown: CancellationToken::new(),
            state: tokio::sync::Mutex::new(State::Created { work_rx, out_tx }),
        };

        (converter, out_rx)
    }

    /// Attaches plugin metadata used to enrich converted records.
    #[must_use]
    pub fn with_plugins(mut self, plugins: impl Into<Arc<PluginRegistry>>) -> Self {
        self.plugins = Some(plugins.into());
        self
    }

    /// Number of workers spawned by `start`.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Spawns the workers.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` unless the converter was just
    /// created.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        let (work_rx, out_tx) = match std::mem::replace(&mut *state, State::Stopped) {
            State::Created { work_rx, out_tx } => (work_rx, out_tx),
            other => {
                let current = other.name();
                *state = other;
                return Err(PipelineError::InvalidState {
                    component: Component::Converter,
                    operation: "start",
                    state: current,
                });
            }
        };

        let workers = (0..self.worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    work: work_rx.clone(),
                    output: out_tx.clone(),
                    shutdown: self.shutdown.clone(),
                    plugins: self.plugins.clone(),
                    groups: HashMap::with_capacity(GROUPS_INITIAL_CAPACITY),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        *state = State::Running(workers);

        debug!(worker_count = self.worker_count, "log converter started");
        Ok(())
    }

    /// Hands a slice of entries to the next idle worker.
    ///
    /// Waits while every worker is busy. Once this returns `Ok`, a worker
    /// owns the slice.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Stopped` once the converter is stopping,
    /// including when it stops while this call waits for a worker.
    pub async fn batch(&self, entries: Vec<Entry>) -> Result<(), PipelineError> {
        let sender = self
            .work_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PipelineError::Stopped(Component::Converter))?;

        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(PipelineError::Stopped(Component::Converter)),
            sent = sender.send(entries) => sent.map_err(|_| PipelineError::Stopped(Component::Converter)),
        }
    }

    /// Stops the workers and closes the output channel.
    ///
    /// Groups a worker has not yet handed off are discarded. Safe to call
    /// any number of times, concurrently or not.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;

        self.work_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.shutdown.cancel();

        if let State::Running(workers) = std::mem::replace(&mut *state, State::Stopped) {
            for worker in workers {
                if let Err(e) = worker.await {
                    error!(error = %e, "log converter worker failed");
                }
            }
            debug!("log converter stopped");
        }
    }
}

/// One conversion worker. Owns its resource map outright.
struct Worker {
    id: usize,
    work: HandoffReceiver<Vec<Entry>>,
    output: HandoffSender<ResourceGroup>,
    shutdown: CancellationToken,
    plugins: Option<Arc<PluginRegistry>>,
    groups: HashMap<ResourceId, ResourceGroup>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            let slice = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                slice = self.work.recv() => match slice {
                    Some(slice) => slice,
                    None => break,
                },
            };

            self.aggregate(slice);
            if let Err(e) = self.flush_all().await {
                debug!(
                    worker = self.id,
                    error = %e,
                    dropped = self.groups.len(),
                    "dropping remaining groups"
                );
                self.groups.clear();
            }
        }

        if let Some(slice) = self.work.take_delivered() {
            debug!(worker = self.id, dropped = slice.len(), "dropping slice taken at shutdown");
        }
        trace!(worker = self.id, "log converter worker exited");
    }

    fn aggregate(&mut self, slice: Vec<Entry>) {
        for entry in slice {
            let resource_id = ResourceId::of(&entry.resource);
            let group = self
                .groups
                .entry(resource_id)
                .or_insert_with(|| ResourceGroup {
                    resource_id,
                    resource: entry.resource.clone(),
                    records: Vec::new(),
                });
            group.records.push(convert(entry, self.plugins.as_deref()));
        }
    }

    /// Sends every held group. On failure the groups not yet sent stay in
    /// the map.
    async fn flush_all(&mut self) -> Result<(), PipelineError> {
        let resource_ids: Vec<ResourceId> = self.groups.keys().copied().collect();
        for resource_id in resource_ids {
            if let Some(group) = self.groups.remove(&resource_id) {
                self.flush(group).await?;
            }
        }
        Ok(())
    }

    async fn flush(&self, group: ResourceGroup) -> Result<(), PipelineError> {
        tokio::select! {
            biased;
            () = self.shutdown.cancelled() => Err(PipelineError::FlushInterrupted(Component::Converter)),
            sent = self.output.send(group) => sent.map_err(|_| PipelineError::Stopped(Component::Converter)),
        }
    }
}

//! End-to-end pipeline wiring.
//!
//! A `LogReceiver` owns one emitter and one converter and runs two loops
//! between them: the emitter loop forwards every emitted slice to the
//! converter, and the consumer loop hands every resource group to the sink.

use super::handoff::HandoffReceiver;
use super::{Component, LogConverter, LogEmitter, PipelineError};
use crate::config::PipelineConfig;
use crate::models::{Entry, ResourceGroup};
use crate::plugin::PluginRegistry;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

enum State {
    Created {
        converter: LogConverter,
        batches: HandoffReceiver<Vec<Entry>>,
        groups: HandoffReceiver<ResourceGroup>,
    },
    Running {
        converter: Arc<LogConverter>,
        loops: Vec<JoinHandle<()>>,
    },
    Stopped,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Running { .. } => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Runs entries through the emitter and converter into a sink.
///
/// # Example
///
/// ```
/// use ingest::config::PipelineConfig;
/// use ingest::models::Entry;
/// use ingest::pipeline::LogReceiver;
/// use ingest::sink::InMemoryLogSink;
///
/// # tokio_test::block_on(async {
/// let sink = InMemoryLogSink::new_shared();
/// let receiver = LogReceiver::new(&PipelineConfig::default(), sink.clone());
///
/// receiver.start().await.unwrap();
/// receiver.process(Entry::new("hello").with_resource("host", "a")).await.unwrap();
/// receiver.shutdown().await;
/// # });
/// ```
pub struct LogReceiver {
    emitter: LogEmitter,
    sink: Arc<dyn LogSink>,
    plugins: Option<Arc<PluginRegistry>>,
    shutdown: CancellationToken,
    state: tokio::sync::Mutex<State>,
}

impl LogReceiver {
    /// Builds the emitter and converter; nothing runs until `start`.
    #[must_use]
    pub fn new(config: &PipelineConfig, sink: Arc<dyn LogSink>) -> Self {
        let (emitter, batches) = LogEmitter::new(config);
        let (converter, groups) = LogConverter::new(config);

        Self {
            emitter,
            sink,
            plugins: None,
            shutdown: CancellationToken::new(),
            state: tokio::sync::Mutex::new(State::Created {
                converter,
                batches,
                groups,
            }),
        }
    }

    /// Attaches plugin metadata used to enrich converted records.
    #[must_use]
    pub fn with_plugins(mut self, plugins: impl Into<Arc<PluginRegistry>>) -> Self {
        self.plugins = Some(plugins.into());
        self
    }

    /// Starts the converter, the emitter, and both forwarding loops.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` unless the receiver was just
    /// created.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        let (converter, batches, groups) = match std::mem::replace(&mut *state, State::Stopped) {
            State::Created {
                converter,
                batches,
                groups,
            } => (converter, batches, groups),
            other => {
                let current = other.name();
                *state = other;
                return Err(PipelineError::InvalidState {
                    component: Component::Receiver,
                    operation: "start",
                    state: current,
                });
            }
        };

        let converter = Arc::new(match &self.plugins {
            Some(plugins) => converter.with_plugins(Arc::clone(plugins)),
            None => converter,
        });
        converter.start().await?;
        self.emitter.start().await?;

        let loops = vec![
            tokio::spawn(emitter_loop(
                batches,
                Arc::clone(&converter),
                self.shutdown.clone(),
            )),
            tokio::spawn(consumer_loop(
                groups,
                Arc::clone(&self.sink),
                self.shutdown.clone(),
            )),
        ];
        let worker_count = converter.worker_count();
        *state = State::Running { converter, loops };

        info!(worker_count, "log receiver started");
        Ok(())
    }

    /// Hands one entry to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns the emitter's error once the pipeline is shutting down.
    pub async fn process(&self, entry: Entry) -> Result<(), PipelineError> {
        self.emitter.process(entry).await
    }

    /// Stops the emitter, then the converter, then both loops.
    ///
    /// Safe to call any number of times.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, State::Stopped) {
            return;
        }

        self.emitter.stop().await;
        match std::mem::replace(&mut *state, State::Stopped) {
            State::Running { converter, loops } => {
                converter.stop().await;
                self.shutdown.cancel();
                for handle in loops {
                    if let Err(e) = handle.await {
                        error!(error = %e, "log receiver loop failed");
                    }
                }
            }
            State::Created { converter, .. } => {
                converter.stop().await;
                self.shutdown.cancel();
            }
            State::Stopped => {}
        }

        info!("log receiver stopped");
    }
}

async fn emitter_loop(
    mut batches: HandoffReceiver<Vec<Entry>>,
    converter: Arc<LogConverter>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            batch = batches.recv() => {
                let Some(batch) = batch else { break };
                if let Err(e) = converter.batch(batch).await {
                    error!(error = %e, "failed to hand batch to converter");
                }
            }
        }
    }

    if let Some(batch) = batches.take_delivered() {
        debug!(dropped = batch.len(), "dropping slice taken at shutdown");
    }
    debug!("emitter loop stopped");
}

async fn consumer_loop(
    mut groups: HandoffReceiver<ResourceGroup>,
    sink: Arc<dyn LogSink>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            group = groups.recv() => {
                let Some(group) = group else { break };
                let resource_id = group.resource_id;
                if let Err(e) = sink.consume(group) {
                    error!(error = %e, %resource_id, "failed to consume resource group");
                }
            }
        }
    }

    if let Some(group) = groups.take_delivered() {
        debug!(dropped = group.len(), "dropping group taken at shutdown");
    }
    debug!("consumer loop stopped");
}

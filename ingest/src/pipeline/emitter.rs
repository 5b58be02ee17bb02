//! Entry batching front end.
//!
//! The emitter buffers entries handed to it by producers and releases them
//! downstream as one slice, either when the buffer reaches the trigger
//! amount or when the flush timer fires, whichever happens first.
//!
//! # Shutdown
//!
//! The output is a handoff channel: a flush returns `Ok` only once the
//! consumer has taken the slice. `stop` cancels the timer task, closes the
//! output channel, and waits for the timer to exit. Entries still buffered at
//! that point are discarded, and a flush still waiting for the consumer fails
//! with `FlushInterrupted`.

use super::handoff::{self, HandoffReceiver, HandoffSender};
use super::{Component, PipelineError};
use crate::config::PipelineConfig;
use crate::models::Entry;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Lifecycle of the emitter's timer task.
enum State {
    Created,
    Running(JoinHandle<()>),
    Stopped,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running(_) => "running",
            Self::Stopped => "stopped",
        }
    }
}

/// Batches entries and emits them as slices on a channel.
///
/// # Example
///
/// ```
/// use ingest::config::PipelineConfig;
/// use ingest::models::Entry;
/// use ingest::pipeline::LogEmitter;
///
/// # tokio_test::block_on(async {
/// let (emitter, mut batches) = LogEmitter::new(&PipelineConfig::default().with_flush_trigger_amount(2));
///
/// emitter.process(Entry::new("one")).await.unwrap();
///
/// // The second entry triggers a flush, which waits for the consumer.
/// let (processed, batch) = tokio::join!(emitter.process(Entry::new("two")), batches.recv());
/// processed.unwrap();
/// assert_eq!(batch.unwrap().len(), 2);
/// emitter.stop().await;
/// # });
/// ```
pub struct LogEmitter {
    shared: Arc<Shared>,
    state: tokio::sync::Mutex<State>,
}

/// State reachable from both callers and the timer task.
struct Shared {
    flush_interval: Duration,
    flush_trigger_amount: usize,
    batch_capacity: usize,
    buffer: Mutex<Vec<Entry>>,
    sender: Mutex<Option<HandoffSender<Vec<Entry>>>>,
    shutdown: CancellationToken,
}

impl LogEmitter {
    /// Creates an emitter and the receiving end of its output channel.
    ///
    /// The channel holds nothing, so every flush waits until the consumer
    /// takes the slice.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> (Self, HandoffReceiver<Vec<Entry>>) {
        let flush_trigger_amount = config.flush_trigger_amount();
        let batch_capacity = batch_capacity(flush_trigger_amount);
        let (tx, rx) = handoff::channel();

        let emitter = Self {
            shared: Arc::new(Shared {
                flush_interval: config.flush_interval(),
                flush_trigger_amount,
                batch_capacity,
                buffer: Mutex::new(Vec::with_capacity(batch_capacity)),
                sender: Mutex::new(Some(tx)),
                shutdown: CancellationToken::new(),
            }),
            state: tokio::sync::Mutex::new(State::Created),
        };

        (emitter, rx)
    }

    /// Starts the flush timer.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidState` if the emitter was already
    /// started or has been stopped.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock().await;
        if !matches!(*state, State::Created) {
            return Err(PipelineError::InvalidState {
                component: Component::Emitter,
                operation: "start",
                state: state.name(),
            });
        }

        let shared = Arc::clone(&self.shared);
        *state = State::Running(tokio::spawn(async move { shared.run_timer().await }));

        debug!(
            flush_interval = ?self.shared.flush_interval,
            flush_trigger_amount = self.shared.flush_trigger_amount,
            "log emitter started"
        );
        Ok(())
    }

    /// Buffers an entry, flushing if the buffer reached the trigger amount.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Stopped` after `stop`, or
    /// `PipelineError::FlushInterrupted` if the triggered flush lost the race
    /// against shutdown.
    pub async fn process(&self, entry: Entry) -> Result<(), PipelineError> {
        if self.shared.shutdown.is_cancelled() {
            return Err(PipelineError::Stopped(Component::Emitter));
        }

        let should_flush = {
            let mut buffer = self.shared.lock_buffer();
            buffer.push(entry);
            buffer.len() >= self.shared.flush_trigger_amount
        };

        if should_flush {
            self.shared.flush(&self.shared.shutdown).await?;
        }
        Ok(())
    }

    /// Emits the buffered entries as one slice.
    ///
    /// Does nothing when the buffer is empty. The send waits for the
    /// consumer but gives up as soon as either `cancel` or the emitter's
    /// own shutdown fires.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::FlushInterrupted` if `cancel` was already
    /// cancelled (nothing is drained) or fired during the send (the slice is
    /// dropped), and `PipelineError::Stopped` once the output channel is
    /// closed.
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        self.shared.flush(cancel).await
    }

    /// Number of entries currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.shared.lock_buffer().len()
    }

    /// Stops the timer and closes the output channel.
    ///
    /// Safe to call any number of times, concurrently or not; every call
    /// returns only once the timer task has exited.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;

        self.shared.shutdown.cancel();
        self.shared
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let State::Running(handle) = std::mem::replace(&mut *state, State::Stopped) {
            if let Err(e) = handle.await {
                error!(error = %e, "log emitter timer task failed");
            }
            debug!(
                discarded = self.shared.lock_buffer().len(),
                "log emitter stopped"
            );
        }
    }
}

impl Shared {
    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> Option<HandoffSender<Vec<Entry>>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn flush(&self, cancel: &CancellationToken) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::FlushInterrupted(Component::Emitter));
        }
        let sender = self
            .sender()
            .ok_or(PipelineError::Stopped(Component::Emitter))?;

        let batch = {
            let mut buffer = self.lock_buffer();
            if buffer.is_empty() {
                return Ok(());
            }
            std::mem::replace(&mut *buffer, Vec::with_capacity(self.batch_capacity))
        };
        let count = batch.len();

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(dropped = count, "log emitter flush interrupted");
                Err(PipelineError::FlushInterrupted(Component::Emitter))
            }
            () = self.shutdown.cancelled() => {
                warn!(dropped = count, "log emitter flush interrupted");
                Err(PipelineError::FlushInterrupted(Component::Emitter))
            }
            sent = sender.send(batch) => sent.map_err(|_| PipelineError::Stopped(Component::Emitter)),
        }
    }

    async fn run_timer(&self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.flush(&self.shutdown).await {
                        debug!(error = %e, "timed flush skipped");
                    }
                }
            }
        }
    }
}

/// Capacity of a fresh buffer: the trigger amount plus ten percent headroom.
fn batch_capacity(flush_trigger_amount: usize) -> usize {
    flush_trigger_amount.saturating_add(flush_trigger_amount / 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;
    use tokio_test::{assert_err, assert_ok, assert_pending, assert_ready, assert_ready_err};
    use tracing_test::traced_test;

    const LONG: Duration = Duration::from_secs(3600);
    const WAIT: Duration = Duration::from_secs(2);
    const IDLE: Duration = Duration::from_millis(50);

    fn config(trigger: usize, interval: Duration) -> PipelineConfig {
        PipelineConfig::default()
            .with_flush_trigger_amount(trigger)
            .with_flush_interval(interval)
    }

    fn entries(n: usize) -> Vec<Entry> {
        (0..n).map(|i| Entry::new(format!("entry {i}"))).collect()
    }

    #[test]
    fn test_batch_capacity() {
        assert_eq!(batch_capacity(200), 220);
        assert_eq!(batch_capacity(15), 16);
        assert_eq!(batch_capacity(1), 1);
        assert_eq!(batch_capacity(usize::MAX), usize::MAX);
    }

    #[tokio::test]
    async fn test_trigger_amount_flushes_without_timer() {
        let (emitter, mut rx) = LogEmitter::new(&config(3, LONG));

        for entry in entries(2) {
            assert_ok!(emitter.process(entry).await);
        }
        assert_eq!(emitter.buffered(), 2);

        let (processed, batch) = tokio::join!(emitter.process(Entry::new("third")), rx.recv());
        assert_ok!(processed);
        let batch = batch.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[2].body, Entry::new("third").body);
        assert_eq!(emitter.buffered(), 0);

        emitter.stop().await;
    }

    #[tokio::test]
    async fn test_timer_flushes_partial_batch() {
        let (emitter, mut rx) = LogEmitter::new(&config(100, Duration::from_millis(20)));
        assert_ok!(emitter.start().await);

        assert_ok!(emitter.process(Entry::new("lonely")).await);

        let batch = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);

        emitter.stop().await;
    }

    #[tokio::test]
    async fn test_flush_preserves_order() {
        let (emitter, mut rx) = LogEmitter::new(&config(50, LONG));
        let input = entries(50);

        for entry in input[..49].iter().cloned() {
            assert_ok!(emitter.process(entry).await);
        }

        let (processed, batch) = tokio::join!(emitter.process(input[49].clone()), rx.recv());
        assert_ok!(processed);
        assert_eq!(batch.unwrap(), input);
        emitter.stop().await;
    }

    #[tokio::test]
    async fn test_flush_empty_buffer_is_noop() {
        let (emitter, mut rx) = LogEmitter::new(&config(10, LONG));

        // Nobody is reading, so this would hang if it tried to send.
        assert_ok!(timeout(WAIT, emitter.flush(&CancellationToken::new()))
            .await
            .unwrap());
        assert!(timeout(IDLE, rx.recv()).await.is_err());
        emitter.stop().await;
    }

    #[tokio::test]
    async fn test_flush_waits_for_consumer() {
        let (emitter, mut rx) = LogEmitter::new(&config(10, LONG));
        assert_ok!(emitter.process(Entry::new("held")).await);

        let cancel = CancellationToken::new();
        let mut flush = tokio_test::task::spawn(emitter.flush(&cancel));
        assert_pending!(flush.poll());
        assert_pending!(flush.poll());

        let mut recv = tokio_test::task::spawn(rx.recv());
        assert_pending!(recv.poll());

        assert!(flush.is_woken());
        assert_ok!(assert_ready!(flush.poll()));
        assert_eq!(assert_ready!(recv.poll()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flush_with_cancelled_token_sends_nothing() {
        let (emitter, mut rx) = LogEmitter::new(&config(10, LONG));
        assert_ok!(emitter.process(Entry::new("kept")).await);

        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(
            emitter.flush(&cancel).await,
            Err(PipelineError::FlushInterrupted(Component::Emitter))
        );
        assert_eq!(emitter.buffered(), 1);

        // The next slice out is the untouched buffer.
        let fresh = CancellationToken::new();
        let (flushed, batch) = tokio::join!(emitter.flush(&fresh), rx.recv());
        assert_ok!(flushed);
        assert_eq!(batch.unwrap()[0].body, Entry::new("kept").body);
        emitter.stop().await;
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let (emitter, _rx) = LogEmitter::new(&config(10, LONG));
        assert_ok!(emitter.start().await);

        assert_eq!(
            emitter.start().await,
            Err(PipelineError::InvalidState {
                component: Component::Emitter,
                operation: "start",
                state: "running",
            })
        );
        emitter.stop().await;
    }

    #[tokio::test]
    async fn test_start_after_stop_rejected() {
        let (emitter, _rx) = LogEmitter::new(&config(10, LONG));
        emitter.stop().await;

        let err = assert_err!(emitter.start().await);
        assert!(matches!(
            err,
            PipelineError::InvalidState {
                state: "stopped",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_process_after_stop_rejected() {
        let (emitter, _rx) = LogEmitter::new(&config(10, LONG));
        emitter.stop().await;

        assert_eq!(
            emitter.process(Entry::new("late")).await,
            Err(PipelineError::Stopped(Component::Emitter))
        );
        assert_eq!(emitter.buffered(), 0);
    }

    #[tokio::test]
    async fn test_stop_closes_channel() {
        let (emitter, mut rx) = LogEmitter::new(&config(10, Duration::from_millis(10)));
        assert_ok!(emitter.start().await);

        emitter.stop().await;

        assert!(timeout(WAIT, rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_stop_is_idempotent() {
        let (emitter, mut rx) = LogEmitter::new(&config(10, Duration::from_millis(5)));
        let emitter = Arc::new(emitter);
        assert_ok!(emitter.start().await);

        let stops: Vec<_> = (0..4)
            .map(|_| {
                let emitter = Arc::clone(&emitter);
                tokio::spawn(async move { emitter.stop().await })
            })
            .collect();
        for stop in stops {
            assert_ok!(timeout(WAIT, stop).await.unwrap());
        }

        emitter.stop().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_stop_interrupts_blocked_flush() {
        let (emitter, mut rx) = LogEmitter::new(&config(1, LONG));

        // No consumer, so the triggered flush cannot hand the slice off.
        let mut blocked = tokio_test::task::spawn(emitter.process(Entry::new("first")));
        assert_pending!(blocked.poll());

        emitter.shared.shutdown.cancel();
        let err = assert_ready_err!(blocked.poll());
        assert_eq!(err, PipelineError::FlushInterrupted(Component::Emitter));
        drop(blocked);

        emitter.stop().await;
        assert!(rx.recv().await.is_none());
        assert!(logs_contain("log emitter flush interrupted"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_fails_flush_waiting_for_consumer() {
        let (emitter, mut rx) = LogEmitter::new(&config(100, LONG));
        let emitter = Arc::new(emitter);
        assert_ok!(emitter.process(Entry::new("unclaimed")).await);

        let flush = {
            let emitter = Arc::clone(&emitter);
            tokio::spawn(async move { emitter.flush(&CancellationToken::new()).await })
        };
        tokio::time::sleep(IDLE).await;
        assert!(!flush.is_finished());

        emitter.stop().await;

        assert_eq!(
            timeout(WAIT, flush).await.unwrap().unwrap(),
            Err(PipelineError::FlushInterrupted(Component::Emitter))
        );
        assert!(rx.recv().await.is_none());
    }
}

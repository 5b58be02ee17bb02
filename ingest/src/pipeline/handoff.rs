//! Rendezvous channel between pipeline stages.
//!
//! A send completes only once a receiver has taken the value, so whoever
//! `send` returned `Ok` to knows the value has an owner. Receivers announce
//! they are ready by queueing a `oneshot` ticket; the sender answers the
//! oldest live ticket.
//!
//! ```text
//!   HandoffReceiver ──ticket (oneshot::Sender)──> HandoffSender
//!   HandoffReceiver <──────────── value ───────── HandoffSender
//! ```
//!
//! Both ends can be cloned. Cloned receivers share the ticket queue, so a
//! pool of receivers gets values in the order they became ready.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};

type Ticket<T> = oneshot::Sender<T>;

/// Creates a connected sender/receiver pair.
///
/// # Example
///
/// ```
/// use ingest::pipeline::handoff;
///
/// # tokio_test::block_on(async {
/// let (tx, mut rx) = handoff::channel();
///
/// let (sent, received) = tokio::join!(tx.send("slice"), rx.recv());
/// assert!(sent.is_ok());
/// assert_eq!(received, Some("slice"));
/// # });
/// ```
#[must_use]
pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (ticket_tx, ticket_rx) = mpsc::unbounded_channel();

    let sender = HandoffSender {
        tickets: Arc::new(Mutex::new(ticket_rx)),
    };
    let receiver = HandoffReceiver {
        tickets: ticket_tx,
        pending: None,
    };

    (sender, receiver)
}

/// Sending half of a handoff channel.
pub struct HandoffSender<T> {
    tickets: Arc<Mutex<mpsc::UnboundedReceiver<Ticket<T>>>>,
}

impl<T> Clone for HandoffSender<T> {
    fn clone(&self) -> Self {
        Self {
            tickets: Arc::clone(&self.tickets),
        }
    }
}

impl<T> HandoffSender<T> {
    /// Waits for a ready receiver and hands it `value`.
    ///
    /// Dropping the future before it completes drops `value` without
    /// delivering it.
    ///
    /// # Errors
    ///
    /// Gives `value` back once every receiver is gone.
    pub async fn send(&self, value: T) -> Result<(), T> {
        let mut tickets = self.tickets.lock().await;
        let mut value = value;

        loop {
            let Some(ticket) = tickets.recv().await else {
                return Err(value);
            };
            // A receiver that went away leaves a dead ticket behind.
            match ticket.send(value) {
                Ok(()) => return Ok(()),
                Err(returned) => value = returned,
            }
        }
    }
}

/// Receiving half of a handoff channel.
pub struct HandoffReceiver<T> {
    tickets: mpsc::UnboundedSender<Ticket<T>>,
    pending: Option<oneshot::Receiver<T>>,
}

impl<T> Clone for HandoffReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            tickets: self.tickets.clone(),
            pending: None,
        }
    }
}

impl<T> HandoffReceiver<T> {
    /// Waits for the next value.
    ///
    /// Returns `None` once every sender is gone. Cancel safe: a value
    /// delivered after the future was dropped is returned by the next call,
    /// or by `take_delivered`.
    pub async fn recv(&mut self) -> Option<T> {
        if self.pending.is_none() {
            let (ticket, pending) = oneshot::channel();
            self.tickets.send(ticket).ok()?;
            self.pending = Some(pending);
        }

        let pending = self.pending.as_mut()?;
        let value = pending.await.ok();
        self.pending = None;
        value
    }

    /// Takes a value that was handed over but not yet returned by `recv`.
    pub fn take_delivered(&mut self) -> Option<T> {
        self.pending.take()?.try_recv().ok()
    }
}

//! Asynchronous ingest pipeline.
//!
//! ```text
//!   producer ──process──> LogEmitter ──Vec<Entry>──> LogConverter ──ResourceGroup──> consumer
//!                         (batching)                 (N workers)
//! ```
//!
//! `LogReceiver` wires the three stages together and drives a `LogSink`.
//! Channels between stages are unbuffered `handoff` channels: a send returns
//! only once the next stage has taken the value, so a slow consumer applies
//! backpressure all the way back to `process`.

pub mod converter;
pub mod emitter;
pub mod handoff;
pub mod receiver;

pub use converter::LogConverter;
pub use emitter::LogEmitter;
pub use receiver::LogReceiver;

use std::fmt;
use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// The batching front end.
    Emitter,
    /// The conversion worker pool.
    Converter,
    /// The wiring around emitter, converter, and sink.
    Receiver,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Emitter => "log emitter",
            Self::Converter => "log converter",
            Self::Receiver => "log receiver",
        })
    }
}

/// Errors returned by pipeline stages.
///
/// None of these are retried; each one means the pipeline is shutting down or
/// was driven out of order.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The component has been stopped.
    #[error("{0} is stopped")]
    Stopped(Component),

    /// Shutdown won the race against a channel send; the batch was dropped.
    #[error("{0} flush interrupted by shutdown")]
    FlushInterrupted(Component),

    /// Lifecycle operation called in the wrong state.
    #[error("cannot {operation} {component} while {state}")]
    InvalidState {
        /// Component that rejected the call.
        component: Component,
        /// Operation that was attempted.
        operation: &'static str,
        /// Lifecycle state the component was in.
        state: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            PipelineError::Stopped(Component::Converter).to_string(),
            "log converter is stopped"
        );
        assert_eq!(
            PipelineError::FlushInterrupted(Component::Emitter).to_string(),
            "log emitter flush interrupted by shutdown"
        );
        assert_eq!(
            PipelineError::InvalidState {
                component: Component::Receiver,
                operation: "start",
                state: "running",
            }
            .to_string(),
            "cannot start log receiver while running"
        );
    }
}

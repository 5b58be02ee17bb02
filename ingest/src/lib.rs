//! Heimsight Ingest Library
//!
//! This crate turns raw log entries into OTLP-shaped records grouped by the
//! resource that produced them.
//!
//! # Modules
//!
//! - [`models`] - Entries, records, and resource groups
//! - [`convert`] - Entry to record conversion and body normalization
//! - [`resource`] - Stable resource identities
//! - [`pipeline`] - Batching emitter, converter worker pool, and receiver
//! - [`sink`] - Downstream consumers of resource groups
//! - [`plugin`] - Plugin metadata used for record enrichment
//! - [`config`] - Pipeline tuning
//!
//! # Example
//!
//! ```
//! use ingest::convert::convert;
//! use ingest::models::{Entry, Severity};
//!
//! let entry = Entry::new("User logged in")
//!     .with_severity(Severity::Info)
//!     .with_resource("host", "web-1");
//!
//! let record = convert(entry, None);
//! assert_eq!(record.severity_text, "Info");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod convert;
pub mod models;
pub mod pipeline;
pub mod plugin;
pub mod resource;
pub mod sink;

pub use pipeline::{LogConverter, LogEmitter, LogReceiver, PipelineError};
pub use resource::ResourceId;
pub use sink::{InMemoryLogSink, LogSink, SinkError};

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde_json;

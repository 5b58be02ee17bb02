//! Data models for the ingest pipeline.
//!
//! Entries come in, records go out, grouped by the resource that produced them.

pub mod entry;
pub mod record;
pub mod value;

pub use entry::{Entry, Severity};
pub use record::{AnyValue, Record, ResourceGroup};
pub use value::Value;

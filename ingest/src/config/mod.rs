//! Configuration module for the ingest pipeline.
//!
//! This module contains the tuning knobs shared by the emitter, converter, and receiver.

pub mod pipeline;

pub use pipeline::{
    default_worker_count, PipelineConfig, DEFAULT_FLUSH_INTERVAL, DEFAULT_FLUSH_TRIGGER_AMOUNT,
};

//! Pipeline tuning configuration.
//!
//! Every setting is optional. Absent or zero values fall back to the
//! defaults below when read through the resolved accessors.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time between timer-driven emitter flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Default number of buffered entries that triggers an emitter flush.
pub const DEFAULT_FLUSH_TRIGGER_AMOUNT: usize = 200;

const ENV_FLUSH_INTERVAL_MS: &str = "INGEST_FLUSH_INTERVAL_MS";
const ENV_FLUSH_TRIGGER_AMOUNT: &str = "INGEST_FLUSH_TRIGGER_AMOUNT";
const ENV_WORKER_COUNT: &str = "INGEST_WORKER_COUNT";

/// Configuration shared by the emitter, converter, and receiver.
///
/// Values can be set via environment variables:
/// - `INGEST_FLUSH_INTERVAL_MS`: flush interval in milliseconds (default: 100)
/// - `INGEST_FLUSH_TRIGGER_AMOUNT`: buffered entries that force a flush (default: 200)
/// - `INGEST_WORKER_COUNT`: converter workers (default: a quarter of the CPUs, at least 1)
///
/// # Examples
///
/// ```
/// use ingest::config::PipelineConfig;
/// use std::time::Duration;
///
/// let config = PipelineConfig::default().with_flush_trigger_amount(3);
/// assert_eq!(config.flush_trigger_amount(), 3);
/// assert_eq!(config.flush_interval(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Time between timer-driven flushes, in milliseconds.
    pub flush_interval_ms: Option<u64>,
    /// Number of buffered entries that forces a flush.
    pub flush_trigger_amount: Option<usize>,
    /// Number of converter workers.
    pub worker_count: Option<usize>,
}

impl PipelineConfig {
    /// Creates a configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the variables is set but is not a
    /// non-negative integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| -> Result<Option<u64>> {
            lookup(key)
                .map(|v| v.trim().parse::<u64>())
                .transpose()
                .with_context(|| format!("{key} must be a non-negative integer"))
        };

        Ok(Self {
            flush_interval_ms: parse(ENV_FLUSH_INTERVAL_MS)?,
            flush_trigger_amount: parse(ENV_FLUSH_TRIGGER_AMOUNT)?
                .map(usize::try_from)
                .transpose()
                .context("flush trigger amount out of range")?,
            worker_count: parse(ENV_WORKER_COUNT)?
                .map(usize::try_from)
                .transpose()
                .context("worker count out of range")?,
        })
    }

    /// Sets the flush interval.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets the flush trigger amount.
    #[must_use]
    pub fn with_flush_trigger_amount(mut self, amount: usize) -> Self {
        self.flush_trigger_amount = Some(amount);
        self
    }

    /// Sets the number of converter workers.
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Returns the effective flush interval.
    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        match self.flush_interval_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_FLUSH_INTERVAL,
        }
    }

    /// Returns the effective flush trigger amount.
    #[must_use]
    pub fn flush_trigger_amount(&self) -> usize {
        match self.flush_trigger_amount {
            Some(amount) if amount > 0 => amount,
            _ => DEFAULT_FLUSH_TRIGGER_AMOUNT,
        }
    }

    /// Returns the effective number of converter workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        match self.worker_count {
            Some(count) if count > 0 => count,
            _ => default_worker_count(),
        }
    }
}

/// A quarter of the available CPUs, at least one.
#[must_use]
pub fn default_worker_count() -> usize {
    (num_cpus::get() / 4).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.flush_interval(), DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.flush_trigger_amount(), DEFAULT_FLUSH_TRIGGER_AMOUNT);
        assert_eq!(config.worker_count(), default_worker_count());
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_zero_values_fall_back_to_defaults() {
        let config = PipelineConfig {
            flush_interval_ms: Some(0),
            flush_trigger_amount: Some(0),
            worker_count: Some(0),
        };
        assert_eq!(config.flush_interval(), DEFAULT_FLUSH_INTERVAL);
        assert_eq!(config.flush_trigger_amount(), DEFAULT_FLUSH_TRIGGER_AMOUNT);
        assert_eq!(config.worker_count(), default_worker_count());
    }

    #[test]
    fn test_builders() {
        let config = PipelineConfig::default()
            .with_flush_interval(Duration::from_millis(250))
            .with_flush_trigger_amount(10)
            .with_worker_count(3);

        assert_eq!(config.flush_interval(), Duration::from_millis(250));
        assert_eq!(config.flush_trigger_amount(), 10);
        assert_eq!(config.worker_count(), 3);
    }

    #[test]
    fn test_from_lookup_reads_all_values() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("INGEST_FLUSH_INTERVAL_MS", "50"),
            ("INGEST_FLUSH_TRIGGER_AMOUNT", " 20 "),
            ("INGEST_WORKER_COUNT", "2"),
        ]))
        .unwrap();

        assert_eq!(config.flush_interval_ms, Some(50));
        assert_eq!(config.flush_trigger_amount, Some(20));
        assert_eq!(config.worker_count, Some(2));
    }

    #[test]
    fn test_from_lookup_missing_values_are_none() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_from_lookup_rejects_malformed_values() {
        let err = PipelineConfig::from_lookup(lookup(&[("INGEST_WORKER_COUNT", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("INGEST_WORKER_COUNT"));

        assert!(
            PipelineConfig::from_lookup(lookup(&[("INGEST_FLUSH_INTERVAL_MS", "-5")])).is_err()
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let config: PipelineConfig = serde_json::from_str(r#"{"worker_count": 4}"#).unwrap();
        assert_eq!(config.worker_count(), 4);
        assert_eq!(config.flush_trigger_amount, None);
    }
}

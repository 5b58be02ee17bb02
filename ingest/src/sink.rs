//! Downstream consumers of resource groups.
//!
//! `LogSink` is the seam between the pipeline and whatever persists or
//! exports its output. `InMemoryLogSink` keeps everything in a vector and is
//! meant for tests and local development.

use crate::models::ResourceGroup;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Errors that can occur while consuming groups.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to acquire lock on the sink.
    #[error("Failed to acquire lock on log sink")]
    LockError,

    /// Generic storage error.
    #[error("Storage error: {0}")]
    StorageError(String),
}

/// Receives every group the pipeline produces.
///
/// Implementations must be thread-safe; the receiver calls `consume` from a
/// background task.
pub trait LogSink: Send + Sync {
    /// Takes ownership of one group.
    ///
    /// # Errors
    ///
    /// Returns an error if the group could not be stored. The pipeline logs
    /// the error and moves on.
    fn consume(&self, group: ResourceGroup) -> Result<(), SinkError>;
}

/// In-memory sink that keeps every group it receives.
///
/// # Example
///
/// ```
/// use ingest::models::ResourceGroup;
/// use ingest::sink::{InMemoryLogSink, LogSink};
/// use std::collections::HashMap;
///
/// let sink = InMemoryLogSink::new();
/// sink.consume(ResourceGroup::new(HashMap::new())).unwrap();
///
/// assert_eq!(sink.group_count().unwrap(), 1);
/// assert_eq!(sink.record_count().unwrap(), 0);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLogSink {
    groups: Arc<RwLock<Vec<ResourceGroup>>>,
}

impl InMemoryLogSink {
    /// Creates a new empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            groups: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Creates a new sink wrapped in an Arc.
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns a copy of every group received so far, in arrival order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn groups(&self) -> Result<Vec<ResourceGroup>, SinkError> {
        let groups = self.groups.read().map_err(|_| SinkError::LockError)?;
        Ok(groups.clone())
    }

    /// Returns the number of groups received.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn group_count(&self) -> Result<usize, SinkError> {
        let groups = self.groups.read().map_err(|_| SinkError::LockError)?;
        Ok(groups.len())
    }

    /// Returns the number of records across all groups.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn record_count(&self) -> Result<usize, SinkError> {
        let groups = self.groups.read().map_err(|_| SinkError::LockError)?;
        Ok(groups.iter().map(ResourceGroup::len).sum())
    }

    /// Removes every stored group.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn clear(&self) -> Result<(), SinkError> {
        let mut groups = self.groups.write().map_err(|_| SinkError::LockError)?;
        groups.clear();
        Ok(())
    }
}

impl LogSink for InMemoryLogSink {
    fn consume(&self, group: ResourceGroup) -> Result<(), SinkError> {
        let mut groups = self.groups.write().map_err(|_| SinkError::LockError)?;
        groups.push(group);
        Ok(())
    }
}

impl<T: LogSink + ?Sized> LogSink for Arc<T> {
    fn consume(&self, group: ResourceGroup) -> Result<(), SinkError> {
        (**self).consume(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert_to_group;
    use crate::models::Entry;

    fn group(host: &str, records: usize) -> ResourceGroup {
        let mut group = convert_to_group(Entry::new("first").with_resource("host", host));
        for _ in 1..records {
            group
                .records
                .push(convert_to_group(Entry::new("more")).records.remove(0));
        }
        group
    }

    #[test]
    fn test_consume_and_count() {
        let sink = InMemoryLogSink::new();

        sink.consume(group("a", 3)).unwrap();
        sink.consume(group("b", 2)).unwrap();

        assert_eq!(sink.group_count().unwrap(), 2);
        assert_eq!(sink.record_count().unwrap(), 5);
    }

    #[test]
    fn test_groups_in_arrival_order() {
        let sink = InMemoryLogSink::new();
        sink.consume(group("a", 1)).unwrap();
        sink.consume(group("b", 1)).unwrap();

        let hosts: Vec<String> = sink
            .groups()
            .unwrap()
            .into_iter()
            .map(|g| g.resource["host"].clone())
            .collect();
        assert_eq!(hosts, vec!["a", "b"]);
    }

    #[test]
    fn test_clear() {
        let sink = InMemoryLogSink::new();
        sink.consume(group("a", 2)).unwrap();

        sink.clear().unwrap();

        assert_eq!(sink.group_count().unwrap(), 0);
        assert_eq!(sink.record_count().unwrap(), 0);
    }

    #[test]
    fn test_shared_sink_through_trait_object() {
        let sink = InMemoryLogSink::new_shared();
        let dynamic: Arc<dyn LogSink> = sink.clone();

        dynamic.consume(group("a", 1)).unwrap();

        assert_eq!(sink.group_count().unwrap(), 1);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SinkError::LockError.to_string(),
            "Failed to acquire lock on log sink"
        );
        assert_eq!(
            SinkError::StorageError("disk full".to_string()).to_string(),
            "Storage error: disk full"
        );
    }
}

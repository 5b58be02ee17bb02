//! Plugin metadata registry.
//!
//! Entries emitted by a plugin carry a `plugin_id` attribute. The registry
//! maps those ids to the plugin's type, name, and version so converted
//! records can be enriched with them. The registry is built by the caller and
//! handed to the converter; there is no process-wide instance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata describing one configured plugin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin type, e.g. `nginx`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub plugin_type: Option<String>,
    /// Human-readable plugin name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Plugin version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PluginInfo {
    /// Creates plugin info with every field set.
    #[must_use]
    pub fn new(
        plugin_type: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            plugin_type: Some(plugin_type.into()),
            name: Some(name.into()),
            version: Some(version.into()),
        }
    }

    /// Returns the enrichment attributes this plugin contributes.
    pub(crate) fn attributes(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("plugin_type", self.plugin_type.as_deref()),
            ("plugin_name", self.name.as_deref()),
            ("plugin_version", self.version.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key, v)))
    }
}

/// Registry of plugin metadata keyed by plugin id.
///
/// # Example
///
/// ```
/// use ingest::plugin::{PluginInfo, PluginRegistry};
///
/// let registry = PluginRegistry::new()
///     .with_plugin("nginx-1", PluginInfo::new("nginx", "NGINX access logs", "0.0.3"));
///
/// assert_eq!(registry.len(), 1);
/// assert!(registry.get("nginx-1").is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginRegistry {
    plugins: HashMap<String, PluginInfo>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin, replacing any previous entry with the same id.
    pub fn register(&mut self, id: impl Into<String>, info: PluginInfo) {
        self.plugins.insert(id.into(), info);
    }

    /// Registers a plugin and returns the registry.
    #[must_use]
    pub fn with_plugin(mut self, id: impl Into<String>, info: PluginInfo) -> Self {
        self.register(id, info);
        self
    }

    /// Looks up a plugin by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PluginInfo> {
        self.plugins.get(id)
    }

    /// Number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_replaces() {
        let mut registry = PluginRegistry::new();
        registry.register("id", PluginInfo::new("a", "A", "1"));
        registry.register("id", PluginInfo::new("b", "B", "2"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("id").unwrap().plugin_type.as_deref(), Some("b"));
    }

    #[test]
    fn test_attributes_skip_missing_fields() {
        let info = PluginInfo {
            name: Some("only-name".to_string()),
            ..Default::default()
        };
        let attrs: Vec<_> = info.attributes().collect();
        assert_eq!(attrs, vec![("plugin_name", "only-name")]);
    }

    #[test]
    fn test_deserialize_pipeline_config_shape() {
        let json = r#"{
            "myid": {"type": "my_plugin", "name": "my_plugin_1", "version": "0.0.10"},
            "other": {"name": "unnamed"}
        }"#;

        let registry: PluginRegistry = serde_json::from_str(json).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.get("myid"),
            Some(&PluginInfo::new("my_plugin", "my_plugin_1", "0.0.10"))
        );
        assert!(registry.get("other").unwrap().version.is_none());
        assert!(registry.get("missing").is_none());
        assert!(!registry.is_empty());
    }
}

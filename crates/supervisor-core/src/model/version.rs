//! Config version history (§3 "Config Version", §8 monotonicity/cap
//! properties).

use super::user_config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single point in the configuration history.
///
/// `version` is strictly increasing across the lifetime of a supervisor
/// instance; it never resets even after the history is trimmed down to
/// `max_versions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigVersion {
    pub version: u64,
    pub config: Config,
    pub config_hash: String,
    pub created_at: DateTime<Utc>,
    /// Who or what produced this version: `"api"`, `"auto-config"`,
    /// `"remote-config"`, or `"rollback"`.
    pub source: String,
    /// Who applied this version, as supplied by the caller.
    pub author: String,
    /// Free-text note supplied by the caller.
    pub description: String,
    /// Size in bytes of the canonical generated configuration this version
    /// produced.
    pub size: u64,
    pub metadata: HashMap<String, String>,
}

/// The caller-supplied fields for a new [`ConfigVersion`] entry; everything
/// except `version`/`created_at`, which `VersionHistory::push` assigns.
#[derive(Debug, Clone, Default)]
pub struct NewVersion {
    pub config_hash: String,
    pub source: String,
    pub author: String,
    pub description: String,
    pub size: u64,
    pub metadata: HashMap<String, String>,
}

/// Bounded version history. `versions.len() <= max_versions` always holds;
/// pushing past the cap drops the oldest entry (§8 "History... capped").
#[derive(Debug, Clone)]
pub struct VersionHistory {
    versions: Vec<ConfigVersion>,
    max_versions: usize,
    next_version: u64,
}

impl VersionHistory {
    pub fn new(max_versions: usize) -> Self {
        Self {
            versions: Vec::new(),
            max_versions: max_versions.max(1),
            next_version: 1,
        }
    }

    /// Records a new version, assigning it the next monotonic version
    /// number, and evicts the oldest entry if the cap is exceeded.
    pub fn push(&mut self, config: Config, new_version: NewVersion) -> ConfigVersion {
        let entry = ConfigVersion {
            version: self.next_version,
            config,
            config_hash: new_version.config_hash,
            created_at: Utc::now(),
            source: new_version.source,
            author: new_version.author,
            description: new_version.description,
            size: new_version.size,
            metadata: new_version.metadata,
        };
        self.next_version += 1;
        self.versions.push(entry.clone());
        if self.versions.len() > self.max_versions {
            self.versions.remove(0);
        }
        entry
    }

    pub fn current(&self) -> Option<&ConfigVersion> {
        self.versions.last()
    }

    pub fn get(&self, version: u64) -> Option<&ConfigVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn all(&self) -> &[ConfigVersion] {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::user_config::{Config, ServiceConfig};

    fn sample_config(name: &str) -> Config {
        Config {
            service: ServiceConfig {
                name: name.to_string(),
                environment: None,
                version: None,
                tags: Default::default(),
            },
            license_key: "X".to_string(),
            metrics: Default::default(),
            traces: Default::default(),
            logs: Default::default(),
            security: Default::default(),
            processing: Default::default(),
            export: Default::default(),
        }
    }

    fn new_version(hash: &str) -> NewVersion {
        NewVersion {
            config_hash: hash.to_string(),
            source: "api".to_string(),
            author: "tester".to_string(),
            description: "test update".to_string(),
            size: 0,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn versions_increase_monotonically() {
        let mut history = VersionHistory::new(10);
        let v1 = history.push(sample_config("a"), new_version("h1"));
        let v2 = history.push(sample_config("b"), new_version("h2"));
        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);
        assert_eq!(history.current().unwrap().version, 2);
    }

    #[test]
    fn history_is_capped_and_keeps_incrementing() {
        let mut history = VersionHistory::new(3);
        for i in 0..5 {
            history.push(sample_config(&format!("cfg-{i}")), new_version(&format!("h{i}")));
        }
        assert_eq!(history.len(), 3);
        // oldest two (versions 1, 2) were evicted, but numbering kept climbing
        assert!(history.get(1).is_none());
        assert!(history.get(2).is_none());
        assert_eq!(history.current().unwrap().version, 5);
    }
}

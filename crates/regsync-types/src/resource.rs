//! Synchronized payloads and health readings.

use crate::endpoint::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A service instance as seen by a registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub service: String,
    pub host: String,
    pub port: u32,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default = "default_healthy")]
    pub healthy: bool,
    #[serde(default)]
    pub isolated: bool,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

fn default_weight() -> u32 {
    100
}

fn default_healthy() -> bool {
    true
}

impl Instance {
    pub fn new(host: impl Into<String>, port: u32) -> Self {
        Self {
            namespace: String::new(),
            service: String::new(),
            host: host.into(),
            port,
            weight: default_weight(),
            healthy: default_healthy(),
            isolated: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Returns `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A configuration file held by a config center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub group: String,
    pub file_name: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl ConfigFile {
    pub fn new(file_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            group: String::new(),
            file_name: file_name.into(),
            content: content.into(),
            labels: BTreeMap::new(),
        }
    }
}

/// Backend call counters since the last read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub total: u64,
    pub errors: u64,
}

impl Health {
    pub const fn new(total: u64, errors: u64) -> Self {
        Self { total, errors }
    }

    pub const fn is_zero(&self) -> bool {
        self.total == 0 && self.errors == 0
    }
}

/// Key under which health readings are aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimension {
    pub name: String,
    pub resource_type: ResourceType,
    pub product_name: String,
}

impl Dimension {
    pub fn new(
        name: impl Into<String>,
        resource_type: ResourceType,
        product_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type,
            product_name: product_name.into(),
        }
    }
}

/// One aggregated reading handed to reporters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub dimension: Dimension,
    pub total: u64,
    pub errors: u64,
}

/// A flushed batch of health records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatInfo {
    pub records: Vec<HealthRecord>,
}

impl StatInfo {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

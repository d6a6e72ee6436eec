//! The declarative sync document delivered by config providers.

use crate::defaults;
use crate::duration::parse_interval;
use crate::endpoint::ResourceEndpoint;
use crate::matching::Match;
use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// One source → destination synchronization rule set.
///
/// Identity is the name; two tasks with the same name are compared by
/// full value when diffing revisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTask {
    pub name: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub source: ResourceEndpoint,
    #[serde(default)]
    pub destination: ResourceEndpoint,
    #[serde(rename = "match", default)]
    pub matches: Vec<Match>,
}

impl SyncTask {
    pub fn new(
        name: impl Into<String>,
        source: ResourceEndpoint,
        destination: ResourceEndpoint,
    ) -> Self {
        Self {
            name: name.into(),
            enable: true,
            source,
            destination,
            matches: Vec::new(),
        }
    }

    pub fn with_match(mut self, m: Match) -> Self {
        self.matches.push(m);
        self
    }

    /// Matches that actually select something.
    pub fn active_matches(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(|m| !m.is_empty())
    }
}

/// How workers move data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodType {
    /// Periodic full-state reconciliation.
    Pull,
    /// Event subscription on the source.
    Watch,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodType::Pull => "pull",
            MethodType::Watch => "watch",
            MethodType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Method {
    #[serde(rename = "type")]
    pub method_type: MethodType,
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl Method {
    pub fn pull(interval: impl Into<String>) -> Self {
        Self {
            method_type: MethodType::Pull,
            enable: true,
            interval: Some(interval.into()),
        }
    }

    pub fn watch() -> Self {
        Self {
            method_type: MethodType::Watch,
            enable: true,
            interval: None,
        }
    }

    /// Pull period, defaulting to five minutes.
    pub fn pull_interval(&self) -> Duration {
        parse_interval(self.interval.as_deref(), defaults::PULL_INTERVAL_MS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl HealthCheckConfig {
    /// Probe period, defaulting to five seconds.
    pub fn interval(&self) -> Duration {
        parse_interval(self.interval.as_deref(), defaults::HEALTH_CHECK_INTERVAL_MS)
    }
}

/// Kind of stat reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Renders batches to the stat log.
    File,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetType::File => "file",
            TargetType::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportTarget {
    #[serde(rename = "type")]
    pub target_type: TargetType,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ReportTarget {
    pub fn new(target_type: TargetType) -> Self {
        Self {
            target_type,
            enable: true,
            options: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(default)]
    pub targets: Vec<ReportTarget>,
}

impl ReportConfig {
    /// Flush period, defaulting to sixty seconds.
    pub fn interval(&self) -> Duration {
        parse_interval(self.interval.as_deref(), defaults::REPORT_INTERVAL_MS)
    }
}

/// The desired state of the whole service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncDocument {
    /// Registry synchronization tasks.
    #[serde(default)]
    pub tasks: Vec<SyncTask>,

    /// Configuration-file synchronization tasks.
    #[serde(default)]
    pub config_tasks: Vec<SyncTask>,

    #[serde(default)]
    pub methods: Vec<Method>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportConfig>,
}

impl SyncDocument {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ParseError> {
        serde_json::from_slice(bytes).map_err(|e| ParseError::InvalidDocument(e.to_string()))
    }

    pub fn from_yaml(bytes: &[u8]) -> Result<Self, ParseError> {
        serde_yaml::from_slice(bytes).map_err(|e| ParseError::InvalidDocument(e.to_string()))
    }

    /// Parses YAML when `path` ends in `.yaml`/`.yml`, JSON otherwise.
    pub fn from_path_bytes(path: &str, bytes: &[u8]) -> Result<Self, ParseError> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            Self::from_yaml(bytes)
        } else {
            Self::from_json(bytes)
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, ParseError> {
        serde_json::to_string_pretty(self).map_err(|e| ParseError::InvalidDocument(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Group, ResourceType};
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"{
        "tasks": [{
            "name": "nacos-to-polaris",
            "enable": true,
            "source": {"name": "nacos", "type": "nacos", "addresses": ["127.0.0.1:8848"]},
            "destination": {
                "name": "polaris", "type": "polaris", "addresses": ["127.0.0.1:8090"],
                "authorization": {"token": "abc"}
            },
            "match": [{"namespace": "public", "service": "orders", "groups": [{"name": "canary"}]}]
        }],
        "methods": [{"type": "watch", "enable": true}, {"type": "pull", "enable": true, "interval": "60s"}],
        "healthCheck": {"enable": true},
        "report": {"interval": "1m", "targets": [{"type": "file", "enable": true}]}
    }"#;

    #[test]
    fn test_parse_json_document() {
        let doc = SyncDocument::from_json(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.tasks.len(), 1);
        let task = &doc.tasks[0];
        assert_eq!(task.source.resource_type, ResourceType::Nacos);
        assert_eq!(
            task.destination.authorization.as_ref().and_then(|a| a.token.as_deref()),
            Some("abc")
        );
        assert_eq!(task.matches[0].groups, vec![Group::new("canary")]);
        assert_eq!(doc.methods[1].pull_interval(), Duration::from_secs(60));
        assert_eq!(
            doc.health_check.as_ref().map(HealthCheckConfig::interval),
            Some(Duration::from_secs(5))
        );
        assert_eq!(doc.report.as_ref().map(ReportConfig::interval), Some(Duration::from_secs(60)));
        assert!(doc.config_tasks.is_empty());
    }

    #[test]
    fn test_parse_yaml_document() {
        let yaml = r#"
configTasks:
  - name: etcd-sync
    enable: true
    source: {name: etcd, type: etcd, addresses: ["127.0.0.1:2379"]}
    destination: {name: polaris, type: polaris, addresses: ["127.0.0.1:8093"]}
    match:
      - namespace: default
        configGroup: app
methods:
  - type: pull
    enable: true
"#;
        let doc = SyncDocument::from_path_bytes("sync.yml", yaml.as_bytes()).unwrap();
        assert_eq!(doc.config_tasks[0].matches[0].name, "app");
        assert_eq!(doc.methods[0].pull_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_method_type() {
        let doc = SyncDocument::from_json(br#"{"methods":[{"type":"push","enable":true}]}"#).unwrap();
        assert_eq!(doc.methods[0].method_type, MethodType::Unknown);
    }

    #[test]
    fn test_invalid_document() {
        assert!(SyncDocument::from_json(b"{not json").is_err());
    }

    #[test]
    fn test_json_roundtrip_preserves_equality() {
        let doc = SyncDocument::from_json(SAMPLE.as_bytes()).unwrap();
        let text = doc.to_json_pretty().unwrap();
        assert_eq!(SyncDocument::from_json(text.as_bytes()).unwrap(), doc);
    }
}

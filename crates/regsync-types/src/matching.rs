//! Match rules and the entity identities they select.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the group injected into every match.
pub const DEFAULT_GROUP: &str = "default";

/// Service name that expands to every service in the namespace.
pub const MATCH_ALL: &str = "*";

/// A named sub-selector of a service with an optional metadata filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// The implicit `default` group with no filter.
    pub fn default_group() -> Self {
        Self::new(DEFAULT_GROUP)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_GROUP
    }

    /// Returns true if `metadata` carries every key/value of this group's filter.
    pub fn selects(&self, metadata: &BTreeMap<String, String>) -> bool {
        self.metadata
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// One selection rule of a sync task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Match {
    #[serde(default)]
    pub namespace: String,

    /// Service name for registry tasks, config group name for config tasks.
    #[serde(default, alias = "service", alias = "configGroup")]
    pub name: String,

    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Match {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    /// An empty match selects nothing and is never expanded.
    pub fn is_empty(&self) -> bool {
        self.namespace.is_empty() && self.name.is_empty() && self.groups.is_empty()
    }

    /// Returns true if the name expands to every entity in the namespace.
    pub fn is_wildcard(&self) -> bool {
        self.name == MATCH_ALL
    }

    /// The groups actually synchronized: the declared ones, with the
    /// `default` group prepended when none of them is named `default`.
    pub fn effective_groups(&self) -> Vec<Group> {
        let mut groups = Vec::with_capacity(self.groups.len() + 1);
        if !self.groups.iter().any(Group::is_default) {
            groups.push(Group::default_group());
        }
        groups.extend(self.groups.iter().cloned());
        groups
    }

    pub fn service(&self) -> Service {
        Service::new(self.namespace.clone(), self.name.clone())
    }

    pub fn config_group(&self) -> ConfigGroup {
        ConfigGroup::new(self.namespace.clone(), self.name.clone())
    }
}

/// Identity of a registry service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Service {
    pub namespace: String,
    pub name: String,
}

impl Service {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Identity of a configuration group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigGroup {
    pub namespace: String,
    pub name: String,
}

impl ConfigGroup {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ConfigGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

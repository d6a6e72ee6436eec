//! Backend endpoint descriptors.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Endpoint option naming the namespace a backend treats as its default.
///
/// When both sides of a task declare it, entities living in the source's
/// default namespace are written into the destination's default namespace.
pub const OPTION_DEFAULT_NAMESPACE: &str = "default_namespace";

/// Kind of backend behind an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Polaris,
    Nacos,
    Consul,
    Kong,
    Kubernetes,
    Zookeeper,
    Apollo,
    Etcd,
    /// Unrecognized backend tag; always rejected by validation.
    #[default]
    #[serde(other)]
    Unknown,
}

impl ResourceType {
    /// Returns the lowercase tag used in documents and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Polaris => "polaris",
            ResourceType::Nacos => "nacos",
            ResourceType::Consul => "consul",
            ResourceType::Kong => "kong",
            ResourceType::Kubernetes => "kubernetes",
            ResourceType::Zookeeper => "zookeeper",
            ResourceType::Apollo => "apollo",
            ResourceType::Etcd => "etcd",
            ResourceType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "polaris" => Ok(ResourceType::Polaris),
            "nacos" => Ok(ResourceType::Nacos),
            "consul" => Ok(ResourceType::Consul),
            "kong" => Ok(ResourceType::Kong),
            "kubernetes" => Ok(ResourceType::Kubernetes),
            "zookeeper" => Ok(ResourceType::Zookeeper),
            "apollo" => Ok(ResourceType::Apollo),
            "etcd" => Ok(ResourceType::Etcd),
            _ => Err(ParseError::InvalidResourceType(s.to_string())),
        }
    }
}

/// Credentials presented to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Database descriptor for backends that persist through a SQL store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A source or destination backend instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEndpoint {
    /// Logical name, used as the stat dimension name.
    #[serde(default)]
    pub name: String,

    /// Free-form product label (e.g. "nacos-2.x").
    #[serde(default)]
    pub product_name: String,

    #[serde(rename = "type", default)]
    pub resource_type: ResourceType,

    #[serde(default)]
    pub addresses: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<Database>,

    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ResourceEndpoint {
    /// Creates an endpoint with a single address.
    pub fn new(
        name: impl Into<String>,
        resource_type: ResourceType,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type,
            addresses: vec![address.into()],
            ..Default::default()
        }
    }

    /// Sets an option, returning the endpoint for chaining.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Returns an option value.
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// The namespace this backend treats as its default, if declared.
    pub fn default_namespace(&self) -> Option<&str> {
        self.option(OPTION_DEFAULT_NAMESPACE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_roundtrip_str() {
        for ty in [
            ResourceType::Polaris,
            ResourceType::Nacos,
            ResourceType::Kubernetes,
            ResourceType::Etcd,
        ] {
            assert_eq!(ty.to_string().parse::<ResourceType>().unwrap(), ty);
        }
        assert!("mysql".parse::<ResourceType>().is_err());
    }

    #[test]
    fn test_unknown_type_deserializes() {
        let endpoint: ResourceEndpoint =
            serde_json::from_str(r#"{"name":"x","type":"eureka","addresses":["a:1"]}"#).unwrap();
        assert_eq!(endpoint.resource_type, ResourceType::Unknown);
    }

    #[test]
    fn test_default_namespace_option() {
        let endpoint = ResourceEndpoint::new("polaris", ResourceType::Polaris, "127.0.0.1:8091")
            .with_option(OPTION_DEFAULT_NAMESPACE, "default");
        assert_eq!(endpoint.default_namespace(), Some("default"));
        assert_eq!(
            ResourceEndpoint::new("n", ResourceType::Nacos, "a").default_namespace(),
            None
        );
    }
}

//! Namespace translation between backends with different default namespaces.

use regsync_types::{ConfigGroup, ResourceEndpoint, Service};

/// Maps the source's default namespace onto the destination's.
///
/// Both endpoints must declare `default_namespace` for any translation to
/// happen; every other namespace passes through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceAlias {
    source: Option<String>,
    destination: Option<String>,
}

impl NamespaceAlias {
    pub fn between(source: &ResourceEndpoint, destination: &ResourceEndpoint) -> Self {
        Self {
            source: source.default_namespace().map(str::to_string),
            destination: destination.default_namespace().map(str::to_string),
        }
    }

    pub fn translate<'a>(&'a self, namespace: &'a str) -> &'a str {
        match (&self.source, &self.destination) {
            (Some(from), Some(to)) if from == namespace => to,
            _ => namespace,
        }
    }

    pub fn service(&self, service: &Service) -> Service {
        Service::new(self.translate(&service.namespace), service.name.clone())
    }

    pub fn config_group(&self, group: &ConfigGroup) -> ConfigGroup {
        ConfigGroup::new(self.translate(&group.namespace), group.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_types::{ResourceType, OPTION_DEFAULT_NAMESPACE};

    fn endpoint(ty: ResourceType, default_ns: Option<&str>) -> ResourceEndpoint {
        let endpoint = ResourceEndpoint::new(ty.as_str(), ty, "127.0.0.1:1");
        match default_ns {
            Some(ns) => endpoint.with_option(OPTION_DEFAULT_NAMESPACE, ns),
            None => endpoint,
        }
    }

    #[test]
    fn test_translates_default_namespace() {
        let alias = NamespaceAlias::between(
            &endpoint(ResourceType::Nacos, Some("")),
            &endpoint(ResourceType::Polaris, Some("default")),
        );
        assert_eq!(alias.service(&Service::new("", "orders")), Service::new("default", "orders"));
        assert_eq!(alias.translate("prod"), "prod");
    }

    #[test]
    fn test_no_translation_without_both_sides() {
        let alias = NamespaceAlias::between(
            &endpoint(ResourceType::Nacos, Some("public")),
            &endpoint(ResourceType::Polaris, None),
        );
        assert_eq!(alias.translate("public"), "public");
        assert_eq!(NamespaceAlias::default().translate(""), "");
    }
}

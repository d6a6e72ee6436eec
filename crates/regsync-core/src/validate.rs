//! Document validation.
//!
//! A revision is checked as a whole before anything is applied; the first
//! problem found rejects it.

use crate::error::{SyncError, SyncResult};
use regsync_types::{
    Match, Method, MethodType, ReportConfig, ResourceEndpoint, ResourceType, SyncTask, TargetType,
};
use std::collections::HashSet;

/// How match rules are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRules {
    /// Service matches. The namespace may be empty (some registries have an
    /// unnamed default namespace); namespace and group names must not
    /// contain a dot.
    Registry,
    /// Config group matches. The namespace is required.
    Config,
}

/// Checks task names, endpoints and match rules.
///
/// Names must be unique across all tasks. Everything else is only checked
/// for enabled tasks.
pub fn verify_tasks<F>(tasks: &[SyncTask], rules: MatchRules, supports: F) -> SyncResult<()>
where
    F: Fn(ResourceType) -> bool,
{
    let mut names = HashSet::new();
    for task in tasks {
        if !names.insert(task.name.as_str()) {
            return Err(SyncError::invalid_config(
                format!("tasks[{}]", task.name),
                "duplicate task name",
            ));
        }
        if !task.enable {
            continue;
        }
        if task.name.trim().is_empty() {
            return Err(SyncError::invalid_config("tasks[].name", "must not be empty"));
        }
        verify_endpoint(&task.name, "source", &task.source, &supports)?;
        verify_endpoint(&task.name, "destination", &task.destination, &supports)?;
        for (index, rule) in task.matches.iter().enumerate() {
            verify_match(&task.name, index, rule, rules)?;
        }
    }
    Ok(())
}

fn verify_endpoint<F>(
    task: &str,
    role: &str,
    endpoint: &ResourceEndpoint,
    supports: &F,
) -> SyncResult<()>
where
    F: Fn(ResourceType) -> bool,
{
    let field = |name: &str| format!("tasks[{}].{}.{}", task, role, name);
    if endpoint.name.trim().is_empty() {
        return Err(SyncError::invalid_config(field("name"), "must not be empty"));
    }
    if endpoint.addresses.iter().all(|a| a.trim().is_empty()) {
        return Err(SyncError::invalid_config(
            field("addresses"),
            "at least one address is required",
        ));
    }
    if endpoint.resource_type == ResourceType::Unknown {
        return Err(SyncError::invalid_config(field("type"), "unknown backend type"));
    }
    if !supports(endpoint.resource_type) {
        return Err(SyncError::unsupported_backend(
            endpoint.name.clone(),
            endpoint.resource_type,
        ));
    }
    Ok(())
}

fn verify_match(task: &str, index: usize, rule: &Match, rules: MatchRules) -> SyncResult<()> {
    if rule.is_empty() {
        return Ok(());
    }
    let field = |name: &str| format!("tasks[{}].match[{}].{}", task, index, name);
    match rules {
        MatchRules::Config if rule.namespace.trim().is_empty() => {
            return Err(SyncError::invalid_config(field("namespace"), "must not be empty"));
        }
        MatchRules::Registry if rule.namespace.contains('.') => {
            return Err(SyncError::invalid_config(field("namespace"), "must not contain '.'"));
        }
        _ => {}
    }
    if rule.name.trim().is_empty() {
        return Err(SyncError::invalid_config(field("name"), "must not be empty"));
    }
    for group in &rule.groups {
        if group.name.trim().is_empty() {
            return Err(SyncError::invalid_config(
                field("groups"),
                "group name must not be empty",
            ));
        }
        if rules == MatchRules::Registry && group.name.contains('.') {
            return Err(SyncError::invalid_config(
                field("groups"),
                format!("group '{}' must not contain '.'", group.name),
            ));
        }
        if group
            .metadata
            .iter()
            .any(|(k, v)| k.trim().is_empty() || v.trim().is_empty())
        {
            return Err(SyncError::invalid_config(
                field("groups"),
                format!("group '{}' has an empty metadata key or value", group.name),
            ));
        }
    }
    Ok(())
}

/// Checks the method list against the tasks it will drive.
pub fn verify_methods(methods: &[Method], tasks: &[SyncTask]) -> SyncResult<()> {
    let mut seen = HashSet::new();
    for method in methods {
        if method.method_type == MethodType::Unknown {
            return Err(SyncError::invalid_config("methods[].type", "unknown method type"));
        }
        if !seen.insert(method.method_type) {
            return Err(SyncError::invalid_config(
                "methods[].type",
                format!("duplicate method type '{}'", method.method_type),
            ));
        }
    }
    let any_task = tasks.iter().any(|t| t.enable);
    let any_method = methods.iter().any(|m| m.enable);
    if any_task && !any_method {
        return Err(SyncError::invalid_config(
            "methods",
            "at least one method must be enabled when tasks are enabled",
        ));
    }
    Ok(())
}

/// Checks that every enabled report target has a handler.
pub fn verify_report<F>(report: Option<&ReportConfig>, supports: F) -> SyncResult<()>
where
    F: Fn(TargetType) -> bool,
{
    let Some(report) = report else {
        return Ok(());
    };
    for target in report.targets.iter().filter(|t| t.enable) {
        if target.target_type == TargetType::Unknown || !supports(target.target_type) {
            return Err(SyncError::invalid_config(
                "report.targets[].type",
                format!("unsupported report target '{}'", target.target_type),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_types::{Group, ReportTarget};

    fn endpoint(name: &str, ty: ResourceType) -> ResourceEndpoint {
        ResourceEndpoint::new(name, ty, "127.0.0.1:1")
    }

    fn task(name: &str) -> SyncTask {
        SyncTask::new(
            name,
            endpoint("nacos", ResourceType::Nacos),
            endpoint("polaris", ResourceType::Polaris),
        )
        .with_match(Match::new("public", "orders"))
    }

    fn all(_: ResourceType) -> bool {
        true
    }

    #[test]
    fn test_valid_tasks() {
        assert!(verify_tasks(&[task("a"), task("b")], MatchRules::Registry, all).is_ok());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = verify_tasks(&[task("a"), task("a")], MatchRules::Registry, all).unwrap_err();
        assert!(err.to_string().contains("duplicate task name"));
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(verify_tasks(&[task("")], MatchRules::Registry, all).is_err());
    }

    #[test]
    fn test_disabled_task_not_checked() {
        let mut t = task("a");
        t.enable = false;
        t.source.addresses.clear();
        assert!(verify_tasks(&[t], MatchRules::Registry, all).is_ok());
    }

    #[test]
    fn test_endpoint_rules() {
        let mut t = task("a");
        t.source.addresses.clear();
        assert!(verify_tasks(&[t], MatchRules::Registry, all).is_err());

        let mut t = task("a");
        t.destination.name.clear();
        assert!(verify_tasks(&[t], MatchRules::Registry, all).is_err());

        let mut t = task("a");
        t.source.resource_type = ResourceType::Unknown;
        assert!(verify_tasks(&[t], MatchRules::Registry, all).is_err());
    }

    #[test]
    fn test_unsupported_backend_rejected() {
        let err = verify_tasks(&[task("a")], MatchRules::Registry, |ty| {
            ty == ResourceType::Nacos
        })
        .unwrap_err();
        assert!(matches!(
            err,
            SyncError::UnsupportedBackend {
                resource_type: ResourceType::Polaris,
                ..
            }
        ));
    }

    fn check(rule: Match, rules: MatchRules) -> SyncResult<()> {
        verify_tasks(&[task("a").with_match(rule)], rules, all)
    }

    #[test]
    fn test_match_rules() {
        for rules in [MatchRules::Registry, MatchRules::Config] {
            assert!(check(Match::default(), rules).is_ok());
            assert!(check(Match::new("ns", ""), rules).is_err());
            let bad_group = Match::new("ns", "svc").with_group(Group::new(""));
            assert!(check(bad_group, rules).is_err());
            let bad_meta =
                Match::new("ns", "svc").with_group(Group::new("g").with_metadata("env", ""));
            assert!(check(bad_meta, rules).is_err());
        }
    }

    #[test]
    fn test_registry_match_allows_unnamed_namespace() {
        assert!(check(Match::new("", "svc"), MatchRules::Registry).is_ok());
        assert!(check(Match::new("", "svc"), MatchRules::Config).is_err());
    }

    #[test]
    fn test_registry_match_rejects_dotted_names() {
        assert!(check(Match::new("prod.eu", "svc"), MatchRules::Registry).is_err());
        let dotted = Match::new("prod", "svc").with_group(Group::new("g.1"));
        assert!(check(dotted.clone(), MatchRules::Registry).is_err());
        assert!(check(dotted, MatchRules::Config).is_ok());
    }

    #[test]
    fn test_methods_rules() {
        let tasks = [task("a")];
        assert!(verify_methods(&[Method::watch(), Method::pull("30s")], &tasks).is_ok());
        assert!(verify_methods(&[Method::watch(), Method::watch()], &tasks).is_err());
        assert!(verify_methods(&[], &tasks).is_err());
        assert!(verify_methods(&[], &[]).is_ok());

        let mut disabled = Method::watch();
        disabled.enable = false;
        assert!(verify_methods(&[disabled], &tasks).is_err());

        let unknown = Method {
            method_type: MethodType::Unknown,
            enable: true,
            interval: None,
        };
        assert!(verify_methods(&[unknown], &tasks).is_err());
    }

    #[test]
    fn test_report_rules() {
        let report = ReportConfig {
            interval: None,
            targets: vec![ReportTarget::new(TargetType::Unknown)],
        };
        assert!(verify_report(Some(&report), |_| true).is_err());

        let mut disabled = ReportTarget::new(TargetType::Unknown);
        disabled.enable = false;
        let report = ReportConfig {
            interval: None,
            targets: vec![disabled, ReportTarget::new(TargetType::File)],
        };
        assert!(verify_report(Some(&report), |t| t == TargetType::File).is_ok());
        assert!(verify_report(Some(&report), |_| false).is_err());
        assert!(verify_report(None, |_| false).is_ok());
    }
}

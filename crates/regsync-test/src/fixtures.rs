//! Builders for documents and their parts.

use regsync_types::{
    Group, HealthCheckConfig, Instance, Match, Method, ReportConfig, ReportTarget, ResourceEndpoint,
    ResourceType, SyncDocument, SyncTask, TargetType,
};

/// An endpoint with one placeholder address.
pub fn endpoint(name: &str, resource_type: ResourceType) -> ResourceEndpoint {
    ResourceEndpoint::new(name, resource_type, format!("{}.local:8848", name))
}

/// An enabled task syncing `ns/service` between two endpoints.
pub fn task(name: &str, source: ResourceEndpoint, destination: ResourceEndpoint) -> SyncTask {
    SyncTask::new(name, source, destination)
}

/// An enabled nacos → polaris task named `name` matching `ns/service`.
pub fn registry_task(name: &str, namespace: &str, service: &str) -> SyncTask {
    task(
        name,
        endpoint(&format!("{}-src", name), ResourceType::Nacos),
        endpoint(&format!("{}-dst", name), ResourceType::Polaris),
    )
    .with_match(Match::new(namespace, service))
}

pub fn instance(host: &str, port: u32) -> Instance {
    Instance::new(host, port)
}

pub fn group(name: &str) -> Group {
    Group::new(name)
}

/// Builder for whole revisions.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    document: SyncDocument,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task: SyncTask) -> Self {
        self.document.tasks.push(task);
        self
    }

    pub fn config_task(mut self, task: SyncTask) -> Self {
        self.document.config_tasks.push(task);
        self
    }

    pub fn pull(mut self, interval: &str) -> Self {
        self.document.methods.push(Method::pull(interval));
        self
    }

    pub fn watch(mut self) -> Self {
        self.document.methods.push(Method::watch());
        self
    }

    pub fn health_check(mut self, interval: &str) -> Self {
        self.document.health_check = Some(HealthCheckConfig {
            enable: true,
            interval: Some(interval.to_string()),
        });
        self
    }

    pub fn report(mut self, interval: &str, target_type: TargetType) -> Self {
        self.document.report = Some(ReportConfig {
            interval: Some(interval.to_string()),
            targets: vec![ReportTarget::new(target_type)],
        });
        self
    }

    pub fn build(self) -> SyncDocument {
        self.document
    }
}

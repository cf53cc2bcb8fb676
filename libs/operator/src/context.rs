//! The Run Context: everything a single reconcile needs, re-derived from the CRD every time
//! (`spec.md` §3 "Run Context"). Never cached across invocations.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;

use crate::config::{EngineConfig, Images};
use crate::crd::configuration::{BackendSpec, Configuration};
use crate::naming::{DerivedNames, LegacySubResources, NamespacePolicy};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurationType {
    Hcl,
    Remote,
}

/// One entry of the variable Secret projected into the Job's env as `TF_VAR_<k>` (or, for
/// credentials, verbatim).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvRef {
    pub env_name: String,
    pub secret_key: String,
}

pub struct RunContext {
    pub names: DerivedNames,
    pub controller_namespace: String,
    pub namespace: String,
    pub configuration_type: ConfigurationType,
    pub complete_configuration: String,
    pub backend: BackendSpec,
    pub envs: Vec<EnvRef>,
    pub credentials: BTreeMap<String, String>,
    pub region: Option<String>,
    pub configuration_changed: bool,
    pub env_changed: bool,
    pub delete_resource: bool,
    pub force_delete: bool,
    pub images: Images,
    pub resources: ResourceRequirements,
    pub node_selector: Option<BTreeMap<String, String>>,
    pub legacy: LegacySubResources,
}

impl RunContext {
    /// Applies the namespace/name policy (`spec.md` §4.1 "Namespace policy") to derive names,
    /// the controller namespace, and the pre-migration `LegacySubResources` snapshot. Everything
    /// else (configuration type, rendered text, credentials, drift flags, resources) is filled in
    /// by pre-check.
    pub fn new_skeleton(
        cfg: &Configuration,
        controller_namespace_env: Option<&str>,
        engine: &EngineConfig,
    ) -> Self {
        let cfg_name = cfg.metadata.name.clone().unwrap_or_default();
        let cfg_namespace = cfg.metadata.namespace.clone().unwrap_or_default();
        let uid = cfg.metadata.uid.clone().unwrap_or_default();

        let per_tenant_names = DerivedNames::per_tenant(&cfg_name);
        let legacy = LegacySubResources {
            namespace: cfg_namespace.clone(),
            names: per_tenant_names.clone(),
        };

        let policy = NamespacePolicy::resolve(controller_namespace_env, &cfg_namespace);
        let (names, controller_namespace, backend) = match &policy {
            NamespacePolicy::PerTenant { namespace } => {
                let mut backend = cfg.spec.backend.clone().unwrap_or_default();
                if backend.secret_suffix.is_none() {
                    backend.secret_suffix = Some(cfg_name.clone());
                }
                (per_tenant_names, namespace.clone(), backend)
            }
            NamespacePolicy::Centralized { controller_namespace } => (
                DerivedNames::centralized(&uid),
                controller_namespace.clone(),
                crate::naming::forced_in_cluster_backend(&uid),
            ),
        };

        Self {
            names,
            controller_namespace,
            namespace: cfg_namespace,
            configuration_type: ConfigurationType::Hcl,
            complete_configuration: String::new(),
            backend,
            envs: Vec::new(),
            credentials: BTreeMap::new(),
            region: None,
            configuration_changed: false,
            env_changed: false,
            delete_resource: cfg.spec.delete_resource,
            force_delete: cfg.spec.force_delete,
            images: engine.images.clone(),
            resources: ResourceRequirements::default(),
            node_selector: engine.node_selector.clone(),
            legacy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::configuration::{Configuration, ConfigurationSpec};
    use kube::api::ObjectMeta;

    fn cfg(name: &str, namespace: &str, uid: &str) -> Configuration {
        Configuration {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            spec: ConfigurationSpec::default(),
            status: None,
        }
    }

    #[test]
    fn per_tenant_mode_names_by_configuration_name_and_snapshots_same_legacy() {
        let c = cfg("demo", "tenant-ns", "uid-1");
        let engine = EngineConfig::default();
        let ctx = RunContext::new_skeleton(&c, None, &engine);

        assert_eq!(ctx.controller_namespace, "tenant-ns");
        assert_eq!(ctx.names.apply_job_name, "demo-apply");
        assert_eq!(ctx.legacy.namespace, "tenant-ns");
        assert_eq!(ctx.legacy.names, ctx.names);
    }

    #[test]
    fn centralized_mode_names_by_uid_and_snapshots_per_tenant_legacy() {
        let c = cfg("demo", "tenant-ns", "uid-1");
        let engine = EngineConfig::default();
        let ctx = RunContext::new_skeleton(&c, Some("controller-ns"), &engine);

        assert_eq!(ctx.controller_namespace, "controller-ns");
        assert_eq!(ctx.names.apply_job_name, "uid-1-apply");
        assert!(ctx.backend.in_cluster_config);
        assert_eq!(ctx.backend.secret_suffix.as_deref(), Some("uid-1"));

        // Legacy snapshot remembers the pre-migration per-tenant names so teardown can find them.
        assert_eq!(ctx.legacy.namespace, "tenant-ns");
        assert_eq!(ctx.legacy.names.apply_job_name, "demo-apply");
        assert_ne!(ctx.legacy.names, ctx.names);
    }

    #[test]
    fn delete_resource_and_force_delete_default_from_spec() {
        let mut c = cfg("demo", "tenant-ns", "uid-1");
        c.spec.delete_resource = false;
        c.spec.force_delete = true;
        let engine = EngineConfig::default();
        let ctx = RunContext::new_skeleton(&c, None, &engine);
        assert!(!ctx.delete_resource);
        assert!(ctx.force_delete);
    }
}

//! Component C: Job Assembler.
//!
//! Builds the apply/destroy Job spec from a `RunContext` (`spec.md` §3 "Derived Artifacts",
//! §4.4/§4.5). Pure construction — no Kubernetes calls here, only `artifacts::create_job` talks
//! to the API.

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, EnvVarSource, PodSpec, PodTemplateSpec, ResourceRequirements,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::ObjectMeta as KubeObjectMeta;

use crate::context::RunContext;
use crate::naming::EXECUTOR_SERVICE_ACCOUNT;

pub const EXECUTOR_CONTAINER: &str = "terraform-executor";
pub const INIT_CONTAINER_PREPARE: &str = "prepare-input-terraform-configurations";
pub const INIT_CONTAINER_GIT: &str = "git-configuration";
pub const INIT_CONTAINER_TF_INIT: &str = "terraform-init";

const WORKING_VOLUME: &str = "working";
const INPUT_CONFIGURATION_VOLUME: &str = "tf-input-configuration";
const BACKEND_VOLUME: &str = "tf-backend";
const WORKING_DIR: &str = "/data";
const INPUT_CONFIGURATION_DIR: &str = "/opt/tf-configuration";
const BACKEND_DIR: &str = "/opt/tf-backend";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobAction {
    Apply,
    Destroy,
}

impl JobAction {
    fn terraform_args(self) -> &'static [&'static str] {
        match self {
            JobAction::Apply => &["apply", "-lock=false", "-auto-approve"],
            JobAction::Destroy => &["destroy", "-lock=false", "-auto-approve"],
        }
    }
}

/// Renders the environment variables projected from the variable Secret, one `SecretKeyRef` per
/// `EnvRef` recorded on the run context.
fn env_vars(ctx: &RunContext) -> Vec<EnvVar> {
    ctx.envs
        .iter()
        .map(|env_ref| EnvVar {
            name: env_ref.env_name.clone(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: ctx.names.variable_secret_name.clone(),
                    key: env_ref.secret_key.clone(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
        .collect()
}

fn volumes(ctx: &RunContext) -> Vec<Volume> {
    vec![
        Volume {
            name: WORKING_VOLUME.to_string(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        },
        Volume {
            name: INPUT_CONFIGURATION_VOLUME.to_string(),
            config_map: Some(k8s_openapi::api::core::v1::ConfigMapVolumeSource {
                name: ctx.names.configuration_cm_name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: BACKEND_VOLUME.to_string(),
            empty_dir: Some(Default::default()),
            ..Default::default()
        },
    ]
}

fn prepare_input_container(ctx: &RunContext) -> Container {
    Container {
        name: INIT_CONTAINER_PREPARE.to_string(),
        image: Some(ctx.images.busybox.clone()),
        command: Some(vec!["sh".to_string(), "-c".to_string()]),
        args: Some(vec![format!(
            "cp {INPUT_CONFIGURATION_DIR}/* {WORKING_DIR}"
        )]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: INPUT_CONFIGURATION_VOLUME.to_string(),
                mount_path: INPUT_CONFIGURATION_DIR.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: WORKING_VOLUME.to_string(),
                mount_path: WORKING_DIR.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

/// Clones `remote` and stages `path` (or the repository root) into the working directory.
fn git_container(ctx: &RunContext, remote: &str, path: Option<&str>) -> Container {
    let src = match path {
        Some(p) if !p.is_empty() => format!("{BACKEND_DIR}/{p}"),
        _ => BACKEND_DIR.to_string(),
    };
    Container {
        name: INIT_CONTAINER_GIT.to_string(),
        image: Some(ctx.images.git.clone()),
        command: Some(vec!["sh".to_string(), "-c".to_string()]),
        args: Some(vec![format!(
            "git clone {remote} {BACKEND_DIR} && cp -r {src}/* {WORKING_DIR}"
        )]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: BACKEND_VOLUME.to_string(),
                mount_path: BACKEND_DIR.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: WORKING_VOLUME.to_string(),
                mount_path: WORKING_DIR.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

fn terraform_init_container(ctx: &RunContext) -> Container {
    Container {
        name: INIT_CONTAINER_TF_INIT.to_string(),
        image: Some(ctx.images.executor.clone()),
        command: Some(vec!["terraform".to_string()]),
        args: Some(vec!["init".to_string()]),
        working_dir: Some(WORKING_DIR.to_string()),
        env: Some(env_vars(ctx)),
        volume_mounts: Some(vec![VolumeMount {
            name: WORKING_VOLUME.to_string(),
            mount_path: WORKING_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn executor_container(ctx: &RunContext, action: JobAction) -> Container {
    Container {
        name: EXECUTOR_CONTAINER.to_string(),
        image: Some(ctx.images.executor.clone()),
        command: Some(vec!["terraform".to_string()]),
        args: Some(action.terraform_args().iter().map(|s| s.to_string()).collect()),
        working_dir: Some(WORKING_DIR.to_string()),
        env: Some(env_vars(ctx)),
        resources: Some(ctx.resources.clone()),
        volume_mounts: Some(vec![VolumeMount {
            name: WORKING_VOLUME.to_string(),
            mount_path: WORKING_DIR.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Assembles the full Job object for `action`. `remote`/`path` come from the Configuration's spec
/// (only relevant for `ConfigurationType::Remote`) and gate whether the git-clone init container
/// is included at all.
pub fn assemble_job(
    ctx: &RunContext,
    job_name: &str,
    action: JobAction,
    remote: Option<&str>,
    path: Option<&str>,
) -> Job {
    let mut init_containers = vec![prepare_input_container(ctx)];
    if let Some(remote) = remote.filter(|r| !r.is_empty()) {
        init_containers.push(git_container(ctx, remote, path));
    }
    init_containers.push(terraform_init_container(ctx));

    let mut annotations = BTreeMap::new();
    annotations.insert("sidecar.istio.io/inject".to_string(), "false".to_string());

    let pod_spec = PodSpec {
        service_account_name: Some(EXECUTOR_SERVICE_ACCOUNT.to_string()),
        restart_policy: Some("OnFailure".to_string()),
        node_selector: ctx.node_selector.clone(),
        init_containers: Some(init_containers),
        containers: vec![executor_container(ctx, action)],
        volumes: Some(volumes(ctx)),
        ..Default::default()
    };

    Job {
        metadata: ObjectMeta {
            name: Some(job_name.to_string()),
            namespace: Some(ctx.controller_namespace.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            parallelism: Some(1),
            completions: Some(1),
            backoff_limit: Some(i32::MAX),
            template: PodTemplateSpec {
                metadata: Some(KubeObjectMeta {
                    annotations: Some(annotations),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, Images};
    use crate::crd::configuration::BackendSpec;
    use crate::naming::{DerivedNames, LegacySubResources};
    use crate::context::ConfigurationType;

    fn sample_context() -> RunContext {
        let names = DerivedNames::per_tenant("demo");
        RunContext {
            legacy: LegacySubResources {
                namespace: "default".to_string(),
                names: names.clone(),
            },
            names,
            controller_namespace: "default".to_string(),
            namespace: "default".to_string(),
            configuration_type: ConfigurationType::Hcl,
            complete_configuration: String::new(),
            backend: BackendSpec::default(),
            envs: vec![crate::context::EnvRef {
                env_name: "TF_VAR_x".to_string(),
                secret_key: "TF_VAR_x".to_string(),
            }],
            credentials: Default::default(),
            region: None,
            configuration_changed: false,
            env_changed: false,
            delete_resource: true,
            force_delete: false,
            images: Images::default(),
            resources: ResourceRequirements::default(),
            node_selector: None,
        }
    }

    #[test]
    fn apply_job_has_no_git_container_without_remote() {
        let ctx = sample_context();
        let job = assemble_job(&ctx, "demo-apply", JobAction::Apply, None, None);
        let inits = job.spec.unwrap().template.spec.unwrap().init_containers.unwrap();
        assert_eq!(inits.len(), 2);
        assert!(inits.iter().all(|c| c.name != INIT_CONTAINER_GIT));
    }

    #[test]
    fn apply_job_includes_git_container_with_remote() {
        let ctx = sample_context();
        let job = assemble_job(
            &ctx,
            "demo-apply",
            JobAction::Apply,
            Some("https://example.com/repo.git"),
            Some("modules/foo"),
        );
        let inits = job.spec.unwrap().template.spec.unwrap().init_containers.unwrap();
        assert_eq!(inits.len(), 3);
        assert_eq!(inits[1].name, INIT_CONTAINER_GIT);
    }

    #[test]
    fn destroy_job_uses_destroy_args() {
        let ctx = sample_context();
        let job = assemble_job(&ctx, "demo-destroy", JobAction::Destroy, None, None);
        let spec = job.spec.unwrap();
        assert_eq!(spec.backoff_limit, Some(i32::MAX));
        let containers = spec.template.spec.unwrap().containers;
        assert_eq!(containers[0].args.as_ref().unwrap()[0], "destroy");
    }

    #[test]
    fn job_is_single_run_and_uses_executor_service_account() {
        let ctx = sample_context();
        let job = assemble_job(&ctx, "demo-apply", JobAction::Apply, None, None);
        let spec = job.spec.unwrap();
        assert_eq!(spec.parallelism, Some(1));
        assert_eq!(spec.completions, Some(1));
        let pod = spec.template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some(EXECUTOR_SERVICE_ACCOUNT));
        assert_eq!(pod.restart_policy.as_deref(), Some("OnFailure"));
    }
}

//! Component E: Reconcile Driver.
//!
//! The top-level state machine (`spec.md` §4.1): finalizer, pre-check, apply-path, destroy-path,
//! status updates, requeue policy, legacy GC.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tokio::time::Duration;
use tracing::{field, info, instrument, warn, Span};

use crate::collaborators::JobProbeState;
use crate::config::{parse_resources, EngineConfig};
use crate::configuration::artifacts::{self, FIELD_MANAGER};
use crate::configuration::drift;
use crate::configuration::harvest;
use crate::configuration::job::{assemble_job, JobAction};
use crate::context::{EnvRef, RunContext};
use crate::crd::configuration::{
    ApplyState, ApplyStatus, Configuration, ConfigurationStatus, DestroyState, DestroyStatus,
};
use crate::configuration::controller::Context;
use crate::error::{Error, Result};
use crate::finalizer;
use crate::naming::DerivedNames;
use crate::telemetry;

const CONFLICT_REQUEUE: Duration = Duration::from_secs(3);
const JOB_NOT_DONE_REQUEUE: Duration = Duration::from_secs(3);
const POLL_FAILURE_REQUEUE: Duration = Duration::from_secs(5);

#[instrument(skip(cfg, ctx), fields(trace_id))]
pub async fn reconcile_configuration(cfg: Arc<Configuration>, ctx: Arc<Context>) -> Result<Action> {
    let trace_id = telemetry::get_trace_id();
    Span::current().record("trace_id", field::display(&trace_id));
    let _timer = ctx.metrics.reconcile.count_and_measure(&trace_id);

    let client = ctx.client.clone();
    let name = cfg.name_any();
    let namespace = cfg.namespace().ok_or(Error::MissingNamespace)?;
    info!("reconciling Configuration \"{name}\" in {namespace}");

    let deleting = cfg.meta().deletion_timestamp.is_some();

    if !deleting {
        match finalizer::add::<Configuration>(client.clone(), &name, &namespace).await {
            Ok(_) => {}
            Err(kube::Error::Api(e)) if e.code == 409 => {
                return Ok(Action::requeue(CONFLICT_REQUEUE));
            }
            Err(e) => return Err(Error::KubeError(e)),
        }
    }

    let engine = EngineConfig::from_env();
    let controller_namespace_env = std::env::var("CONTROLLER_NAMESPACE").ok();
    let mut run_ctx = RunContext::new_skeleton(&cfg, controller_namespace_env.as_deref(), &engine);

    let pre_check_outcome = if deleting {
        None
    } else {
        match pre_check(&client, &cfg, &mut run_ctx, &engine, &ctx.collaborators).await {
            Ok(outcome) => Some(outcome),
            Err(e) => return Err(e),
        }
    };

    if let Some(PreCheckOutcome::Stopped(status)) = pre_check_outcome {
        patch_status(&client, &name, &namespace, status).await?;
        return Ok(Action::requeue(POLL_FAILURE_REQUEUE));
    }

    if deleting {
        return destroy_path(&client, &cfg, &run_ctx, &name, &namespace, &ctx.collaborators).await;
    }

    apply_path(&client, &cfg, &run_ctx, &name, &namespace, &ctx.collaborators).await
}

pub fn error_policy(cfg: Arc<Configuration>, error: &Error, ctx: Arc<Context>) -> Action {
    if error.is_requeue_sentinel() {
        return Action::requeue(JOB_NOT_DONE_REQUEUE);
    }
    warn!(configuration = %cfg.name_any(), %error, "reconcile failed");
    ctx.metrics.reconcile.set_failure(&cfg, error);
    Action::requeue(Duration::from_secs(5 * 60))
}

enum PreCheckOutcome {
    Continue,
    Stopped(ConfigurationStatus),
}

/// Populates `run_ctx` fully and re-establishes the derived-artifact invariants (`spec.md` §4.2).
async fn pre_check(
    client: &Client,
    cfg: &Configuration,
    run_ctx: &mut RunContext,
    engine: &EngineConfig,
    collaborators: &crate::collaborators::Collaborators,
) -> Result<PreCheckOutcome> {
    run_ctx.resources = parse_resources(&engine.resources)?;

    let ty = match collaborators.validator.validate(cfg) {
        Ok(ty) => ty,
        Err(Error::StaticCheckFailed(msg)) => {
            return Ok(PreCheckOutcome::Stopped(ConfigurationStatus {
                apply: Some(ApplyStatus {
                    state: Some(ApplyState::ConfigurationStaticCheckFailed),
                    message: Some(msg),
                    ..Default::default()
                }),
                ..Default::default()
            }));
        }
        Err(e) => return Err(e),
    };
    run_ctx.configuration_type = ty;

    let mut credentials = BTreeMap::new();
    let mut region = None;
    if !cfg.spec.inline_credentials {
        let provider = match collaborators.providers.get_provider(client, cfg).await? {
            Some(p) if p.is_ready() => p,
            Some(_) | None => {
                return Ok(PreCheckOutcome::Stopped(ConfigurationStatus {
                    apply: Some(ApplyStatus {
                        state: Some(ApplyState::Authorizing),
                        message: Some("provider not found or not ready".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }));
            }
        };
        region = collaborators.providers.set_region(&provider);
        credentials = collaborators
            .providers
            .get_credentials(client, &provider)
            .await?
            .ok_or_else(|| Error::CredentialsUnavailable(provider.name_any()))?;
    }
    run_ctx.region = region;
    run_ctx.credentials = credentials.clone();

    let (text, backend) = collaborators
        .renderer
        .render(cfg, client, ty, &credentials, engine.github_blocked)
        .await?;
    run_ctx.complete_configuration = text;
    if !run_ctx.backend.in_cluster_config {
        let mut backend = backend;
        if backend.secret_suffix.is_none() {
            backend.secret_suffix = Some(cfg.name_any());
        }
        run_ctx.backend = backend;
    }

    let existing_cm = artifacts::get_configmap(
        client.clone(),
        &run_ctx.controller_namespace,
        &run_ctx.names.configuration_cm_name,
    )
    .await?;
    run_ctx.configuration_changed =
        drift::iac_drift(run_ctx.configuration_type, &run_ctx.complete_configuration, existing_cm.as_ref());
    artifacts::upsert_configmap(
        client.clone(),
        &run_ctx.controller_namespace,
        &run_ctx.names.configuration_cm_name,
        run_ctx.configuration_type,
        &run_ctx.complete_configuration,
    )
    .await?;

    let mut variable_data: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut envs = Vec::new();
    for (key, value) in cfg.spec.variables() {
        let env_name = format!("TF_VAR_{key}");
        let rendered = match value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        variable_data.insert(env_name.clone(), rendered.into_bytes());
        envs.push(EnvRef {
            env_name,
            secret_key: env_name_to_key(&key),
        });
    }
    for (key, value) in &run_ctx.credentials {
        variable_data.insert(key.clone(), value.clone().into_bytes());
        envs.push(EnvRef {
            env_name: key.clone(),
            secret_key: key.clone(),
        });
    }
    run_ctx.envs = envs;

    let existing_secret = artifacts::get_secret(
        client.clone(),
        &run_ctx.controller_namespace,
        &run_ctx.names.variable_secret_name,
    )
    .await?;
    run_ctx.env_changed = drift::variable_drift(&variable_data, existing_secret.as_ref());
    if run_ctx.env_changed || existing_secret.is_none() {
        artifacts::upsert_variable_secret(
            client.clone(),
            &run_ctx.controller_namespace,
            &run_ctx.names.variable_secret_name,
            &variable_data,
        )
        .await?;
    }

    ensure_executor_cluster_role(client, &run_ctx.controller_namespace).await?;

    Ok(PreCheckOutcome::Continue)
}

fn env_name_to_key(key: &str) -> String {
    format!("TF_VAR_{key}")
}

/// Idempotent install of the executor ClusterRole; out of scope for byte-level RBAC content, but
/// the driver must ensure it exists before any Job referencing its ServiceAccount runs.
async fn ensure_executor_cluster_role(client: &Client, controller_namespace: &str) -> Result<()> {
    use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
    let api: Api<ClusterRole> = Api::all(client.clone());
    let name = crate::naming::executor_cluster_role_name(controller_namespace);
    let role = ClusterRole {
        metadata: kube::api::ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["".to_string()]),
            resources: Some(vec!["secrets".to_string(), "configmaps".to_string()]),
            verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
            ..Default::default()
        }]),
        ..Default::default()
    };
    api.patch(
        &name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&role),
    )
    .await
    .map_err(Error::KubeError)?;
    Ok(())
}

/// Idempotent install of the RBAC a newly created apply Job needs (`spec.md` §4.4 step 1): the
/// ServiceAccount its pod runs as, and a ClusterRoleBinding tying that ServiceAccount to the
/// executor ClusterRole `ensure_executor_cluster_role` installs during pre-check.
async fn ensure_executor_rbac(client: &Client, controller_namespace: &str) -> Result<()> {
    use k8s_openapi::api::core::v1::ServiceAccount;
    use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};

    let sa_api: Api<ServiceAccount> = Api::namespaced(client.clone(), controller_namespace);
    let sa = ServiceAccount {
        metadata: kube::api::ObjectMeta {
            name: Some(crate::naming::EXECUTOR_SERVICE_ACCOUNT.to_string()),
            namespace: Some(controller_namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    sa_api
        .patch(
            crate::naming::EXECUTOR_SERVICE_ACCOUNT,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&sa),
        )
        .await
        .map_err(Error::KubeError)?;

    let role_name = crate::naming::executor_cluster_role_name(controller_namespace);
    let binding_name = format!("{role_name}-binding");
    let crb_api: Api<ClusterRoleBinding> = Api::all(client.clone());
    let crb = ClusterRoleBinding {
        metadata: kube::api::ObjectMeta {
            name: Some(binding_name.clone()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role_name,
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: crate::naming::EXECUTOR_SERVICE_ACCOUNT.to_string(),
            namespace: Some(controller_namespace.to_string()),
            ..Default::default()
        }]),
    };
    crb_api
        .patch(
            &binding_name,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(&crb),
        )
        .await
        .map_err(Error::KubeError)?;

    Ok(())
}

async fn apply_path(
    client: &Client,
    cfg: &Configuration,
    run_ctx: &RunContext,
    name: &str,
    namespace: &str,
    collaborators: &crate::collaborators::Collaborators,
) -> Result<Action> {
    let job_name = run_ctx.names.apply_job_name.clone();
    let existing = artifacts::get_job(client.clone(), &run_ctx.controller_namespace, &job_name).await?;

    match existing {
        None => {
            ensure_executor_rbac(client, &run_ctx.controller_namespace).await?;
            let (remote, path) = (cfg.spec.remote.as_deref(), cfg.spec.path.as_deref());
            let job = assemble_job(run_ctx, &job_name, JobAction::Apply, remote, path);
            artifacts::create_job(client.clone(), &run_ctx.controller_namespace, &job).await?;
            return Err(Error::ApplyJobNotCompleted);
        }
        Some(job) => {
            if run_ctx.env_changed || run_ctx.configuration_changed {
                artifacts::delete_job(client.clone(), &run_ctx.controller_namespace, &job_name).await?;
                artifacts::delete_secret(
                    client.clone(),
                    &run_ctx.controller_namespace,
                    &run_ctx.names.variable_secret_name,
                )
                .await?;
                let status = ConfigurationStatus {
                    apply: Some(ApplyStatus {
                        state: Some(ApplyState::ConfigurationReloading),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                patch_status(client, name, namespace, status).await?;
                return Ok(Action::requeue(JOB_NOT_DONE_REQUEUE));
            }

            if artifacts::job_succeeded(&job) && !run_ctx.env_changed {
                let status = harvest_and_build_status(client, cfg, run_ctx, collaborators).await?;
                patch_status(client, name, namespace, status).await?;
                return Ok(Action::requeue(Duration::from_secs(0)));
            }

            let current = fetch_status(client, name, namespace).await?;
            let already_provisioning = current
                .apply
                .as_ref()
                .and_then(|a| a.state.clone())
                .map(|s| matches!(s, ApplyState::ConfigurationProvisioningAndChecking | ApplyState::InvalidRegion))
                .unwrap_or(false);
            if !already_provisioning {
                let status = ConfigurationStatus {
                    apply: Some(ApplyStatus {
                        state: Some(ApplyState::ConfigurationProvisioningAndChecking),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                patch_status(client, name, namespace, status).await?;
            }

            match poll_job_status(client, run_ctx, &job_name, collaborators).await? {
                JobProbeState::Running => Err(Error::ApplyJobNotCompleted),
                JobProbeState::Succeeded => Ok(Action::requeue(Duration::from_secs(0))),
                JobProbeState::Failed(message) => {
                    let status = ConfigurationStatus {
                        apply: Some(ApplyStatus {
                            state: Some(ApplyState::ConfigurationProvisioningAndChecking),
                            message: Some(message),
                            ..Default::default()
                        }),
                        ..Default::default()
                    };
                    patch_status(client, name, namespace, status).await?;
                    Ok(Action::requeue(POLL_FAILURE_REQUEUE))
                }
            }
        }
    }
}

async fn poll_job_status(
    client: &Client,
    run_ctx: &RunContext,
    job_name: &str,
    collaborators: &crate::collaborators::Collaborators,
) -> Result<JobProbeState> {
    collaborators
        .status_probe
        .get_status(
            client,
            &run_ctx.controller_namespace,
            job_name,
            &run_ctx.controller_namespace,
            crate::configuration::job::EXECUTOR_CONTAINER,
            crate::configuration::job::INIT_CONTAINER_TF_INIT,
        )
        .await
}

async fn harvest_and_build_status(
    client: &Client,
    cfg: &Configuration,
    run_ctx: &RunContext,
    collaborators: &crate::collaborators::Collaborators,
) -> Result<ConfigurationStatus> {
    let state_json = collaborators
        .backend
        .get_tf_state_json(client, &run_ctx.controller_namespace, &run_ctx.backend)
        .await;
    let outputs = match state_json {
        Ok(bytes) => harvest::parse_outputs(&bytes).unwrap_or_default(),
        Err(_) => BTreeMap::new(),
    };

    if let Some(secret_ref) = &cfg.spec.write_connection_secret_to_reference {
        let ns = harvest::connection_secret_namespace(secret_ref.namespace.as_deref(), "default");
        harvest::harvest(
            client.clone(),
            &ns,
            &secret_ref.name,
            &cfg.name_any(),
            &run_ctx.namespace,
            &outputs,
        )
        .await?;
    }

    Ok(ConfigurationStatus {
        apply: Some(ApplyStatus {
            state: Some(ApplyState::Available),
            outputs,
            region: run_ctx.region.clone(),
            ..Default::default()
        }),
        observed_generation: cfg.meta().generation,
        ..Default::default()
    })
}

/// Three namespace/name combinations tried for every GC step, to absorb per-tenant ↔ centralized
/// migrations (`spec.md` §4.5 "Three-try GC").
fn gc_combos(run_ctx: &RunContext, cfg_namespace: &str) -> Vec<(String, DerivedNames)> {
    let mut combos = vec![
        (run_ctx.legacy.namespace.clone(), run_ctx.legacy.names.clone()),
        (run_ctx.controller_namespace.clone(), run_ctx.names.clone()),
        (cfg_namespace.to_string(), run_ctx.names.clone()),
    ];
    combos.dedup_by(|a, b| a == b);
    combos
}

async fn destroy_path(
    client: &Client,
    cfg: &Configuration,
    run_ctx: &RunContext,
    name: &str,
    namespace: &str,
    collaborators: &crate::collaborators::Collaborators,
) -> Result<Action> {
    let deletable = collaborators.deletability.is_deletable(client, cfg).await.unwrap_or(false);
    let delete_directly = deletable || !run_ctx.delete_resource;

    let destroy_job_name = run_ctx.names.destroy_job_name.clone();

    if let Some(job) = artifacts::get_job(client.clone(), &run_ctx.controller_namespace, &destroy_job_name).await? {
        if job_failed(&job) {
            let status = ConfigurationStatus {
                destroy: Some(DestroyStatus {
                    state: Some(DestroyState::ConfigurationDestroyFailed),
                    message: Some("destroy job failed".to_string()),
                }),
                ..Default::default()
            };
            patch_status(client, name, namespace, status).await?;
        }
    }

    if !delete_directly {
        if artifacts::get_job(client.clone(), &run_ctx.controller_namespace, &destroy_job_name).await?.is_none() {
            let job = assemble_job(
                run_ctx,
                &destroy_job_name,
                JobAction::Destroy,
                cfg.spec.remote.as_deref(),
                cfg.spec.path.as_deref(),
            );
            artifacts::create_job(client.clone(), &run_ctx.controller_namespace, &job).await?;
        } else if run_ctx.env_changed || run_ctx.configuration_changed {
            artifacts::delete_job(client.clone(), &run_ctx.controller_namespace, &destroy_job_name).await?;
        }
    }

    let status = ConfigurationStatus {
        destroy: Some(DestroyStatus {
            state: Some(DestroyState::ConfigurationDestroying),
            ..Default::default()
        }),
        ..Default::default()
    };
    patch_status(client, name, namespace, status).await?;

    if cfg.spec.force_delete {
        let _ = gc(client, cfg, run_ctx, collaborators).await;
        finalizer::delete::<Configuration>(client.clone(), name, namespace).await?;
        return Ok(Action::await_change());
    }

    if !delete_directly {
        let done = artifacts::get_job(client.clone(), &run_ctx.controller_namespace, &destroy_job_name)
            .await?
            .map(|j| artifacts::job_succeeded(&j))
            .unwrap_or(false);
        if !done {
            return Err(Error::DestroyJobNotCompleted);
        }
    }

    gc(client, cfg, run_ctx, collaborators).await?;
    finalizer::delete::<Configuration>(client.clone(), name, namespace).await?;
    Ok(Action::await_change())
}

fn job_failed(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.failed)
        .map(|n| n > 0)
        .unwrap_or(false)
}

/// Cleanup order: (a) ConfigMap; (b) user connection Secret; (c) apply Job; (d) destroy Job;
/// (e) variable Secret; (f) backend-specific cleanup. Any error here aborts GC and is returned so
/// the finalizer stays (`spec.md` §4.5); the `forceDelete` caller discards it on its own terms.
async fn gc(
    client: &Client,
    cfg: &Configuration,
    run_ctx: &RunContext,
    collaborators: &crate::collaborators::Collaborators,
) -> Result<()> {
    let cfg_namespace = cfg.namespace().ok_or(Error::MissingNamespace)?;
    let combos = gc_combos(run_ctx, &cfg_namespace);

    for (ns, names) in &combos {
        artifacts::delete_configmap(client.clone(), ns, &names.configuration_cm_name).await?;
    }

    if let Some(secret_ref) = &cfg.spec.write_connection_secret_to_reference {
        let ns = harvest::connection_secret_namespace(secret_ref.namespace.as_deref(), "default");
        artifacts::delete_secret(client.clone(), &ns, &secret_ref.name).await?;
    }

    for (ns, names) in &combos {
        artifacts::delete_job(client.clone(), ns, &names.apply_job_name).await?;
    }
    for (ns, names) in &combos {
        artifacts::delete_job(client.clone(), ns, &names.destroy_job_name).await?;
    }
    for (ns, names) in &combos {
        artifacts::delete_secret(client.clone(), ns, &names.variable_secret_name).await?;
    }

    collaborators
        .backend
        .clean_up(client, &run_ctx.controller_namespace, &run_ctx.backend)
        .await?;

    Ok(())
}

async fn fetch_status(client: &Client, name: &str, namespace: &str) -> Result<ConfigurationStatus> {
    let api: Api<Configuration> = Api::namespaced(client.clone(), namespace);
    let current = api.get_status(name).await.map_err(Error::KubeError)?;
    Ok(current.status.unwrap_or_default())
}

async fn patch_status(
    client: &Client,
    name: &str,
    namespace: &str,
    status: ConfigurationStatus,
) -> Result<()> {
    let api: Api<Configuration> = Api::namespaced(client.clone(), namespace);
    let patch = json!({ "status": status });
    api.patch_status(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Merge(&patch),
    )
    .await
    .map_err(Error::StatusUpdateError)?;
    Ok(())
}

/// Mock-apiserver harness for the status subresource, grounded on the teacher's
/// `echo/mod.rs` `ApiServerVerifier`/`tower_test::mock::pair` pattern, scoped here to the two
/// functions that talk directly to the Configuration status subresource rather than the full
/// reconcile (whose downstream Job/ConfigMap/Secret calls are exercised individually by
/// `artifacts`, `drift`, `job`, and `harvest`'s own unit tests).
#[cfg(test)]
mod status_tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use http::{Request, Response};
    use kube::client::Body;

    fn mock_client() -> (Client, tower_test::mock::Handle<Request<Body>, Response<Body>>) {
        let (mock_service, handle) = tower_test::mock::pair::<Request<Body>, Response<Body>>();
        (Client::new(mock_service, "default"), handle)
    }

    #[tokio::test]
    async fn patch_status_sends_a_force_applied_merge_patch_to_the_status_subresource() {
        let (client, mut handle) = mock_client();
        let status = ConfigurationStatus {
            apply: Some(ApplyStatus {
                state: Some(ApplyState::Available),
                ..Default::default()
            }),
            ..Default::default()
        };

        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::PATCH);
            assert_eq!(
                request.uri().to_string(),
                format!(
                    "/apis/terraform.example.com/v1beta2/namespaces/default/configurations/demo/status?&force=true&fieldManager={FIELD_MANAGER}"
                )
            );
            let body = request.into_body().collect_bytes().await.unwrap();
            let sent: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_json_include!(
                actual: sent,
                expected: json!({ "status": { "apply": { "state": "Available" } } })
            );
            let response = serde_json::to_vec(&Configuration::new(
                "demo",
                crate::crd::configuration::ConfigurationSpec::default(),
            ))
            .unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
        });

        patch_status(&client, "demo", "default", status).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("timeout waiting for mock apiserver")
            .unwrap();
    }

    #[tokio::test]
    async fn fetch_status_reads_the_status_subresource_with_a_plain_get() {
        let (client, mut handle) = mock_client();

        let server = tokio::spawn(async move {
            let (request, send) = handle.next_request().await.expect("service not called");
            assert_eq!(request.method(), http::Method::GET);
            assert_eq!(
                request.uri().to_string(),
                "/apis/terraform.example.com/v1beta2/namespaces/default/configurations/demo/status?"
            );
            let mut cfg = Configuration::new(
                "demo",
                crate::crd::configuration::ConfigurationSpec::default(),
            );
            cfg.status = Some(ConfigurationStatus {
                apply: Some(ApplyStatus {
                    state: Some(ApplyState::ConfigurationReloading),
                    ..Default::default()
                }),
                ..Default::default()
            });
            let response = serde_json::to_vec(&cfg).unwrap();
            send.send_response(Response::builder().body(Body::from(response)).unwrap());
        });

        let status = fetch_status(&client, "demo", "default").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("timeout waiting for mock apiserver")
            .unwrap();
        assert_eq!(
            status.apply.unwrap().state,
            Some(ApplyState::ConfigurationReloading)
        );
    }
}

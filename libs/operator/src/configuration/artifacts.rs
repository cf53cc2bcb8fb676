//! Component A: Artifact Store.
//!
//! Create/update/delete the derived ConfigMap, variable Secret, and the two Jobs in the chosen
//! namespace (`spec.md` §2 component table, §3 "Derived Artifacts").

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::Client;

use crate::context::ConfigurationType;
use crate::error::{Error, Result};

pub const FIELD_MANAGER: &str = "tf-controller";
const KUBECONFIG_KEY: &str = "kubeconfig";

pub fn hcl_data_key(ty: ConfigurationType) -> &'static str {
    match ty {
        ConfigurationType::Hcl => "main.tf",
        ConfigurationType::Remote => "backend.tf",
    }
}

/// Create-or-update the IaC ConfigMap with the rendered text (`spec.md` §4.2 step 5).
pub async fn upsert_configmap(
    client: Client,
    namespace: &str,
    name: &str,
    ty: ConfigurationType,
    complete_configuration: &str,
) -> Result<ConfigMap> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    let mut data = BTreeMap::new();
    data.insert(
        hcl_data_key(ty).to_string(),
        complete_configuration.to_string(),
    );
    data.insert(KUBECONFIG_KEY.to_string(), String::new());

    let cm = ConfigMap {
        metadata: kube::api::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    };

    api.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&cm),
    )
    .await
    .map_err(Error::KubeError)
}

pub async fn get_configmap(client: Client, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    match api.get(name).await {
        Ok(cm) => Ok(Some(cm)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// Create-or-update the variable Secret. Byte-for-byte content is the union of `spec.variable`
/// values and credential bytes (`spec.md` §3 "Derived Artifacts").
pub async fn upsert_variable_secret(
    client: Client,
    namespace: &str,
    name: &str,
    data: &BTreeMap<String, Vec<u8>>,
) -> Result<Secret> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    let secret = Secret {
        metadata: kube::api::ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                .collect(),
        ),
        ..Default::default()
    };

    api.patch(
        name,
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(&secret),
    )
    .await
    .map_err(Error::KubeError)
}

pub async fn get_secret(client: Client, namespace: &str, name: &str) -> Result<Option<Secret>> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    match api.get(name).await {
        Ok(s) => Ok(Some(s)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::KubeError(e)),
    }
}

pub async fn delete_secret(client: Client, namespace: &str, name: &str) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(client, namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

pub async fn delete_configmap(client: Client, namespace: &str, name: &str) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client, namespace);
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

pub async fn get_job(client: Client, namespace: &str, name: &str) -> Result<Option<Job>> {
    let api: Api<Job> = Api::namespaced(client, namespace);
    match api.get(name).await {
        Ok(job) => Ok(Some(job)),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
        Err(e) => Err(Error::KubeError(e)),
    }
}

pub async fn create_job(client: Client, namespace: &str, job: &Job) -> Result<Job> {
    let api: Api<Job> = Api::namespaced(client, namespace);
    api.create(&PostParams::default(), job)
        .await
        .map_err(Error::KubeError)
}

/// Deletes a Job with background propagation so the finalizer/GC path does not have to wait for
/// dependent Pods to finish terminating (`spec.md` §4.4 step 2).
pub async fn delete_job(client: Client, namespace: &str, name: &str) -> Result<()> {
    let api: Api<Job> = Api::namespaced(client, namespace);
    let dp = DeleteParams {
        propagation_policy: Some(PropagationPolicy::Background),
        ..Default::default()
    };
    match api.delete(name, &dp).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
        Err(e) => Err(Error::KubeError(e)),
    }
}

/// `Succeeded == 1` on the Job's status (`spec.md` invariants throughout §4).
pub fn job_succeeded(job: &Job) -> bool {
    job.status
        .as_ref()
        .and_then(|s| s.succeeded)
        .map(|n| n == 1)
        .unwrap_or(false)
}

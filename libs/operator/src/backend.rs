//! The remote-state backend adapter (`spec.md` §6: `Backend.GetTFStateJSON`, `Backend.CleanUp`).
//!
//! Out of scope for this crate: a real deployment plugs in readers for whichever backends the
//! rendered IaC selects (S3, GCS, Consul, ...). `InClusterBackend` is the one backend this crate
//! implements directly, because centralized mode (`spec.md` §4.1) *forces* every Configuration
//! onto it — there is no external collaborator to delegate to for that case.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams};
use kube::Client;

use crate::crd::configuration::BackendSpec;
use crate::error::{Error, Result};

const STATE_KEY: &str = "tfstate";

/// Injected as a single shared collaborator (`Collaborators::backend`), so its methods take the
/// per-Configuration identity (namespace, backend selector) as parameters rather than baking them
/// into `&self` the way `InClusterBackend` does internally.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_tf_state_json(&self, client: &Client, namespace: &str, backend: &BackendSpec) -> Result<Vec<u8>>;
    async fn clean_up(&self, client: &Client, namespace: &str, backend: &BackendSpec) -> Result<()>;
}

/// The built-in in-cluster Kubernetes backend: state is a base64 JSON blob in a Secret named
/// `tfstate-<secret_suffix>`, living in `namespace`.
pub struct InClusterBackend {
    pub namespace: String,
    pub secret_suffix: String,
}

impl InClusterBackend {
    pub fn secret_name(&self) -> String {
        format!("tfstate-{}", self.secret_suffix)
    }

    pub async fn get_tf_state_json(&self, client: &Client) -> Result<Vec<u8>> {
        let api: Api<Secret> = Api::namespaced(client.clone(), &self.namespace);
        let secret = api.get(&self.secret_name()).await?;
        let data = secret
            .data
            .and_then(|mut d| d.remove(STATE_KEY))
            .map(|b| b.0)
            .unwrap_or_default();
        Ok(data)
    }

    pub async fn clean_up(&self, client: &Client) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(client.clone(), &self.namespace);
        match api.delete(&self.secret_name(), &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}

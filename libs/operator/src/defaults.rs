//! Default, in-scope implementations of the collaborator traits (`spec.md` §6).
//!
//! The HCL-templating renderer, the per-cloud-provider credential mapping, and pod-log-based
//! status probing are the genuinely out-of-scope pieces (`spec.md` §1): a production deployment
//! replaces these with richer implementations. What is wired here stays within what the core
//! itself can reasonably do against the Kubernetes API alone, so the controller binary has
//! something real to run against rather than a stub.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::api::Api;
use kube::Client;

use crate::backend::{Backend, InClusterBackend};
use crate::collaborators::{
    ConfigurationValidator, Credentials, Deletability, JobProbeState, ProviderResolver, Renderer,
    TerraformStatusProbe,
};
use crate::context::ConfigurationType;
use crate::crd::configuration::{BackendSpec, Configuration};
use crate::crd::provider::Provider;
use crate::error::{Error, Result};

/// `hcl` XOR `remote` must be set; anything else is a static-check failure.
pub struct ExclusivityValidator;

impl ConfigurationValidator for ExclusivityValidator {
    fn validate(&self, cfg: &Configuration) -> Result<ConfigurationType> {
        match (cfg.spec.hcl.is_some(), cfg.spec.remote.is_some()) {
            (true, false) => Ok(ConfigurationType::Hcl),
            (false, true) => Ok(ConfigurationType::Remote),
            (true, true) => Err(Error::StaticCheckFailed(
                "spec.hcl and spec.remote are mutually exclusive".to_string(),
            )),
            (false, false) => Err(Error::StaticCheckFailed(
                "one of spec.hcl or spec.remote is required".to_string(),
            )),
        }
    }
}

/// Passes the inline HCL body through untouched; credential interpolation into the rendered text
/// is left to a richer, deployment-specific renderer.
pub struct PassthroughRenderer;

#[async_trait]
impl Renderer for PassthroughRenderer {
    async fn render(
        &self,
        cfg: &Configuration,
        _client: &Client,
        ty: ConfigurationType,
        _credentials: &Credentials,
        _github_blocked: bool,
    ) -> Result<(String, BackendSpec)> {
        let text = match ty {
            ConfigurationType::Hcl => cfg.spec.hcl.clone().unwrap_or_default(),
            ConfigurationType::Remote => String::new(),
        };
        Ok((text, cfg.spec.backend.clone().unwrap_or_default()))
    }
}

/// Conservative default: always run the destroy Job rather than risk skipping real cleanup.
pub struct AlwaysDestroy;

#[async_trait]
impl Deletability for AlwaysDestroy {
    async fn is_deletable(&self, _client: &Client, _cfg: &Configuration) -> Result<bool> {
        Ok(false)
    }
}

/// Reads the referenced `Provider` and decodes its credentials Secret verbatim into string pairs.
/// Per-cloud field-name mapping (e.g. access key vs. service account JSON) is the out-of-scope
/// piece a production renderer/decoder adds on top.
pub struct K8sProviderResolver;

#[async_trait]
impl ProviderResolver for K8sProviderResolver {
    async fn get_provider(&self, client: &Client, cfg: &Configuration) -> Result<Option<Provider>> {
        let Some(provider_ref) = &cfg.spec.provider_ref else {
            return Ok(None);
        };
        let namespace = provider_ref
            .namespace
            .clone()
            .or_else(|| cfg.metadata.namespace.clone())
            .ok_or(Error::MissingNamespace)?;
        let api: Api<Provider> = Api::namespaced(client.clone(), &namespace);
        match api.get(&provider_ref.name).await {
            Ok(p) => Ok(Some(p)),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(None),
            Err(e) => Err(Error::KubeError(e)),
        }
    }

    fn set_region(&self, provider: &Provider) -> Option<String> {
        provider.spec.region.clone()
    }

    async fn get_credentials(
        &self,
        client: &Client,
        provider: &Provider,
    ) -> Result<Option<Credentials>> {
        use k8s_openapi::api::core::v1::Secret;

        let secret_ref = &provider.spec.credentials_secret_ref;
        let namespace = secret_ref
            .namespace
            .clone()
            .or_else(|| provider.metadata.namespace.clone())
            .ok_or(Error::MissingNamespace)?;
        let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
        let secret = match api.get(&secret_ref.name).await {
            Ok(s) => s,
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(None),
            Err(e) => return Err(Error::KubeError(e)),
        };
        let credentials = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
            .collect();
        Ok(Some(credentials))
    }
}

/// Reads the Job's own status counters instead of streaming pod logs (`spec.md` §1 treats
/// pod-log streaming as out of scope).
pub struct JobStatusProbe;

#[async_trait]
impl TerraformStatusProbe for JobStatusProbe {
    async fn get_status(
        &self,
        client: &Client,
        namespace: &str,
        job_name: &str,
        _controller_namespace: &str,
        _container: &str,
        _init_container: &str,
    ) -> Result<JobProbeState> {
        let api: Api<Job> = Api::namespaced(client.clone(), namespace);
        let job = match api.get(job_name).await {
            Ok(job) => job,
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(JobProbeState::Running),
            Err(e) => return Err(Error::KubeError(e)),
        };
        let status = job.status.unwrap_or_default();
        if status.succeeded.unwrap_or(0) > 0 {
            Ok(JobProbeState::Succeeded)
        } else if status.failed.unwrap_or(0) > 0 {
            Ok(JobProbeState::Failed("job reported failed pod(s)".to_string()))
        } else {
            Ok(JobProbeState::Running)
        }
    }
}

/// Only backend this crate implements directly (`spec.md` §1): a non-in-cluster `BackendSpec`
/// selects something a richer, deployment-specific reader handles instead, so this default reads
/// as empty state / a no-op cleanup rather than erroring.
pub struct DefaultBackend;

#[async_trait]
impl Backend for DefaultBackend {
    async fn get_tf_state_json(&self, client: &Client, namespace: &str, backend: &BackendSpec) -> Result<Vec<u8>> {
        if !backend.in_cluster_config {
            return Ok(Vec::new());
        }
        InClusterBackend {
            namespace: namespace.to_string(),
            secret_suffix: backend.secret_suffix.clone().unwrap_or_default(),
        }
        .get_tf_state_json(client)
        .await
    }

    async fn clean_up(&self, client: &Client, namespace: &str, backend: &BackendSpec) -> Result<()> {
        if !backend.in_cluster_config {
            return Ok(());
        }
        InClusterBackend {
            namespace: namespace.to_string(),
            secret_suffix: backend.secret_suffix.clone().unwrap_or_default(),
        }
        .clean_up(client)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_client() -> (Client, tower_test::mock::Handle<http::Request<kube::client::Body>, http::Response<kube::client::Body>>) {
        let (mock_service, handle) = tower_test::mock::pair();
        (Client::new(mock_service, "default"), handle)
    }

    #[tokio::test]
    async fn default_backend_reads_nothing_when_not_in_cluster() {
        let (client, _handle) = mock_client();
        let backend = BackendSpec {
            in_cluster_config: false,
            secret_suffix: None,
        };
        let state = DefaultBackend.get_tf_state_json(&client, "ctrl-ns", &backend).await.unwrap();
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn default_backend_clean_up_is_a_no_op_when_not_in_cluster() {
        let (client, _handle) = mock_client();
        let backend = BackendSpec {
            in_cluster_config: false,
            secret_suffix: None,
        };
        DefaultBackend.clean_up(&client, "ctrl-ns", &backend).await.unwrap();
    }

    fn cfg_with(hcl: Option<&str>, remote: Option<&str>) -> Configuration {
        use crate::crd::configuration::ConfigurationSpec;
        Configuration::new(
            "demo",
            ConfigurationSpec {
                hcl: hcl.map(|s| s.to_string()),
                remote: remote.map(|s| s.to_string()),
                ..Default::default()
            },
        )
    }

    #[test]
    fn validator_rejects_neither() {
        let cfg = cfg_with(None, None);
        assert!(ExclusivityValidator.validate(&cfg).is_err());
    }

    #[test]
    fn validator_rejects_both() {
        let cfg = cfg_with(Some("terraform{}"), Some("https://example.com/repo.git"));
        assert!(ExclusivityValidator.validate(&cfg).is_err());
    }

    #[test]
    fn validator_accepts_hcl_only() {
        let cfg = cfg_with(Some("terraform{}"), None);
        assert_eq!(ExclusivityValidator.validate(&cfg).unwrap(), ConfigurationType::Hcl);
    }

    #[test]
    fn validator_accepts_remote_only() {
        let cfg = cfg_with(None, Some("https://example.com/repo.git"));
        assert_eq!(ExclusivityValidator.validate(&cfg).unwrap(), ConfigurationType::Remote);
    }
}

//! Fixed-interface collaborators (`spec.md` §6 "Collaborator interfaces consumed by the core").
//!
//! The HCL/JSON renderer, credential decoder, remote-state backend adapter, and pod-log status
//! probe are out of scope for this crate (`spec.md` §1); they are modeled here as traits so the
//! reconciliation engine can be driven against deterministic fakes in tests, and wired to a real
//! implementation (a separate crate, not part of this specification) in production.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;

use crate::backend::Backend;
use crate::context::ConfigurationType;
use crate::crd::configuration::{BackendSpec, Configuration};
use crate::crd::provider::Provider;
use crate::error::Result;

/// Decoded credential map, e.g. `{"AccessKeyID": "...", "AccessKeySecret": "..."}`.
pub type Credentials = BTreeMap<String, String>;

/// Outcome of a pod-log-based probe into a running apply/destroy Job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobProbeState {
    Running,
    Succeeded,
    Failed(String),
}

/// `ValidConfigurationObject(cfg) -> (ConfigurationType, error)`.
pub trait ConfigurationValidator: Send + Sync {
    fn validate(&self, cfg: &Configuration) -> Result<ConfigurationType>;
}

/// `RenderConfiguration(cfg, client, type, creds) -> (text, backend, error)`.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        cfg: &Configuration,
        client: &Client,
        ty: ConfigurationType,
        credentials: &Credentials,
        github_blocked: bool,
    ) -> Result<(String, BackendSpec)>;
}

/// `IsDeletable(ctx, client, cfg) -> (bool, error)`.
#[async_trait]
pub trait Deletability: Send + Sync {
    async fn is_deletable(&self, client: &Client, cfg: &Configuration) -> Result<bool>;
}

/// `GetProviderFromConfiguration`, `SetRegion`, `GetProviderCredentials`.
///
/// A `None` return from `get_credentials` with `Ok` means "not retrievable" and is a hard
/// failure at the call site (`spec.md` §6), distinct from a `Provider` lookup error.
#[async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn get_provider(&self, client: &Client, cfg: &Configuration) -> Result<Option<Provider>>;
    fn set_region(&self, provider: &Provider) -> Option<String>;
    async fn get_credentials(
        &self,
        client: &Client,
        provider: &Provider,
    ) -> Result<Option<Credentials>>;
}

/// `GetTerraformStatus(ctx, ns, jobName, ctrlNs, container, initContainer) -> (state, error)`.
#[async_trait]
pub trait TerraformStatusProbe: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn get_status(
        &self,
        client: &Client,
        namespace: &str,
        job_name: &str,
        controller_namespace: &str,
        container: &str,
        init_container: &str,
    ) -> Result<JobProbeState>;
}

/// The bundle of collaborators a reconcile needs, grouped for convenient injection via
/// `Context`.
#[derive(Clone)]
pub struct Collaborators {
    pub validator: Arc<dyn ConfigurationValidator>,
    pub renderer: Arc<dyn Renderer>,
    pub deletability: Arc<dyn Deletability>,
    pub providers: Arc<dyn ProviderResolver>,
    pub status_probe: Arc<dyn TerraformStatusProbe>,
    pub backend: Arc<dyn Backend>,
}

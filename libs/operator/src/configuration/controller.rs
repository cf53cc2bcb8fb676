//! Controller wiring for `Configuration`: the `Context`/`State` shared with the web server, and
//! the top-level `run()` loop (`spec.md` §2 "Reconcile Driver", modeled on the generic
//! controller/state/diagnostics shape this workspace uses for every watched CRD).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::runtime::controller::Controller;
use kube::runtime::{events::Reporter, watcher::Config};
use kube::Client;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{error, trace};

use crate::collaborators::Collaborators;
use crate::configuration::reconcile::{error_policy, reconcile_configuration};
use crate::crd::configuration::Configuration;
use crate::metrics::Metrics;

/// Context injected into every reconcile and error-policy invocation.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub metrics: Arc<Metrics>,
    pub collaborators: Collaborators,
}

/// Diagnostics read by the web server's `/` endpoint.
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "tf-controller".into(),
        }
    }
}

/// State shared between the controller and the web server.
#[derive(Clone)]
pub struct State {
    diagnostics: Arc<RwLock<Diagnostics>>,
    metrics: Arc<Metrics>,
    collaborators: Collaborators,
}

impl State {
    /// `registry` is typically the one `k8s-util`'s `new_client_with_metrics` already registered
    /// client-transport metrics onto, so the reconcile metrics (`spec.md` §2 ambient stack) land
    /// on the same `/metrics` endpoint as the Kubernetes client's own counters.
    pub fn new(registry: prometheus_client::registry::Registry, collaborators: Collaborators) -> Self {
        Self {
            diagnostics: Arc::default(),
            metrics: Arc::new(Metrics::new(registry)),
            collaborators,
        }
    }

    pub fn metrics(&self) -> String {
        let mut buffer = String::new();
        let registry = &*self.metrics.registry;
        prometheus_client::encoding::text::encode(&mut buffer, registry).unwrap();
        buffer
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    pub fn to_context(&self, client: Client) -> Arc<Context> {
        Arc::new(Context {
            client,
            metrics: self.metrics.clone(),
            diagnostics: self.diagnostics.clone(),
            collaborators: self.collaborators.clone(),
        })
    }
}

/// Initializes the Configuration controller and drives it to completion (until shutdown).
pub async fn run(state: State, client: Client) {
    let configurations = Api::<Configuration>::all(client.clone());
    if let Err(e) = configurations.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        std::process::exit(1);
    }
    trace!("init configuration controller");
    Controller::new(configurations, Config::default().any_semantic())
        .shutdown_on_signal()
        .run(reconcile_configuration, error_policy, state.to_context(client))
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
}

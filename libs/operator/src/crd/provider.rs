use super::configuration::ObjectRef;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Cloud credentials and region. Treated as a read-only collaborator by the Configuration
/// reconciler: its own controller (out of scope for this crate) validates credentials and
/// sets `status.state`.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "terraform.example.com",
    version = "v1beta2",
    kind = "Provider",
    plural = "providers",
    namespaced
)]
#[kube(status = "ProviderStatus")]
#[kube(derive = "PartialEq")]
pub struct ProviderSpec {
    /// Secret carrying the cloud credentials, e.g. an access key / secret key pair.
    #[serde(rename = "credentials")]
    pub credentials_secret_ref: ObjectRef,

    /// Cloud region this Provider authenticates into.
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ProviderState {
    #[default]
    Initializing,
    Ready,
    NotReady,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct ProviderStatus {
    #[serde(default)]
    pub state: Option<ProviderState>,
}

impl Provider {
    pub fn is_ready(&self) -> bool {
        matches!(
            self.status.as_ref().and_then(|s| s.state.as_ref()),
            Some(ProviderState::Ready)
        )
    }
}

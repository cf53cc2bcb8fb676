use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A reference to a Kubernetes object by name and (optional) namespace.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Where to land the harvested outputs.
pub type SecretRef = ObjectRef;

/// Backend selector. When unset the renderer picks a default; in centralized mode the driver
/// always overwrites this to the in-cluster Kubernetes backend keyed by the Configuration's UID.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct BackendSpec {
    #[serde(default, rename = "inClusterConfig")]
    pub in_cluster_config: bool,
    #[serde(default, rename = "secretSuffix")]
    pub secret_suffix: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One IaC unit: either an inline HCL/JSON document or a reference to a remote repository.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "terraform.example.com",
    version = "v1beta2",
    kind = "Configuration",
    plural = "configurations",
    namespaced
)]
#[kube(status = "ConfigurationStatus")]
#[kube(derive = "PartialEq")]
pub struct ConfigurationSpec {
    /// Inline HCL/JSON IaC document. Mutually exclusive with `remote`.
    #[serde(default)]
    pub hcl: Option<String>,

    /// Git URL of a remote repository holding the IaC document. Mutually exclusive with `hcl`.
    #[serde(default)]
    pub remote: Option<String>,

    /// Subdirectory within the remote repository holding the IaC document.
    #[serde(default)]
    pub path: Option<String>,

    /// Free-form variable map, rendered into `TF_VAR_<k>` environment references.
    #[serde(default)]
    pub variable: Option<BTreeMap<String, serde_json::Value>>,

    /// Backend selector. Left unset to use the renderer's default.
    #[serde(default)]
    pub backend: Option<BackendSpec>,

    /// Where to write harvested outputs as a connection Secret.
    #[serde(default, rename = "writeConnectionSecretToReference")]
    pub write_connection_secret_to_reference: Option<SecretRef>,

    /// The `Provider` supplying cloud credentials and region.
    #[serde(default, rename = "providerRef")]
    pub provider_ref: Option<ObjectRef>,

    /// Skip provider resolution; credentials are supplied by the renderer directly.
    #[serde(default, rename = "inlineCredentials")]
    pub inline_credentials: bool,

    /// Whether deletion should run a destroy Job at all.
    #[serde(default = "default_true", rename = "deleteResource")]
    pub delete_resource: bool,

    /// Skip waiting for the destroy Job and force-remove all artifacts regardless of outcome.
    #[serde(default, rename = "forceDelete")]
    pub force_delete: bool,
}

impl ConfigurationSpec {
    /// `spec.variable`, defaulted to empty when unset.
    pub fn variables(&self) -> BTreeMap<String, serde_json::Value> {
        self.variable.clone().unwrap_or_default()
    }
}

/// Hand-rolled rather than `#[derive(Default)]`: `#[serde(default = "default_true")]` only
/// applies on deserialization of a partial document, not to `Default::default()` calls made from
/// Rust code (e.g. in tests), so a derived impl would silently diverge from `spec.md`'s stated
/// default of `true` for `deleteResource`.
impl Default for ConfigurationSpec {
    fn default() -> Self {
        Self {
            hcl: None,
            remote: None,
            path: None,
            variable: None,
            backend: None,
            write_connection_secret_to_reference: None,
            provider_ref: None,
            inline_credentials: false,
            delete_resource: true,
            force_delete: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ApplyState {
    ProviderNotReady,
    Authorizing,
    ConfigurationStaticCheckFailed,
    ConfigurationReloading,
    ConfigurationProvisioningAndChecking,
    Available,
    GeneratingOutputs,
    InvalidRegion,
}

impl ApplyState {
    /// Terminal states for the apply path (`spec.md` §4.1).
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplyState::Available | ApplyState::InvalidRegion)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DestroyState {
    ConfigurationDestroying,
    ConfigurationDestroyFailed,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct ApplyStatus {
    pub state: Option<ApplyState>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct DestroyStatus {
    pub state: Option<DestroyState>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq)]
pub struct ConfigurationStatus {
    #[serde(default)]
    pub apply: Option<ApplyStatus>,
    #[serde(default)]
    pub destroy: Option<DestroyStatus>,
    #[serde(default, rename = "observedGeneration")]
    pub observed_generation: Option<i64>,
}

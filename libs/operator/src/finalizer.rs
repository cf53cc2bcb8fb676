use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt::Debug;

/// Finalizer carried by every `Configuration` this controller has started reconciling.
///
/// Present iff teardown has not completed all cleanup steps (`spec.md` §3 invariant 4).
pub static CONFIGURATION_FINALIZER: &str = "configuration.terraform.example.com/finalizer";

/// Adds our finalizer if it is not already present. Idempotent: re-adding is a no-op merge patch.
pub async fn add<K>(client: Client, name: &str, namespace: &str) -> kube::Result<K>
where
    K: Clone + DeserializeOwned + Debug + Resource,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    let patch: Value = json!({
        "metadata": {
            "finalizers": [CONFIGURATION_FINALIZER]
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
}

/// Removes our finalizer. Idempotent: removing an absent finalizer is a no-op merge patch.
pub async fn delete<K>(client: Client, name: &str, namespace: &str) -> kube::Result<K>
where
    K: Clone + DeserializeOwned + Debug + Resource,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client, namespace);
    let patch: Value = json!({
        "metadata": {
            "finalizers": null
        }
    });
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
}

//! Component D: Output Harvester.
//!
//! Parses the Terraform state JSON fetched from the backend and writes the `outputs` mapping into
//! the connection Secret the Configuration asked for (`spec.md` §4.4 step "GeneratingOutputs").

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, ObjectMeta, Patch, PatchParams};
use kube::Client;
use serde::Deserialize;

use crate::configuration::artifacts::FIELD_MANAGER;
use crate::error::{Error, Result};

/// Labels recording which Configuration last wrote a connection Secret, so two Configurations can
/// never silently clobber one another's output Secret (`spec.md` §3 "Derived Artifacts").
pub const CREATED_BY_LABEL: &str = "terraform.example.com/created-by";
pub const CREATED_BY_VALUE: &str = "terraform-controller";
pub const OWNED_BY_LABEL: &str = "terraform.example.com/owned-by";
pub const OWNED_NAMESPACE_LABEL: &str = "terraform.example.com/owned-namespace";

#[derive(Deserialize)]
struct TerraformState {
    #[serde(default)]
    outputs: BTreeMap<String, TerraformOutput>,
}

#[derive(Deserialize)]
struct TerraformOutput {
    value: serde_json::Value,
}

/// Flattens a Terraform state JSON blob into `name -> value` strings. Non-string output values
/// are rendered via their JSON text form.
pub fn parse_outputs(state_json: &[u8]) -> Result<BTreeMap<String, String>> {
    let state: TerraformState = serde_json::from_slice(state_json)?;
    Ok(state
        .outputs
        .into_iter()
        .map(|(name, out)| {
            let rendered = match out.value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (name, rendered)
        })
        .collect())
}

fn label<'a>(secret: &'a Secret, key: &str) -> Option<&'a str> {
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(|s| s.as_str())
}

/// `Some(error)` iff `existing` carries an `owned-by`/`owned-namespace` label that names a
/// Configuration other than `configuration_name`/`configuration_namespace` (`spec.md` §3
/// invariant 3, §4.7). Pulled out of `harvest` so the ownership rule is unit-testable without a
/// live API server.
fn ownership_conflict(
    existing: &Secret,
    configuration_name: &str,
    configuration_namespace: &str,
) -> Option<Error> {
    let owner = label(existing, OWNED_BY_LABEL);
    let owner_ns = label(existing, OWNED_NAMESPACE_LABEL);
    let mismatched = owner.is_some_and(|o| o != configuration_name)
        || owner_ns.is_some_and(|ns| ns != configuration_namespace);
    mismatched.then(|| {
        Error::SecretOwnershipConflict(format!(
            "{}/{}",
            owner_ns.unwrap_or(""),
            owner.unwrap_or("")
        ))
    })
}

/// Writes `outputs` into the connection Secret named `name` in `namespace`, owned by the
/// Configuration `configuration_name`/`configuration_namespace`. Refuses to overwrite a Secret
/// whose `owned-by` or `owned-namespace` label is present and names a different Configuration
/// (`spec.md` §3 invariant 3, §4.7).
pub async fn harvest(
    client: Client,
    namespace: &str,
    name: &str,
    configuration_name: &str,
    configuration_namespace: &str,
    outputs: &BTreeMap<String, String>,
) -> Result<Secret> {
    let api: Api<Secret> = Api::namespaced(client, namespace);

    match api.get(name).await {
        Ok(existing) => {
            if let Some(e) = ownership_conflict(&existing, configuration_name, configuration_namespace) {
                return Err(e);
            }
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {}
        Err(e) => return Err(Error::KubeError(e)),
    }

    let mut labels = BTreeMap::new();
    labels.insert(CREATED_BY_LABEL.to_string(), CREATED_BY_VALUE.to_string());
    labels.insert(OWNED_BY_LABEL.to_string(), configuration_name.to_string());
    labels.insert(
        OWNED_NAMESPACE_LABEL.to_string(),
        configuration_namespace.to_string(),
    );

    let data = outputs
        .iter()
        .map(|(k, v)| (k.clone(), ByteString(v.clone().into_bytes())))
        .collect();

    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        data: Some(data),
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

/// The namespace for the connection Secret defaults to `"default"` when the spec leaves it unset
/// (`spec.md` §4.2).
pub fn connection_secret_namespace(namespace: Option<&str>, fallback: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => fallback.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_string_and_non_string_outputs() {
        let json = br#"{"outputs":{"endpoint":{"value":"1.2.3.4"},"port":{"value":5432}}}"#;
        let outputs = parse_outputs(json).unwrap();
        assert_eq!(outputs.get("endpoint").unwrap(), "1.2.3.4");
        assert_eq!(outputs.get("port").unwrap(), "5432");
    }

    #[test]
    fn missing_outputs_key_yields_empty_map() {
        let json = br#"{}"#;
        let outputs = parse_outputs(json).unwrap();
        assert!(outputs.is_empty());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let json = br#"not json"#;
        assert!(parse_outputs(json).is_err());
    }

    #[test]
    fn connection_secret_namespace_defaults_when_unset() {
        assert_eq!(connection_secret_namespace(None, "default"), "default");
        assert_eq!(connection_secret_namespace(Some(""), "default"), "default");
        assert_eq!(connection_secret_namespace(Some("prod"), "default"), "prod");
    }

    fn secret_owned_by(name: &str, namespace: &str) -> Secret {
        let mut labels = BTreeMap::new();
        labels.insert(OWNED_BY_LABEL.to_string(), name.to_string());
        labels.insert(OWNED_NAMESPACE_LABEL.to_string(), namespace.to_string());
        Secret {
            metadata: ObjectMeta {
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn unlabeled_secret_has_no_ownership_conflict() {
        let secret = Secret::default();
        assert!(ownership_conflict(&secret, "c1", "t1").is_none());
    }

    #[test]
    fn matching_owner_has_no_conflict() {
        let secret = secret_owned_by("c1", "t1");
        assert!(ownership_conflict(&secret, "c1", "t1").is_none());
    }

    #[test]
    fn different_owner_name_conflicts() {
        let secret = secret_owned_by("other", "t1");
        assert!(ownership_conflict(&secret, "c1", "t1").is_some());
    }

    #[test]
    fn different_owner_namespace_conflicts() {
        let secret = secret_owned_by("c1", "t2");
        assert!(ownership_conflict(&secret, "c1", "t1").is_some());
    }
}

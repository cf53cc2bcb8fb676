//! Component B: Drift Detector.
//!
//! Two independent, pure-read checks (`spec.md` §4.3): byte/string equality between desired
//! inputs and what is currently stored. Extra keys already in the Secret never count as drift.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};

use crate::configuration::artifacts::hcl_data_key;
use crate::context::ConfigurationType;

/// For `Hcl`, string-equal the ConfigMap's data against the rendered text. For `Remote`, always
/// `false` — the remote HEAD is the source of truth, re-resolved by the Job itself.
pub fn iac_drift(
    ty: ConfigurationType,
    desired_text: &str,
    existing_cm: Option<&ConfigMap>,
) -> bool {
    match ty {
        ConfigurationType::Remote => false,
        ConfigurationType::Hcl => {
            let key = hcl_data_key(ty);
            existing_cm
                .and_then(|cm| cm.data.as_ref())
                .and_then(|data| data.get(key))
                .map(|stored| stored != desired_text)
                .unwrap_or(true)
        }
    }
}

/// For every key in the desired data, the Secret must carry an equal byte value; any missing or
/// differing key sets drift. Keys present only in the stored Secret are ignored.
pub fn variable_drift(desired: &BTreeMap<String, Vec<u8>>, existing_secret: Option<&Secret>) -> bool {
    let existing_data = existing_secret.and_then(|s| s.data.as_ref());
    desired.iter().any(|(key, value)| {
        existing_data
            .and_then(|data| data.get(key))
            .map(|stored| &stored.0 != value)
            .unwrap_or(true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;

    fn cm_with(key: &str, value: &str) -> ConfigMap {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), value.to_string());
        ConfigMap {
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn remote_never_drifts() {
        assert!(!iac_drift(ConfigurationType::Remote, "anything", None));
    }

    #[test]
    fn hcl_drifts_when_absent() {
        assert!(iac_drift(ConfigurationType::Hcl, "terraform{}", None));
    }

    #[test]
    fn hcl_no_drift_when_equal() {
        let cm = cm_with("main.tf", "terraform{}");
        assert!(!iac_drift(ConfigurationType::Hcl, "terraform{}", Some(&cm)));
    }

    #[test]
    fn hcl_drifts_when_changed() {
        let cm = cm_with("main.tf", "terraform{}");
        assert!(iac_drift(ConfigurationType::Hcl, "terraform{other=1}", Some(&cm)));
    }

    #[test]
    fn variable_drift_on_missing_secret() {
        let mut desired = BTreeMap::new();
        desired.insert("TF_VAR_x".to_string(), b"1".to_vec());
        assert!(variable_drift(&desired, None));
    }

    #[test]
    fn variable_drift_ignores_extra_keys() {
        let mut desired = BTreeMap::new();
        desired.insert("TF_VAR_x".to_string(), b"1".to_vec());
        let mut stored = BTreeMap::new();
        stored.insert("TF_VAR_x".to_string(), ByteString(b"1".to_vec()));
        stored.insert("extra".to_string(), ByteString(b"2".to_vec()));
        let secret = Secret {
            data: Some(stored),
            ..Default::default()
        };
        assert!(!variable_drift(&desired, Some(&secret)));
    }

    #[test]
    fn variable_drift_on_changed_value() {
        let mut desired = BTreeMap::new();
        desired.insert("TF_VAR_x".to_string(), b"2".to_vec());
        let mut stored = BTreeMap::new();
        stored.insert("TF_VAR_x".to_string(), ByteString(b"1".to_vec()));
        let secret = Secret {
            data: Some(stored),
            ..Default::default()
        };
        assert!(variable_drift(&desired, Some(&secret)));
    }
}

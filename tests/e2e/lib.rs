#[cfg(all(test, feature = "e2e-tests"))]
mod test {
    use std::time::Duration;

    use k8s_openapi::api::batch::v1::Job;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::{Api, DeleteParams, PostParams};
    use kube::client::Client;
    use kube::runtime::wait::{await_condition, conditions, Condition};
    use kube::ResourceExt;
    use tf_controller::crd::configuration::{ApplyState, Configuration, ConfigurationSpec};
    use tokio::time::timeout;

    fn is_apply_available() -> impl Condition<Configuration> {
        |obj: Option<&Configuration>| {
            obj.and_then(|c| c.status.as_ref())
                .and_then(|s| s.apply.as_ref())
                .and_then(|a| a.state.clone())
                == Some(ApplyState::Available)
        }
    }

    fn has_finalizer() -> impl Condition<Configuration> {
        |obj: Option<&Configuration>| {
            obj.map(|c| {
                c.meta()
                    .finalizers
                    .as_ref()
                    .is_some_and(|f| !f.is_empty())
            })
            .unwrap_or(false)
        }
    }

    fn exists<R>() -> impl Condition<R> {
        |obj: Option<&R>| obj.is_some()
    }

    async fn wait_for<R, C>(api: Api<R>, name: &str, condition: C)
    where
        R: kube::Resource
            + Clone
            + std::fmt::Debug
            + for<'de> k8s_openapi::serde::Deserialize<'de>
            + 'static
            + Send,
        C: Condition<R>,
    {
        timeout(
            Duration::from_secs(30),
            await_condition(api, name, condition),
        )
        .await
        .unwrap()
        .unwrap();
    }

    /// Creates a minimal inline-HCL, inline-credentials Configuration that never touches a real
    /// Provider (`spec.md` §8 scenario S1).
    async fn setup(name: &str) -> (Api<Configuration>, Api<ConfigMap>, Api<Job>) {
        let cfg = Configuration::new(
            name,
            ConfigurationSpec {
                hcl: Some("terraform {}".to_string()),
                inline_credentials: true,
                ..Default::default()
            },
        );

        let client = Client::try_default().await.unwrap();
        let cfg_api = Api::<Configuration>::namespaced(client.clone(), "default");
        cfg_api.create(&PostParams::default(), &cfg).await.unwrap();

        let cm_api = Api::<ConfigMap>::namespaced(client.clone(), "default");
        let job_api = Api::<Job>::namespaced(client, "default");

        wait_for(cfg_api.clone(), name, has_finalizer()).await;
        wait_for(cm_api.clone(), &format!("tf-{name}"), exists()).await;

        (cfg_api, cm_api, job_api)
    }

    #[tokio::test]
    async fn configuration_create_materializes_configmap_and_applies() {
        let name = "test-create";
        let (cfg_api, _cm_api, job_api) = setup(name).await;

        wait_for(job_api.clone(), &format!("{name}-apply"), conditions::is_job_completed()).await;
        wait_for(cfg_api.clone(), name, is_apply_available()).await;

        let cfg = cfg_api.get(name).await.unwrap();
        let apply = cfg.status.unwrap().apply.unwrap();
        assert_eq!(apply.state, Some(ApplyState::Available));
        assert!(apply.outputs.is_empty());
    }

    #[tokio::test]
    async fn configuration_edit_hcl_recreates_apply_job() {
        let name = "test-edit-hcl";
        let (cfg_api, _cm_api, job_api) = setup(name).await;
        wait_for(job_api.clone(), &format!("{name}-apply"), conditions::is_job_completed()).await;
        wait_for(cfg_api.clone(), name, is_apply_available()).await;

        let mut cfg = cfg_api.get(name).await.unwrap();
        let original_job = job_api.get(&format!("{name}-apply")).await.unwrap();
        cfg.spec.hcl = Some("terraform { required_version = \">= 1.0\" }".to_string());
        cfg.metadata.managed_fields = None;
        cfg_api
            .replace(name, &Default::default(), &cfg)
            .await
            .unwrap();

        wait_for(
            job_api.clone(),
            &format!("{name}-apply"),
            conditions::is_deleted(&original_job.uid().unwrap()),
        )
        .await;
        wait_for(job_api.clone(), &format!("{name}-apply"), conditions::is_job_completed()).await;
        wait_for(cfg_api.clone(), name, is_apply_available()).await;
    }

    #[tokio::test]
    async fn configuration_delete_removes_derived_artifacts_and_finalizer() {
        let name = "test-delete";
        let (cfg_api, cm_api, job_api) = setup(name).await;
        wait_for(job_api.clone(), &format!("{name}-apply"), conditions::is_job_completed()).await;
        wait_for(cfg_api.clone(), name, is_apply_available()).await;

        let cfg = cfg_api.get(name).await.unwrap();
        cfg_api.delete(name, &DeleteParams::default()).await.unwrap();

        wait_for(
            cfg_api.clone(),
            name,
            conditions::is_deleted(&cfg.uid().unwrap()),
        )
        .await;

        // Derived artifacts are gone alongside the Configuration (`spec.md` §4.5 cleanup order).
        assert!(cm_api.get(&format!("tf-{name}")).await.is_err());
        assert!(job_api.get(&format!("{name}-apply")).await.is_err());
    }

    #[tokio::test]
    async fn configuration_force_delete_ignores_destroy_job_outcome() {
        let name = "test-force-delete";
        let cfg = Configuration::new(
            name,
            ConfigurationSpec {
                hcl: Some("terraform {}".to_string()),
                inline_credentials: true,
                force_delete: true,
                ..Default::default()
            },
        );

        let client = Client::try_default().await.unwrap();
        let cfg_api = Api::<Configuration>::namespaced(client.clone(), "default");
        cfg_api.create(&PostParams::default(), &cfg).await.unwrap();
        wait_for(cfg_api.clone(), name, has_finalizer()).await;

        let current = cfg_api.get(name).await.unwrap();
        cfg_api.delete(name, &DeleteParams::default()).await.unwrap();

        wait_for(
            cfg_api.clone(),
            name,
            conditions::is_deleted(&current.uid().unwrap()),
        )
        .await;
    }
}

use thiserror::Error;

/// All errors possible to occur during reconciliation of a `Configuration`.
#[derive(Error, Debug)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate.
    #[error("Kubernetes reported error: {0}")]
    KubeError(#[from] kube::Error),

    /// The `Configuration` object is missing a namespace.
    #[error("Configuration resource must be namespaced")]
    MissingNamespace,

    /// `ValidConfigurationObject` rejected the CRD.
    #[error("configuration failed static validation: {0}")]
    StaticCheckFailed(String),

    /// A referenced `Provider` is missing or not yet `Ready`.
    #[error("provider not ready: {0}")]
    ProviderNotFound(String),

    /// `GetProviderCredentials` returned `None` with no error: "not retrievable".
    #[error("credentials unavailable for provider {0}")]
    CredentialsUnavailable(String),

    /// `RenderConfiguration` failed.
    #[error("failed to render configuration: {0}")]
    RenderError(String),

    /// CPU/memory quantity strings from the process environment failed to parse.
    #[error("failed to parse resource quantities: {0}")]
    ResourceQuantityError(String),

    /// `JOB_NODE_SELECTOR` was set but was not valid JSON; caller should warn and continue.
    #[error("failed to parse JOB_NODE_SELECTOR: {0}")]
    NodeSelectorParseError(String),

    /// The connection secret already carries ownership labels naming a different Configuration.
    #[error("cannot update secret owned by {0}")]
    SecretOwnershipConflict(String),

    /// Backend state JSON did not parse as the expected outputs shape.
    #[error("failed to parse backend state: {0}")]
    StateParseError(#[from] serde_json::Error),

    /// Sentinel: the apply Job has not reached a terminal state yet. Never surfaced to the user.
    #[error("apply job not yet completed")]
    ApplyJobNotCompleted,

    /// Sentinel: the destroy Job has not reached a terminal state yet. Never surfaced to the user.
    #[error("destroy job not yet completed")]
    DestroyJobNotCompleted,

    /// A status update failed. Only returned to the caller when no other error is in flight.
    #[error("failed to update configuration status: {0}")]
    StatusUpdateError(#[source] kube::Error),

    /// The current tracing span carries no valid OpenTelemetry trace id; metrics exemplars are
    /// skipped rather than recorded against `TraceId::INVALID`.
    #[error("no valid trace id in current span")]
    InvalidTraceId,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Short, cardinality-bounded label for the `failures` metric and log lines.
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube",
            Error::MissingNamespace => "missing_namespace",
            Error::StaticCheckFailed(_) => "static_check_failed",
            Error::ProviderNotFound(_) => "provider_not_found",
            Error::CredentialsUnavailable(_) => "credentials_unavailable",
            Error::RenderError(_) => "render_error",
            Error::ResourceQuantityError(_) => "resource_quantity_error",
            Error::NodeSelectorParseError(_) => "node_selector_parse_error",
            Error::SecretOwnershipConflict(_) => "secret_ownership_conflict",
            Error::StateParseError(_) => "state_parse_error",
            Error::ApplyJobNotCompleted => "apply_job_not_completed",
            Error::DestroyJobNotCompleted => "destroy_job_not_completed",
            Error::StatusUpdateError(_) => "status_update_error",
            Error::InvalidTraceId => "invalid_trace_id",
        }
        .to_string()
    }

    /// The two non-error "not yet done" sentinels never count as reconciliation failures.
    pub fn is_requeue_sentinel(&self) -> bool {
        matches!(self, Error::ApplyJobNotCompleted | Error::DestroyJobNotCompleted)
    }
}

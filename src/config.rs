use clap::Args;

/// Value of the `app.kubernetes.io/created-by` label when none is configured.
pub const DEFAULT_CREATOR_TAG: &str = "application-service";

/// Shared image repository all tenants publish to.
pub const DEFAULT_IMAGE_REPO: &str = "quay.io/redhat-appstudio/user-workload";

/// OCI bundle holding the build pipeline definitions.
pub const DEFAULT_BUILD_BUNDLE: &str = "quay.io/redhat-appstudio/build-templates-bundle:v0.1.4";

pub const DEFAULT_PAC_SECRET: &str = "pipelines-as-code-secret";
pub const DEFAULT_PAC_WEBHOOK_SECRET: &str = "pipelines-as-code-webhooks-secret";

/// Settings held by each generator instance.
///
/// All fields can be set from the command line or from the environment.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Value of the `app.kubernetes.io/created-by` label
    #[arg(long, env = "GITOPS_CREATOR_TAG", default_value = DEFAULT_CREATOR_TAG)]
    pub creator_tag: String,

    /// Protected image repository shared by all namespaces
    #[arg(long, env = "GITOPS_DEFAULT_IMAGE_REPO", default_value = DEFAULT_IMAGE_REPO)]
    pub default_image_repo: String,

    /// Bundle referenced by generated PipelineRuns
    #[arg(long, env = "GITOPS_BUILD_BUNDLE", default_value = DEFAULT_BUILD_BUNDLE)]
    pub build_bundle: String,

    /// Secret holding the git provider token used by Pipelines as Code
    #[arg(long, env = "GITOPS_PAC_SECRET", default_value = DEFAULT_PAC_SECRET)]
    pub pac_secret_name: String,

    /// Secret holding the per-repository webhook secrets
    #[arg(long, env = "GITOPS_PAC_WEBHOOK_SECRET", default_value = DEFAULT_PAC_WEBHOOK_SECRET)]
    pub pac_webhook_secret_name: String,

    /// Always generate Pipelines as Code resources
    #[arg(long, env = "GITOPS_HACBS")]
    pub hacbs: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            creator_tag: DEFAULT_CREATOR_TAG.to_string(),
            default_image_repo: DEFAULT_IMAGE_REPO.to_string(),
            build_bundle: DEFAULT_BUILD_BUNDLE.to_string(),
            pac_secret_name: DEFAULT_PAC_SECRET.to_string(),
            pac_webhook_secret_name: DEFAULT_PAC_WEBHOOK_SECRET.to_string(),
            hacbs: false,
        }
    }
}

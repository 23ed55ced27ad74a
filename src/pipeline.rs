//! Build pipeline resolution.
//!
//! A component is built either by Pipelines as Code, in which case the only
//! resource generated is a PaC `Repository`, or by a webhook: a
//! TriggerTemplate that stamps out PipelineRuns, the EventListener receiving
//! push events and the Route exposing that listener.

use std::{collections::BTreeMap, path::Path};

use k8s_openapi::apimachinery::pkg::{runtime::RawExtension, util::intstr::IntOrString};
use kube::core::ObjectMeta;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

use crate::{
    config::GeneratorConfig,
    crds::{
        ClaimSource, EventListener, EventListenerSpec, EventListenerTrigger, GitProviderSpec,
        Param, ParamSpec, PipelineRef, PipelineRun, PipelineRunSpec, Repository, RepositorySpec,
        Route, RoutePort, RouteSpec, RouteTargetReference, SecretKeyRef, SecretSource,
        TriggerBindingRef, TriggerTemplate, TriggerTemplateRef, TriggerTemplateSpec,
        WorkspaceBinding,
    },
    devfile::Devfile,
    generate::Generator,
    image::{self, GIT_REVISION_PARAM},
    kustomize::{Kustomization, KUSTOMIZATION_FILE},
    manifests::COMMON_STORAGE_CLAIM,
    resources::{Component, GIT_PROVIDER_ANNOTATION, PAC_ANNOTATION},
    scm::{self, GitProvider},
    yaml::{self, Manifests},
    Error, Result,
};

pub const PAC_REPOSITORY_FILE: &str = "pac-repository.yaml";
pub const TRIGGER_TEMPLATE_FILE: &str = "trigger-template.yaml";
pub const EVENT_LISTENER_FILE: &str = "event-listener.yaml";
pub const WEBHOOK_ROUTE_FILE: &str = "build-webhook-route.yaml";

pub const DOCKER_BUILD_PIPELINE: &str = "docker-build";
pub const JAVA_BUILDER_PIPELINE: &str = "java-builder";
pub const NODEJS_BUILDER_PIPELINE: &str = "nodejs-builder";
pub const NOOP_PIPELINE: &str = "noop";

pub const BUILD_COMPONENT_LABEL: &str = "build.appstudio.openshift.io/component";
pub const BUILD_APPLICATION_LABEL: &str = "build.appstudio.openshift.io/application";
pub const BUILD_TYPE_LABEL: &str = "build.appstudio.openshift.io/type";
pub const BUILD_VERSION_LABEL: &str = "build.appstudio.openshift.io/version";
pub const PIPELINE_TYPE_LABEL: &str = "pipelines.appstudio.openshift.io/type";

const BUILD_TYPE: &str = "build";
const BUILD_VERSION: &str = "0.1";

/// Workspace holding the cloned sources.
pub const SOURCE_WORKSPACE: &str = "workspace";
/// Workspace holding the registry credentials.
pub const REGISTRY_AUTH_WORKSPACE: &str = "registry-auth";
pub const REGISTRY_SECRET: &str = "redhat-appstudio-registry-pull-secret";

/// Workspace sub path of the build triggered when a component is created.
pub const INITIAL_BUILD_SUB_PATH: &str = "initialbuild";

const GIT_REVISION: &str = "git-revision";
const EVENT_LISTENER_SERVICE_ACCOUNT: &str = "pipeline";
const PUSH_BINDING: &str = "github-push";
const CLUSTER_TRIGGER_BINDING: &str = "ClusterTriggerBinding";
const EVENT_LISTENER_PORT: i32 = 8080;

/// Keys of the PaC secret holding GitHub App credentials.
const GITHUB_APP_KEYS: [&str; 2] = ["github-application-id", "github-private-key"];
const GITLAB_URL: &str = "https://gitlab.com";

/// Inputs of a build generation that come from the cluster rather than the component.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildInputs {
    /// Keys and values of the Pipelines as Code secret.
    pub pac_config: BTreeMap<String, String>,
    /// Whether the registry pull secret exists in the component namespace.
    pub has_registry_secret: bool,
}

/// Picks the build pipeline for a serialized devfile.
pub fn determine_build_pipeline(devfile: &str) -> &'static str {
    let devfile = match Devfile::parse(devfile) {
        Ok(devfile) => devfile,
        Err(err) => {
            debug!(%err, "unable to parse devfile");
            return NOOP_PIPELINE;
        }
    };
    if devfile.has_dockerfile() {
        return DOCKER_BUILD_PIPELINE;
    }
    match devfile.metadata.language.to_lowercase().as_str() {
        "java" => JAVA_BUILDER_PIPELINE,
        "nodejs" | "node" => NODEJS_BUILDER_PIPELINE,
        // Python builds have no pipeline yet.
        "python" => NOOP_PIPELINE,
        _ => NOOP_PIPELINE,
    }
}

/// Labels carried by every build resource of `component`.
pub fn build_labels(component: &Component) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            BUILD_COMPONENT_LABEL.to_string(),
            component.component_name().to_string(),
        ),
        (
            BUILD_APPLICATION_LABEL.to_string(),
            component.application().to_string(),
        ),
        (BUILD_TYPE_LABEL.to_string(), BUILD_TYPE.to_string()),
        (BUILD_VERSION_LABEL.to_string(), BUILD_VERSION.to_string()),
        (PIPELINE_TYPE_LABEL.to_string(), BUILD_TYPE.to_string()),
    ])
}

/// The PipelineRun parameters of a build of `component`.
///
/// Webhook builds (`is_initial == false`) tag the output image with the pushed
/// revision and need a `containerImage`. Images in the protected repository
/// are rejected before anything else happens.
pub fn get_params_for_component_build(
    component: &Component,
    is_initial: bool,
    config: &GeneratorConfig,
) -> Result<Vec<Param>> {
    let image = component.spec.container_image.as_str();
    image::check_protected_repo(image, &component.namespace_any(), &config.default_image_repo)?;

    let output_image = if is_initial {
        image.to_string()
    } else if image.is_empty() {
        return Err(Error::MissingField("containerImage"));
    } else {
        image::normalize_output_image(image)
    };

    let mut params = vec![
        Param::new("git-url", component.git_url()),
        Param::new("output-image", output_image),
    ];

    if let Some(git) = component.git_source() {
        if !git.revision.is_empty() {
            params.push(Param::new("revision", &git.revision));
        }
    }

    if let Ok(devfile) = Devfile::parse(component.devfile()) {
        if let Some(dockerfile) = devfile
            .outerloop_dockerfile()
            .or_else(|| devfile.find_dockerfile())
        {
            params.push(Param::new("dockerfile", &dockerfile.uri));
            if !dockerfile.build_context.is_empty() {
                params.push(Param::new("path-context", &dockerfile.build_context));
            }
        }
    }

    Ok(params)
}

/// The PipelineRun spec building `component` with `params`.
pub fn determine_build_execution(
    component: &Component,
    params: Vec<Param>,
    workspace_sub_path: &str,
    has_registry_secret: bool,
    config: &GeneratorConfig,
) -> PipelineRunSpec {
    let mut workspaces = vec![WorkspaceBinding {
        name: SOURCE_WORKSPACE.to_string(),
        persistent_volume_claim: Some(ClaimSource {
            claim_name: COMMON_STORAGE_CLAIM.to_string(),
        }),
        sub_path: format!("{}/{workspace_sub_path}", component.component_name()),
        ..Default::default()
    }];
    if has_registry_secret {
        workspaces.push(WorkspaceBinding {
            name: REGISTRY_AUTH_WORKSPACE.to_string(),
            secret: Some(SecretSource {
                secret_name: REGISTRY_SECRET.to_string(),
            }),
            ..Default::default()
        });
    }

    PipelineRunSpec {
        params,
        pipeline_ref: PipelineRef {
            name: determine_build_pipeline(component.devfile()).to_string(),
            bundle: config.build_bundle.clone(),
        },
        workspaces,
    }
}

fn pipeline_run_metadata(component: &Component) -> ObjectMeta {
    let labels = build_labels(component);
    ObjectMeta {
        generate_name: Some(format!("{}-", component.component_name())),
        namespace: Some(component.namespace_any()),
        annotations: Some(labels.clone()),
        labels: Some(labels),
        ..Default::default()
    }
}

/// The PipelineRun of the first build of a new component.
pub fn generate_initial_build_pipeline_run(
    component: &Component,
    has_registry_secret: bool,
    config: &GeneratorConfig,
) -> Result<PipelineRun> {
    let params = get_params_for_component_build(component, true, config)?;
    let spec = determine_build_execution(
        component,
        params,
        INITIAL_BUILD_SUB_PATH,
        has_registry_secret,
        config,
    );
    let mut run = PipelineRun::new("", spec);
    run.metadata = pipeline_run_metadata(component);
    Ok(run)
}

fn metadata(name: impl Into<String>, component: &Component) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some(component.namespace_any()),
        ..Default::default()
    }
}

/// Strips a trailing `.git` and `/` from a repository URL.
fn repository_url(url: &str) -> &str {
    let url = url.strip_suffix(".git").unwrap_or(url);
    url.strip_suffix('/').unwrap_or(url)
}

/// Turns a repository URL into a valid secret key.
pub fn sanitize_secret_key(url: &str) -> String {
    url.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// The PaC Repository binding the source repository of `component`.
pub fn pac_repository(
    component: &Component,
    pac_config: &BTreeMap<String, String>,
    config: &GeneratorConfig,
) -> Result<Repository> {
    let git_url = component.git_url();
    let provider =
        scm::detect_provider(git_url, component.annotation(GIT_PROVIDER_ANNOTATION))?;
    let url = repository_url(git_url);

    let github_app = GITHUB_APP_KEYS
        .iter()
        .any(|key| pac_config.contains_key(*key));
    let git_provider = if github_app && provider == GitProvider::GitHub {
        None
    } else {
        Some(GitProviderSpec {
            url: (provider == GitProvider::GitLab).then(|| GITLAB_URL.to_string()),
            secret: Some(SecretKeyRef {
                name: config.pac_secret_name.clone(),
                key: format!("{provider}.token"),
            }),
            webhook_secret: Some(SecretKeyRef {
                name: config.pac_webhook_secret_name.clone(),
                key: sanitize_secret_key(url),
            }),
        })
    };

    let mut repository = Repository::new(
        component.component_name(),
        RepositorySpec {
            url: url.to_string(),
            git_provider,
        },
    );
    repository.metadata = metadata(component.component_name(), component);
    Ok(repository)
}

/// The TriggerTemplate creating a PipelineRun per pushed revision.
pub fn trigger_template(
    component: &Component,
    has_registry_secret: bool,
    config: &GeneratorConfig,
) -> Result<TriggerTemplate> {
    let params = get_params_for_component_build(component, false, config)?;
    let spec = determine_build_execution(
        component,
        params,
        GIT_REVISION_PARAM,
        has_registry_secret,
        config,
    );
    let mut run = PipelineRun::new("", spec);
    run.metadata = pipeline_run_metadata(component);
    let run = serde_json::to_value(&run).map_err(|e| Error::EncodeTemplate("PipelineRun", e))?;

    let mut template = TriggerTemplate::new(
        component.component_name(),
        TriggerTemplateSpec {
            params: vec![ParamSpec {
                name: GIT_REVISION.to_string(),
                description: Some("The git revision to build".to_string()),
            }],
            resource_templates: vec![RawExtension(run)],
        },
    );
    template.metadata = metadata(component.component_name(), component);
    Ok(template)
}

pub fn event_listener(component: &Component) -> EventListener {
    let mut listener = EventListener::new(
        component.component_name(),
        EventListenerSpec {
            service_account_name: EVENT_LISTENER_SERVICE_ACCOUNT.to_string(),
            triggers: vec![EventListenerTrigger {
                bindings: vec![TriggerBindingRef {
                    reference: PUSH_BINDING.to_string(),
                    kind: CLUSTER_TRIGGER_BINDING.to_string(),
                }],
                template: TriggerTemplateRef {
                    reference: component.component_name().to_string(),
                },
            }],
        },
    );
    listener.metadata = metadata(component.component_name(), component);
    listener
}

/// The Route exposing the EventListener service of `component`.
pub fn webhook_route(component: &Component) -> Route {
    let name = format!("el{}", component.component_name());
    let mut route = Route::new(
        &name,
        RouteSpec {
            path: Some("/".to_string()),
            port: Some(RoutePort {
                target_port: IntOrString::Int(EVENT_LISTENER_PORT),
            }),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: format!("el-{}", component.component_name()),
                weight: None,
            },
            ..Default::default()
        },
    );
    route.metadata = metadata(name, component);
    route
}

/// Whether `component` is built by Pipelines as Code.
pub fn is_pac(component: &Component, config: &GeneratorConfig) -> bool {
    config.hacbs || component.annotation(PAC_ANNOTATION) == Some("1")
}

impl Generator<'_> {
    /// The build resources of `component`, keyed by file name.
    pub fn build_manifests(&self, component: &Component, inputs: &BuildInputs) -> Result<Manifests> {
        component.validate()?;
        let config = self.config();

        let mut files = Manifests::new();
        if is_pac(component, config) {
            files.insert(
                PAC_REPOSITORY_FILE,
                &pac_repository(component, &inputs.pac_config, config)?,
            )?;
        } else {
            files.insert(
                TRIGGER_TEMPLATE_FILE,
                &trigger_template(component, inputs.has_registry_secret, config)?,
            )?;
            files.insert(EVENT_LISTENER_FILE, &event_listener(component))?;
            files.insert(WEBHOOK_ROUTE_FILE, &webhook_route(component))?;
        }

        let mut kustomization = Kustomization::new();
        kustomization.add_resources(files.paths().map(|path| path.to_string_lossy().into_owned()));
        files.insert(KUSTOMIZATION_FILE, &kustomization)?;
        Ok(files)
    }

    /// Writes the build resources of `component` into `output_folder`.
    pub fn generate_build(
        &self,
        output_folder: &Path,
        component: &Component,
        inputs: &BuildInputs,
    ) -> Result<()> {
        let files = self.build_manifests(component, inputs)?;
        yaml::write(self.fs(), output_folder, &files)?;
        info!(
            component = component.component_name(),
            dir = %output_folder.display(),
            pac = is_pac(component, self.config()),
            "generated build resources"
        );
        Ok(())
    }
}

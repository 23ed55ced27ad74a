use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Annotation opting a component into Pipelines as Code builds when set to `"1"`.
pub const PAC_ANNOTATION: &str = "pipelinesascode";

/// Annotation naming the git provider of a self-hosted source repository.
pub const GIT_PROVIDER_ANNOTATION: &str = "git-provider";

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, JsonSchema)]
#[kube(
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    kind = "Component",
    namespaced
)]
#[kube(status = "ComponentStatus")]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub component_name: String,
    pub application: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container_image: String,

    /// Number of pods; anything below one means one.
    #[serde(default)]
    pub replicas: Option<i32>,

    /// Port the workload listens on. Zero disables the Service and Route.
    #[serde(default)]
    pub target_port: i32,

    /// Host of the generated Route.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,

    /// Image pull secret of the container image.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret: String,

    #[serde(default)]
    pub source: ComponentSource,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSource {
    pub git: Option<GitSource>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GitSource {
    pub url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub devfile_url: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dockerfile_url: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// The devfile model of the component, serialized.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub devfile: String,
}

impl Component {
    /// The component name used in every generated resource.
    pub fn component_name(&self) -> &str {
        &self.spec.component_name
    }

    pub fn namespace_any(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    pub fn application(&self) -> &str {
        &self.spec.application
    }

    pub fn replicas(&self) -> i32 {
        match self.spec.replicas {
            Some(replicas) if replicas > 0 => replicas,
            _ => 1,
        }
    }

    pub fn git_source(&self) -> Option<&GitSource> {
        self.spec.source.git.as_ref()
    }

    pub fn git_url(&self) -> &str {
        self.git_source().map(|git| git.url.as_str()).unwrap_or_default()
    }

    pub fn devfile(&self) -> &str {
        self.status
            .as_ref()
            .map(|status| status.devfile.as_str())
            .unwrap_or_default()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }

    /// Checks the fields every generator relies on.
    pub fn validate(&self) -> Result<()> {
        if self.spec.component_name.is_empty() {
            return Err(Error::MissingField("name"));
        }
        if self.namespace_any().is_empty() {
            return Err(Error::MissingField("namespace"));
        }
        if self.spec.target_port < 0 {
            return Err(Error::InvalidField {
                field: "targetPort",
                reason: format!("{} is negative", self.spec.target_port),
            });
        }
        Ok(())
    }
}

/// An environment name/value pair.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct EnvVarPair {
    pub name: String,
    pub value: String,
}

impl From<&EnvVarPair> for EnvVar {
    fn from(pair: &EnvVarPair) -> Self {
        EnvVar {
            name: pair.name.clone(),
            value: Some(pair.value.clone()),
            ..Default::default()
        }
    }
}

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, JsonSchema)]
#[kube(
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    kind = "Environment",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    #[serde(default)]
    pub configuration: EnvironmentConfiguration,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfiguration {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarPair>,

    #[serde(default)]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

#[derive(CustomResource, Debug, Serialize, Deserialize, Default, Clone, JsonSchema)]
#[kube(
    group = "appstudio.redhat.com",
    version = "v1alpha1",
    kind = "ApplicationSnapshotEnvironmentBinding",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSnapshotEnvironmentBindingSpec {
    pub application: String,
    pub environment: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snapshot: String,

    #[serde(default)]
    pub components: Vec<BindingComponent>,
}

/// One component deployed into one environment.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindingComponent {
    pub name: String,

    #[serde(default)]
    pub configuration: BindingComponentConfiguration,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BindingComponentConfiguration {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarPair>,

    #[serde(default)]
    pub replicas: Option<i32>,

    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

//! The parts of a devfile the build pipeline resolver looks at.

use serde::Deserialize;

/// Name of the devfile component that describes the outer-loop image build.
pub const OUTERLOOP_BUILD_COMPONENT: &str = "outerloop-build";

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Devfile {
    #[serde(default)]
    pub schema_version: String,

    #[serde(default)]
    pub metadata: DevfileMetadata,

    #[serde(default)]
    pub components: Vec<DevfileComponent>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevfileMetadata {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub language: String,

    #[serde(default)]
    pub project_type: String,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevfileComponent {
    pub name: String,

    #[serde(default)]
    pub image: Option<ImageComponent>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageComponent {
    #[serde(default)]
    pub image_name: String,

    #[serde(default)]
    pub dockerfile: Option<DockerfileImage>,
}

#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DockerfileImage {
    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub build_context: String,
}

impl Devfile {
    /// Parses a devfile in YAML or JSON form.
    pub fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    fn dockerfiles(&self) -> impl Iterator<Item = (&DevfileComponent, &DockerfileImage)> {
        self.components.iter().filter_map(|component| {
            let dockerfile = component.image.as_ref()?.dockerfile.as_ref()?;
            Some((component, dockerfile))
        })
    }

    /// The Dockerfile of the `outerloop-build` image component.
    pub fn outerloop_dockerfile(&self) -> Option<&DockerfileImage> {
        self.dockerfiles()
            .find(|(component, _)| component.name == OUTERLOOP_BUILD_COMPONENT)
            .map(|(_, dockerfile)| dockerfile)
    }

    /// The Dockerfile of the first image component that has one.
    pub fn find_dockerfile(&self) -> Option<&DockerfileImage> {
        self.dockerfiles().map(|(_, dockerfile)| dockerfile).next()
    }

    pub fn has_dockerfile(&self) -> bool {
        self.find_dockerfile().is_some()
    }
}

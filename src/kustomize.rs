use std::{collections::BTreeMap, path::Path};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{fs::Filesystem, Error, Result};

pub const KUSTOMIZATION_API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
pub const KUSTOMIZATION_KIND: &str = "Kustomization";
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

/// A kustomization manifest.
///
/// `resources`, `bases` and `patches` are kept sorted and free of duplicates.
/// Fields this model does not know about are carried over unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    resources: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bases: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    patches: Vec<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_api_version() -> String {
    KUSTOMIZATION_API_VERSION.to_string()
}

fn default_kind() -> String {
    KUSTOMIZATION_KIND.to_string()
}

impl Default for Kustomization {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            resources: vec![],
            bases: vec![],
            patches: vec![],
            extra: BTreeMap::new(),
        }
    }
}

fn merge<I, S>(list: &mut Vec<String>, items: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let merged = list
        .drain(..)
        .chain(items.into_iter().map(Into::into))
        .sorted()
        .dedup()
        .collect();
    *list = merged;
}

impl Kustomization {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resources<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        merge(&mut self.resources, items);
    }

    pub fn add_bases<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        merge(&mut self.bases, items);
    }

    pub fn add_patches<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        merge(&mut self.patches, items);
    }

    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    pub fn patches(&self) -> &[String] {
        &self.patches
    }

    /// Parses a kustomization, normalizing the order of its lists.
    pub fn parse(contents: &[u8], path: &Path) -> Result<Self> {
        let mut parsed: Kustomization =
            serde_yaml::from_slice(contents).map_err(|source| Error::ParseKustomization {
                path: path.to_path_buf(),
                source,
            })?;
        for list in [
            &mut parsed.resources,
            &mut parsed.bases,
            &mut parsed.patches,
        ] {
            merge(list, Vec::<String>::new());
        }
        Ok(parsed)
    }

    /// Reads the kustomization at `path`, or `None` if there is no such file.
    pub fn read(fs: &dyn Filesystem, path: &Path) -> Result<Option<Self>> {
        if !fs.exists(path) {
            return Ok(None);
        }
        let contents = fs.read(path).map_err(Error::fs("read", path))?;
        Self::parse(&contents, path).map(Some)
    }
}

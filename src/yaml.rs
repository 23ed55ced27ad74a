//! YAML writer.
//!
//! A [`Manifests`] value maps paths relative to an output folder to the
//! documents that go there. [`write`] materializes it through a
//! [`Filesystem`], creating parent directories and overwriting existing files.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::Serialize;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

use crate::{fs::Filesystem, Error, Result};

/// Documents keyed by their path relative to the output folder.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Manifests(BTreeMap<PathBuf, serde_yaml::Value>);

impl Manifests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `value` and stores it under `path`, replacing any previous document.
    pub fn insert<T: Serialize>(&mut self, path: impl Into<PathBuf>, value: &T) -> Result<()> {
        let path = path.into();
        let value = serde_yaml::to_value(value).map_err(|source| Error::Encode {
            path: path.clone(),
            source,
        })?;
        self.0.insert(path, value);
        Ok(())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&serde_yaml::Value> {
        self.0.get(path.as_ref())
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.0.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Writes every document of `manifests` below `root`.
pub fn write(fs: &dyn Filesystem, root: &Path, manifests: &Manifests) -> Result<()> {
    let root = fs.expand_home(root).map_err(Error::fs("resolve", root))?;

    for (relative, value) in &manifests.0 {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs.mkdir_all(parent)
                .map_err(Error::fs("create directory", parent))?;
        }
        fs.create(&path).map_err(Error::fs("create", &path))?;
        let contents = serde_yaml::to_string(value).map_err(|source| Error::Encode {
            path: path.clone(),
            source,
        })?;
        fs.write(&path, contents.as_bytes())
            .map_err(Error::fs("write", &path))?;
        debug!(path = %path.display(), "wrote manifest");
    }
    Ok(())
}

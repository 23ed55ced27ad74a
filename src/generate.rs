//! Base and parent kustomize generation.
//!
//! The layout of an application in a GitOps repository is
//!
//! ```text
//! <app-root>/kustomization.yaml
//! <app-root>/components/<component>/base/{deployment,service,route,kustomization}.yaml
//! <app-root>/components/<component>/base/.tekton/...
//! <app-root>/components/<component>/overlays/<environment>/...
//! ```

use std::{
    io,
    path::{Path, PathBuf},
};

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

use crate::{
    config::GeneratorConfig,
    fs::Filesystem,
    kustomize::{Kustomization, KUSTOMIZATION_FILE},
    manifests,
    resources::Component,
    yaml::{self, Manifests},
    Error, Result,
};

pub const DEPLOYMENT_FILE: &str = "deployment.yaml";
pub const SERVICE_FILE: &str = "service.yaml";
pub const ROUTE_FILE: &str = "route.yaml";
pub const COMMON_STORAGE_PVC_FILE: &str = "common-storage-pvc.yaml";

pub const COMPONENTS_DIR: &str = "components";
pub const BASE_DIR: &str = "base";
pub const OVERLAYS_DIR: &str = "overlays";
pub const TEKTON_DIR: &str = ".tekton";

/// `components/<component>/base`, relative to the application root.
pub fn base_dir(component_name: &str) -> PathBuf {
    Path::new(COMPONENTS_DIR).join(component_name).join(BASE_DIR)
}

/// `components/<component>/overlays/<environment>`, relative to the application root.
pub fn overlay_dir(component_name: &str, environment: &str) -> PathBuf {
    Path::new(COMPONENTS_DIR)
        .join(component_name)
        .join(OVERLAYS_DIR)
        .join(environment)
}

/// Writes manifests through a [`Filesystem`].
///
/// The configuration is held by the generator instead of process globals so
/// generators with different settings can run side by side.
#[derive(Clone, Copy)]
pub struct Generator<'a> {
    fs: &'a dyn Filesystem,
    config: &'a GeneratorConfig,
}

impl<'a> Generator<'a> {
    pub fn new(fs: &'a dyn Filesystem, config: &'a GeneratorConfig) -> Self {
        Self { fs, config }
    }

    pub fn fs(&self) -> &'a dyn Filesystem {
        self.fs
    }

    pub fn config(&self) -> &'a GeneratorConfig {
        self.config
    }

    /// The documents of the base directory of `component`, keyed by file name.
    pub fn base_manifests(&self, component: &Component) -> Result<Manifests> {
        component.validate()?;

        let mut files = Manifests::new();
        let mut kustomization = Kustomization::new();

        files.insert(DEPLOYMENT_FILE, &manifests::deployment(component, self.config))?;
        kustomization.add_resources([DEPLOYMENT_FILE]);

        if component.spec.target_port != 0 {
            files.insert(SERVICE_FILE, &manifests::service(component, self.config))?;
            files.insert(ROUTE_FILE, &manifests::route(component, self.config))?;
            kustomization.add_resources([SERVICE_FILE, ROUTE_FILE]);
        }

        files.insert(KUSTOMIZATION_FILE, &kustomization)?;
        Ok(files)
    }

    /// Writes the base directory of `component` into `output_folder`.
    pub fn generate_base(&self, output_folder: &Path, component: &Component) -> Result<()> {
        let files = self.base_manifests(component)?;
        yaml::write(self.fs, output_folder, &files)?;
        info!(
            component = component.component_name(),
            dir = %output_folder.display(),
            files = files.len(),
            "generated base"
        );
        Ok(())
    }

    /// Rebuilds `<app_root>/kustomization.yaml` from the component directories on disk.
    ///
    /// When `pvc` is given it is written next to the kustomization and listed
    /// as a resource. A PVC file written by an earlier run stays listed.
    pub fn generate_parent_kustomize(
        &self,
        app_root: &Path,
        pvc: Option<&PersistentVolumeClaim>,
    ) -> Result<()> {
        let app_root = self
            .fs
            .expand_home(app_root)
            .map_err(Error::fs("resolve", app_root))?;
        let components_dir = app_root.join(COMPONENTS_DIR);

        let entries = match self.fs.read_dir(&components_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => vec![],
            Err(err) => return Err(Error::fs("read directory", &components_dir)(err)),
        };

        let mut kustomization = Kustomization::new();
        kustomization.add_bases(
            entries
                .iter()
                .filter(|entry| entry.is_dir)
                .map(|entry| format!("{COMPONENTS_DIR}/{}", entry.name)),
        );

        let mut files = Manifests::new();
        if let Some(pvc) = pvc {
            files.insert(COMMON_STORAGE_PVC_FILE, pvc)?;
        }
        if pvc.is_some() || self.fs.exists(&app_root.join(COMMON_STORAGE_PVC_FILE)) {
            kustomization.add_resources([COMMON_STORAGE_PVC_FILE]);
        }
        files.insert(KUSTOMIZATION_FILE, &kustomization)?;

        yaml::write(self.fs, &app_root, &files)?;
        debug!(dir = %app_root.display(), bases = kustomization.bases().len(), "generated parent kustomization");
        Ok(())
    }
}

//! Environment overlays.
//!
//! An overlay references the base of its component and patches the
//! Deployment for one environment. Regenerating an overlay replaces the
//! patches the generator owns and keeps any patch a user added.

use std::{collections::BTreeMap, path::Path};

#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

use crate::{
    generate::Generator,
    kustomize::{Kustomization, KUSTOMIZATION_FILE},
    manifests,
    resources::{BindingComponent, Environment},
    yaml::{self, Manifests},
    Error, Result,
};

pub const DEPLOYMENT_PATCH_FILE: &str = "deployment-patch.yaml";

/// Path from an overlay to the base of its component.
pub const BASE_REFERENCE: &str = "../../base";

/// Patch file names the generator owns, per component.
///
/// Callers keep one of these across runs; entries are never duplicated.
pub type GeneratedResources = BTreeMap<String, Vec<String>>;

fn record_generated(generated: &mut GeneratedResources, component: &str, file: &str) {
    let owned = generated.entry(component.to_string()).or_default();
    if !owned.iter().any(|existing| existing == file) {
        owned.push(file.to_string());
    }
}

impl Generator<'_> {
    /// Writes the overlay of `binding` for `environment` into `output_folder`.
    ///
    /// An existing kustomization that cannot be parsed is an error; it is left
    /// untouched.
    pub fn generate_overlays(
        &self,
        output_folder: &Path,
        binding: &BindingComponent,
        environment: &Environment,
        image: &str,
        namespace: &str,
        generated: &mut GeneratedResources,
    ) -> Result<()> {
        let fs = self.fs();
        let output_folder = fs
            .expand_home(output_folder)
            .map_err(Error::fs("resolve", output_folder))?;
        let kustomization_path = output_folder.join(KUSTOMIZATION_FILE);

        let previous = Kustomization::read(fs, &kustomization_path)?;
        if previous.is_some() {
            fs.remove(&kustomization_path)
                .map_err(Error::fs("remove", &kustomization_path))?;
        }

        let patch = manifests::deployment_patch(binding, environment, image, namespace);

        let mut kustomization = Kustomization::new();
        kustomization.add_resources([BASE_REFERENCE]);
        kustomization.add_patches([DEPLOYMENT_PATCH_FILE]);
        record_generated(generated, &binding.name, DEPLOYMENT_PATCH_FILE);

        if let Some(previous) = previous {
            let owned = generated
                .get(&binding.name)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let preserved: Vec<&String> = previous
                .patches()
                .iter()
                .filter(|patch| !owned.contains(*patch))
                .collect();
            if !preserved.is_empty() {
                debug!(component = %binding.name, patches = ?preserved, "keeping user patches");
            }
            kustomization.add_patches(preserved.into_iter().cloned());
            kustomization.extra = previous.extra;
        }

        let mut files = Manifests::new();
        files.insert(DEPLOYMENT_PATCH_FILE, &patch)?;
        files.insert(KUSTOMIZATION_FILE, &kustomization)?;
        yaml::write(fs, &output_folder, &files)?;

        info!(
            component = %binding.name,
            dir = %output_folder.display(),
            "generated overlay"
        );
        Ok(())
    }
}

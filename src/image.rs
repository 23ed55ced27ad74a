//! Output image references of webhook builds and the protected registry policy.

use std::sync::OnceLock;

use regex::Regex;

use crate::{Error, Result};

/// Placeholder the TriggerTemplate replaces with the pushed revision.
pub const GIT_REVISION_PARAM: &str = "$(tt.params.git-revision)";

fn sha_suffix() -> &'static Regex {
    static SHA_SUFFIX: OnceLock<Regex> = OnceLock::new();
    SHA_SUFFIX.get_or_init(|| Regex::new(r"^(.+)-[0-9a-f]{40}$").expect("valid regex"))
}

/// Tags an output image with the revision of the webhook event.
///
/// A trailing commit SHA is dropped first, so an image built for an earlier
/// commit is re-tagged rather than extended. Already normalized references are
/// returned unchanged.
pub fn normalize_output_image(image: &str) -> String {
    let suffix = format!("-{GIT_REVISION_PARAM}");
    if image.ends_with(&suffix) {
        return image.to_string();
    }

    let image = match sha_suffix().captures(image) {
        Some(captures) => captures[1].to_string(),
        None => image.to_string(),
    };

    if image.contains(':') {
        format!("{image}{suffix}")
    } else {
        format!("{image}:latest{suffix}")
    }
}

/// Rejects images pushed to the shared repository without the namespace tag prefix.
pub fn check_protected_repo(image: &str, namespace: &str, default_repo: &str) -> Result<()> {
    if !image.starts_with(default_repo) {
        return Ok(());
    }
    let allowed_prefix = format!("{default_repo}:{namespace}-");
    if image.starts_with(&allowed_prefix) {
        Ok(())
    } else {
        Err(Error::ProtectedRepo {
            image: image.to_string(),
            repo: default_repo.to_string(),
            namespace: namespace.to_string(),
        })
    }
}

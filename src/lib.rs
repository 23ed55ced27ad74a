#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

use std::path::PathBuf;

use crate::{executor::ExecError, git::GitStep, scm::ScmError};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("component {0} is required")]
    MissingField(&'static str),

    #[error("component {field} is invalid: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    #[error("unable to parse URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(
        "invalid remote {0:?}: the remote must be of the form https://github.com/<org>/<repo> or https://gitlab.com/<org>/<repo>"
    )]
    InvalidRemote(String),

    #[error(
        "unable to determine the git provider of {url:?}: set the {annotation:?} annotation to one of {allowed}"
    )]
    UnknownGitProvider {
        url: String,
        annotation: &'static str,
        allowed: String,
    },

    #[error("unsupported value {value:?} in the {annotation:?} annotation: must be one of {allowed}")]
    UnsupportedGitProvider {
        value: String,
        annotation: &'static str,
        allowed: String,
    },

    #[error(
        "output image {image:?} is in the protected repository {repo:?}: its tag must start with {namespace:?} followed by a dash"
    )]
    ProtectedRepo {
        image: String,
        repo: String,
        namespace: String,
    },

    #[error("unable to {action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to encode {} as YAML: {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unable to encode the {0} template")]
    EncodeTemplate(&'static str, #[source] serde_json::Error),

    #[error("unable to parse kustomization {}: {source}", path.display())]
    ParseKustomization {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{step} failed in {}: {source}", dir.display())]
    Git {
        step: GitStep,
        dir: PathBuf,
        #[source]
        source: ExecError,
    },

    #[error("unable to create repository {namespace}/{name}: {source}")]
    CreateRepository {
        namespace: String,
        name: String,
        #[source]
        source: ScmError,
    },

    #[error("unable to look up the current user of the git provider: {0}")]
    CurrentUser(#[source] ScmError),

    #[error("repository {namespace}/{name} already exists")]
    RepoAlreadyExists { namespace: String, name: String },

    #[error("{0} is not configured")]
    ConfigMissing(&'static str),
}

/// Failure classes callers branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Filesystem,
    Executor,
    Scm,
    ConfigMissing,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingField(_)
            | Error::InvalidField { .. }
            | Error::InvalidUrl { .. }
            | Error::InvalidRemote(_)
            | Error::UnknownGitProvider { .. }
            | Error::UnsupportedGitProvider { .. }
            | Error::ProtectedRepo { .. } => ErrorKind::InvalidInput,
            Error::Filesystem { .. }
            | Error::Encode { .. }
            | Error::EncodeTemplate(..)
            | Error::ParseKustomization { .. } => ErrorKind::Filesystem,
            Error::Git { .. } => ErrorKind::Executor,
            Error::CreateRepository { .. }
            | Error::CurrentUser(_)
            | Error::RepoAlreadyExists { .. } => ErrorKind::Scm,
            Error::ConfigMissing(_) => ErrorKind::ConfigMissing,
        }
    }

    /// Returns a closure that wraps an I/O error with the failed action and path.
    pub(crate) fn fs(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::Filesystem {
            action,
            path,
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Configuration shared by all generators.
pub mod config;

/// Filesystem port and its implementations.
pub mod fs;

/// Command executor port and its implementations.
pub mod executor;

/// Resource type definitions.
pub mod resources;

/// Third-party custom resources the generator emits.
pub mod crds;

pub mod devfile;
pub mod generate;
pub mod git;
pub mod image;
pub mod kustomize;
pub mod manifests;
pub mod overlay;
pub mod pipeline;
pub mod scm;
pub mod scripting;
pub mod yaml;

pub use config::GeneratorConfig;
pub use generate::Generator;

//! Git hosting providers: URL parsing, remote validation and the REST client port.

use std::{borrow::Cow, fmt, str::FromStr};

use async_trait::async_trait;
use itertools::Itertools;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{resources::GIT_PROVIDER_ANNOTATION, Error, Result};

/// Hosts a GitOps repository may live on.
pub const ALLOWED_REMOTE_HOSTS: [&str; 2] = ["github.com", "gitlab.com"];

/// Description of repositories created by [`create_repository`].
pub const DEFAULT_REPO_DESCRIPTION: &str = "GitOps repository";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GitProvider {
    GitHub,
    GitLab,
    Bitbucket,
}

impl GitProvider {
    pub const ALL: [GitProvider; 3] = [GitProvider::GitHub, GitProvider::GitLab, GitProvider::Bitbucket];

    pub fn as_str(&self) -> &'static str {
        match self {
            GitProvider::GitHub => "github",
            GitProvider::GitLab => "gitlab",
            GitProvider::Bitbucket => "bitbucket",
        }
    }

    fn allowed() -> String {
        Self::ALL.iter().map(GitProvider::as_str).join(", ")
    }
}

impl fmt::Display for GitProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GitProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == s)
            .ok_or(())
    }
}

fn invalid_url(url: &str, reason: impl ToString) -> Error {
    Error::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Extracts the host of an `https://host/...` or `git@host:...` URL.
pub fn host_of(url: &str) -> Result<String> {
    if let Some(rest) = url.strip_prefix("git@") {
        return match rest.split_once(':') {
            Some((host, _)) if !host.is_empty() => Ok(host.to_string()),
            _ => Err(invalid_url(url, "expected git@<host>:<path>")),
        };
    }
    let parsed = Url::parse(url).map_err(|e| invalid_url(url, e))?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or_else(|| invalid_url(url, "missing host"))
}

/// Determines the provider hosting `url`.
///
/// The label left of the top-level domain names the provider (`github.com` is
/// `github`). Self-hosted instances have to name their provider through the
/// `git-provider` annotation, whose value is passed as `annotation`.
pub fn detect_provider(url: &str, annotation: Option<&str>) -> Result<GitProvider> {
    let host = host_of(url)?;
    let labels: Vec<&str> = host.split('.').collect();
    let tag = match labels.len() {
        0 | 1 => labels.first().copied().unwrap_or_default(),
        n => labels[n - 2],
    };
    if let Ok(provider) = tag.parse() {
        return Ok(provider);
    }

    match annotation {
        Some(value) => value.parse().map_err(|()| Error::UnsupportedGitProvider {
            value: value.to_string(),
            annotation: GIT_PROVIDER_ANNOTATION,
            allowed: GitProvider::allowed(),
        }),
        None => Err(Error::UnknownGitProvider {
            url: url.to_string(),
            annotation: GIT_PROVIDER_ANNOTATION,
            allowed: GitProvider::allowed(),
        }),
    }
}

/// Accepts only `https://github.com/...` and `https://gitlab.com/...` remotes.
pub fn validate_remote(remote: &str) -> Result<Url> {
    let invalid = || Error::InvalidRemote(redact(remote).into_owned());
    let parsed = Url::parse(remote).map_err(|_| invalid())?;
    if parsed.scheme() != "https" {
        return Err(invalid());
    }
    match parsed.host_str() {
        Some(host) if ALLOWED_REMOTE_HOSTS.contains(&host) => Ok(parsed),
        _ => Err(invalid()),
    }
}

/// Returns `remote` with `token` as user info, for cloning and pushing over https.
pub fn authenticated_remote(remote: &str, token: &str) -> Result<String> {
    let mut parsed = validate_remote(remote)?;
    if token.is_empty() {
        return Ok(parsed.to_string());
    }
    parsed
        .set_username(token)
        .map_err(|()| invalid_url(remote, "cannot carry credentials"))?;
    Ok(parsed.to_string())
}

/// `arg` without the credentials of a URL carrying user info.
///
/// Any other argument is returned as is.
pub fn redact(arg: &str) -> Cow<'_, str> {
    let Ok(mut url) = Url::parse(arg) else {
        return Cow::Borrowed(arg);
    };
    if url.username().is_empty() && url.password().is_none() {
        return Cow::Borrowed(arg);
    }
    match url.set_username("").and_then(|()| url.set_password(None)) {
        Ok(()) => Cow::Owned(url.to_string()),
        Err(()) => Cow::Borrowed("<redacted>"),
    }
}

/// Errors reported by an [`ScmClient`].
pub type ScmError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScmUser {
    pub login: String,
}

/// Account a new repository is created under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RepositoryOwner {
    /// The authenticated user.
    User,
    Organization(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryInput {
    pub owner: RepositoryOwner,
    pub name: String,
    pub private: bool,
    pub description: String,
}

/// REST client of a git hosting provider.
#[async_trait]
pub trait ScmClient: Send + Sync {
    async fn current_user(&self) -> Result<ScmUser, ScmError>;

    async fn create_repository(&self, input: &RepositoryInput) -> Result<(), ScmError>;

    /// Whether `namespace/name` exists.
    async fn find_repository(&self, namespace: &str, name: &str) -> Result<bool, ScmError>;
}

/// Records repository creation requests instead of sending them.
///
/// The authenticated user is `login`, and no repository exists beforehand.
#[derive(Debug, Default)]
pub struct RecordingScm {
    login: String,
    requests: std::sync::Mutex<Vec<RepositoryInput>>,
}

impl RecordingScm {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            requests: Default::default(),
        }
    }

    pub fn requests(&self) -> Vec<RepositoryInput> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ScmClient for RecordingScm {
    async fn current_user(&self) -> Result<ScmUser, ScmError> {
        Ok(ScmUser {
            login: self.login.clone(),
        })
    }

    async fn create_repository(&self, input: &RepositoryInput) -> Result<(), ScmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(input.clone());
        Ok(())
    }

    async fn find_repository(&self, _namespace: &str, _name: &str) -> Result<bool, ScmError> {
        Ok(false)
    }
}

/// Creates the private repository `namespace/name`.
///
/// The repository is created under the user account when `namespace` is the
/// login of the authenticated user.
pub async fn create_repository(client: &dyn ScmClient, namespace: &str, name: &str) -> Result<()> {
    let user = client.current_user().await.map_err(Error::CurrentUser)?;
    let owner = if user.login == namespace {
        RepositoryOwner::User
    } else {
        RepositoryOwner::Organization(namespace.to_string())
    };
    let input = RepositoryInput {
        owner,
        name: name.to_string(),
        private: true,
        description: DEFAULT_REPO_DESCRIPTION.to_string(),
    };
    info!(namespace, name, owner = ?input.owner, "creating repository");

    let Err(source) = client.create_repository(&input).await else {
        return Ok(());
    };
    if let Ok(true) = client.find_repository(namespace, name).await {
        return Err(Error::RepoAlreadyExists {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }
    Err(Error::CreateRepository {
        namespace: namespace.to_string(),
        name: name.to_string(),
        source,
    })
}

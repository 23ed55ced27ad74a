//! Git repository lifecycle.
//!
//! The driver clones the GitOps repository of an application, regenerates
//! part of the tree and pushes the result. Every git and rm invocation goes
//! through an [`Executor`], every file through the generator's filesystem.
//! Nothing is committed when regeneration leaves the tree unchanged.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use kube::ResourceExt;
#[allow(unused_imports)]
use tracing::{debug, error, info, warn};

use crate::{
    executor::Executor,
    generate::{self, Generator, TEKTON_DIR},
    overlay::GeneratedResources,
    pipeline::BuildInputs,
    resources::{BindingComponent, Component, Environment},
    scm::{self, ScmClient},
    Error, Result,
};

/// A git or rm invocation of the driver, used to attribute failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GitStep {
    Clone,
    Switch,
    CheckoutBranch,
    Remove,
    Add,
    Diff,
    Commit,
    Push,
    Init,
    RenameBranch,
    AddRemote,
}

impl fmt::Display for GitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            GitStep::Clone => "git clone",
            GitStep::Switch => "git switch",
            GitStep::CheckoutBranch => "git checkout -b",
            GitStep::Remove => "rm",
            GitStep::Add => "git add",
            GitStep::Diff => "git diff",
            GitStep::Commit => "git commit",
            GitStep::Push => "git push",
            GitStep::Init => "git init",
            GitStep::RenameBranch => "git branch -m",
            GitStep::AddRemote => "git remote add",
        };
        f.write_str(step)
    }
}

pub const INITIAL_COMMIT_MESSAGE: &str = "Generate GitOps resources";

pub fn base_commit_message(component: &str) -> String {
    format!("Generate GitOps base resources for component {component}")
}

pub fn overlays_commit_message(environment: &str, component: &str) -> String {
    format!("Generate {environment} environment overlays for component {component}")
}

pub fn remove_commit_message(component: &str) -> String {
    format!("Removed component {component}")
}

/// The GitOps repository of an application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitOpsRepo {
    /// Remote URL, possibly carrying an access token.
    pub url: String,
    pub branch: String,
    /// Folder of the application inside the repository.
    pub context: PathBuf,
}

impl GitOpsRepo {
    pub fn new(url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.into(),
            context: PathBuf::from("."),
        }
    }

    pub fn with_context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = context.into();
        self
    }

    /// The application root inside a clone at `repo_path`.
    fn app_root(&self, repo_path: &Path) -> PathBuf {
        if self.at_root() {
            repo_path.to_path_buf()
        } else {
            repo_path.join(&self.context)
        }
    }

    /// `path` relative to the repository root.
    fn path_in_context(&self, path: &Path) -> PathBuf {
        if self.at_root() {
            path.to_path_buf()
        } else {
            self.context.join(path)
        }
    }

    fn at_root(&self) -> bool {
        self.context.as_os_str().is_empty() || self.context == Path::new(".")
    }
}

/// What a push operation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// Regeneration produced no change; nothing was committed.
    Unchanged,
}

/// The environment overlay pushed by [`GitDriver::generate_overlays_and_push`].
#[derive(Clone, Copy, Debug)]
pub struct OverlayTarget<'b> {
    pub binding: &'b BindingComponent,
    pub environment: &'b Environment,
    pub image: &'b str,
    pub namespace: &'b str,
}

pub struct GitDriver<'a> {
    executor: &'a dyn Executor,
    generator: Generator<'a>,
}

impl<'a> GitDriver<'a> {
    pub fn new(executor: &'a dyn Executor, generator: Generator<'a>) -> Self {
        Self {
            executor,
            generator,
        }
    }

    async fn run(&self, step: GitStep, dir: &Path, command: &str, args: &[&str]) -> Result<Vec<u8>> {
        debug!(%step, dir = %dir.display(), "running");
        self.executor
            .execute(dir, command, args)
            .await
            .map_err(|source| Error::Git {
                step,
                dir: dir.to_path_buf(),
                source,
            })
    }

    async fn git(&self, step: GitStep, dir: &Path, args: &[&str]) -> Result<Vec<u8>> {
        self.run(step, dir, "git", args).await
    }

    /// Clones `repo` into `<output>/<name>` and selects its branch.
    async fn checkout(&self, output: &Path, repo: &GitOpsRepo, name: &str) -> Result<PathBuf> {
        scm::validate_remote(&repo.url)?;
        self.generator
            .fs()
            .mkdir_all(output)
            .map_err(Error::fs("create directory", output))?;

        self.git(GitStep::Clone, output, &["clone", &repo.url, name])
            .await?;
        let repo_path = output.join(name);

        if let Err(err) = self.git(GitStep::Switch, &repo_path, &["switch", &repo.branch]).await {
            debug!(%err, branch = %repo.branch, "branch does not exist, creating it");
            self.git(
                GitStep::CheckoutBranch,
                &repo_path,
                &["checkout", "-b", &repo.branch],
            )
            .await?;
        }
        Ok(repo_path)
    }

    async fn remove(&self, repo_path: &Path, target: &Path) -> Result<()> {
        let target = target.to_string_lossy();
        self.run(GitStep::Remove, repo_path, "rm", &["-rf", &target])
            .await?;
        Ok(())
    }

    /// Stages everything and, if anything changed, commits and pushes.
    async fn commit_and_push(
        &self,
        repo_path: &Path,
        branch: &str,
        message: &str,
    ) -> Result<PushOutcome> {
        self.git(GitStep::Add, repo_path, &["add", "."]).await?;
        let diff = self
            .git(GitStep::Diff, repo_path, &["--no-pager", "diff", "--cached"])
            .await?;
        if diff.iter().all(u8::is_ascii_whitespace) {
            info!(dir = %repo_path.display(), "no changes to commit");
            return Ok(PushOutcome::Unchanged);
        }

        self.git(GitStep::Commit, repo_path, &["commit", "-m", message])
            .await?;
        self.git(GitStep::Push, repo_path, &["push", "origin", branch])
            .await?;
        info!(dir = %repo_path.display(), branch, message, "pushed");
        Ok(PushOutcome::Pushed)
    }

    fn regenerate(
        &self,
        app_root: &Path,
        component: &Component,
        build: Option<&BuildInputs>,
    ) -> Result<()> {
        let base = app_root.join(generate::base_dir(component.component_name()));
        self.generator.generate_base(&base, component)?;
        if let Some(inputs) = build {
            self.generator
                .generate_build(&base.join(TEKTON_DIR), component, inputs)?;
        }
        self.generator.generate_parent_kustomize(app_root, None)
    }

    /// Regenerates the base of `component` in an existing repository and pushes it.
    ///
    /// The build resources are regenerated too when `build` is given.
    pub async fn generate_and_push(
        &self,
        output: &Path,
        repo: &GitOpsRepo,
        component: &Component,
        build: Option<&BuildInputs>,
    ) -> Result<PushOutcome> {
        component.validate()?;
        let name = component.component_name();
        info!(component = name, branch = %repo.branch, "generating base resources");

        let repo_path = self.checkout(output, repo, name).await?;
        self.remove(&repo_path, &repo.path_in_context(&generate::base_dir(name)))
            .await?;
        self.regenerate(&repo.app_root(&repo_path), component, build)?;

        self.commit_and_push(&repo_path, &repo.branch, &base_commit_message(name))
            .await
    }

    /// Deletes `component` from the repository and pushes the result.
    pub async fn remove_component(
        &self,
        output: &Path,
        repo: &GitOpsRepo,
        component_name: &str,
    ) -> Result<PushOutcome> {
        if component_name.is_empty() {
            return Err(Error::MissingField("name"));
        }
        info!(component = component_name, branch = %repo.branch, "removing component");

        let repo_path = self.checkout(output, repo, component_name).await?;
        let component_dir = Path::new(generate::COMPONENTS_DIR).join(component_name);
        self.remove(&repo_path, &repo.path_in_context(&component_dir))
            .await?;
        self.generator
            .generate_parent_kustomize(&repo.app_root(&repo_path), None)?;

        self.commit_and_push(
            &repo_path,
            &repo.branch,
            &remove_commit_message(component_name),
        )
        .await
    }

    /// Regenerates one environment overlay of a component and pushes it.
    pub async fn generate_overlays_and_push(
        &self,
        output: &Path,
        repo: &GitOpsRepo,
        target: &OverlayTarget<'_>,
        generated: &mut GeneratedResources,
    ) -> Result<PushOutcome> {
        let name = target.binding.name.as_str();
        if name.is_empty() {
            return Err(Error::MissingField("name"));
        }
        let environment = target.environment.name_any();
        info!(component = name, %environment, "generating overlays");

        let repo_path = self.checkout(output, repo, name).await?;
        let overlay = repo
            .app_root(&repo_path)
            .join(generate::overlay_dir(name, &environment));
        self.generator.generate_overlays(
            &overlay,
            target.binding,
            target.environment,
            target.image,
            target.namespace,
            generated,
        )?;

        self.commit_and_push(
            &repo_path,
            &repo.branch,
            &overlays_commit_message(&environment, name),
        )
        .await
    }

    /// Creates the remote repository, generates the first resources of `component`
    /// in a new local repository and pushes them.
    pub async fn init_and_push(
        &self,
        output: &Path,
        repo: &GitOpsRepo,
        component: &Component,
        scm: &dyn ScmClient,
        build: Option<&BuildInputs>,
    ) -> Result<()> {
        if repo.url.is_empty() {
            return Err(Error::ConfigMissing("GitOps repository URL"));
        }
        component.validate()?;
        let remote = scm::validate_remote(&repo.url)?;
        let mut segments = remote.path_segments().into_iter().flatten();
        let (Some(namespace), Some(repo_name)) = (segments.next(), segments.next()) else {
            return Err(Error::InvalidRemote(scm::redact(&repo.url).into_owned()));
        };
        let repo_name = repo_name.strip_suffix(".git").unwrap_or(repo_name);
        if namespace.is_empty() || repo_name.is_empty() {
            return Err(Error::InvalidRemote(scm::redact(&repo.url).into_owned()));
        }

        scm::create_repository(scm, namespace, repo_name).await?;

        let name = component.component_name();
        let repo_path = output.join(name);
        self.regenerate(&repo.app_root(&repo_path), component, build)?;

        self.git(GitStep::Init, &repo_path, &["init"]).await?;
        self.git(GitStep::Add, &repo_path, &["add", "."]).await?;
        self.git(
            GitStep::Commit,
            &repo_path,
            &["commit", "-m", INITIAL_COMMIT_MESSAGE],
        )
        .await?;
        self.git(
            GitStep::RenameBranch,
            &repo_path,
            &["branch", "-m", &repo.branch],
        )
        .await?;
        self.git(
            GitStep::AddRemote,
            &repo_path,
            &["remote", "add", "origin", &repo.url],
        )
        .await?;
        self.git(
            GitStep::Push,
            &repo_path,
            &["push", "-u", "origin", &repo.branch],
        )
        .await?;

        info!(component = name, namespace, repository = repo_name, "initialized GitOps repository");
        Ok(())
    }
}

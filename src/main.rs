#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use kube::ResourceExt;
use serde::de::DeserializeOwned;

use gitops_generator::{
    executor::{CommandExecutor, RecordingExecutor},
    fs::{MemoryFilesystem, OsFilesystem},
    git::{GitDriver, GitOpsRepo, PushOutcome},
    manifests,
    overlay::GeneratedResources,
    pipeline::BuildInputs,
    resources::{ApplicationSnapshotEnvironmentBinding, Component, Environment},
    scm::{self, RecordingScm},
    Generator, GeneratorConfig,
};

#[derive(Clone, Parser)]
#[clap(version)]
struct Cli {
    /// The tracing filter used for logs
    #[clap(long, env = "GITOPS_LOG", default_value = "gitops_generator=info,warn")]
    log_level: kubert::LogFilter,

    /// The logging format
    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    config: GeneratorConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Subcommand)]
enum Commands {
    /// Writes the base resources of a component
    Base {
        /// Component manifest
        #[clap(long)]
        component: PathBuf,

        /// Folder receiving deployment.yaml and friends
        #[clap(long)]
        output: PathBuf,
    },

    /// Writes the overlay of a component for one environment
    Overlay {
        /// ApplicationSnapshotEnvironmentBinding manifest
        #[clap(long)]
        binding: PathBuf,

        /// Environment manifest
        #[clap(long)]
        environment: PathBuf,

        /// Name of the component in the binding
        #[clap(long)]
        component_name: String,

        #[clap(long)]
        image: String,

        /// Defaults to the namespace of the binding
        #[clap(long)]
        namespace: Option<String>,

        #[clap(long)]
        output: PathBuf,
    },

    /// Writes the build resources of a component
    Build {
        #[clap(long)]
        component: PathBuf,

        #[clap(long)]
        output: PathBuf,

        #[clap(flatten)]
        build: BuildArgs,
    },

    /// Writes the kustomization of an application root
    Parent {
        #[clap(long)]
        app_root: PathBuf,

        /// Also writes the shared build storage claim into this namespace
        #[clap(long)]
        pvc_namespace: Option<String>,
    },

    /// Regenerates a component in its GitOps repository and pushes it
    Push {
        #[clap(long)]
        component: PathBuf,

        #[clap(flatten)]
        repo: RepoArgs,

        /// Also regenerates the build resources
        #[clap(long)]
        with_build: bool,

        #[clap(flatten)]
        build: BuildArgs,
    },

    /// Removes a component from its GitOps repository
    Remove {
        #[clap(long)]
        component_name: String,

        #[clap(flatten)]
        repo: RepoArgs,
    },

    /// Prints the commands creating the GitOps repository of a component
    Init {
        #[clap(long)]
        component: PathBuf,

        #[clap(flatten)]
        repo: RepoArgs,

        /// Login of the account the repository is created with
        #[clap(long, default_value = "")]
        login: String,
    },
}

#[derive(Args, Clone, Debug)]
struct RepoArgs {
    /// GitOps repository URL
    #[clap(long, env = "GITOPS_REPO_URL")]
    remote: String,

    #[clap(long, default_value = "main")]
    branch: String,

    /// Folder of the application inside the repository
    #[clap(long, default_value = ".")]
    context: PathBuf,

    /// Access token used to clone and push
    #[clap(long, env = "GITOPS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Where repositories are cloned; a temporary directory by default
    #[clap(long)]
    workdir: Option<PathBuf>,

    /// Deadline of every git command, in seconds
    #[clap(long)]
    timeout: Option<u64>,

    /// Prints the git commands instead of running them
    #[clap(long)]
    dry_run: bool,
}

impl RepoArgs {
    fn repo(&self) -> anyhow::Result<GitOpsRepo> {
        let url = match &self.token {
            Some(token) => scm::authenticated_remote(&self.remote, token)?,
            None => self.remote.clone(),
        };
        Ok(GitOpsRepo::new(url, &self.branch).with_context(&self.context))
    }

    fn executor(&self) -> CommandExecutor {
        match self.timeout {
            Some(secs) => CommandExecutor::with_timeout(Duration::from_secs(secs)),
            None => CommandExecutor::new(),
        }
    }
}

#[derive(Args, Clone, Debug, Default)]
struct BuildArgs {
    /// A key of the Pipelines as Code secret, as KEY=VALUE
    #[clap(long = "pac-config", value_parser = parse_key_value)]
    pac_config: Vec<(String, String)>,

    /// The registry pull secret exists in the component namespace
    #[clap(long)]
    registry_secret: bool,
}

impl BuildArgs {
    fn inputs(&self) -> BuildInputs {
        BuildInputs {
            pac_config: self.pac_config.iter().cloned().collect::<BTreeMap<_, _>>(),
            has_registry_secret: self.registry_secret,
        }
    }
}

fn parse_key_value(s: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got {s:?}"))?;
    Ok((key.to_string(), value.to_string()))
}

fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
}

/// A driver operation of the `push` and `remove` commands.
enum Operation {
    Push {
        component: Box<Component>,
        build: Option<BuildInputs>,
    },
    Remove {
        component_name: String,
    },
}

impl Operation {
    async fn run(
        &self,
        driver: &GitDriver<'_>,
        workdir: &Path,
        repo: &GitOpsRepo,
    ) -> gitops_generator::Result<PushOutcome> {
        match self {
            Operation::Push { component, build } => {
                driver
                    .generate_and_push(workdir, repo, component, build.as_ref())
                    .await
            }
            Operation::Remove { component_name } => {
                driver.remove_component(workdir, repo, component_name).await
            }
        }
    }
}

/// Runs `op` against the real tree, or in memory when `--dry-run` is set.
async fn run_driver(args: &RepoArgs, config: &GeneratorConfig, op: Operation) -> anyhow::Result<()> {
    let repo = args.repo()?;

    if args.dry_run {
        let fs = MemoryFilesystem::new();
        let executor = RecordingExecutor::new().respond("git --no-pager diff", "(dry run)");
        let driver = GitDriver::new(&executor, Generator::new(&fs, config));
        op.run(&driver, Path::new("/workdir"), &repo).await?;
        print!("{}", executor.script());
        return Ok(());
    }

    let tempdir;
    let workdir = match &args.workdir {
        Some(workdir) => workdir.as_path(),
        None => {
            tempdir = tempfile::tempdir()?;
            tempdir.path()
        }
    };
    let executor = args.executor();
    let driver = GitDriver::new(&executor, Generator::new(&OsFilesystem, config));
    match op.run(&driver, workdir, &repo).await? {
        PushOutcome::Pushed => println!("pushed to {}", args.branch),
        PushOutcome::Unchanged => println!("nothing to push"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli {
        log_level,
        log_format,
        config,
        command,
    } = Cli::parse();

    log_format.try_init(log_level)?;

    let fs = OsFilesystem;
    let generator = Generator::new(&fs, &config);

    match command {
        Commands::Base { component, output } => {
            let component: Component = load(&component)?;
            generator.generate_base(&output, &component)?;
        }
        Commands::Overlay {
            binding,
            environment,
            component_name,
            image,
            namespace,
            output,
        } => {
            let binding: ApplicationSnapshotEnvironmentBinding = load(&binding)?;
            let environment: Environment = load(&environment)?;
            let namespace = namespace.unwrap_or_else(|| binding.namespace().unwrap_or_default());
            let Some(target) = binding
                .spec
                .components
                .iter()
                .find(|c| c.name == component_name)
            else {
                bail!("component {component_name:?} is not part of the binding");
            };
            generator.generate_overlays(
                &output,
                target,
                &environment,
                &image,
                &namespace,
                &mut GeneratedResources::new(),
            )?;
        }
        Commands::Build {
            component,
            output,
            build,
        } => {
            let component: Component = load(&component)?;
            generator.generate_build(&output, &component, &build.inputs())?;
        }
        Commands::Parent {
            app_root,
            pvc_namespace,
        } => {
            let pvc = pvc_namespace.as_deref().map(manifests::common_storage_pvc);
            generator.generate_parent_kustomize(&app_root, pvc.as_ref())?;
        }
        Commands::Push {
            component,
            repo,
            with_build,
            build,
        } => {
            let op = Operation::Push {
                component: Box::new(load(&component)?),
                build: with_build.then(|| build.inputs()),
            };
            run_driver(&repo, &config, op).await?;
        }
        Commands::Remove {
            component_name,
            repo,
        } => {
            run_driver(&repo, &config, Operation::Remove { component_name }).await?;
        }
        Commands::Init {
            component,
            repo,
            login,
        } => {
            let component: Component = load(&component)?;
            let gitops = repo.repo()?;
            let fs = MemoryFilesystem::new();
            let executor = RecordingExecutor::new();
            let scm = RecordingScm::new(login);
            GitDriver::new(&executor, Generator::new(&fs, &config))
                .init_and_push(Path::new("/workdir"), &gitops, &component, &scm, None)
                .await?;
            for request in scm.requests() {
                println!("# create repository {:?} owned by {:?}", request.name, request.owner);
            }
            print!("{}", executor.script());
            for path in fs.files() {
                println!("# generated {}", path.display());
            }
        }
    }

    Ok(())
}

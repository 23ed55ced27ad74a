use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use assert_matches::assert_matches;
use gitops_generator::{
    config::DEFAULT_IMAGE_REPO,
    crds::{Repository, Route, TriggerTemplate},
    fs::{Filesystem, MemoryFilesystem},
    kustomize::Kustomization,
    manifests::selector_labels,
    overlay::GeneratedResources,
    pipeline::{self, BuildInputs},
    resources::{
        ApplicationSnapshotEnvironmentBinding, Component, ComponentSource, ComponentSpec,
        Environment, GitSource,
    },
    scm, Error, ErrorKind, Generator, GeneratorConfig,
};
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{ResourceRequirements, Service},
    },
    apimachinery::pkg::{api::resource::Quantity, util::intstr::IntOrString},
};
use kube::core::ObjectMeta;
use proptest::prelude::*;

const BASE: &str = "/gitops/components/test-component/base";
const TEKTON: &str = "/gitops/components/test-component/base/.tekton";
const OVERLAY: &str = "/gitops/components/test-component/overlays/staging";

fn component(spec: ComponentSpec) -> Component {
    let mut component = Component::new("", spec);
    component.metadata = ObjectMeta {
        name: Some("test-component".into()),
        namespace: Some("test-namespace".into()),
        ..Default::default()
    };
    component
}

fn minimal_spec() -> ComponentSpec {
    ComponentSpec {
        component_name: "test-component".into(),
        application: "test-application".into(),
        ..Default::default()
    }
}

fn with_git(mut spec: ComponentSpec, url: &str) -> ComponentSpec {
    spec.source = ComponentSource {
        git: Some(GitSource {
            url: url.into(),
            ..Default::default()
        }),
    };
    spec
}

fn read<T: serde::de::DeserializeOwned>(fs: &MemoryFilesystem, path: &str) -> T {
    serde_yaml::from_slice(&fs.read(Path::new(path)).unwrap()).unwrap()
}

fn files_under(fs: &MemoryFilesystem, dir: &str) -> Vec<String> {
    fs.files()
        .into_iter()
        .filter_map(|path| {
            path.strip_prefix(dir)
                .ok()
                .map(|rest| rest.to_string_lossy().into_owned())
        })
        .collect()
}

#[test]
fn minimal_base() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig::default();
    Generator::new(&fs, &config)
        .generate_base(Path::new(BASE), &component(minimal_spec()))
        .unwrap();

    assert_eq!(
        files_under(&fs, BASE),
        ["deployment.yaml", "kustomization.yaml"]
    );

    let deployment: Deployment = read(&fs, &format!("{BASE}/deployment.yaml"));
    let labels = deployment.metadata.labels.unwrap();
    assert_eq!(labels.len(), 5);
    assert_eq!(labels["app.kubernetes.io/name"], "test-component");
    assert_eq!(labels["app.kubernetes.io/instance"], "test-component");
    assert_eq!(labels["app.kubernetes.io/part-of"], "test-application");
    assert_eq!(labels["app.kubernetes.io/managed-by"], "kustomize");
    assert_eq!(labels["app.kubernetes.io/created-by"], "application-service");

    let spec = deployment.spec.unwrap();
    assert_eq!(spec.replicas, Some(1));
    let container = &spec.template.spec.unwrap().containers[0];
    assert_eq!(container.name, "container-image");
    assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));
    assert_eq!(container.ports, None);
    assert_eq!(container.readiness_probe, None);
    assert_eq!(container.liveness_probe, None);

    let kustomization: Kustomization = read(&fs, &format!("{BASE}/kustomization.yaml"));
    assert_eq!(kustomization.resources(), ["deployment.yaml"]);
    assert_eq!(kustomization.api_version, "kustomize.config.k8s.io/v1beta1");
}

#[test]
fn full_base() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig::default();
    let resources = ResourceRequirements {
        limits: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("2M".into())),
            ("memory".to_string(), Quantity("1Gi".into())),
        ])),
        requests: Some(BTreeMap::from([
            ("cpu".to_string(), Quantity("1M".into())),
            ("memory".to_string(), Quantity("256Mi".into())),
        ])),
        ..Default::default()
    };
    let spec = ComponentSpec {
        target_port: 5000,
        route: "example.com".into(),
        replicas: Some(3),
        container_image: "quay.io/test/test-image:latest".into(),
        env: vec![k8s_openapi::api::core::v1::EnvVar {
            name: "test".into(),
            value: Some("value".into()),
            ..Default::default()
        }],
        resources: Some(resources.clone()),
        ..minimal_spec()
    };
    Generator::new(&fs, &config)
        .generate_base(Path::new(BASE), &component(spec))
        .unwrap();

    assert_eq!(
        files_under(&fs, BASE),
        [
            "deployment.yaml",
            "kustomization.yaml",
            "route.yaml",
            "service.yaml"
        ]
    );

    let deployment: Deployment = read(&fs, &format!("{BASE}/deployment.yaml"));
    let spec = deployment.spec.unwrap();
    assert_eq!(spec.replicas, Some(3));
    let container = &spec.template.spec.unwrap().containers[0];
    assert_eq!(container.resources.as_ref(), Some(&resources));
    assert_eq!(container.env.as_ref().unwrap()[0].name, "test");
    let readiness = container.readiness_probe.as_ref().unwrap();
    assert_eq!(
        readiness.tcp_socket.as_ref().unwrap().port,
        IntOrString::Int(5000)
    );
    assert_eq!(readiness.initial_delay_seconds, Some(10));
    assert_eq!(readiness.period_seconds, Some(10));
    let liveness = container.liveness_probe.as_ref().unwrap();
    assert_eq!(liveness.http_get.as_ref().unwrap().path.as_deref(), Some("/"));

    let service: Service = read(&fs, &format!("{BASE}/service.yaml"));
    let port = &service.spec.unwrap().ports.unwrap()[0];
    assert_eq!(port.port, 5000);
    assert_eq!(port.target_port, Some(IntOrString::Int(5000)));

    let route: Route = read(&fs, &format!("{BASE}/route.yaml"));
    assert_eq!(route.spec.host.as_deref(), Some("example.com"));
    let tls = route.spec.tls.unwrap();
    assert_eq!(tls.termination, "edge");
    assert_eq!(tls.insecure_edge_termination_policy.as_deref(), Some("Redirect"));
    assert_eq!(route.spec.to.kind, "Service");
    assert_eq!(route.spec.to.weight, Some(100));

    let kustomization: Kustomization = read(&fs, &format!("{BASE}/kustomization.yaml"));
    assert_eq!(
        kustomization.resources(),
        ["deployment.yaml", "route.yaml", "service.yaml"]
    );
}

fn pac_component() -> Component {
    let mut component = component(with_git(minimal_spec(), "https://github.com/user/repo.git"));
    component
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert("pipelinesascode".into(), "1".into());
    component
}

#[test]
fn pac_with_webhook() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig {
        pac_secret_name: "pac-secret".into(),
        ..Default::default()
    };
    let inputs = BuildInputs {
        pac_config: BTreeMap::from([("github.token".into(), "token".into())]),
        has_registry_secret: false,
    };
    Generator::new(&fs, &config)
        .generate_build(Path::new(TEKTON), &pac_component(), &inputs)
        .unwrap();

    assert_eq!(
        files_under(&fs, TEKTON),
        ["kustomization.yaml", "pac-repository.yaml"]
    );
    let kustomization: Kustomization = read(&fs, &format!("{TEKTON}/kustomization.yaml"));
    assert_eq!(kustomization.resources(), ["pac-repository.yaml"]);

    let repository: Repository = read(&fs, &format!("{TEKTON}/pac-repository.yaml"));
    assert_eq!(repository.metadata.name.as_deref(), Some("test-component"));
    assert_eq!(repository.spec.url, "https://github.com/user/repo");
    let provider = repository.spec.git_provider.unwrap();
    assert_eq!(provider.url, None);
    let secret = provider.secret.unwrap();
    assert_eq!((secret.name.as_str(), secret.key.as_str()), ("pac-secret", "github.token"));
    assert_eq!(provider.webhook_secret.unwrap().key, "https___github.com_user_repo");
}

#[test]
fn pac_with_github_app() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig::default();
    let inputs = BuildInputs {
        pac_config: BTreeMap::from([
            ("github-application-id".into(), "12345".into()),
            ("github-private-key".into(), "key".into()),
        ]),
        has_registry_secret: false,
    };
    Generator::new(&fs, &config)
        .generate_build(Path::new(TEKTON), &pac_component(), &inputs)
        .unwrap();

    let raw = String::from_utf8(fs.read(&Path::new(TEKTON).join("pac-repository.yaml")).unwrap())
        .unwrap();
    assert!(!raw.contains("git_provider"));
    let repository: Repository = read(&fs, &format!("{TEKTON}/pac-repository.yaml"));
    assert_eq!(repository.spec.git_provider, None);
}

#[test]
fn hacbs_mode_selects_pac() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig {
        hacbs: true,
        ..Default::default()
    };
    let c = component(with_git(minimal_spec(), "https://gitlab.com/group/repo"));
    Generator::new(&fs, &config)
        .generate_build(Path::new(TEKTON), &c, &BuildInputs::default())
        .unwrap();
    assert!(fs.exists(&Path::new(TEKTON).join("pac-repository.yaml")));
}

#[test]
fn webhook_triad() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig::default();
    let spec = ComponentSpec {
        container_image: "quay.io/foo/bar:tag".into(),
        ..with_git(minimal_spec(), "https://github.com/user/repo")
    };
    Generator::new(&fs, &config)
        .generate_build(Path::new(TEKTON), &component(spec), &BuildInputs::default())
        .unwrap();

    assert_eq!(
        files_under(&fs, TEKTON),
        [
            "build-webhook-route.yaml",
            "event-listener.yaml",
            "kustomization.yaml",
            "trigger-template.yaml"
        ]
    );

    let template: TriggerTemplate = read(&fs, &format!("{TEKTON}/trigger-template.yaml"));
    let run = &template.spec.resource_templates[0].0;
    assert_eq!(run["spec"]["pipelineRef"]["name"], "noop");
    let params = run["spec"]["params"].as_array().unwrap();
    assert_eq!(params.len(), 2);
    assert_eq!(params[0]["name"], "git-url");
    assert_eq!(params[0]["value"], "https://github.com/user/repo");
    assert_eq!(params[1]["name"], "output-image");
    assert_eq!(params[1]["value"], "quay.io/foo/bar:tag-$(tt.params.git-revision)");

    let route: Route = read(&fs, &format!("{TEKTON}/build-webhook-route.yaml"));
    assert_eq!(route.metadata.name.as_deref(), Some("eltest-component"));
    assert_eq!(route.spec.port.unwrap().target_port, IntOrString::Int(8080));
}

#[test]
fn webhook_build_rejects_protected_image() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig::default();
    let spec = ComponentSpec {
        container_image: format!("{DEFAULT_IMAGE_REPO}:mytag"),
        ..with_git(minimal_spec(), "https://github.com/user/repo")
    };
    let err = Generator::new(&fs, &config)
        .generate_build(Path::new(TEKTON), &component(spec), &BuildInputs::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(fs.files().is_empty());
}

fn staging() -> (ApplicationSnapshotEnvironmentBinding, Environment) {
    let binding = serde_yaml::from_str(include_str!("fixtures/binding.yaml")).unwrap();
    let environment = serde_yaml::from_str(include_str!("fixtures/environment.yaml")).unwrap();
    (binding, environment)
}

fn generate_overlay(fs: &MemoryFilesystem, generated: &mut GeneratedResources) {
    let config = GeneratorConfig::default();
    let (binding, environment) = staging();
    Generator::new(fs, &config)
        .generate_overlays(
            Path::new(OVERLAY),
            &binding.spec.components[0],
            &environment,
            "quay.io/test/test-image:v2",
            "test-namespace",
            generated,
        )
        .unwrap();
}

fn seed_overlay(fs: &MemoryFilesystem, patches: &[&str]) {
    let mut kustomization = Kustomization::new();
    kustomization.add_resources(["../../base"]);
    kustomization.add_patches(patches.iter().copied());
    fs.mkdir_all(Path::new(OVERLAY)).unwrap();
    fs.write(
        &Path::new(OVERLAY).join("kustomization.yaml"),
        serde_yaml::to_string(&kustomization).unwrap().as_bytes(),
    )
    .unwrap();
}

#[test]
fn overlay_regeneration_preserves_custom_patch() {
    let fs = MemoryFilesystem::new();
    seed_overlay(&fs, &["deployment-patch.yaml", "custom-patch.yaml"]);
    let mut generated =
        GeneratedResources::from([("test-component".into(), vec!["deployment-patch.yaml".into()])]);

    generate_overlay(&fs, &mut generated);

    let kustomization: Kustomization = read(&fs, &format!("{OVERLAY}/kustomization.yaml"));
    assert_eq!(
        kustomization.patches(),
        ["custom-patch.yaml", "deployment-patch.yaml"]
    );
    assert_eq!(kustomization.resources(), ["../../base"]);
    assert_eq!(generated["test-component"], ["deployment-patch.yaml"]);

    let patch: Deployment = read(&fs, &format!("{OVERLAY}/deployment-patch.yaml"));
    let spec = patch.spec.unwrap();
    assert_eq!(spec.replicas, Some(4));
    let container = &spec.template.spec.unwrap().containers[0];
    assert_eq!(container.image.as_deref(), Some("quay.io/test/test-image:v2"));
    let env = container.env.as_ref().unwrap();
    assert_eq!(env.len(), 1);
    assert_eq!(env[0].value.as_deref(), Some("info"));
}

#[test]
fn protected_registry_rejection() {
    let config = GeneratorConfig::default();
    let mut c = component(ComponentSpec {
        container_image: format!("{DEFAULT_IMAGE_REPO}:mytag"),
        ..with_git(minimal_spec(), "https://github.com/user/repo")
    });
    c.metadata.namespace = Some("yourtag".into());

    let err = pipeline::get_params_for_component_build(&c, false, &config).unwrap_err();
    assert_matches!(err, Error::ProtectedRepo { .. });
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = pipeline::generate_initial_build_pipeline_run(&c, true, &config).unwrap_err();
    assert_matches!(err, Error::ProtectedRepo { .. });
}

#[test]
fn parent_kustomization_lists_components() {
    let fs = MemoryFilesystem::new();
    let config = GeneratorConfig::default();
    let generator = Generator::new(&fs, &config);
    for name in ["web", "api"] {
        let mut c = component(ComponentSpec {
            component_name: name.into(),
            ..minimal_spec()
        });
        c.metadata.name = Some(name.into());
        generator
            .generate_base(&Path::new("/gitops/components").join(name).join("base"), &c)
            .unwrap();
    }
    generator
        .generate_parent_kustomize(Path::new("/gitops"), None)
        .unwrap();

    let kustomization: Kustomization = read(&fs, "/gitops/kustomization.yaml");
    assert_eq!(kustomization.bases(), ["components/api", "components/web"]);
}

fn component_strategy() -> impl Strategy<Value = Component> {
    (
        "[a-z][a-z0-9-]{0,12}",
        0..10_000i32,
        prop::option::of(-2..5i32),
        prop_oneof![Just(String::new()), Just("quay.io/org/image:v1".to_string())],
        prop_oneof![Just(String::new()), Just("pull-secret".to_string())],
    )
        .prop_map(|(name, target_port, replicas, image, secret)| {
            let mut c = component(ComponentSpec {
                component_name: name.clone(),
                target_port,
                replicas,
                container_image: image,
                secret,
                ..minimal_spec()
            });
            c.metadata.name = Some(name);
            c
        })
}

proptest! {
    #[test]
    fn selectors_agree(c in component_strategy()) {
        let config = GeneratorConfig::default();
        let files = Generator::new(&MemoryFilesystem::new(), &config).base_manifests(&c).unwrap();

        let deployment: Deployment =
            serde_yaml::from_value(files.get("deployment.yaml").unwrap().clone()).unwrap();
        let spec = deployment.spec.unwrap();
        let expected = selector_labels(c.component_name());
        prop_assert_eq!(spec.selector.match_labels.as_ref(), Some(&expected));
        prop_assert_eq!(spec.template.metadata.as_ref().unwrap().labels.as_ref(), Some(&expected));
        prop_assert!(spec.replicas.unwrap() >= 1);

        if let Some(service) = files.get("service.yaml") {
            let service: Service = serde_yaml::from_value(service.clone()).unwrap();
            prop_assert_eq!(service.spec.unwrap().selector, Some(expected));
        }
    }

    #[test]
    fn zero_port_means_deployment_only(c in component_strategy()) {
        let config = GeneratorConfig::default();
        let files = Generator::new(&MemoryFilesystem::new(), &config).base_manifests(&c).unwrap();
        let kustomization: Kustomization =
            serde_yaml::from_value(files.get("kustomization.yaml").unwrap().clone()).unwrap();

        let deployment: Deployment =
            serde_yaml::from_value(files.get("deployment.yaml").unwrap().clone()).unwrap();
        let container = deployment.spec.unwrap().template.spec.unwrap().containers.remove(0);
        if c.spec.target_port == 0 {
            prop_assert_eq!(files.len(), 2);
            prop_assert_eq!(kustomization.resources(), ["deployment.yaml"]);
            prop_assert!(container.ports.is_none());
            prop_assert!(container.readiness_probe.is_none() && container.liveness_probe.is_none());
        } else {
            prop_assert_eq!(files.len(), 4);
            prop_assert!(container.readiness_probe.is_some() && container.liveness_probe.is_some());
        }
    }

    #[test]
    fn pull_secret_only_with_image(c in component_strategy()) {
        let config = GeneratorConfig::default();
        let files = Generator::new(&MemoryFilesystem::new(), &config).base_manifests(&c).unwrap();
        let deployment: Deployment =
            serde_yaml::from_value(files.get("deployment.yaml").unwrap().clone()).unwrap();
        let secrets = deployment.spec.unwrap().template.spec.unwrap().image_pull_secrets;

        if c.spec.container_image.is_empty() || c.spec.secret.is_empty() {
            prop_assert!(secrets.is_none());
        } else {
            let secrets = secrets.unwrap();
            prop_assert_eq!(secrets.len(), 1);
            prop_assert_eq!(secrets[0].name.as_deref(), Some(c.spec.secret.as_str()));
        }
    }

    #[test]
    fn add_resources_is_order_independent(
        (items, shuffled) in prop::collection::vec("[a-z]{1,6}\\.yaml", 0..12)
            .prop_flat_map(|items| (Just(items.clone()), Just(items).prop_shuffle()))
    ) {
        let mut ordered = Kustomization::new();
        ordered.add_resources(items.iter().cloned());
        let mut permuted = Kustomization::new();
        permuted.add_resources(shuffled.iter().cloned());
        permuted.add_resources(shuffled.iter().cloned());

        prop_assert_eq!(ordered.resources(), permuted.resources());
        let expected: Vec<String> = items.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        prop_assert_eq!(ordered.resources(), expected.as_slice());
    }

    #[test]
    fn overlay_keeps_user_patches(user in prop::collection::btree_set("user-[a-z]{1,6}\\.yaml", 0..5)) {
        let fs = MemoryFilesystem::new();
        let mut prior = vec!["deployment-patch.yaml", "stale-generated.yaml"];
        prior.extend(user.iter().map(String::as_str));
        seed_overlay(&fs, &prior);
        let mut generated = GeneratedResources::from([(
            "test-component".to_string(),
            vec!["deployment-patch.yaml".to_string(), "stale-generated.yaml".to_string()],
        )]);

        generate_overlay(&fs, &mut generated);

        let kustomization: Kustomization = read(&fs, &format!("{OVERLAY}/kustomization.yaml"));
        let mut expected: BTreeSet<String> = user;
        expected.insert("deployment-patch.yaml".to_string());
        let expected: Vec<String> = expected.into_iter().collect();
        prop_assert_eq!(kustomization.patches(), expected.as_slice());
    }

    #[test]
    fn remote_validator_accepts_only_known_hosts(
        scheme in prop_oneof![Just("https"), Just("http"), Just("ssh")],
        host in prop_oneof![
            Just("github.com"),
            Just("gitlab.com"),
            Just("bitbucket.org"),
            Just("example.com"),
        ],
        path in "[a-z]{1,8}/[a-z]{1,8}",
    ) {
        let remote = format!("{scheme}://{host}/{path}");
        let accepted = scm::validate_remote(&remote).is_ok();
        prop_assert_eq!(
            accepted,
            scheme == "https" && (host == "github.com" || host == "gitlab.com")
        );
    }
}

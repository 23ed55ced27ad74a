//! Pure constructors for the manifests of a component.

use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Container, ContainerPort, EnvVar, HTTPGetAction, LocalObjectReference,
            PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe,
            ResourceRequirements, Service, ServicePort, ServiceSpec, TCPSocketAction,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity, apis::meta::v1::LabelSelector, util::intstr::IntOrString,
    },
};
use kube::core::ObjectMeta;

use crate::{
    config::GeneratorConfig,
    crds::{Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig},
    resources::{BindingComponent, Component, Environment},
};

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const CREATED_BY_LABEL: &str = "app.kubernetes.io/created-by";

/// Name of the single container of every generated Deployment.
pub const CONTAINER_NAME: &str = "container-image";

/// Claim shared by all build workspaces of a namespace.
pub const COMMON_STORAGE_CLAIM: &str = "appstudio";

const PROBE_INITIAL_DELAY_SECONDS: i32 = 10;
const PROBE_PERIOD_SECONDS: i32 = 10;

pub fn standard_labels(component: &Component, config: &GeneratorConfig) -> BTreeMap<String, String> {
    let name = component.component_name().to_string();
    BTreeMap::from([
        (NAME_LABEL.to_string(), name.clone()),
        (INSTANCE_LABEL.to_string(), name),
        (PART_OF_LABEL.to_string(), component.application().to_string()),
        (MANAGED_BY_LABEL.to_string(), "kustomize".to_string()),
        (CREATED_BY_LABEL.to_string(), config.creator_tag.clone()),
    ])
}

/// The one label that selects the pods of a component.
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(INSTANCE_LABEL.to_string(), name.to_string())])
}

fn metadata(component: &Component, config: &GeneratorConfig) -> ObjectMeta {
    ObjectMeta {
        name: Some(component.component_name().to_string()),
        namespace: Some(component.namespace_any()),
        labels: Some(standard_labels(component, config)),
        ..Default::default()
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn non_empty_vec<T: Clone>(values: &[T]) -> Option<Vec<T>> {
    (!values.is_empty()).then(|| values.to_vec())
}

pub fn deployment(component: &Component, config: &GeneratorConfig) -> Deployment {
    let spec = &component.spec;
    let selector = selector_labels(component.component_name());

    let mut container = Container {
        name: CONTAINER_NAME.to_string(),
        image: non_empty(&spec.container_image),
        image_pull_policy: Some("Always".to_string()),
        env: non_empty_vec(&spec.env),
        resources: spec.resources.clone(),
        ..Default::default()
    };

    if spec.target_port != 0 {
        let port = IntOrString::Int(spec.target_port);
        container.ports = Some(vec![ContainerPort {
            container_port: spec.target_port,
            ..Default::default()
        }]);
        container.readiness_probe = Some(Probe {
            tcp_socket: Some(TCPSocketAction {
                port: port.clone(),
                ..Default::default()
            }),
            initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECONDS),
            period_seconds: Some(PROBE_PERIOD_SECONDS),
            ..Default::default()
        });
        container.liveness_probe = Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/".to_string()),
                port,
                ..Default::default()
            }),
            initial_delay_seconds: Some(PROBE_INITIAL_DELAY_SECONDS),
            period_seconds: Some(PROBE_PERIOD_SECONDS),
            ..Default::default()
        });
    }

    let image_pull_secrets = (!spec.container_image.is_empty() && !spec.secret.is_empty())
        .then(|| {
            vec![LocalObjectReference {
                name: Some(spec.secret.clone()),
            }]
        });

    Deployment {
        metadata: metadata(component, config),
        spec: Some(DeploymentSpec {
            replicas: Some(component.replicas()),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(selector),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    image_pull_secrets,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn service(component: &Component, config: &GeneratorConfig) -> Service {
    let target_port = component.spec.target_port;
    Service {
        metadata: metadata(component, config),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(component.component_name())),
            ports: Some(vec![ServicePort {
                port: target_port,
                target_port: Some(IntOrString::Int(target_port)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn route(component: &Component, config: &GeneratorConfig) -> Route {
    let mut route = Route::new(
        component.component_name(),
        RouteSpec {
            host: non_empty(&component.spec.route),
            path: None,
            port: Some(RoutePort {
                target_port: IntOrString::Int(component.spec.target_port),
            }),
            tls: Some(TlsConfig {
                termination: "edge".to_string(),
                insecure_edge_termination_policy: Some("Redirect".to_string()),
            }),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: component.component_name().to_string(),
                weight: Some(100),
            },
        },
    );
    route.metadata = metadata(component, config);
    route
}

/// Builds the strategic-merge patch an environment overlay applies to the base Deployment.
///
/// Environment variables set on the binding win over those of the environment.
/// Replicas and resources come from the binding, falling back to the environment.
pub fn deployment_patch(
    binding: &BindingComponent,
    environment: &Environment,
    image: &str,
    namespace: &str,
) -> Deployment {
    let binding_config = &binding.configuration;
    let environment_config = &environment.spec.configuration;

    let env: Vec<EnvVar> = binding_config
        .env
        .iter()
        .chain(
            environment_config
                .env
                .iter()
                .filter(|pair| !binding_config.env.iter().any(|own| own.name == pair.name)),
        )
        .map(EnvVar::from)
        .collect();

    let resources: Option<ResourceRequirements> = binding_config
        .resources
        .clone()
        .or_else(|| environment_config.resources.clone());

    Deployment {
        metadata: ObjectMeta {
            name: Some(binding.name.clone()),
            namespace: non_empty(namespace),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: binding_config.replicas.or(environment_config.replicas),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: non_empty(image),
                        env: non_empty_vec(&env),
                        resources,
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The shared claim build workspaces bind to.
pub fn common_storage_pvc(namespace: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(COMMON_STORAGE_CLAIM.to_string()),
            namespace: non_empty(namespace),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity("1Gi".to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

//! Kubernetes resource builders for PeeringServer
//!
//! This module creates and converges the three objects owned by every
//! PeeringServer: the peer-list ConfigMap, the headless Service, and the
//! StatefulSet running the managed servers.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
    HTTPGetAction, ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements as K8sResources, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::{info, instrument, warn};

use crate::crd::PeeringServer;
use crate::error::{Error, Result};
use crate::peering::{self, PeeringConfig};

/// Mount point of the peer configuration inside every pod.
pub const CONFIG_MOUNT_PATH: &str = "/etc/peering";

/// Get the standard labels for a PeeringServer's owned objects
pub fn standard_labels(ps: &PeeringServer) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), ps.name_any());
    labels.insert("managed-by".to_string(), "peering-operator".to_string());
    labels
}

/// Pod-identity subset of the standard labels, used as the workload selector.
fn selector_labels(ps: &PeeringServer) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), ps.name_any())])
}

/// Create an OwnerReference for garbage collection
pub fn owner_reference(ps: &PeeringServer) -> OwnerReference {
    OwnerReference {
        api_version: PeeringServer::api_version(&()).to_string(),
        kind: PeeringServer::kind(&()).to_string(),
        name: ps.name_any(),
        uid: ps.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

pub fn config_map_name(ps: &PeeringServer) -> String {
    format!("{}-config", ps.name_any())
}

pub fn headless_service_name(ps: &PeeringServer) -> String {
    format!("{}-headless", ps.name_any())
}

fn object_meta(ps: &PeeringServer, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: ps.namespace(),
        labels: Some(standard_labels(ps)),
        owner_references: Some(vec![owner_reference(ps)]),
        ..Default::default()
    }
}

fn namespace_of(ps: &PeeringServer) -> String {
    ps.namespace().unwrap_or_else(|| "default".to_string())
}

// ============================================================================
// ConfigMap
// ============================================================================

/// The peer document a cohort should converge to.
pub fn desired_peer_config(ps: &PeeringServer) -> PeeringConfig {
    PeeringConfig {
        peers: peering::peer_endpoints(
            &ps.name_any(),
            &namespace_of(ps),
            ps.spec.replicas,
            ps.spec.port,
        ),
        ping_interval: ps.spec.ping_interval,
    }
}

pub fn build_config_map(ps: &PeeringServer) -> Result<ConfigMap> {
    let config = desired_peer_config(ps);

    let mut data = BTreeMap::new();
    data.insert(
        peering::CONFIG_KEY.to_string(),
        serde_json::to_string(&config)?,
    );

    Ok(ConfigMap {
        metadata: object_meta(ps, config_map_name(ps)),
        data: Some(data),
        ..Default::default()
    })
}

/// Ensure the peer-list ConfigMap matches the declared cohort.
///
/// `data` is overwritten wholesale; stray keys do not survive a reconcile.
#[instrument(skip(client, ps), fields(name = %ps.name_any(), namespace = ps.namespace()))]
pub async fn ensure_config_map(client: &Client, ps: &PeeringServer) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace_of(ps));
    let name = config_map_name(ps);

    let mut desired = build_config_map(ps)?;

    match api.get(&name).await {
        Ok(existing) => {
            desired.metadata.resource_version = existing.metadata.resource_version.clone();
            api.replace(&name, &PostParams::default(), &desired).await?;
            info!("Replaced ConfigMap {}", name);
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            api.create(&PostParams::default(), &desired).await?;
            info!("Created ConfigMap {}", name);
        }
        Err(e) => return Err(Error::KubeError(e)),
    }

    Ok(())
}

// ============================================================================
// Headless Service
// ============================================================================

pub fn build_service(ps: &PeeringServer, existing: Option<&Service>) -> Service {
    let live_spec = existing.and_then(|svc| svc.spec.as_ref());

    Service {
        metadata: object_meta(ps, headless_service_name(ps)),
        spec: Some(ServiceSpec {
            // clusterIP is immutable once assigned; carry the live value
            // forward so a replace does not get rejected.
            cluster_ip: live_spec
                .and_then(|s| s.cluster_ip.clone())
                .or_else(|| Some("None".to_string())),
            cluster_ips: live_spec.and_then(|s| s.cluster_ips.clone()),
            selector: Some(selector_labels(ps)),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: ps.spec.port,
                target_port: Some(IntOrString::String("http".to_string())),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Ensure the headless Service giving each pod its stable DNS identity.
#[instrument(skip(client, ps), fields(name = %ps.name_any(), namespace = ps.namespace()))]
pub async fn ensure_service(client: &Client, ps: &PeeringServer) -> Result<()> {
    let api: Api<Service> = Api::namespaced(client.clone(), &namespace_of(ps));
    let name = headless_service_name(ps);

    match api.get(&name).await {
        Ok(existing) => {
            let mut desired = build_service(ps, Some(&existing));
            desired.metadata.resource_version = existing.metadata.resource_version.clone();
            api.replace(&name, &PostParams::default(), &desired).await?;
            info!("Replaced Service {}", name);
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            let desired = build_service(ps, None);
            api.create(&PostParams::default(), &desired).await?;
            info!("Created Service {}", name);
        }
        Err(e) => return Err(Error::KubeError(e)),
    }

    Ok(())
}

// ============================================================================
// StatefulSet
// ============================================================================

pub fn build_statefulset(ps: &PeeringServer, existing: Option<&StatefulSet>) -> StatefulSet {
    let labels = standard_labels(ps);
    let name = ps.name_any();
    let live_spec = existing.and_then(|sts| sts.spec.as_ref());

    // selector and serviceName are immutable after creation; keep the live
    // values and only warn when the desired state has drifted from them.
    let fresh_selector = LabelSelector {
        match_labels: Some(selector_labels(ps)),
        ..Default::default()
    };
    let selector = live_spec
        .map(|s| s.selector.clone())
        .unwrap_or_else(|| fresh_selector.clone());
    if selector != fresh_selector {
        warn!(
            "StatefulSet {} selector {:?} is immutable and differs from the desired {:?}",
            name, selector, fresh_selector
        );
    }
    let service_name = live_spec
        .map(|s| s.service_name.clone())
        .unwrap_or_else(|| headless_service_name(ps));
    if service_name != headless_service_name(ps) {
        warn!(
            "StatefulSet {} serviceName {} is immutable and differs from the desired {}",
            name,
            service_name,
            headless_service_name(ps)
        );
    }

    StatefulSet {
        metadata: object_meta(ps, name),
        spec: Some(StatefulSetSpec {
            replicas: Some(ps.spec.replicas),
            selector,
            service_name,
            template: build_pod_template(ps, &labels),
            ..Default::default()
        }),
        status: None,
    }
}

/// Ensure the StatefulSet running the cohort.
///
/// Scaling only rewrites `spec.replicas`; running pods learn about the new
/// cohort through the republished ConfigMap, never through a rollout.
#[instrument(skip(client, ps), fields(name = %ps.name_any(), namespace = ps.namespace()))]
pub async fn ensure_statefulset(client: &Client, ps: &PeeringServer) -> Result<()> {
    let api: Api<StatefulSet> = Api::namespaced(client.clone(), &namespace_of(ps));
    let name = ps.name_any();

    match api.get(&name).await {
        Ok(existing) => {
            let mut desired = build_statefulset(ps, Some(&existing));
            desired.metadata.resource_version = existing.metadata.resource_version.clone();
            api.replace(&name, &PostParams::default(), &desired).await?;
            info!("Replaced StatefulSet {}", name);
        }
        Err(kube::Error::Api(e)) if e.code == 404 => {
            let desired = build_statefulset(ps, None);
            api.create(&PostParams::default(), &desired).await?;
            info!("Created StatefulSet {}", name);
        }
        Err(e) => return Err(Error::KubeError(e)),
    }

    Ok(())
}

// ============================================================================
// Pod Template Builder
// ============================================================================

fn build_pod_template(ps: &PeeringServer, labels: &BTreeMap<String, String>) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![build_container(ps)],
            volumes: Some(vec![Volume {
                name: "config".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: config_map_name(ps),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

fn build_container(ps: &PeeringServer) -> Container {
    let mut requests = BTreeMap::new();
    requests.insert(
        "cpu".to_string(),
        Quantity(ps.spec.resources.requests.cpu.clone()),
    );
    requests.insert(
        "memory".to_string(),
        Quantity(ps.spec.resources.requests.memory.clone()),
    );

    let mut limits = BTreeMap::new();
    limits.insert(
        "cpu".to_string(),
        Quantity(ps.spec.resources.limits.cpu.clone()),
    );
    limits.insert(
        "memory".to_string(),
        Quantity(ps.spec.resources.limits.memory.clone()),
    );

    let env_vars = vec![
        EnvVar {
            name: "PORT".to_string(),
            value: Some(ps.spec.port.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: "CONFIG_PATH".to_string(),
            value: Some(format!("{CONFIG_MOUNT_PATH}/{}", peering::CONFIG_KEY)),
            ..Default::default()
        },
        EnvVar {
            name: "POD_NAME".to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        },
    ];

    let health_probe = |initial_delay_seconds: i32, period_seconds: i32| Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/health".to_string()),
            port: IntOrString::String("http".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay_seconds),
        period_seconds: Some(period_seconds),
        ..Default::default()
    };

    Container {
        name: "peering-server".to_string(),
        image: Some(ps.spec.image.clone()),
        ports: Some(vec![ContainerPort {
            name: Some("http".to_string()),
            container_port: ps.spec.port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env_vars),
        resources: Some(K8sResources {
            requests: Some(requests),
            limits: Some(limits),
            claims: None,
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: "config".to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        liveness_probe: Some(health_probe(5, 10)),
        readiness_probe: Some(health_probe(3, 5)),
        ..Default::default()
    }
}

//! Unit tests for Kubernetes resource builders.
//!
//! Run with: `cargo test resources_test`

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{Service, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    use crate::controller::resources::{
        build_config_map, build_service, build_statefulset, config_map_name, desired_peer_config,
        headless_service_name, owner_reference, standard_labels, CONFIG_MOUNT_PATH,
    };
    use crate::crd::{PeeringServer, PeeringServerSpec, ResourceRequirements};
    use crate::peering::{PeeringConfig, CONFIG_KEY};

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn make_server(name: &str, namespace: &str, replicas: i32) -> PeeringServer {
        let mut ps = PeeringServer::new(
            name,
            PeeringServerSpec {
                replicas,
                ping_interval: 60_000,
                port: 8080,
                image: "peering-server:latest".to_string(),
                resources: ResourceRequirements::default(),
            },
        );
        ps.metadata.namespace = Some(namespace.to_string());
        ps.metadata.uid = Some(format!("uid-{name}"));
        ps
    }

    // -----------------------------------------------------------------------
    // Naming, labels, ownership
    // -----------------------------------------------------------------------

    #[test]
    fn test_owned_object_names() {
        let ps = make_server("small", "default", 3);
        assert_eq!(config_map_name(&ps), "small-config");
        assert_eq!(headless_service_name(&ps), "small-headless");
    }

    #[test]
    fn test_standard_labels() {
        let ps = make_server("small", "default", 3);
        let labels = standard_labels(&ps);
        assert_eq!(labels.get("app"), Some(&"small".to_string()));
        assert_eq!(
            labels.get("managed-by"),
            Some(&"peering-operator".to_string())
        );
    }

    #[test]
    fn test_owner_reference_marks_controller() {
        let ps = make_server("small", "default", 3);
        let owner = owner_reference(&ps);

        assert_eq!(owner.api_version, "luxor.io/v1");
        assert_eq!(owner.kind, "PeeringServer");
        assert_eq!(owner.name, "small");
        assert_eq!(owner.uid, "uid-small");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }

    #[test]
    fn test_all_owned_objects_carry_owner_references() {
        let ps = make_server("small", "default", 3);

        let cm = build_config_map(&ps).unwrap();
        let svc = build_service(&ps, None);
        let sts = build_statefulset(&ps, None);

        for refs in [
            cm.metadata.owner_references,
            svc.metadata.owner_references,
            sts.metadata.owner_references,
        ] {
            let refs = refs.expect("owner references must be set");
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].name, "small");
        }
    }

    // -----------------------------------------------------------------------
    // Peer list
    // -----------------------------------------------------------------------

    #[test]
    fn test_peer_list_enumerates_every_ordinal() {
        let ps = make_server("small", "default", 3);
        let config = desired_peer_config(&ps);

        assert_eq!(config.ping_interval, 60_000);
        let hosts: Vec<_> = config.peers.iter().map(|p| p.host.as_str()).collect();
        assert_eq!(
            hosts,
            vec![
                "small-0.small-headless.default.svc.cluster.local",
                "small-1.small-headless.default.svc.cluster.local",
                "small-2.small-headless.default.svc.cluster.local",
            ]
        );
    }

    #[test]
    fn test_peer_list_tracks_namespace() {
        let ps = make_server("edge", "prod", 1);
        let config = desired_peer_config(&ps);
        assert_eq!(
            config.peers[0].host,
            "edge-0.edge-headless.prod.svc.cluster.local"
        );
    }

    // -----------------------------------------------------------------------
    // ConfigMap
    // -----------------------------------------------------------------------

    #[test]
    fn test_config_map_carries_parseable_peer_document() {
        let ps = make_server("small", "default", 2);
        let cm = build_config_map(&ps).unwrap();

        assert_eq!(cm.metadata.name.as_deref(), Some("small-config"));
        let data = cm.data.expect("config map data");
        let raw = data.get(CONFIG_KEY).expect("config.json key");

        let parsed: PeeringConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, desired_peer_config(&ps));
    }

    #[test]
    fn test_config_map_build_is_deterministic() {
        let ps = make_server("small", "default", 5);
        let first = serde_json::to_string(&build_config_map(&ps).unwrap()).unwrap();
        let second = serde_json::to_string(&build_config_map(&ps).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    // -----------------------------------------------------------------------
    // Headless Service
    // -----------------------------------------------------------------------

    #[test]
    fn test_fresh_service_is_headless() {
        let ps = make_server("small", "default", 3);
        let svc = build_service(&ps, None);

        assert_eq!(svc.metadata.name.as_deref(), Some("small-headless"));
        let spec = svc.spec.expect("service spec");
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));

        let ports = spec.ports.expect("service ports");
        assert_eq!(ports.len(), 1);
        assert_eq!(ports[0].name.as_deref(), Some("http"));
        assert_eq!(ports[0].port, 8080);
        assert_eq!(ports[0].protocol.as_deref(), Some("TCP"));

        let selector = spec.selector.expect("selector");
        assert_eq!(selector.get("app"), Some(&"small".to_string()));
        assert!(!selector.contains_key("managed-by"));
    }

    #[test]
    fn test_service_preserves_assigned_cluster_ip() {
        let ps = make_server("small", "default", 3);
        let existing = Service {
            spec: Some(ServiceSpec {
                cluster_ip: Some("None".to_string()),
                cluster_ips: Some(vec!["None".to_string()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let svc = build_service(&ps, Some(&existing));
        let spec = svc.spec.expect("service spec");
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.cluster_ips, Some(vec!["None".to_string()]));
    }

    // -----------------------------------------------------------------------
    // StatefulSet
    // -----------------------------------------------------------------------

    #[test]
    fn test_statefulset_wires_cohort_identity() {
        let ps = make_server("small", "default", 3);
        let sts = build_statefulset(&ps, None);

        assert_eq!(sts.metadata.name.as_deref(), Some("small"));
        let spec = sts.spec.expect("statefulset spec");
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name, "small-headless");
        assert_eq!(
            spec.selector
                .match_labels
                .as_ref()
                .and_then(|l| l.get("app")),
            Some(&"small".to_string())
        );
    }

    #[test]
    fn test_statefulset_keeps_live_selector_and_service_name() {
        let ps = make_server("small", "default", 3);
        let mut live = build_statefulset(&ps, None);
        if let Some(spec) = live.spec.as_mut() {
            spec.service_name = "small-old-headless".to_string();
            spec.selector = LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    "app".to_string(),
                    "small-old".to_string(),
                )])),
                ..Default::default()
            };
        }

        // Both immutable fields diverge from a fresh build; the rebuilt
        // object must carry the live values forward, not rewrite them.
        let rebuilt = build_statefulset(&ps, Some(&live));
        let spec = rebuilt.spec.expect("statefulset spec");
        assert_eq!(spec.service_name, "small-old-headless");
        assert_eq!(
            spec.selector.match_labels.as_ref().and_then(|l| l.get("app")),
            Some(&"small-old".to_string())
        );
    }

    #[test]
    fn test_pod_template_mounts_config_read_only() {
        let ps = make_server("small", "default", 3);
        let sts = build_statefulset(&ps, None);

        let template = sts.spec.expect("spec").template;
        let pod_spec = template.spec.expect("pod spec");

        let volumes = pod_spec.volumes.expect("volumes");
        assert_eq!(volumes.len(), 1);
        assert_eq!(
            volumes[0]
                .config_map
                .as_ref()
                .map(|cm| cm.name.as_str()),
            Some("small-config")
        );

        let container = &pod_spec.containers[0];
        assert_eq!(container.name, "peering-server");
        assert_eq!(container.image.as_deref(), Some("peering-server:latest"));

        let mounts = container.volume_mounts.as_ref().expect("volume mounts");
        assert_eq!(mounts[0].mount_path, CONFIG_MOUNT_PATH);
        assert_eq!(mounts[0].read_only, Some(true));
    }

    #[test]
    fn test_container_env_and_probes() {
        let ps = make_server("small", "default", 3);
        let sts = build_statefulset(&ps, None);
        let pod_spec = sts.spec.expect("spec").template.spec.expect("pod spec");
        let container = &pod_spec.containers[0];

        let env = container.env.as_ref().expect("env");
        let lookup = |name: &str| env.iter().find(|e| e.name == name).expect(name);

        assert_eq!(lookup("PORT").value.as_deref(), Some("8080"));
        assert_eq!(
            lookup("CONFIG_PATH").value.as_deref(),
            Some("/etc/peering/config.json")
        );
        let pod_name = lookup("POD_NAME");
        assert_eq!(
            pod_name
                .value_from
                .as_ref()
                .and_then(|v| v.field_ref.as_ref())
                .map(|f| f.field_path.as_str()),
            Some("metadata.name")
        );

        for probe in [
            container.liveness_probe.as_ref().expect("liveness"),
            container.readiness_probe.as_ref().expect("readiness"),
        ] {
            let http_get = probe.http_get.as_ref().expect("http probe");
            assert_eq!(http_get.path.as_deref(), Some("/health"));
            assert_eq!(http_get.port, IntOrString::String("http".to_string()));
        }
    }

    #[test]
    fn test_container_resources_follow_spec_quantities() {
        let ps = make_server("small", "default", 3);
        let sts = build_statefulset(&ps, None);
        let pod_spec = sts.spec.expect("spec").template.spec.expect("pod spec");
        let resources = pod_spec.containers[0].resources.as_ref().expect("resources");

        let requests = resources.requests.as_ref().expect("requests");
        assert_eq!(requests.get("cpu").map(|q| q.0.as_str()), Some("100m"));
        assert_eq!(requests.get("memory").map(|q| q.0.as_str()), Some("128Mi"));

        let limits = resources.limits.as_ref().expect("limits");
        assert_eq!(limits.get("cpu").map(|q| q.0.as_str()), Some("200m"));
        assert_eq!(limits.get("memory").map(|q| q.0.as_str()), Some("256Mi"));
    }

    #[test]
    fn test_builders_are_idempotent() {
        let ps = make_server("small", "default", 4);

        let svc_a = serde_json::to_string(&build_service(&ps, None)).unwrap();
        let svc_b = serde_json::to_string(&build_service(&ps, None)).unwrap();
        assert_eq!(svc_a, svc_b);

        let sts_a = serde_json::to_string(&build_statefulset(&ps, None)).unwrap();
        let sts_b = serde_json::to_string(&build_statefulset(&ps, None)).unwrap();
        assert_eq!(sts_a, sts_b);
    }
}

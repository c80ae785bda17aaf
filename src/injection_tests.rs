// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `injection.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::SidecarInjectionSpec;
    use crate::errors::ClusterError;
    use crate::fake_cluster::{sample_app, FakeCluster};
    use indexmap::IndexMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn injecting_app(namespace: &str, name: &str, selector: &[(&str, &str)]) -> AppConfig {
        let mut app = sample_app(namespace, name, "orders");
        app.spec.sidecar_injection = Some(SidecarInjectionSpec {
            enabled: true,
            name: None,
            image: Some("envoyproxy/envoy:v1.31.0".to_string()),
            selector_labels: selector
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            env: IndexMap::from([
                ("ZETA".to_string(), "1".to_string()),
                ("ALPHA".to_string(), "2".to_string()),
            ]),
            volumes: vec!["envoy-config".to_string()],
            volume_mounts: IndexMap::from([("envoy-config".to_string(), "/etc/envoy".to_string())]),
        });
        app
    }

    fn pod(namespace: &str, name: &str, labels: &[(&str, &str)], containers: &[&str]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(format!("pod-uid-{name}")),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|c| Container {
                        name: (*c).to_string(),
                        ..Default::default()
                    })
                    .collect(),
                volumes: Some(vec![Volume {
                    name: "data".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_registry_register_and_unregister() {
        let registry = InjectionRegistry::new();
        let app = injecting_app("shop", "orders-config", &[("app", "orders")]);

        registry.register(&app);
        registry.register(&app);

        assert_eq!(registry.len(), 1, "Re-registering refreshes the entry");
        assert!(registry.contains("shop/orders-config"));
        assert!(registry.unregister("shop", "orders-config"));
        assert!(!registry.unregister("shop", "orders-config"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_snapshot_is_sorted() {
        let registry = InjectionRegistry::new();
        for (ns, name) in [("web", "b"), ("api", "z"), ("web", "a")] {
            registry.register(&injecting_app(ns, name, &[("app", "x")]));
        }

        let keys: Vec<String> = registry.snapshot().into_iter().map(|(k, _)| k).collect();

        assert_eq!(keys, vec!["api/z", "web/a", "web/b"]);
    }

    #[test]
    fn test_should_inject_match_and_flips() {
        let app = injecting_app("shop", "orders-config", &[("app", "orders"), ("tier", "backend")]);
        let matching = pod("shop", "orders-1", &[("app", "orders"), ("tier", "backend"), ("x", "y")], &["main"]);
        assert!(should_inject(&matching, &app), "Baseline pod should match");

        let other_namespace = pod("web", "orders-1", &[("app", "orders"), ("tier", "backend")], &["main"]);
        assert!(!should_inject(&other_namespace, &app), "Namespace differs");

        let wrong_label = pod("shop", "orders-1", &[("app", "orders"), ("tier", "frontend")], &["main"]);
        assert!(!should_inject(&wrong_label, &app), "Selector label value differs");

        let missing_label = pod("shop", "orders-1", &[("app", "orders")], &["main"]);
        assert!(!should_inject(&missing_label, &app), "Selector label missing");

        let already = pod(
            "shop",
            "orders-1",
            &[("app", "orders"), ("tier", "backend")],
            &["main", "orders-sidecar"],
        );
        assert!(!should_inject(&already, &app), "Sidecar already present");
    }

    #[test]
    fn test_empty_selector_never_matches() {
        let app = injecting_app("shop", "orders-config", &[]);
        let any_pod = pod("shop", "orders-1", &[("app", "orders")], &["main"]);

        assert!(!should_inject(&any_pod, &app));
    }

    #[test]
    fn test_build_injected_pod_appends() {
        // Arrange
        let app = injecting_app("shop", "orders-config", &[("app", "orders")]);
        let original = pod("shop", "orders-1", &[("app", "orders")], &["main"]);

        // Act
        let injected = build_injected_pod(&original, &app);

        // Assert
        let spec = injected.spec.unwrap();
        let names: Vec<&str> = spec.containers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["main", "orders-sidecar"]);
        let sidecar = &spec.containers[1];
        assert_eq!(sidecar.image.as_deref(), Some("envoyproxy/envoy:v1.31.0"));
        let env: Vec<&str> = sidecar.env.as_ref().unwrap().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(env, vec!["ZETA", "ALPHA"], "Env keeps declaration order");
        let mount = &sidecar.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.name, "envoy-config");
        assert_eq!(mount.mount_path, "/etc/envoy");
        let volumes = spec.volumes.unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[0].name, "data", "Existing volumes come first");
        assert_eq!(volumes[1].name, "envoy-config");
        assert!(volumes[1].empty_dir.is_some());
    }

    #[test]
    fn test_custom_sidecar_name() {
        let mut app = injecting_app("shop", "orders-config", &[("app", "orders")]);
        if let Some(injection) = app.spec.sidecar_injection.as_mut() {
            injection.name = Some("proxy".to_string());
        }

        assert_eq!(build_sidecar_container(&app).name, "proxy");
        let with_proxy = pod("shop", "orders-1", &[("app", "orders")], &["main", "proxy"]);
        assert!(!should_inject(&with_proxy, &app));
    }

    #[tokio::test]
    async fn test_handle_pod_created_first_match_wins() {
        // Arrange: two matching AppConfigs, "shop/a" sorts first
        let cluster = FakeCluster::new();
        let created = pod("shop", "orders-1", &[("app", "orders")], &["main"]);
        cluster.insert(&created);
        let registry = InjectionRegistry::new();
        registry.register(&injecting_app("shop", "b", &[("app", "orders")]));
        let mut first = injecting_app("shop", "a", &[("app", "orders")]);
        if let Some(injection) = first.spec.sidecar_injection.as_mut() {
            injection.name = Some("first".to_string());
        }
        registry.register(&first);

        // Act
        let result = handle_pod_created(&cluster, &registry, &created).await;

        // Assert
        assert_eq!(result, InjectionResult::Injected("shop/a".to_string()));
        let stored: Pod = cluster.stored("shop", "orders-1").unwrap();
        let names: Vec<String> = stored.spec.unwrap().containers.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["main", "first"], "Only one sidecar is injected");
    }

    #[tokio::test]
    async fn test_handle_pod_created_skips_terminating_pod() {
        let cluster = FakeCluster::new();
        let registry = InjectionRegistry::new();
        registry.register(&injecting_app("shop", "orders-config", &[("app", "orders")]));
        let mut terminating = pod("shop", "orders-1", &[("app", "orders")], &["main"]);
        terminating.metadata.deletion_timestamp =
            Some(serde_json::from_value(serde_json::json!("2025-06-01T12:00:00Z")).unwrap());

        let result = handle_pod_created(&cluster, &registry, &terminating).await;

        assert_eq!(result, InjectionResult::Terminating);
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_handle_pod_created_failure_is_not_retried() {
        let cluster = FakeCluster::new();
        cluster.fail(
            "apply",
            "Pod",
            "orders-1",
            ClusterError::api(422, "Invalid", "spec: Forbidden: pod updates may not add or remove containers"),
            5,
        );
        let registry = InjectionRegistry::new();
        registry.register(&injecting_app("shop", "orders-config", &[("app", "orders")]));
        let created = pod("shop", "orders-1", &[("app", "orders")], &["main"]);

        let result = handle_pod_created(&cluster, &registry, &created).await;

        assert!(matches!(result, InjectionResult::Failed { ref app, .. } if app == "shop/orders-config"));
        assert_eq!(cluster.calls().len(), 1, "Exactly one apply attempt");
    }

    #[tokio::test]
    async fn test_handle_pod_created_without_match() {
        let cluster = FakeCluster::new();
        let registry = InjectionRegistry::new();
        registry.register(&injecting_app("shop", "orders-config", &[("app", "payments")]));

        let result =
            handle_pod_created(&cluster, &registry, &pod("shop", "orders-1", &[("app", "orders")], &["main"])).await;

        assert_eq!(result, InjectionResult::NoMatch);
    }

    #[test]
    fn test_tracker_emits_creation_once() {
        // Arrange
        let mut tracker = PodCreationTracker::new();
        let p = pod("shop", "orders-1", &[], &["main"]);

        // Act / Assert
        assert!(tracker.observe(Event::Apply(p.clone())).is_some(), "First sighting is a creation");
        assert!(tracker.observe(Event::Apply(p.clone())).is_none(), "Updates are ignored");
        assert!(tracker.observe(Event::Delete(p.clone())).is_none());
        assert_eq!(tracker.tracked(), 0);
    }

    #[test]
    fn test_tracker_relist_prunes_and_skips_known_pods() {
        let mut tracker = PodCreationTracker::new();
        let kept = pod("shop", "kept", &[], &["main"]);
        let gone = pod("shop", "gone", &[], &["main"]);
        let fresh = pod("shop", "fresh", &[], &["main"]);
        tracker.observe(Event::Apply(kept.clone()));
        tracker.observe(Event::Apply(gone));

        tracker.observe(Event::Init);
        assert!(tracker.observe(Event::InitApply(kept)).is_none(), "Known pod is not re-created");
        assert!(tracker.observe(Event::InitApply(fresh)).is_some(), "Unseen pod in relist is new");
        tracker.observe(Event::InitDone);

        assert_eq!(tracker.tracked(), 2, "Pod missing from relist was pruned");
    }
}

// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! NetworkPolicy synchronization.
//!
//! One `<appName>-network-policy` object selects the application's pods
//! (`app=<appName>`). Each ingress/egress entry of the spec is a peer:
//!
//! - `key=value` - pods carrying that label
//! - `10.0.0.0/8` - an IP block
//!
//! Entries matching neither form are logged and dropped. An empty ingress list
//! denies all ingress. Egress is only restricted when at least one egress entry is
//! configured.

use crate::cluster::ClusterApi;
use crate::constants::NETWORK_POLICY_NAME_SUFFIX;
use crate::context::Context;
use crate::crd::{AppConfig, NetworkPolicySpec};
use crate::errors::ReconcileError;
use crate::labels::LABEL_APP;
use crate::reconcilers::finalizers::{ResourceKind, ResourceRef};
use crate::reconcilers::resources::{
    app_namespace, child_metadata, ensure_resource, UpdateStrategy,
};
use crate::source::SourceFetcher;
use k8s_openapi::api::networking::v1::{
    IPBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicySpec as PolicySpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;
use std::net::IpAddr;
use tracing::{info, warn};

/// One parsed peer entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Peer {
    /// Pods with label `key=value`
    PodLabel { key: String, value: String },
    /// An IP block in CIDR notation
    Cidr(String),
}

impl Peer {
    /// Parse a peer entry. Returns `None` for entries of neither form.
    #[must_use]
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if let Some((key, value)) = entry.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            return Some(Self::PodLabel {
                key: key.to_string(),
                value: value.trim().to_string(),
            });
        }

        let (address, prefix) = entry.split_once('/')?;
        let address: IpAddr = address.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;
        let max_prefix = if address.is_ipv4() { 32 } else { 128 };
        (prefix <= max_prefix).then(|| Self::Cidr(entry.to_string()))
    }

    fn to_peer(&self) -> NetworkPolicyPeer {
        match self {
            Self::PodLabel { key, value } => NetworkPolicyPeer {
                pod_selector: Some(match_labels(key, value)),
                ..NetworkPolicyPeer::default()
            },
            Self::Cidr(cidr) => NetworkPolicyPeer {
                ip_block: Some(IPBlock {
                    cidr: cidr.clone(),
                    ..IPBlock::default()
                }),
                ..NetworkPolicyPeer::default()
            },
        }
    }
}

fn match_labels(key: &str, value: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
        ..LabelSelector::default()
    }
}

/// Name of the application's network policy.
#[must_use]
pub fn network_policy_name(app_name: &str) -> String {
    format!("{app_name}{NETWORK_POLICY_NAME_SUFFIX}")
}

fn parse_peers(namespace: &str, direction: &str, entries: &[String]) -> Vec<NetworkPolicyPeer> {
    entries
        .iter()
        .filter_map(|entry| {
            let peer = Peer::parse(entry);
            if peer.is_none() {
                warn!(
                    namespace = %namespace,
                    direction = %direction,
                    entry = %entry,
                    "Ignoring network policy entry, expected key=value or CIDR"
                );
            }
            peer.map(|p| p.to_peer())
        })
        .collect()
}

/// Desired NetworkPolicy for `app`.
///
/// # Errors
///
/// Fails when ownership metadata cannot be derived from `app`.
pub fn build_network_policy(
    app: &AppConfig,
    spec: &NetworkPolicySpec,
) -> Result<NetworkPolicy, ReconcileError> {
    let namespace = app_namespace(app)?;
    let metadata = child_metadata(app, &network_policy_name(&app.spec.app_name))?;

    let ingress_peers = parse_peers(&namespace, "ingress", &spec.ingress);
    let egress_peers = parse_peers(&namespace, "egress", &spec.egress);

    let ingress = if ingress_peers.is_empty() {
        Vec::new()
    } else {
        vec![NetworkPolicyIngressRule {
            from: Some(ingress_peers),
            ..NetworkPolicyIngressRule::default()
        }]
    };

    let (egress, policy_types) = if egress_peers.is_empty() {
        (None, vec!["Ingress".to_string()])
    } else {
        let rule = NetworkPolicyEgressRule {
            to: Some(egress_peers),
            ..NetworkPolicyEgressRule::default()
        };
        (Some(vec![rule]), vec!["Ingress".to_string(), "Egress".to_string()])
    };

    Ok(NetworkPolicy {
        metadata,
        spec: Some(PolicySpec {
            pod_selector: Some(match_labels(LABEL_APP, &app.spec.app_name)),
            ingress: Some(ingress),
            egress,
            policy_types: Some(policy_types),
        }),
    })
}

/// Ensure the network policy when `spec.networkPolicy.enabled`.
///
/// # Errors
///
/// Returns the cluster error of the ensure call.
pub async fn sync_network_policy<C, F>(
    ctx: &Context<C, F>,
    app: &AppConfig,
) -> Result<Vec<ResourceRef>, ReconcileError>
where
    C: ClusterApi,
    F: SourceFetcher,
{
    let Some(spec) = app.spec.network_policy.as_ref().filter(|np| np.enabled) else {
        return Ok(Vec::new());
    };
    let namespace = app_namespace(app)?;
    let policy = build_network_policy(app, spec)?;
    let name = network_policy_name(&app.spec.app_name);

    let outcome = ensure_resource(&ctx.cluster, &namespace, &policy, UpdateStrategy::Apply).await?;
    info!(namespace = %namespace, name = %name, outcome = ?outcome, "Synchronized NetworkPolicy");

    Ok(if outcome.is_owned() {
        vec![ResourceRef::new(ResourceKind::NetworkPolicy, namespace, name)]
    } else {
        Vec::new()
    })
}

#[cfg(test)]
#[path = "network_policy_tests.rs"]
mod network_policy_tests;

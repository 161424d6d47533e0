use std::collections::{btree_map, BTreeMap};

use gateway_api::apis::standard::gateways::Gateway as KubeGateway;
use serde::Serialize;
use tracing::{debug, info};

use super::{Condition, Listener, ResourceKey};

const TARGET: &str = "kubvernor_graph::gateway";

/// The Gateway this controller serves.
#[derive(Clone, Debug, Serialize)]
pub struct Gateway {
    pub key: ResourceKey,
    #[serde(skip)]
    pub source: KubeGateway,
    pub listeners: BTreeMap<String, Listener>,
    /// False when the GatewayClass is missing or invalid. Such a Gateway has no listeners.
    pub valid: bool,
    pub conditions: Vec<Condition>,
}

impl Gateway {
    pub fn new(source: &KubeGateway, listeners: BTreeMap<String, Listener>) -> Self {
        Self { key: ResourceKey::from(source), source: source.clone(), listeners, valid: true, conditions: vec![] }
    }

    pub fn invalid(source: &KubeGateway, conditions: Vec<Condition>) -> Self {
        Self { key: ResourceKey::from(source), source: source.clone(), listeners: BTreeMap::new(), valid: false, conditions }
    }

    pub fn listeners(&self) -> btree_map::Values<'_, String, Listener> {
        self.listeners.values()
    }

    pub fn listener(&self, name: &str) -> Option<&Listener> {
        self.listeners.get(name)
    }

    pub fn listener_mut(&mut self, name: &str) -> Option<&mut Listener> {
        self.listeners.get_mut(name)
    }
}

#[derive(Debug, Default)]
pub struct GatewaySelection<'a> {
    pub winner: Option<&'a KubeGateway>,
    pub ignored: BTreeMap<ResourceKey, &'a KubeGateway>,
}

/// Picks the oldest Gateway of the class; ties are broken by namespace and name. Gateways without a creation timestamp
/// sort first.
pub fn select_gateways<'a>(gateways: impl IntoIterator<Item = &'a KubeGateway>, gateway_class_name: &str) -> GatewaySelection<'a> {
    let mut candidates: Vec<(ResourceKey, &KubeGateway)> = gateways
        .into_iter()
        .filter(|gateway| gateway.spec.gateway_class_name == gateway_class_name)
        .map(|gateway| (ResourceKey::from(gateway), gateway))
        .collect();

    candidates.sort_by(|(this_key, this), (other_key, other)| {
        this.metadata
            .creation_timestamp
            .cmp(&other.metadata.creation_timestamp)
            .then_with(|| this_key.namespace.cmp(&other_key.namespace))
            .then_with(|| this_key.name.cmp(&other_key.name))
    });

    let mut candidates = candidates.into_iter();
    let Some((winner_key, winner)) = candidates.next() else {
        debug!(target: TARGET, "No gateways for class {gateway_class_name}");
        return GatewaySelection::default();
    };

    let ignored: BTreeMap<_, _> = candidates.collect();
    info!(target: TARGET, "Selected gateway {winner_key} ignored {:?}", ignored.keys().map(ToString::to_string).collect::<Vec<_>>());
    GatewaySelection { winner: Some(winner), ignored }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test::gateway_from_yaml;

    fn gateway(name: &str, namespace: &str, class: &str, created: &str) -> KubeGateway {
        gateway_from_yaml(&format!(
            r"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: {name}
  namespace: {namespace}
  creationTimestamp: {created}
spec:
  gatewayClassName: {class}
  listeners:
  - name: http
    port: 80
    protocol: HTTP
"
        ))
    }

    #[test]
    fn no_gateways_for_class() {
        let gateways = [gateway("gw", "test", "other", "2024-01-01T00:00:00Z")];
        let selection = select_gateways(&gateways, "kubvernor");
        assert!(selection.winner.is_none());
        assert!(selection.ignored.is_empty());
    }

    #[test]
    fn oldest_gateway_wins() {
        let gateways = [
            gateway("newer", "test", "kubvernor", "2024-02-01T00:00:00Z"),
            gateway("older", "test", "kubvernor", "2024-01-01T00:00:00Z"),
            gateway("foreign", "test", "other", "2023-01-01T00:00:00Z"),
        ];
        let selection = select_gateways(&gateways, "kubvernor");
        assert_eq!(selection.winner.map(ResourceKey::from), Some(ResourceKey::gateway("older", "test")));
        assert_eq!(selection.ignored.keys().cloned().collect::<Vec<_>>(), vec![ResourceKey::gateway("newer", "test")]);
    }

    #[test]
    fn ties_are_broken_by_namespace_then_name() {
        let created = "2024-01-01T00:00:00Z";
        let gateways = [
            gateway("a", "zeta", "kubvernor", created),
            gateway("b", "alpha", "kubvernor", created),
            gateway("a", "alpha", "kubvernor", created),
        ];
        let selection = select_gateways(&gateways, "kubvernor");
        assert_eq!(selection.winner.map(ResourceKey::from), Some(ResourceKey::gateway("a", "alpha")));
        assert_eq!(selection.ignored.len(), 2);
    }

    #[test]
    fn selection_does_not_depend_on_input_order() {
        let mut gateways = vec![
            gateway("gw1", "test", "kubvernor", "2024-03-01T00:00:00Z"),
            gateway("gw2", "test", "kubvernor", "2024-01-01T00:00:00Z"),
            gateway("gw3", "other", "kubvernor", "2024-01-01T00:00:00Z"),
        ];
        let expected = ResourceKey::gateway("gw3", "other");
        for _ in 0..gateways.len() {
            gateways.rotate_left(1);
            let selection = select_gateways(&gateways, "kubvernor");
            let winner = selection.winner.unwrap();
            assert_eq!(ResourceKey::from(winner), expected);
            for ignored in selection.ignored.values() {
                assert!(winner.metadata.creation_timestamp <= ignored.metadata.creation_timestamp);
            }
        }
    }
}

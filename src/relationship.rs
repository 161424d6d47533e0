use std::collections::{BTreeMap, BTreeSet};

use gateway_api::apis::standard::{
    gatewayclasses::{GatewayClass, GatewayClassParametersRef},
    gateways::Gateway,
    httproutes::HTTPRoute,
};
use k8s_openapi::api::{
    core::v1::{Namespace, Service},
    discovery::v1::EndpointSlice,
};
use kube::ResourceExt;
use tracing::{debug, warn};

use crate::common::{allowed_routes_selector, LabelSelector, ResourceKey, PARAMETERS_REF_GROUP, PARAMETERS_REF_KIND};

const TARGET: &str = "kubvernor_graph::relationship";

pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    GatewayClass,
    Gateway,
    HTTPRoute,
    Service,
    EndpointSlice,
    Namespace,
    /// The extension resource a GatewayClass points at through `parametersRef`.
    ProxyParameters,
}

#[derive(Clone, Copy, Debug)]
pub enum TrackedResource<'a> {
    GatewayClass(&'a GatewayClass),
    Gateway(&'a Gateway),
    HTTPRoute(&'a HTTPRoute),
    Service(&'a Service),
    EndpointSlice(&'a EndpointSlice),
    Namespace(&'a Namespace),
    ProxyParameters(&'a ResourceKey),
}

impl TrackedResource<'_> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            TrackedResource::GatewayClass(_) => ResourceKind::GatewayClass,
            TrackedResource::Gateway(_) => ResourceKind::Gateway,
            TrackedResource::HTTPRoute(_) => ResourceKind::HTTPRoute,
            TrackedResource::Service(_) => ResourceKind::Service,
            TrackedResource::EndpointSlice(_) => ResourceKind::EndpointSlice,
            TrackedResource::Namespace(_) => ResourceKind::Namespace,
            TrackedResource::ProxyParameters(_) => ResourceKind::ProxyParameters,
        }
    }

    pub fn key(&self) -> ResourceKey {
        match self {
            TrackedResource::GatewayClass(resource) => ResourceKey::from(*resource),
            TrackedResource::Gateway(resource) => ResourceKey::from(*resource),
            TrackedResource::HTTPRoute(resource) => ResourceKey::from(*resource),
            TrackedResource::Service(resource) => ResourceKey::from(*resource),
            TrackedResource::EndpointSlice(resource) => ResourceKey::from(*resource),
            TrackedResource::Namespace(resource) => ResourceKey::from(*resource),
            TrackedResource::ProxyParameters(key) => (*key).clone(),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct NamespaceEntry {
    labels: BTreeMap<String, String>,
    gateways: BTreeSet<ResourceKey>,
}

/// Incrementally maintained index telling the event loop whether a changed resource can affect the graph.
///
/// The tracker is not synchronized. It expects a single logical caller; callers sharing it across tasks wrap it in a
/// mutex held across `capture`, `remove` and `exists`.
#[derive(Debug, Default)]
pub struct RelationshipTracker {
    gateway_class_name: String,
    route_to_services: BTreeMap<ResourceKey, BTreeSet<ResourceKey>>,
    service_ref_count: BTreeMap<ResourceKey, usize>,
    endpoint_slice_owners: BTreeMap<ResourceKey, ResourceKey>,
    gateway_label_selectors: BTreeMap<ResourceKey, Vec<LabelSelector>>,
    namespaces: BTreeMap<ResourceKey, NamespaceEntry>,
    parameters_ref: Option<GatewayClassParametersRef>,
}

impl RelationshipTracker {
    pub fn new(gateway_class_name: &str) -> Self {
        Self { gateway_class_name: gateway_class_name.to_owned(), ..Default::default() }
    }

    /// Idempotent upsert.
    pub fn capture(&mut self, resource: TrackedResource<'_>) {
        match resource {
            TrackedResource::GatewayClass(gateway_class) => self.capture_gateway_class(gateway_class),
            TrackedResource::Gateway(gateway) => self.capture_gateway(gateway),
            TrackedResource::HTTPRoute(route) => self.capture_route(route),
            TrackedResource::EndpointSlice(endpoint_slice) => self.capture_endpoint_slice(endpoint_slice),
            TrackedResource::Namespace(namespace) => self.capture_namespace(namespace),
            TrackedResource::Service(_) | TrackedResource::ProxyParameters(_) => {},
        }
    }

    /// Removing something that is not tracked is a no-op.
    pub fn remove(&mut self, kind: ResourceKind, key: &ResourceKey) {
        match kind {
            ResourceKind::GatewayClass => {
                if key.name == self.gateway_class_name {
                    self.parameters_ref = None;
                }
            },
            ResourceKind::Gateway => {
                self.gateway_label_selectors.remove(key);
                for entry in self.namespaces.values_mut() {
                    entry.gateways.remove(key);
                }
            },
            ResourceKind::HTTPRoute => {
                if let Some(services) = self.route_to_services.remove(key) {
                    for service in &services {
                        self.decrement_ref_count(service);
                    }
                }
            },
            ResourceKind::EndpointSlice => {
                self.endpoint_slice_owners.remove(key);
            },
            ResourceKind::Namespace => {
                self.namespaces.remove(key);
            },
            ResourceKind::Service | ResourceKind::ProxyParameters => {},
        }
    }

    /// Gateway, GatewayClass and HTTPRoute changes are always relevant.
    pub fn exists(&self, kind: ResourceKind, key: &ResourceKey) -> bool {
        match kind {
            ResourceKind::GatewayClass | ResourceKind::Gateway | ResourceKind::HTTPRoute => true,
            ResourceKind::Service => self.ref_count(key) > 0,
            ResourceKind::EndpointSlice => self.endpoint_slice_owners.get(key).is_some_and(|service| self.ref_count(service) > 0),
            ResourceKind::Namespace => self.namespaces.get(key).is_some_and(|entry| !entry.gateways.is_empty()),
            ResourceKind::ProxyParameters => self.parameters_ref.as_ref().is_some_and(|parameters_ref| {
                parameters_ref.group == PARAMETERS_REF_GROUP
                    && parameters_ref.kind == PARAMETERS_REF_KIND
                    && parameters_ref.name == key.name
                    && parameters_ref.namespace.as_deref() == Some(key.namespace.as_str())
            }),
        }
    }

    pub fn ref_count(&self, service: &ResourceKey) -> usize {
        self.service_ref_count.get(service).copied().unwrap_or_default()
    }

    fn capture_gateway_class(&mut self, gateway_class: &GatewayClass) {
        if gateway_class.name_any() == self.gateway_class_name {
            self.parameters_ref.clone_from(&gateway_class.spec.parameters_ref);
        }
    }

    fn capture_route(&mut self, route: &HTTPRoute) {
        let route_key = ResourceKey::from(route);
        let services = backend_services(route, &route_key.namespace);
        let previous = self.route_to_services.get(&route_key).cloned().unwrap_or_default();

        for added in services.difference(&previous) {
            *self.service_ref_count.entry(added.clone()).or_default() += 1;
            debug!(target: TARGET, "Service {added} referenced by {route_key} count {}", self.ref_count(added));
        }
        for removed in previous.difference(&services) {
            self.decrement_ref_count(removed);
        }

        if services.is_empty() {
            self.route_to_services.remove(&route_key);
        } else {
            self.route_to_services.insert(route_key, services);
        }
    }

    fn decrement_ref_count(&mut self, service: &ResourceKey) {
        match self.service_ref_count.get_mut(service) {
            Some(count) if *count > 1 => {
                *count -= 1;
                debug!(target: TARGET, "Service {service} count {count}");
            },
            Some(_) => {
                self.service_ref_count.remove(service);
                debug!(target: TARGET, "Service {service} no longer referenced");
            },
            None => warn!(target: TARGET, "Service {service} has no references to remove"),
        }
    }

    fn capture_endpoint_slice(&mut self, endpoint_slice: &EndpointSlice) {
        let key = ResourceKey::from(endpoint_slice);
        let Some(service_name) = endpoint_slice.labels().get(SERVICE_NAME_LABEL) else {
            self.endpoint_slice_owners.remove(&key);
            return;
        };
        let owner = ResourceKey::service(service_name, &key.namespace);
        self.endpoint_slice_owners.insert(key, owner);
    }

    fn capture_gateway(&mut self, gateway: &Gateway) {
        let key = ResourceKey::from(gateway);
        let selectors: Vec<LabelSelector> = gateway
            .spec
            .listeners
            .iter()
            .filter_map(allowed_routes_selector)
            .filter_map(|selector| match selector {
                Ok(selector) => Some(selector),
                Err(e) => {
                    debug!(target: TARGET, "Gateway {key} has an unusable namespace selector {e}");
                    None
                },
            })
            .collect();

        for entry in self.namespaces.values_mut() {
            if selectors.iter().any(|selector| selector.matches(&entry.labels)) {
                entry.gateways.insert(key.clone());
            } else {
                entry.gateways.remove(&key);
            }
        }

        if selectors.is_empty() {
            self.gateway_label_selectors.remove(&key);
        } else {
            self.gateway_label_selectors.insert(key, selectors);
        }
    }

    fn capture_namespace(&mut self, namespace: &Namespace) {
        let labels = namespace.labels().clone();
        let gateways = self
            .gateway_label_selectors
            .iter()
            .filter(|(_, selectors)| selectors.iter().any(|selector| selector.matches(&labels)))
            .map(|(gateway, _)| gateway.clone())
            .collect();
        self.namespaces.insert(ResourceKey::from(namespace), NamespaceEntry { labels, gateways });
    }
}

/// Services named by backendRefs of every rule, whether or not the ref would validate.
fn backend_services(route: &HTTPRoute, route_namespace: &str) -> BTreeSet<ResourceKey> {
    route
        .spec
        .rules
        .iter()
        .flatten()
        .flat_map(|rule| rule.backend_refs.iter().flatten())
        .filter(|backend_ref| matches!(backend_ref.kind.as_deref(), None | Some("Service")))
        .map(|backend_ref| {
            let namespace = backend_ref.namespace.as_deref().filter(|namespace| !namespace.is_empty()).unwrap_or(route_namespace);
            ResourceKey::service(&backend_ref.name, namespace)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test::{endpoint_slice, gateway_class_from_yaml, gateway_from_yaml, http_route_from_yaml, namespace, service};

    fn route(name: &str, services: &[&str]) -> HTTPRoute {
        let backend_refs: String = services.iter().map(|service| format!("\n    - name: {service}\n      port: 80")).collect();
        http_route_from_yaml(&format!(
            r"
apiVersion: gateway.networking.k8s.io/v1
kind: HTTPRoute
metadata:
  name: {name}
  namespace: test
spec:
  rules:
  - backendRefs:{backend_refs}
"
        ))
    }

    fn selecting_gateway(name: &str, env: &str) -> Gateway {
        gateway_from_yaml(&format!(
            r"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  name: {name}
  namespace: test
spec:
  gatewayClassName: kubvernor
  listeners:
  - name: http
    port: 80
    protocol: HTTP
    allowedRoutes:
      namespaces:
        from: Selector
        selector:
          matchLabels:
            env: {env}
"
        ))
    }

    fn svc(name: &str) -> ResourceKey {
        ResourceKey::service(name, "test")
    }

    #[test]
    fn ref_count_conservation() {
        let mut tracker = RelationshipTracker::new("kubvernor");
        let routes: Vec<_> = (0..3).map(|i| route(&format!("hr{i}"), &["svc1"])).collect();
        for route in &routes {
            tracker.capture(TrackedResource::HTTPRoute(route));
        }
        assert_eq!(tracker.ref_count(&svc("svc1")), 3);
        assert!(tracker.exists(ResourceKind::Service, &svc("svc1")));

        for route in &routes {
            tracker.remove(ResourceKind::HTTPRoute, &ResourceKey::from(route));
        }
        assert_eq!(tracker.ref_count(&svc("svc1")), 0);
        assert!(!tracker.service_ref_count.contains_key(&svc("svc1")));
        assert!(!tracker.exists(ResourceKind::Service, &svc("svc1")));
    }

    #[test]
    fn recapture_only_applies_the_delta() {
        let mut tracker = RelationshipTracker::new("kubvernor");
        tracker.capture(TrackedResource::HTTPRoute(&route("hr1", &["svc1", "svc2"])));
        tracker.capture(TrackedResource::HTTPRoute(&route("hr1", &["svc1", "svc2"])));
        assert_eq!(tracker.ref_count(&svc("svc1")), 1);

        tracker.capture(TrackedResource::HTTPRoute(&route("hr1", &["svc2", "svc3"])));
        assert_eq!(tracker.ref_count(&svc("svc1")), 0);
        assert_eq!(tracker.ref_count(&svc("svc2")), 1);
        assert_eq!(tracker.ref_count(&svc("svc3")), 1);
    }

    #[test]
    fn removal_is_idempotent() {
        let mut tracker = RelationshipTracker::new("kubvernor");
        let hr1 = route("hr1", &["svc1"]);
        tracker.capture(TrackedResource::HTTPRoute(&hr1));
        tracker.capture(TrackedResource::HTTPRoute(&route("hr2", &["svc1"])));

        tracker.remove(ResourceKind::HTTPRoute, &ResourceKey::from(&hr1));
        tracker.remove(ResourceKind::HTTPRoute, &ResourceKey::from(&hr1));
        assert_eq!(tracker.ref_count(&svc("svc1")), 1);
    }

    #[test]
    fn only_service_backend_refs_count() {
        let mut tracker = RelationshipTracker::new("kubvernor");
        let mut hr = route("hr1", &["svc1", "svc2"]);
        if let Some(rules) = hr.spec.rules.as_mut() {
            if let Some(backend_refs) = rules[0].backend_refs.as_mut() {
                backend_refs[1].kind = Some("ConfigMap".to_owned());
            }
        }
        tracker.capture(TrackedResource::HTTPRoute(&hr));
        assert!(tracker.exists(ResourceKind::Service, &svc("svc1")));
        assert!(!tracker.exists(ResourceKind::Service, &svc("svc2")));
    }

    #[test]
    fn endpoint_slices_follow_their_service() {
        let mut tracker = RelationshipTracker::new("kubvernor");
        let slice = endpoint_slice("svc1-abc", "test", Some("svc1"));
        let orphan = endpoint_slice("orphan", "test", None);
        tracker.capture(TrackedResource::EndpointSlice(&slice));
        tracker.capture(TrackedResource::EndpointSlice(&orphan));
        assert!(!tracker.exists(ResourceKind::EndpointSlice, &ResourceKey::from(&slice)));

        tracker.capture(TrackedResource::HTTPRoute(&route("hr1", &["svc1"])));
        tracker.capture(TrackedResource::Service(&service("svc1", "test")));
        assert!(tracker.exists(ResourceKind::EndpointSlice, &ResourceKey::from(&slice)));
        assert!(!tracker.exists(ResourceKind::EndpointSlice, &ResourceKey::from(&orphan)));

        tracker.remove(ResourceKind::EndpointSlice, &ResourceKey::from(&slice));
        assert!(!tracker.exists(ResourceKind::EndpointSlice, &ResourceKey::from(&slice)));
    }

    #[test]
    fn namespaces_match_gateway_selectors_both_ways() {
        let mut tracker = RelationshipTracker::new("kubvernor");
        let prod = namespace("prod", &[("env", "prod")]);
        let dev = namespace("dev", &[("env", "dev")]);
        tracker.capture(TrackedResource::Namespace(&prod));
        assert!(!tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&prod)));

        let gateway = selecting_gateway("gw", "prod");
        tracker.capture(TrackedResource::Gateway(&gateway));
        tracker.capture(TrackedResource::Namespace(&dev));
        assert!(tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&prod)));
        assert!(!tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&dev)));

        tracker.capture(TrackedResource::Gateway(&selecting_gateway("gw", "dev")));
        assert!(!tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&prod)));
        assert!(tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&dev)));

        tracker.remove(ResourceKind::Gateway, &ResourceKey::from(&gateway));
        assert!(!tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&dev)));

        tracker.capture(TrackedResource::Gateway(&gateway));
        assert!(tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&prod)));
        tracker.remove(ResourceKind::Namespace, &ResourceKey::from(&prod));
        assert!(!tracker.exists(ResourceKind::Namespace, &ResourceKey::from(&prod)));
    }

    #[test]
    fn parameters_ref_of_own_class_only() {
        let class = |name: &str| {
            gateway_class_from_yaml(&format!(
                r"
apiVersion: gateway.networking.k8s.io/v1
kind: GatewayClass
metadata:
  name: {name}
spec:
  controllerName: kubvernor.com/proxy-controller
  parametersRef:
    group: graph.kubvernor.io
    kind: ProxyParameters
    name: proxy
    namespace: kubvernor
"
            ))
        };
        let parameters = ResourceKey {
            group: PARAMETERS_REF_GROUP.to_owned(),
            namespace: "kubvernor".to_owned(),
            name: "proxy".to_owned(),
            kind: PARAMETERS_REF_KIND.to_owned(),
        };

        let mut tracker = RelationshipTracker::new("kubvernor");
        tracker.capture(TrackedResource::GatewayClass(&class("other")));
        assert!(!tracker.exists(ResourceKind::ProxyParameters, &parameters));

        let own = class("kubvernor");
        tracker.capture(TrackedResource::GatewayClass(&own));
        assert!(tracker.exists(ResourceKind::ProxyParameters, &parameters));
        assert!(!tracker.exists(ResourceKind::ProxyParameters, &ResourceKey { name: "other".to_owned(), ..parameters.clone() }));

        tracker.remove(ResourceKind::GatewayClass, &ResourceKey::from(&own));
        assert!(!tracker.exists(ResourceKind::ProxyParameters, &parameters));
    }

    #[test]
    fn tracked_resource_dispatch() {
        let hr = route("hr1", &[]);
        let resource = TrackedResource::HTTPRoute(&hr);
        assert_eq!(resource.kind(), ResourceKind::HTTPRoute);
        assert_eq!(resource.key(), ResourceKey::http_route("hr1", "test"));
    }
}

use std::fmt::Display;

use gateway_api::apis::standard::{
    gatewayclasses::GatewayClass, gateways::Gateway, httproutes::HTTPRoute, referencegrants::ReferenceGrant,
};
use k8s_openapi::api::{
    core::v1::{Namespace, Secret, Service},
    discovery::v1::EndpointSlice,
};
use kube::ResourceExt;
use serde::{Serialize, Serializer};

pub const DEFAULT_GROUP_NAME: &str = "gateway.networking.k8s.io";
pub const CORE_GROUP_NAME: &str = "";
pub const DISCOVERY_GROUP_NAME: &str = "discovery.k8s.io";
pub const DEFAULT_NAMESPACE_NAME: &str = "default";
pub const DEFAULT_KIND_NAME: &str = "Gateway";

pub const GATEWAY_CLASS_KIND: &str = "GatewayClass";
pub const HTTP_ROUTE_KIND: &str = "HTTPRoute";
pub const REFERENCE_GRANT_KIND: &str = "ReferenceGrant";
pub const SERVICE_KIND: &str = "Service";
pub const SECRET_KIND: &str = "Secret";
pub const NAMESPACE_KIND: &str = "Namespace";
pub const ENDPOINT_SLICE_KIND: &str = "EndpointSlice";

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceKey {
    pub group: String,
    pub namespace: String,
    pub name: String,
    pub kind: String,
}

impl ResourceKey {
    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_owned(),
            namespace: namespace.to_owned(),
            ..Default::default()
        }
    }

    pub fn service(name: &str, namespace: &str) -> Self {
        Self {
            group: CORE_GROUP_NAME.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: SERVICE_KIND.to_owned(),
        }
    }

    pub fn secret(name: &str, namespace: &str) -> Self {
        Self {
            group: CORE_GROUP_NAME.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: SECRET_KIND.to_owned(),
        }
    }

    pub fn http_route(name: &str, namespace: &str) -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: HTTP_ROUTE_KIND.to_owned(),
        }
    }

    pub fn gateway(name: &str, namespace: &str) -> Self {
        Self::namespaced(name, namespace)
    }

    pub fn cluster_namespace(name: &str) -> Self {
        Self {
            group: CORE_GROUP_NAME.to_owned(),
            namespace: String::new(),
            name: name.to_owned(),
            kind: NAMESPACE_KIND.to_owned(),
        }
    }

    pub fn endpoint_slice(name: &str, namespace: &str) -> Self {
        Self {
            group: DISCOVERY_GROUP_NAME.to_owned(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
            kind: ENDPOINT_SLICE_KIND.to_owned(),
        }
    }

    pub fn gateway_class(name: &str) -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: String::new(),
            name: name.to_owned(),
            kind: GATEWAY_CLASS_KIND.to_owned(),
        }
    }
}

impl Default for ResourceKey {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: DEFAULT_NAMESPACE_NAME.to_owned(),
            name: String::default(),
            kind: DEFAULT_KIND_NAME.to_owned(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl Serialize for ResourceKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn namespace_or_default(namespace: Option<String>) -> String {
    namespace.unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned())
}

impl From<&GatewayClass> for ResourceKey {
    fn from(value: &GatewayClass) -> Self {
        Self::gateway_class(&value.name_any())
    }
}

impl From<&Gateway> for ResourceKey {
    fn from(value: &Gateway) -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: namespace_or_default(value.namespace()),
            name: value.name_any(),
            kind: DEFAULT_KIND_NAME.to_owned(),
        }
    }
}

impl From<&HTTPRoute> for ResourceKey {
    fn from(value: &HTTPRoute) -> Self {
        Self::http_route(&value.name_any(), &namespace_or_default(value.namespace()))
    }
}

impl From<&ReferenceGrant> for ResourceKey {
    fn from(value: &ReferenceGrant) -> Self {
        Self {
            group: DEFAULT_GROUP_NAME.to_owned(),
            namespace: namespace_or_default(value.namespace()),
            name: value.name_any(),
            kind: REFERENCE_GRANT_KIND.to_owned(),
        }
    }
}

impl From<&Service> for ResourceKey {
    fn from(value: &Service) -> Self {
        Self::service(&value.name_any(), &namespace_or_default(value.namespace()))
    }
}

impl From<&Secret> for ResourceKey {
    fn from(value: &Secret) -> Self {
        Self::secret(&value.name_any(), &namespace_or_default(value.namespace()))
    }
}

impl From<&Namespace> for ResourceKey {
    fn from(value: &Namespace) -> Self {
        Self::cluster_namespace(&value.name_any())
    }
}

impl From<&EndpointSlice> for ResourceKey {
    fn from(value: &EndpointSlice) -> Self {
        Self::endpoint_slice(&value.name_any(), &namespace_or_default(value.namespace()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_namespace_and_name() {
        assert_eq!(ResourceKey::http_route("hr1", "test").to_string(), "test/hr1");
        assert_eq!(ResourceKey::gateway_class("nginx").to_string(), "nginx");
    }

    #[test]
    fn keys_differ_by_kind() {
        assert_ne!(ResourceKey::gateway("gw", "test"), ResourceKey::http_route("gw", "test"));
        assert_eq!(ResourceKey::gateway("gw", "test").kind, DEFAULT_KIND_NAME);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&ResourceKey::service("svc1", "test")).unwrap();
        assert_eq!(json, "\"test/svc1\"");
    }
}

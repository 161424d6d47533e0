use std::collections::{BTreeMap, BTreeSet};

use gateway_api::apis::standard::referencegrants::{ReferenceGrant, ReferenceGrantFrom, ReferenceGrantTo};
use kube::ResourceExt;
use tracing::debug;

use crate::common::{resource_key::CORE_GROUP_NAME, ResourceKey, DEFAULT_NAMESPACE_NAME};

const TARGET: &str = "kubvernor_graph::reference_grants";

#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FromResourceKey {
    pub group: String,
    pub namespace: String,
    pub kind: String,
}

impl From<&ResourceKey> for FromResourceKey {
    fn from(rk: &ResourceKey) -> Self {
        Self {
            group: normalize_group(&rk.group),
            namespace: rk.namespace.clone(),
            kind: rk.kind.clone(),
        }
    }
}

impl From<&ReferenceGrantFrom> for FromResourceKey {
    fn from(rk: &ReferenceGrantFrom) -> Self {
        Self {
            group: normalize_group(&rk.group),
            namespace: rk.namespace.clone(),
            kind: rk.kind.clone(),
        }
    }
}

/// Target of a grant. A grant without a name covers every object of the kind in its namespace.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ToResourceKey {
    pub group: String,
    pub namespace: String,
    pub name: Option<String>,
    pub kind: String,
}

impl ToResourceKey {
    fn from_grant(to: &ReferenceGrantTo, namespace: &str) -> Self {
        Self {
            group: normalize_group(&to.group),
            namespace: namespace.to_owned(),
            name: to.name.clone().filter(|name| !name.is_empty()),
            kind: to.kind.clone(),
        }
    }

    fn any_name(&self) -> Self {
        Self { name: None, ..self.clone() }
    }
}

impl From<&ResourceKey> for ToResourceKey {
    fn from(rk: &ResourceKey) -> Self {
        Self {
            group: normalize_group(&rk.group),
            namespace: rk.namespace.clone(),
            name: if rk.name.is_empty() { None } else { Some(rk.name.clone()) },
            kind: rk.kind.clone(),
        }
    }
}

fn normalize_group(group: &str) -> String {
    if group == "core" { CORE_GROUP_NAME.to_owned() } else { group.to_owned() }
}

/// Answers whether a cross-namespace reference is allowed by some ReferenceGrant.
#[derive(Clone, Debug, Default)]
pub struct ReferenceGrantIndex {
    allowed: BTreeSet<(ToResourceKey, FromResourceKey)>,
}

impl ReferenceGrantIndex {
    pub fn new<'a>(reference_grants: impl IntoIterator<Item = &'a ReferenceGrant>) -> Self {
        let mut allowed = BTreeSet::new();
        for grant in reference_grants {
            let namespace = grant.namespace().unwrap_or(DEFAULT_NAMESPACE_NAME.to_owned());
            for to in &grant.spec.to {
                let to = ToResourceKey::from_grant(to, &namespace);
                for from in &grant.spec.from {
                    allowed.insert((to.clone(), FromResourceKey::from(from)));
                }
            }
        }
        debug!(target: TARGET, "Indexed {} allowed references", allowed.len());
        Self { allowed }
    }

    pub fn from_map(reference_grants: &BTreeMap<ResourceKey, ReferenceGrant>) -> Self {
        Self::new(reference_grants.values())
    }

    /// `from` carries the referring object's group, kind and namespace; `to` is the referenced object.
    pub fn is_allowed(&self, from: &ResourceKey, to: &ResourceKey) -> bool {
        let from = FromResourceKey::from(from);
        let to = ToResourceKey::from(to);
        self.allowed.contains(&(to.clone(), from.clone())) || self.allowed.contains(&(to.any_name(), from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test::reference_grant_from_yaml;

    fn grant(to_name: Option<&str>) -> ReferenceGrant {
        let name = to_name.map(|name| format!("\n    name: {name}")).unwrap_or_default();
        reference_grant_from_yaml(&format!(
            r"
apiVersion: gateway.networking.k8s.io/v1beta1
kind: ReferenceGrant
metadata:
  name: grant
  namespace: certs
spec:
  from:
  - group: gateway.networking.k8s.io
    kind: Gateway
    namespace: test
  to:
  - group: core
    kind: Secret{name}
"
        ))
    }

    fn gateway() -> ResourceKey {
        ResourceKey::gateway("gw", "test")
    }

    #[test]
    fn named_grant_allows_only_that_secret() {
        let index = ReferenceGrantIndex::new([&grant(Some("cert"))]);
        assert!(index.is_allowed(&gateway(), &ResourceKey::secret("cert", "certs")));
        assert!(!index.is_allowed(&gateway(), &ResourceKey::secret("other", "certs")));
    }

    #[test]
    fn unnamed_grant_allows_every_secret_in_namespace() {
        let index = ReferenceGrantIndex::new([&grant(None)]);
        assert!(index.is_allowed(&gateway(), &ResourceKey::secret("cert", "certs")));
        assert!(index.is_allowed(&gateway(), &ResourceKey::secret("other", "certs")));
        assert!(!index.is_allowed(&gateway(), &ResourceKey::secret("cert", "elsewhere")));
    }

    #[test]
    fn grant_is_specific_to_the_referring_namespace_and_kind() {
        let index = ReferenceGrantIndex::new([&grant(None)]);
        assert!(!index.is_allowed(&ResourceKey::gateway("gw", "other"), &ResourceKey::secret("cert", "certs")));
        assert!(!index.is_allowed(&ResourceKey::http_route("gw", "test"), &ResourceKey::secret("cert", "certs")));
    }

    #[test]
    fn empty_index_allows_nothing() {
        let index = ReferenceGrantIndex::default();
        assert!(!index.is_allowed(&gateway(), &ResourceKey::secret("cert", "certs")));
    }
}

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::common::{conditions, FieldError, Gateway, ParentRef, ParentRefAttachment, ResourceKey, Route, CATCH_ALL_HOSTNAME};

const TARGET: &str = "kubvernor_graph::route_binder";

/// Attaches valid Routes to the Listeners of the winning Gateway and records the outcome on every ParentRef.
pub fn bind_routes(routes: &mut BTreeMap<ResourceKey, Route>, mut gateway: Option<&mut Gateway>, ignored: &BTreeSet<ResourceKey>) {
    for route in routes.values_mut() {
        if !route.valid {
            continue;
        }
        let route_key = route.key.clone();
        let route_hostnames = route.hostnames().to_vec();
        let source_refs = route.source.spec.parent_refs.as_deref().unwrap_or_default();

        for parent_ref in &mut route.parent_refs {
            let port = source_refs.get(parent_ref.idx).and_then(|source_ref| source_ref.port);
            let attachment = bind_parent_ref(parent_ref, port, &route_key, &route_hostnames, gateway.as_deref_mut(), ignored);
            debug!(
                target: TARGET,
                "Route {route_key} parent {} section {:?} attached {:?}",
                parent_ref.gateway,
                parent_ref.section_name,
                attachment.as_ref().map(|attachment| attachment.attached)
            );
            parent_ref.attachment = attachment;
        }
    }
}

fn bind_parent_ref(
    parent_ref: &ParentRef,
    port: Option<i32>,
    route_key: &ResourceKey,
    route_hostnames: &[String],
    gateway: Option<&mut Gateway>,
    ignored: &BTreeSet<ResourceKey>,
) -> Option<ParentRefAttachment> {
    let is_winner = gateway.as_ref().is_some_and(|gateway| gateway.key == parent_ref.gateway);
    if !is_winner && !ignored.contains(&parent_ref.gateway) {
        return None;
    }

    let path = format!("spec.parentRefs[{}]", parent_ref.idx);
    if parent_ref.section_name.is_empty() {
        let error = FieldError::required(format!("{path}.sectionName"), "cannot be empty");
        return Some(ParentRefAttachment::failed(conditions::route::unsupported_value(&error.to_string())));
    }
    if port.is_some() {
        let error = FieldError::forbidden(format!("{path}.port"), "cannot be set");
        return Some(ParentRefAttachment::failed(conditions::route::unsupported_value(&error.to_string())));
    }

    if ignored.contains(&parent_ref.gateway) {
        return Some(ParentRefAttachment::failed(conditions::route::gateway_ignored()));
    }
    let gateway = gateway?;

    let Some(listener) = gateway.listener_mut(&parent_ref.section_name) else {
        return Some(ParentRefAttachment::failed(conditions::route::no_matching_parent()));
    };
    if !listener.valid {
        return Some(ParentRefAttachment::failed(conditions::route::invalid_listener()));
    }

    let accepted = accepted_hostnames(listener.hostname(), route_hostnames);
    if accepted.is_empty() {
        return Some(ParentRefAttachment::failed(conditions::route::no_matching_listener_hostname()));
    }

    listener.accepted_hostnames.extend(accepted);
    listener.routes.insert(route_key.clone());
    Some(ParentRefAttachment::attached())
}

/// Exact hostname intersection. A Listener without hostname accepts every Route hostname; a Route without hostnames
/// gets whatever the Listener accepts.
pub fn accepted_hostnames(listener_hostname: &str, route_hostnames: &[String]) -> Vec<String> {
    if route_hostnames.is_empty() {
        let hostname = if listener_hostname.is_empty() { CATCH_ALL_HOSTNAME } else { listener_hostname };
        return vec![hostname.to_owned()];
    }

    route_hostnames.iter().filter(|hostname| listener_hostname.is_empty() || *hostname == listener_hostname).cloned().collect()
}

use std::collections::BTreeMap;

use gateway_api::apis::standard::httproutes::HTTPRouteRulesBackendRefs;
use k8s_openapi::api::core::v1::Service;
use serde::Serialize;
use tracing::{debug, warn};

use crate::common::{
    conditions,
    resource_key::{CORE_GROUP_NAME, SERVICE_KIND},
    Condition, FieldError, InvariantViolation, ResourceKey, Route,
};

const TARGET: &str = "kubvernor_graph::backends";

const MIN_WEIGHT: i32 = 0;
const MAX_WEIGHT: i32 = 1_000_000;
const DEFAULT_WEIGHT: i32 = 1;

/// The backends of one route rule. Config generation emits one upstream per group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackendGroup {
    pub source: ResourceKey,
    pub rule_idx: usize,
    pub backends: Vec<BackendRef>,
}

impl BackendGroup {
    pub fn new(source: ResourceKey, rule_idx: usize) -> Self {
        Self { source, rule_idx, backends: vec![] }
    }

    /// Kubernetes names never contain `_`, so the name is unique per route and rule.
    pub fn group_name(&self) -> String {
        format!("{}_{}_rule{}", self.source.namespace, self.source.name, self.rule_idx)
    }
}

/// One backendRef of a rule. Invalid refs stay in the group with `valid == false` so the data plane can answer them
/// with an error instead of dropping the traffic share.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackendRef {
    pub name: String,
    pub service: Option<ResourceKey>,
    pub port: i32,
    /// Zero means configured but receiving no traffic.
    pub weight: i32,
    pub valid: bool,
}

impl BackendRef {
    fn invalid(weight: i32) -> Self {
        Self { weight, ..Default::default() }
    }
}

pub fn add_backend_groups(routes: &mut BTreeMap<ResourceKey, Route>, services: &BTreeMap<ResourceKey, Service>) -> Result<(), InvariantViolation> {
    for route in routes.values_mut() {
        add_backend_groups_to_route(route, services)?;
    }
    Ok(())
}

fn add_backend_groups_to_route(route: &mut Route, services: &BTreeMap<ResourceKey, Service>) -> Result<(), InvariantViolation> {
    if !route.valid {
        return Ok(());
    }

    let source_rules = route.source.spec.rules.as_deref().unwrap_or_default();
    for (idx, source_rule) in source_rules.iter().enumerate() {
        let Some(rule) = route.rules.get_mut(idx) else {
            continue;
        };
        if !rule.valid_matches || !rule.valid_filters {
            continue;
        }

        // a rule without backends is fine, e.g. a redirect
        let backend_refs = source_rule.backend_refs.as_deref().unwrap_or_default();
        if backend_refs.is_empty() {
            continue;
        }

        let mut backends = Vec::with_capacity(backend_refs.len());
        for (ref_idx, backend_ref) in backend_refs.iter().enumerate() {
            let path = format!("spec.rules[{idx}].backendRefs[{ref_idx}]");
            let (backend, condition) = create_backend(backend_ref, &route.key, services, &path)?;
            backends.push(backend);
            if let Some(condition) = condition {
                route.conditions.push(condition);
            }
        }
        rule.backend_group.backends = backends;
    }
    Ok(())
}

fn create_backend(
    backend_ref: &HTTPRouteRulesBackendRefs,
    route_key: &ResourceKey,
    services: &BTreeMap<ResourceKey, Service>,
    path: &str,
) -> Result<(BackendRef, Option<Condition>), InvariantViolation> {
    let weight = match backend_ref.weight {
        None => DEFAULT_WEIGHT,
        Some(weight) if validate_weight(weight).is_ok() => weight,
        Some(_) => 0,
    };

    if let Err(condition) = validate_backend_ref(backend_ref, &route_key.namespace, path) {
        warn!(target: TARGET, "Invalid backend ref {path} in {route_key}: {}", condition.message);
        return Ok((BackendRef::invalid(weight), Some(condition)));
    }

    let Some(port) = backend_ref.port else {
        return Err(InvariantViolation::MissingBackendPort { route: route_key.clone(), path: path.to_owned() });
    };

    let service_key = ResourceKey::service(&backend_ref.name, &route_key.namespace);
    let Some(service) = services.get(&service_key) else {
        let error = FieldError::not_found(format!("{path}.name"), &backend_ref.name);
        debug!(target: TARGET, "Backend service {service_key} not found for {route_key}");
        return Ok((BackendRef::invalid(weight), Some(conditions::route::backend_ref_not_found(&error.to_string()))));
    };
    if !exposes_port(service, port) {
        let message = format!("{path}: no matching port for Service {} and port {port}", service_key.name);
        debug!(target: TARGET, "Backend service {service_key} has no port {port} for {route_key}");
        return Ok((BackendRef::invalid(weight), Some(conditions::route::backend_ref_not_found(&message))));
    }

    let backend = BackendRef {
        name: format!("{}_{}_{}", service_key.namespace, service_key.name, port),
        service: Some(service_key),
        port,
        weight,
        valid: true,
    };
    Ok((backend, None))
}

/// Returns the condition for the first problem found.
fn validate_backend_ref(backend_ref: &HTTPRouteRulesBackendRefs, route_namespace: &str, path: &str) -> Result<(), Condition> {
    let filters = backend_ref.filters.as_ref().map_or(0, Vec::len);
    if filters > 0 {
        let error = FieldError::too_many(format!("{path}.filters"), filters, 0);
        return Err(conditions::route::backend_ref_unsupported_value(&error.to_string()));
    }

    if let Some(group) = backend_ref.group.as_deref() {
        if group != "core" && group != CORE_GROUP_NAME {
            let error = FieldError::not_supported(format!("{path}.group"), group, &["core", ""]);
            return Err(conditions::route::backend_ref_invalid_kind(&error.to_string()));
        }
    }

    if let Some(kind) = backend_ref.kind.as_deref() {
        if kind != SERVICE_KIND {
            let error = FieldError::not_supported(format!("{path}.kind"), kind, &[SERVICE_KIND]);
            return Err(conditions::route::backend_ref_invalid_kind(&error.to_string()));
        }
    }

    if let Some(namespace) = backend_ref.namespace.as_deref() {
        if namespace != route_namespace {
            let error = FieldError::invalid(format!("{path}.namespace"), namespace, "cross-namespace routing is not permitted");
            return Err(conditions::route::backend_ref_not_permitted(&error.to_string()));
        }
    }

    if let Some(weight) = backend_ref.weight {
        if let Err(detail) = validate_weight(weight) {
            let error = FieldError::invalid(format!("{path}.weight"), weight, detail);
            return Err(conditions::route::backend_ref_unsupported_value(&error.to_string()));
        }
    }

    Ok(())
}

fn exposes_port(service: &Service, port: i32) -> bool {
    service.spec.iter().flat_map(|spec| spec.ports.iter().flatten()).any(|service_port| service_port.port == port)
}

fn validate_weight(weight: i32) -> Result<(), String> {
    if (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
        Ok(())
    } else {
        Err(format!("must be in the range [{MIN_WEIGHT}, {MAX_WEIGHT}]"))
    }
}

mod route_listener_matcher;

use std::collections::{BTreeMap, BTreeSet};

use gateway_api::apis::standard::{
    gatewayclasses::GatewayClass as KubeGatewayClass, gateways::Gateway as KubeGateway, httproutes::HTTPRoute,
    referencegrants::ReferenceGrant,
};
use k8s_openapi::api::core::v1::{Secret, Service};
pub use route_listener_matcher::accepted_hostnames;
use route_listener_matcher::bind_routes;
use serde::Serialize;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use crate::{
    common::{
        add_backend_groups, build_gateway_class, build_listeners, build_routes, conditions, select_gateways, BackendGroup, Condition,
        Gateway, GatewayClass, InvariantViolation, Listener, ReferenceGrantIndex, ResolvedSecret, ResourceKey, Route, SecretResolver,
    },
    configuration::Configuration,
};

const TARGET: &str = "kubvernor_graph::graph";

/// Snapshot of the cluster resources a build reads. The build never mutates it.
#[derive(Clone, Debug, Default, TypedBuilder)]
pub struct ClusterState {
    /// The class named in the configuration, if it exists.
    #[builder(default, setter(strip_option))]
    pub gateway_class: Option<KubeGatewayClass>,
    #[builder(default)]
    pub gateways: BTreeMap<ResourceKey, KubeGateway>,
    #[builder(default)]
    pub http_routes: BTreeMap<ResourceKey, HTTPRoute>,
    #[builder(default)]
    pub services: BTreeMap<ResourceKey, Service>,
    #[builder(default)]
    pub secrets: BTreeMap<ResourceKey, Secret>,
    #[builder(default)]
    pub reference_grants: BTreeMap<ResourceKey, ReferenceGrant>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Graph {
    pub gateway_class: Option<GatewayClass>,
    pub gateway: Option<Gateway>,
    pub ignored_gateways: BTreeSet<ResourceKey>,
    pub routes: BTreeMap<ResourceKey, Route>,
    /// Every Secret consulted by the build, for the collaborator writing them to disk.
    pub secrets: BTreeMap<ResourceKey, ResolvedSecret>,
}

impl Graph {
    pub fn ignored_gateway_conditions(&self) -> Vec<Condition> {
        conditions::gateway::conflicted()
    }

    pub fn gateway_conditions(&self) -> Vec<Condition> {
        match &self.gateway {
            Some(gateway) if gateway.valid => vec![conditions::gateway::accepted()],
            Some(gateway) => gateway.conditions.clone(),
            None => vec![],
        }
    }

    pub fn backend_groups(&self) -> Vec<&BackendGroup> {
        self.routes.values().flat_map(Route::backend_groups).collect()
    }

    pub fn listener_routes<'a>(&'a self, listener: &'a Listener) -> impl Iterator<Item = &'a Route> {
        listener.routes.iter().filter_map(|key| self.routes.get(key))
    }
}

/// Rebuilds the graph from scratch. Fails only when the input breaks a rule the admission webhook enforces.
pub fn build_graph(state: &ClusterState, configuration: &Configuration) -> Result<Graph, InvariantViolation> {
    let gateway_class = build_gateway_class(state.gateway_class.as_ref(), &configuration.controller_name);

    let selection = select_gateways(state.gateways.values(), &configuration.gateway_class_name);
    let ignored_gateways: BTreeSet<ResourceKey> = selection.ignored.keys().cloned().collect();

    let reference_grants = ReferenceGrantIndex::from_map(&state.reference_grants);
    let mut secret_resolver = SecretResolver::new(&state.secrets, configuration.secrets_directory());

    let mut gateway = match selection.winner {
        Some(winner) => Some(build_gateway(winner, gateway_class.as_ref(), &reference_grants, &mut secret_resolver)?),
        None => None,
    };

    let mut routes = build_routes(&state.http_routes, gateway.as_ref().map(|gateway| &gateway.key), &ignored_gateways)?;
    bind_routes(&mut routes, gateway.as_mut(), &ignored_gateways);
    add_backend_groups(&mut routes, &state.services)?;

    info!(
        target: TARGET,
        "Graph built gateway {:?} ignored {} routes {}",
        gateway.as_ref().map(|gateway| gateway.key.to_string()),
        ignored_gateways.len(),
        routes.len()
    );
    debug!(target: TARGET, "Resolved secrets {:?}", secret_resolver.resolved_secrets().map(|secret| secret.key.to_string()).collect::<Vec<_>>());

    Ok(Graph {
        gateway_class,
        gateway,
        ignored_gateways,
        routes,
        secrets: secret_resolver.into_resolved_secrets(),
    })
}

/// A Gateway whose class is missing or invalid keeps its place as the winner but gets no listeners.
fn build_gateway(
    winner: &KubeGateway,
    gateway_class: Option<&GatewayClass>,
    reference_grants: &ReferenceGrantIndex,
    secret_resolver: &mut SecretResolver,
) -> Result<Gateway, InvariantViolation> {
    let problem = match gateway_class {
        None => Some("GatewayClass doesn't exist"),
        Some(gateway_class) if !gateway_class.valid => Some("GatewayClass is invalid"),
        Some(_) => None,
    };
    if let Some(problem) = problem {
        warn!(target: TARGET, "Gateway {} is invalid: {problem}", ResourceKey::from(winner));
        return Ok(Gateway::invalid(winner, conditions::gateway::invalid(problem)));
    }

    Ok(Gateway::new(winner, build_listeners(winner, reference_grants, secret_resolver)?))
}

use std::io::Write;

use clap::Parser;
use gateway_api::apis::standard::{
    gatewayclasses::GatewayClass, gateways::Gateway, httproutes::HTTPRoute, referencegrants::ReferenceGrant,
};
use k8s_openapi::api::{
    core::v1::{Namespace, Secret, Service},
    discovery::v1::EndpointSlice,
};
use kube::ResourceExt;
use kubvernor_graph::{
    configuration::Configuration,
    graph::{build_graph, ClusterState},
    relationship::{RelationshipTracker, TrackedResource},
    ResourceKey,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    Layer, Registry,
};

const TARGET: &str = "kubvernor_graph";

pub enum Guard {
    Appender(WorkerGuard),
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandArgs {
    #[arg(long)]
    with_config_file: String,
    #[arg(long)]
    with_manifests: String,
}

#[derive(Error, Debug)]
enum ManifestError {
    #[error("document {0} has no kind")]
    MissingKind(usize),
    #[error("document {0} has unsupported kind {1}")]
    UnknownKind(usize, String),
}

enum Manifest {
    GatewayClass(GatewayClass),
    Gateway(Gateway),
    HTTPRoute(HTTPRoute),
    Service(Service),
    Secret(Secret),
    ReferenceGrant(ReferenceGrant),
    Namespace(Namespace),
    EndpointSlice(EndpointSlice),
}

fn init_tracing_logging() -> Guard {
    let registry = Registry::default();
    let file_appender = tracing_appender::rolling::never(".", "kubvernor-graph.log");
    let (non_blocking_appender, guard) = tracing_appender::non_blocking(file_appender);
    let file_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_FILE_LOG").unwrap_or_else(|_| "debug".to_owned()));
    let console_filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_owned()));

    let console_layer = fmt::layer()
        .event_format(fmt::format().compact())
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_span_events(FmtSpan::NONE)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_appender)
        .with_span_events(FmtSpan::NONE)
        .with_target(true)
        .with_ansi(false)
        .with_filter(filter::filter_fn(|meta| !meta.is_span()))
        .with_filter(file_filter);

    registry.with(console_layer).with(file_layer).init();
    Guard::Appender(guard)
}

fn parse_manifests(content: &str) -> kubvernor_graph::Result<Vec<Manifest>> {
    let mut manifests = vec![];
    for (idx, document) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let Some(kind) = value.get("kind").and_then(serde_yaml::Value::as_str).map(str::to_owned) else {
            return Err(ManifestError::MissingKind(idx).into());
        };
        let manifest = match kind.as_str() {
            "GatewayClass" => Manifest::GatewayClass(serde_yaml::from_value(value)?),
            "Gateway" => Manifest::Gateway(serde_yaml::from_value(value)?),
            "HTTPRoute" => Manifest::HTTPRoute(serde_yaml::from_value(value)?),
            "Service" => Manifest::Service(serde_yaml::from_value(value)?),
            "Secret" => Manifest::Secret(serde_yaml::from_value(value)?),
            "ReferenceGrant" => Manifest::ReferenceGrant(serde_yaml::from_value(value)?),
            "Namespace" => Manifest::Namespace(serde_yaml::from_value(value)?),
            "EndpointSlice" => Manifest::EndpointSlice(serde_yaml::from_value(value)?),
            _ => return Err(ManifestError::UnknownKind(idx, kind).into()),
        };
        manifests.push(manifest);
    }
    Ok(manifests)
}

fn track(tracker: &mut RelationshipTracker, manifests: &[Manifest]) {
    for manifest in manifests {
        let resource = match manifest {
            Manifest::GatewayClass(resource) => TrackedResource::GatewayClass(resource),
            Manifest::Gateway(resource) => TrackedResource::Gateway(resource),
            Manifest::HTTPRoute(resource) => TrackedResource::HTTPRoute(resource),
            Manifest::Service(resource) => TrackedResource::Service(resource),
            Manifest::Namespace(resource) => TrackedResource::Namespace(resource),
            Manifest::EndpointSlice(resource) => TrackedResource::EndpointSlice(resource),
            Manifest::Secret(_) | Manifest::ReferenceGrant(_) => continue,
        };
        tracker.capture(resource);
    }

    for manifest in manifests {
        let resource = match manifest {
            Manifest::Service(resource) => TrackedResource::Service(resource),
            Manifest::Namespace(resource) => TrackedResource::Namespace(resource),
            Manifest::EndpointSlice(resource) => TrackedResource::EndpointSlice(resource),
            _ => continue,
        };
        let (kind, key) = (resource.kind(), resource.key());
        info!(target: TARGET, "{kind:?} {key} relevant {}", tracker.exists(kind, &key));
    }
}

fn cluster_state(configuration: &Configuration, manifests: Vec<Manifest>) -> ClusterState {
    let mut state = ClusterState::default();
    for manifest in manifests {
        match manifest {
            Manifest::GatewayClass(resource) => {
                if resource.name_any() == configuration.gateway_class_name {
                    state.gateway_class = Some(resource);
                }
            },
            Manifest::Gateway(resource) => {
                state.gateways.insert(ResourceKey::from(&resource), resource);
            },
            Manifest::HTTPRoute(resource) => {
                state.http_routes.insert(ResourceKey::from(&resource), resource);
            },
            Manifest::Service(resource) => {
                state.services.insert(ResourceKey::from(&resource), resource);
            },
            Manifest::Secret(resource) => {
                state.secrets.insert(ResourceKey::from(&resource), resource);
            },
            Manifest::ReferenceGrant(resource) => {
                state.reference_grants.insert(ResourceKey::from(&resource), resource);
            },
            Manifest::Namespace(_) | Manifest::EndpointSlice(_) => {},
        }
    }
    debug!(target: TARGET, "Cluster state gateways {} routes {} services {}", state.gateways.len(), state.http_routes.len(), state.services.len());
    state
}

fn main() -> kubvernor_graph::Result<()> {
    let args = CommandArgs::parse();
    let configuration: Configuration = serde_yaml::from_str(&std::fs::read_to_string(args.with_config_file)?)?;
    let _guard = init_tracing_logging();

    configuration.validate()?;

    let manifests = parse_manifests(&std::fs::read_to_string(args.with_manifests)?)?;
    let mut tracker = RelationshipTracker::new(&configuration.gateway_class_name);
    track(&mut tracker, &manifests);

    let state = cluster_state(&configuration, manifests);
    let graph = build_graph(&state, &configuration)?;
    info!(target: TARGET, "Graph built with {} routes and {} ignored gateways", graph.routes.len(), graph.ignored_gateways.len());

    writeln!(std::io::stdout().lock(), "{}", serde_json::to_string_pretty(&graph)?)?;
    Ok(())
}

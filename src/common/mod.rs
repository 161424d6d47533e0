pub mod conditions;
mod gateway;
mod gateway_class;
mod labels;
mod listener;
mod references_resolver;
mod resource_key;
mod route;
#[cfg(test)]
pub(crate) mod test;
mod validation;

pub use conditions::{Condition, ConditionSet, ConditionStatus};
pub use gateway::{select_gateways, Gateway};
pub use gateway_class::{build_gateway_class, GatewayClass, PARAMETERS_REF_GROUP, PARAMETERS_REF_KIND};
pub use labels::LabelSelector;
pub use listener::{allowed_routes_selector, build_listeners, Listener, CATCH_ALL_HOSTNAME};
pub use references_resolver::{add_backend_groups, BackendGroup, BackendRef, ReferenceGrantIndex, ResolvedSecret, SecretResolver};
pub use resource_key::{ResourceKey, CORE_GROUP_NAME, DEFAULT_GROUP_NAME, DEFAULT_NAMESPACE_NAME};
pub use route::{build_routes, ParentRef, ParentRefAttachment, Route, Rule};
pub use validation::{aggregate, validate_hostname, wire_name, FieldError};
use thiserror::Error;

/// Field combinations the Gateway API admission webhook and CRD schema rule out.
///
/// Reaching one of these means the webhook is missing or regressed. The graph build stops instead of guessing, so an
/// environment without the webhook has to add the listed checks before handing resources over.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// Webhook: an HTTP listener must not configure `tls`.
    #[error("tls is not nil for HTTP listener {listener:?} of Gateway {gateway}")]
    HttpListenerWithTls { gateway: ResourceKey, listener: String },
    /// Webhook: an HTTPS listener must configure `tls`.
    #[error("tls is nil for HTTPS listener {listener:?} of Gateway {gateway}")]
    HttpsListenerWithoutTls { gateway: ResourceKey, listener: String },
    /// CRD default: `tls.mode` defaults to Terminate.
    #[error("tls.mode is nil for HTTPS listener {listener:?} of Gateway {gateway}")]
    MissingTlsMode { gateway: ResourceKey, listener: String },
    /// Webhook: a Terminate listener has at least one certificateRef.
    #[error("zero certificateRefs for HTTPS listener {listener:?} of Gateway {gateway}")]
    MissingCertificateRefs { gateway: ResourceKey, listener: String },
    /// Webhook: parentRefs of a route are unique per Gateway and section name.
    #[error("duplicate section name {section_name:?} for Gateway {gateway} in HTTPRoute {route}")]
    DuplicateSectionName { route: ResourceKey, gateway: ResourceKey, section_name: String },
    /// CRD default: a path match always has a type.
    #[error("path type cannot be nil in HTTPRoute {route} at {path}")]
    MissingPathMatchType { route: ResourceKey, path: String },
    /// CRD default: a path match always has a value.
    #[error("path value cannot be nil in HTTPRoute {route} at {path}")]
    MissingPathMatchValue { route: ResourceKey, path: String },
    /// Webhook: a RequestRedirect filter carries its configuration.
    #[error("requestRedirect cannot be nil in HTTPRoute {route} at {path}")]
    MissingRequestRedirect { route: ResourceKey, path: String },
    /// Webhook: a Service backendRef has a port.
    #[error("port cannot be nil for Service backendRef in HTTPRoute {route} at {path}")]
    MissingBackendPort { route: ResourceKey, path: String },
}

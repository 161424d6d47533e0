use std::collections::{BTreeMap, BTreeSet};

use gateway_api::apis::standard::gateways::{
    Gateway as KubeGateway, GatewayListeners, GatewayListenersAllowedRoutesNamespacesFrom, GatewayListenersTls,
    GatewayListenersTlsCertificateRefs, GatewayListenersTlsMode,
};
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    aggregate, conditions,
    labels::{LabelSelector, SelectorError},
    resource_key::{HTTP_ROUTE_KIND, SECRET_KIND},
    validate_hostname, wire_name, Condition, ConditionSet, FieldError, InvariantViolation, ReferenceGrantIndex, ResourceKey,
    SecretResolver, CORE_GROUP_NAME, DEFAULT_GROUP_NAME,
};

const TARGET: &str = "kubvernor_graph::listener";

/// Hostname recorded for a Route without hostnames attached to a Listener without hostname.
pub const CATCH_ALL_HOSTNAME: &str = "*";

const HTTP_PORT: i32 = 80;
const HTTPS_PORT: i32 = 443;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProtocolType {
    Http,
    Https,
}

impl TryFrom<&str> for ProtocolType {
    type Error = FieldError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "HTTP" => Ok(Self::Http),
            "HTTPS" => Ok(Self::Https),
            _ => Err(FieldError::not_supported("protocol", value, &["HTTP", "HTTPS"])),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Listener {
    pub name: String,
    #[serde(skip)]
    pub source: GatewayListeners,
    pub valid: bool,
    pub conditions: ConditionSet,
    /// Keys into the graph's routes. Empty unless the Listener is valid.
    pub routes: BTreeSet<ResourceKey>,
    pub accepted_hostnames: BTreeSet<String>,
    pub secret_path: Option<String>,
}

impl Listener {
    fn new(source: &GatewayListeners) -> Self {
        Self {
            name: source.name.clone(),
            source: source.clone(),
            valid: true,
            conditions: ConditionSet::new(),
            routes: BTreeSet::new(),
            accepted_hostnames: BTreeSet::new(),
            secret_path: None,
        }
    }

    pub fn port(&self) -> i32 {
        self.source.port
    }

    /// Empty for a catch-all Listener.
    pub fn hostname(&self) -> &str {
        self.source.hostname.as_deref().unwrap_or_default()
    }

    pub fn protocol(&self) -> Option<ProtocolType> {
        ProtocolType::try_from(self.source.protocol.as_str()).ok()
    }

    pub fn conditions(&self) -> Vec<Condition> {
        self.conditions.deduplicated()
    }

    fn invalidate(&mut self, conditions: impl IntoIterator<Item = Condition>) {
        self.valid = false;
        self.secret_path = None;
        self.conditions.extend(conditions);
    }
}

/// First Listener seen per port and hostname within one build.
#[derive(Default)]
struct HostnameConflicts {
    holders: BTreeMap<(i32, String), usize>,
}

impl HostnameConflicts {
    /// Two Listeners sharing port and hostname invalidate each other.
    fn resolve(&mut self, listeners: &mut [Listener], idx: usize) {
        let Some(listener) = listeners.get(idx) else {
            return;
        };
        let key = (listener.port(), listener.hostname().to_owned());
        let Some(&holder_idx) = self.holders.get(&key) else {
            self.holders.insert(key, idx);
            return;
        };

        let msg = format!("Multiple listeners for port {} use the same hostname {:?}", key.0, key.1);
        if let Some(holder) = listeners.get_mut(holder_idx) {
            if holder.valid {
                warn!(target: TARGET, "Listener {} {msg}", holder.name);
                holder.invalidate(conditions::listener::conflicted_hostname(&msg));
            }
        }
        if let Some(listener) = listeners.get_mut(idx) {
            warn!(target: TARGET, "Listener {} {msg}", listener.name);
            listener.invalidate(conditions::listener::conflicted_hostname(&msg));
        }
    }
}

pub fn build_listeners(
    gateway: &KubeGateway,
    reference_grants: &ReferenceGrantIndex,
    secret_resolver: &mut SecretResolver<'_>,
) -> Result<BTreeMap<String, Listener>, InvariantViolation> {
    let gateway_key = ResourceKey::from(gateway);
    let mut arena: Vec<Listener> = Vec::with_capacity(gateway.spec.listeners.len());
    let mut conflicts = HostnameConflicts::default();

    for source in &gateway.spec.listeners {
        let idx = arena.len();
        let mut listener = Listener::new(source);
        let validation_conditions = validate_listener(source, gateway, &gateway_key, reference_grants)?;
        if !validation_conditions.is_empty() {
            debug!(target: TARGET, "Listener {} of {gateway_key} is invalid", listener.name);
            listener.invalidate(validation_conditions);
        }
        arena.push(listener);

        if !arena[idx].valid {
            continue;
        }
        conflicts.resolve(&mut arena, idx);

        let listener = &mut arena[idx];
        if listener.valid && listener.protocol() == Some(ProtocolType::Https) {
            resolve_certificate(listener, &gateway_key, secret_resolver);
        }
    }

    for listener in arena.iter_mut().filter(|listener| listener.valid) {
        listener.conditions.extend(conditions::listener::defaults());
    }

    Ok(arena.into_iter().map(|listener| (listener.name.clone(), listener)).collect())
}

fn resolve_certificate(listener: &mut Listener, gateway_key: &ResourceKey, secret_resolver: &mut SecretResolver<'_>) {
    let Some(cert_ref) = listener.source.tls.as_ref().and_then(|tls| tls.certificate_refs.as_ref()).and_then(|refs| refs.first()) else {
        return;
    };
    let secret_key = ResourceKey::secret(&cert_ref.name, cert_ref.namespace.as_deref().unwrap_or(&gateway_key.namespace));
    match secret_resolver.resolve(&secret_key) {
        Ok(path) => listener.secret_path = Some(path),
        Err(detail) => {
            let error = FieldError::invalid("tls.certificateRefs[0]", &secret_key, detail);
            warn!(target: TARGET, "Listener {} of {gateway_key} {error}", listener.name);
            listener.invalidate(conditions::listener::invalid_certificate_ref(&error.to_string()));
        },
    }
}

/// Namespace selector of a Listener admitting routes `from: Selector`. `None` when the Listener does not select.
pub fn allowed_routes_selector(listener: &GatewayListeners) -> Option<Result<LabelSelector, SelectorError>> {
    let namespaces = listener.allowed_routes.as_ref()?.namespaces.as_ref()?;
    if !matches!(namespaces.from, Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector)) {
        return None;
    }
    let Some(selector) = namespaces.selector.as_ref() else {
        return Some(Err(SelectorError::Missing));
    };

    let expressions = selector
        .match_expressions
        .iter()
        .flatten()
        .map(|expression| (expression.key.as_str(), expression.operator.as_str(), expression.values.as_deref()));
    Some(LabelSelector::new(selector.match_labels.as_ref(), expressions))
}

fn validate_listener(
    listener: &GatewayListeners,
    gateway: &KubeGateway,
    gateway_key: &ResourceKey,
    reference_grants: &ReferenceGrantIndex,
) -> Result<Vec<Condition>, InvariantViolation> {
    let protocol = match ProtocolType::try_from(listener.protocol.as_str()) {
        Ok(protocol) => protocol,
        Err(error) => return Ok(conditions::listener::unsupported_protocol(&error.to_string())),
    };

    let mut conditions = vec![];
    if gateway.spec.addresses.as_ref().is_some_and(|addresses| !addresses.is_empty()) {
        let error = FieldError::forbidden("spec.addresses", "addresses are not supported");
        conditions.extend(conditions::listener::unsupported_address(&error.to_string()));
    }
    conditions.extend(validate_allowed_route_kinds(listener));
    conditions.extend(validate_namespace_selector(listener));
    conditions.extend(validate_listener_hostname(listener));

    match protocol {
        ProtocolType::Http => conditions.extend(validate_http_listener(listener, gateway_key)?),
        ProtocolType::Https => conditions.extend(validate_https_listener(listener, gateway_key, reference_grants)?),
    }
    Ok(conditions)
}

fn validate_allowed_route_kinds(listener: &GatewayListeners) -> Vec<Condition> {
    let Some(kinds) = listener.allowed_routes.as_ref().and_then(|allowed_routes| allowed_routes.kinds.as_ref()) else {
        return vec![];
    };

    let errors: Vec<_> = kinds
        .iter()
        .enumerate()
        .filter(|(_, kind)| kind.kind != HTTP_ROUTE_KIND || !matches!(kind.group.as_deref(), None | Some(DEFAULT_GROUP_NAME)))
        .map(|(i, kind)| FieldError::not_supported(format!("allowedRoutes.kinds[{i}]"), &kind.kind, &[HTTP_ROUTE_KIND]))
        .collect();

    if errors.is_empty() {
        vec![]
    } else {
        conditions::listener::invalid_route_kinds(&aggregate(&errors))
    }
}

fn validate_namespace_selector(listener: &GatewayListeners) -> Vec<Condition> {
    let path = "allowedRoutes.namespaces.selector";
    match allowed_routes_selector(listener) {
        None | Some(Ok(_)) => vec![],
        Some(Err(SelectorError::Missing)) => {
            let error = FieldError::required(path, SelectorError::Missing.to_string());
            conditions::listener::unsupported_value(&error.to_string())
        },
        Some(Err(error)) => conditions::listener::unsupported_value(&format!("{path}: invalid label selector: {error}")),
    }
}

fn validate_listener_hostname(listener: &GatewayListeners) -> Vec<Condition> {
    let hostname = listener.hostname.as_deref().unwrap_or_default();
    if hostname.is_empty() {
        return vec![];
    }
    match validate_hostname(hostname) {
        Ok(()) => vec![],
        Err(detail) => conditions::listener::unsupported_value(&FieldError::invalid("hostname", hostname, detail).to_string()),
    }
}

fn validate_http_listener(listener: &GatewayListeners, gateway_key: &ResourceKey) -> Result<Vec<Condition>, InvariantViolation> {
    if listener.tls.is_some() {
        return Err(InvariantViolation::HttpListenerWithTls { gateway: gateway_key.clone(), listener: listener.name.clone() });
    }

    let mut conditions = vec![];
    if listener.port != HTTP_PORT {
        let error = FieldError::not_supported("port", listener.port, &["80"]);
        conditions.extend(conditions::listener::port_unavailable(&error.to_string()));
    }
    Ok(conditions)
}

fn validate_https_listener(
    listener: &GatewayListeners,
    gateway_key: &ResourceKey,
    reference_grants: &ReferenceGrantIndex,
) -> Result<Vec<Condition>, InvariantViolation> {
    let Some(tls) = listener.tls.as_ref() else {
        return Err(InvariantViolation::HttpsListenerWithoutTls { gateway: gateway_key.clone(), listener: listener.name.clone() });
    };

    let mut conditions = vec![];
    if listener.port != HTTPS_PORT {
        let error = FieldError::not_supported("port", listener.port, &["443"]);
        conditions.extend(conditions::listener::port_unavailable(&error.to_string()));
    }
    conditions.extend(validate_tls(tls, listener, gateway_key, reference_grants)?);
    Ok(conditions)
}

fn validate_tls(
    tls: &GatewayListenersTls,
    listener: &GatewayListeners,
    gateway_key: &ResourceKey,
    reference_grants: &ReferenceGrantIndex,
) -> Result<Vec<Condition>, InvariantViolation> {
    let Some(mode) = tls.mode.as_ref() else {
        return Err(InvariantViolation::MissingTlsMode { gateway: gateway_key.clone(), listener: listener.name.clone() });
    };

    let mut conditions = vec![];
    let terminate = matches!(mode, GatewayListenersTlsMode::Terminate);
    if !terminate {
        let error = FieldError::not_supported("tls.mode", wire_name(mode), &["Terminate"]);
        conditions.extend(conditions::listener::unsupported_value(&error.to_string()));
    }

    if tls.options.as_ref().is_some_and(|options| !options.is_empty()) {
        let error = FieldError::forbidden("tls.options", "options are not supported");
        conditions.extend(conditions::listener::unsupported_value(&error.to_string()));
    }

    match tls.certificate_refs.as_deref().unwrap_or_default() {
        [] if terminate => {
            return Err(InvariantViolation::MissingCertificateRefs { gateway: gateway_key.clone(), listener: listener.name.clone() });
        },
        [] => {},
        [cert_ref] => conditions.extend(validate_certificate_ref(cert_ref, gateway_key, reference_grants)),
        many => {
            let error = FieldError::too_many("tls.certificateRefs", many.len(), 1);
            conditions.extend(conditions::listener::unsupported_value(&error.to_string()));
        },
    }
    Ok(conditions)
}

fn validate_certificate_ref(
    cert_ref: &GatewayListenersTlsCertificateRefs,
    gateway_key: &ResourceKey,
    reference_grants: &ReferenceGrantIndex,
) -> Vec<Condition> {
    let path = "tls.certificateRefs[0]";
    let mut conditions = vec![];

    if let Some(kind) = cert_ref.kind.as_deref() {
        if kind != SECRET_KIND {
            let error = FieldError::not_supported(format!("{path}.kind"), kind, &[SECRET_KIND]);
            conditions.extend(conditions::listener::invalid_certificate_ref(&error.to_string()));
        }
    }

    if let Some(group) = cert_ref.group.as_deref() {
        if group != CORE_GROUP_NAME && group != "core" {
            let error = FieldError::not_supported(format!("{path}.group"), group, &[CORE_GROUP_NAME, "core"]);
            conditions.extend(conditions::listener::invalid_certificate_ref(&error.to_string()));
        }
    }

    if let Some(namespace) = cert_ref.namespace.as_deref() {
        let secret_key = ResourceKey::secret(&cert_ref.name, namespace);
        if namespace != gateway_key.namespace && !reference_grants.is_allowed(gateway_key, &secret_key) {
            let error = FieldError::forbidden(format!("{path}.namespace"), format!("Certificate ref to secret {secret_key} not permitted by any ReferenceGrant"));
            conditions.extend(conditions::listener::ref_not_permitted(&error.to_string()));
        }
    }

    conditions
}

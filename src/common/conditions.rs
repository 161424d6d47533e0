use std::{collections::BTreeMap, fmt::Display};

use serde::Serialize;

pub const CONDITION_ACCEPTED: &str = "Accepted";
pub const CONDITION_PROGRAMMED: &str = "Programmed";
pub const CONDITION_RESOLVED_REFS: &str = "ResolvedRefs";
pub const CONDITION_CONFLICTED: &str = "Conflicted";

pub const REASON_ACCEPTED: &str = "Accepted";
pub const REASON_PROGRAMMED: &str = "Programmed";
pub const REASON_RESOLVED_REFS: &str = "ResolvedRefs";
pub const REASON_INVALID: &str = "Invalid";
pub const REASON_UNSUPPORTED_VALUE: &str = "UnsupportedValue";
pub const REASON_UNSUPPORTED_PROTOCOL: &str = "UnsupportedProtocol";
pub const REASON_UNSUPPORTED_ADDRESS: &str = "UnsupportedAddress";
pub const REASON_PORT_UNAVAILABLE: &str = "PortUnavailable";
pub const REASON_HOSTNAME_CONFLICT: &str = "HostnameConflict";
pub const REASON_INVALID_CERTIFICATE_REF: &str = "InvalidCertificateRef";
pub const REASON_INVALID_ROUTE_KINDS: &str = "InvalidRouteKinds";
pub const REASON_REF_NOT_PERMITTED: &str = "RefNotPermitted";
pub const REASON_INVALID_PARAMETERS: &str = "InvalidParameters";
pub const REASON_GATEWAY_CONFLICT: &str = "GatewayConflict";
pub const REASON_NO_MATCHING_LISTENER_HOSTNAME: &str = "NoMatchingListenerHostname";
pub const REASON_NO_MATCHING_PARENT: &str = "NoMatchingParent";
pub const REASON_INVALID_LISTENER: &str = "InvalidListener";
pub const REASON_GATEWAY_IGNORED: &str = "GatewayIgnored";
pub const REASON_INVALID_KIND: &str = "InvalidKind";
pub const REASON_BACKEND_NOT_FOUND: &str = "BackendNotFound";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        };
        f.write_str(status)
    }
}

/// A status fact about a resource. `observedGeneration` and `lastTransitionTime` are added by whoever writes the status.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
}

impl Condition {
    pub fn new(type_: &str, status: ConditionStatus, reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: type_.to_owned(),
            status,
            reason: reason.to_owned(),
            message: message.into(),
        }
    }
}

/// Ordered conditions as they were pushed, duplicates included.
///
/// `deduplicated()` collapses them so that a later condition replaces an earlier one of the same type, keeping the slot
/// of the first occurrence.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConditionSet(Vec<Condition>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: Condition) {
        self.0.push(condition);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.iter()
    }

    pub fn contains_reason(&self, reason: &str) -> bool {
        self.0.iter().any(|c| c.reason == reason)
    }

    pub fn deduplicated(&self) -> Vec<Condition> {
        deduplicate_conditions(self.0.iter().cloned())
    }
}

impl Extend<Condition> for ConditionSet {
    fn extend<T: IntoIterator<Item = Condition>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

impl From<Vec<Condition>> for ConditionSet {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}

impl<'a> IntoIterator for &'a ConditionSet {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub fn deduplicate_conditions(conditions: impl IntoIterator<Item = Condition>) -> Vec<Condition> {
    let mut slots: BTreeMap<String, usize> = BTreeMap::new();
    let mut result: Vec<Condition> = vec![];
    for condition in conditions {
        if let Some(slot) = slots.get(&condition.type_) {
            result[*slot] = condition;
        } else {
            slots.insert(condition.type_.clone(), result.len());
            result.push(condition);
        }
    }
    result
}

pub mod gateway_class {
    use super::*;

    pub fn accepted() -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::True, REASON_ACCEPTED, "GatewayClass is accepted")
    }

    pub fn invalid_parameters(msg: &str) -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_INVALID_PARAMETERS, msg)
    }
}

pub mod gateway {
    use super::*;

    pub fn accepted() -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::True, REASON_ACCEPTED, "Gateway is accepted")
    }

    pub fn invalid(msg: &str) -> Vec<Condition> {
        vec![
            Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_INVALID, msg),
            Condition::new(CONDITION_PROGRAMMED, ConditionStatus::False, REASON_INVALID, msg),
        ]
    }

    pub fn conflicted() -> Vec<Condition> {
        let msg = "The resource is ignored due to a conflicting Gateway resource";
        vec![
            Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_GATEWAY_CONFLICT, msg),
            Condition::new(CONDITION_PROGRAMMED, ConditionStatus::False, REASON_GATEWAY_CONFLICT, msg),
        ]
    }
}

pub mod listener {
    use super::*;

    pub fn defaults() -> Vec<Condition> {
        vec![
            Condition::new(CONDITION_ACCEPTED, ConditionStatus::True, REASON_ACCEPTED, "Listener is accepted"),
            Condition::new(CONDITION_PROGRAMMED, ConditionStatus::True, REASON_PROGRAMMED, "Listener is programmed"),
            Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::True, REASON_RESOLVED_REFS, "All references are resolved"),
        ]
    }

    fn not_accepted(reason: &str, msg: &str) -> Vec<Condition> {
        vec![
            Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, reason, msg),
            Condition::new(CONDITION_PROGRAMMED, ConditionStatus::False, REASON_INVALID, msg),
        ]
    }

    fn unresolved(reason: &str, msg: &str) -> Vec<Condition> {
        vec![
            Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, reason, msg),
            Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::False, reason, msg),
        ]
    }

    pub fn unsupported_value(msg: &str) -> Vec<Condition> {
        not_accepted(REASON_UNSUPPORTED_VALUE, msg)
    }

    pub fn unsupported_protocol(msg: &str) -> Vec<Condition> {
        not_accepted(REASON_UNSUPPORTED_PROTOCOL, msg)
    }

    pub fn unsupported_address(msg: &str) -> Vec<Condition> {
        not_accepted(REASON_UNSUPPORTED_ADDRESS, msg)
    }

    pub fn port_unavailable(msg: &str) -> Vec<Condition> {
        not_accepted(REASON_PORT_UNAVAILABLE, msg)
    }

    pub fn invalid_certificate_ref(msg: &str) -> Vec<Condition> {
        unresolved(REASON_INVALID_CERTIFICATE_REF, msg)
    }

    pub fn ref_not_permitted(msg: &str) -> Vec<Condition> {
        unresolved(REASON_REF_NOT_PERMITTED, msg)
    }

    pub fn invalid_route_kinds(msg: &str) -> Vec<Condition> {
        vec![Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::False, REASON_INVALID_ROUTE_KINDS, msg)]
    }

    pub fn conflicted_hostname(msg: &str) -> Vec<Condition> {
        vec![
            Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_HOSTNAME_CONFLICT, msg),
            Condition::new(CONDITION_CONFLICTED, ConditionStatus::True, REASON_HOSTNAME_CONFLICT, msg),
        ]
    }
}

pub mod route {
    use super::*;

    pub fn accepted() -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::True, REASON_ACCEPTED, "The route is accepted")
    }

    pub fn resolved_refs() -> Condition {
        Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::True, REASON_RESOLVED_REFS, "All references are resolved")
    }

    pub fn unsupported_value(msg: &str) -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_UNSUPPORTED_VALUE, msg)
    }

    pub fn partially_invalid(msg: &str) -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::True, REASON_UNSUPPORTED_VALUE, format!("Some rules are invalid: {msg}"))
    }

    pub fn no_matching_listener_hostname() -> Condition {
        Condition::new(
            CONDITION_ACCEPTED,
            ConditionStatus::False,
            REASON_NO_MATCHING_LISTENER_HOSTNAME,
            "Listener hostname does not match the Route hostnames",
        )
    }

    pub fn no_matching_parent() -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_NO_MATCHING_PARENT, "Listener is not found for this parent ref")
    }

    pub fn invalid_listener() -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_INVALID_LISTENER, "Listener is invalid for this parent ref")
    }

    pub fn gateway_ignored() -> Condition {
        Condition::new(CONDITION_ACCEPTED, ConditionStatus::False, REASON_GATEWAY_IGNORED, "The Gateway is ignored by the controller")
    }

    pub fn backend_ref_invalid_kind(msg: &str) -> Condition {
        Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::False, REASON_INVALID_KIND, msg)
    }

    pub fn backend_ref_not_permitted(msg: &str) -> Condition {
        Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::False, REASON_REF_NOT_PERMITTED, msg)
    }

    pub fn backend_ref_not_found(msg: &str) -> Condition {
        Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::False, REASON_BACKEND_NOT_FOUND, msg)
    }

    pub fn backend_ref_unsupported_value(msg: &str) -> Condition {
        Condition::new(CONDITION_RESOLVED_REFS, ConditionStatus::False, REASON_UNSUPPORTED_VALUE, msg)
    }
}

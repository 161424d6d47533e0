use std::collections::{BTreeMap, BTreeSet};

use gateway_api::apis::standard::httproutes::{
    HTTPRoute, HTTPRouteRules, HTTPRouteRulesFilters, HTTPRouteRulesFiltersType, HTTPRouteRulesMatches, HTTPRouteRulesMatchesPath,
    HTTPRouteRulesMatchesPathType,
};
use serde::Serialize;
use tracing::{debug, warn};

use super::{
    aggregate, conditions,
    resource_key::DEFAULT_KIND_NAME,
    validate_hostname, wire_name, BackendGroup, Condition, ConditionSet, FieldError, InvariantViolation, ResourceKey,
    DEFAULT_GROUP_NAME,
};

const TARGET: &str = "kubvernor_graph::route";

const SUPPORTED_METHODS: [&str; 9] = ["CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE"];
const SUPPORTED_REDIRECT_SCHEMES: [&str; 2] = ["http", "https"];
const SUPPORTED_REDIRECT_STATUS_CODES: [&str; 2] = ["301", "302"];
const EXACT_MATCH: &str = "Exact";
const REQUEST_REDIRECT_FILTER: &str = "RequestRedirect";

#[derive(Clone, Debug, Serialize)]
pub struct Route {
    pub key: ResourceKey,
    #[serde(skip)]
    pub source: HTTPRoute,
    pub parent_refs: Vec<ParentRef>,
    /// Aligned with the source rules.
    pub rules: Vec<Rule>,
    pub conditions: ConditionSet,
    pub valid: bool,
}

/// A parentRef pointing at a Gateway this controller knows about. `idx` is the position in the source parentRefs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParentRef {
    pub idx: usize,
    pub gateway: ResourceKey,
    pub section_name: String,
    pub attachment: Option<ParentRefAttachment>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParentRefAttachment {
    pub attached: bool,
    pub failed_condition: Option<Condition>,
}

impl ParentRefAttachment {
    pub fn attached() -> Self {
        Self { attached: true, failed_condition: None }
    }

    pub fn failed(condition: Condition) -> Self {
        Self { attached: false, failed_condition: Some(condition) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub valid_matches: bool,
    pub valid_filters: bool,
    /// Populated only for rules with valid matches and filters.
    pub backend_group: BackendGroup,
}

impl Rule {
    pub fn is_valid(&self) -> bool {
        self.valid_matches && self.valid_filters
    }
}

impl Route {
    pub fn hostnames(&self) -> &[String] {
        self.source.spec.hostnames.as_deref().unwrap_or_default()
    }

    pub fn backend_groups(&self) -> impl Iterator<Item = &BackendGroup> {
        self.rules.iter().filter(|rule| rule.is_valid()).map(|rule| &rule.backend_group)
    }

    pub fn is_attached(&self) -> bool {
        self.parent_refs.iter().any(|parent_ref| parent_ref.attachment.as_ref().is_some_and(|attachment| attachment.attached))
    }

    /// Status conditions for one parent: defaults, then route conditions, then the attachment failure.
    pub fn parent_conditions(&self, parent_ref: &ParentRef) -> Vec<Condition> {
        let defaults = [conditions::route::accepted(), conditions::route::resolved_refs()];
        let failed = parent_ref.attachment.as_ref().and_then(|attachment| attachment.failed_condition.clone());
        conditions::deduplicate_conditions(defaults.into_iter().chain(self.conditions.iter().cloned()).chain(failed))
    }
}

/// Builds every Route that references the winning Gateway or an ignored one. Routes referencing neither are left out.
pub fn build_routes(
    http_routes: &BTreeMap<ResourceKey, HTTPRoute>,
    winner: Option<&ResourceKey>,
    ignored: &BTreeSet<ResourceKey>,
) -> Result<BTreeMap<ResourceKey, Route>, InvariantViolation> {
    let mut routes = BTreeMap::new();
    for http_route in http_routes.values() {
        if let Some(route) = build_route(http_route, winner, ignored)? {
            routes.insert(route.key.clone(), route);
        }
    }
    Ok(routes)
}

fn build_route(source: &HTTPRoute, winner: Option<&ResourceKey>, ignored: &BTreeSet<ResourceKey>) -> Result<Option<Route>, InvariantViolation> {
    let key = ResourceKey::from(source);
    let parent_refs = build_parent_refs(source, &key, winner, ignored)?;
    if parent_refs.is_empty() {
        debug!(target: TARGET, "Route {key} does not reference any relevant gateway");
        return Ok(None);
    }

    let mut rules = vec![];
    let mut rule_errors = vec![];
    for (idx, rule) in source.spec.rules.iter().flatten().enumerate() {
        let match_errors = validate_matches(rule, idx, &key)?;
        let filter_errors = validate_filters(rule, idx, &key)?;
        rules.push(Rule {
            valid_matches: match_errors.is_empty(),
            valid_filters: filter_errors.is_empty(),
            backend_group: BackendGroup::new(key.clone(), idx),
        });
        rule_errors.extend(match_errors);
        rule_errors.extend(filter_errors);
    }

    let mut route = Route {
        key,
        source: source.clone(),
        parent_refs,
        rules,
        conditions: ConditionSet::new(),
        valid: true,
    };

    let hostname_errors = validate_route_hostnames(route.hostnames());
    if !hostname_errors.is_empty() {
        let msg = aggregate(&hostname_errors);
        warn!(target: TARGET, "Route {} has invalid hostnames {msg}", route.key);
        route.valid = false;
        route.conditions.push(conditions::route::unsupported_value(&msg));
        return Ok(Some(route));
    }

    if !rule_errors.is_empty() {
        let msg = aggregate(&rule_errors);
        if route.rules.iter().any(Rule::is_valid) {
            debug!(target: TARGET, "Route {} has invalid rules {msg}", route.key);
            route.conditions.push(conditions::route::partially_invalid(&msg));
        } else {
            warn!(target: TARGET, "Route {} has no valid rules {msg}", route.key);
            route.valid = false;
            route.conditions.push(conditions::route::unsupported_value(&format!("All rules are invalid: {msg}")));
        }
    }

    Ok(Some(route))
}

fn build_parent_refs(
    source: &HTTPRoute,
    key: &ResourceKey,
    winner: Option<&ResourceKey>,
    ignored: &BTreeSet<ResourceKey>,
) -> Result<Vec<ParentRef>, InvariantViolation> {
    let mut seen = BTreeSet::new();
    let mut parent_refs = vec![];

    for (idx, parent_ref) in source.spec.parent_refs.iter().flatten().enumerate() {
        if !matches!(parent_ref.kind.as_deref(), None | Some(DEFAULT_KIND_NAME)) || !matches!(parent_ref.group.as_deref(), None | Some(DEFAULT_GROUP_NAME)) {
            continue;
        }

        let gateway = ResourceKey::gateway(&parent_ref.name, parent_ref.namespace.as_deref().unwrap_or(&key.namespace));
        if winner != Some(&gateway) && !ignored.contains(&gateway) {
            continue;
        }

        let section_name = parent_ref.section_name.clone().unwrap_or_default();
        if !seen.insert((gateway.clone(), section_name.clone())) {
            return Err(InvariantViolation::DuplicateSectionName { route: key.clone(), gateway, section_name });
        }
        parent_refs.push(ParentRef { idx, gateway, section_name, attachment: None });
    }
    Ok(parent_refs)
}

fn validate_route_hostnames(hostnames: &[String]) -> Vec<FieldError> {
    hostnames
        .iter()
        .enumerate()
        .filter_map(|(i, hostname)| validate_hostname(hostname).err().map(|detail| FieldError::invalid(format!("spec.hostnames[{i}]"), hostname, detail)))
        .collect()
}

fn validate_matches(rule: &HTTPRouteRules, rule_idx: usize, key: &ResourceKey) -> Result<Vec<FieldError>, InvariantViolation> {
    let mut errors = vec![];
    for (match_idx, route_match) in rule.matches.iter().flatten().enumerate() {
        let path = format!("spec.rules[{rule_idx}].matches[{match_idx}]");
        errors.extend(validate_match(route_match, &path, key)?);
    }
    Ok(errors)
}

fn validate_match(route_match: &HTTPRouteRulesMatches, path: &str, key: &ResourceKey) -> Result<Vec<FieldError>, InvariantViolation> {
    let mut errors = vec![];
    if let Some(path_match) = route_match.path.as_ref() {
        errors.extend(validate_path_match(path_match, &format!("{path}.path"), key)?);
    }

    for (i, header) in route_match.headers.iter().flatten().enumerate() {
        let header_path = format!("{path}.headers[{i}]");
        if let Some(match_type) = header.r#type.as_ref().map(wire_name) {
            if match_type != EXACT_MATCH {
                errors.push(FieldError::not_supported(format!("{header_path}.type"), match_type, &[EXACT_MATCH]));
            }
        }
        if header.name.is_empty() {
            errors.push(FieldError::required(format!("{header_path}.name"), "cannot be empty"));
        }
    }

    for (i, query_param) in route_match.query_params.iter().flatten().enumerate() {
        let query_path = format!("{path}.queryParams[{i}]");
        if let Some(match_type) = query_param.r#type.as_ref().map(wire_name) {
            if match_type != EXACT_MATCH {
                errors.push(FieldError::not_supported(format!("{query_path}.type"), match_type, &[EXACT_MATCH]));
            }
        }
        if query_param.name.is_empty() {
            errors.push(FieldError::required(format!("{query_path}.name"), "cannot be empty"));
        }
    }

    if let Some(method) = route_match.method.as_ref().map(wire_name) {
        if !SUPPORTED_METHODS.contains(&method.as_str()) {
            errors.push(FieldError::not_supported(format!("{path}.method"), method, &SUPPORTED_METHODS));
        }
    }

    Ok(errors)
}

fn validate_path_match(path_match: &HTTPRouteRulesMatchesPath, path: &str, key: &ResourceKey) -> Result<Vec<FieldError>, InvariantViolation> {
    let Some(match_type) = path_match.r#type.as_ref() else {
        return Err(InvariantViolation::MissingPathMatchType { route: key.clone(), path: path.to_owned() });
    };
    let Some(value) = path_match.value.as_deref() else {
        return Err(InvariantViolation::MissingPathMatchValue { route: key.clone(), path: path.to_owned() });
    };

    if !matches!(match_type, HTTPRouteRulesMatchesPathType::Exact | HTTPRouteRulesMatchesPathType::PathPrefix) {
        return Ok(vec![FieldError::not_supported(format!("{path}.type"), wire_name(match_type), &["Exact", "PathPrefix"])]);
    }

    if value.starts_with('/') {
        Ok(vec![])
    } else {
        Ok(vec![FieldError::invalid(format!("{path}.value"), value, "must start with /")])
    }
}

fn validate_filters(rule: &HTTPRouteRules, rule_idx: usize, key: &ResourceKey) -> Result<Vec<FieldError>, InvariantViolation> {
    let mut errors = vec![];
    for (filter_idx, filter) in rule.filters.iter().flatten().enumerate() {
        let path = format!("spec.rules[{rule_idx}].filters[{filter_idx}]");
        errors.extend(validate_filter(filter, &path, key)?);
    }
    Ok(errors)
}

fn validate_filter(filter: &HTTPRouteRulesFilters, path: &str, key: &ResourceKey) -> Result<Vec<FieldError>, InvariantViolation> {
    if !matches!(filter.r#type, HTTPRouteRulesFiltersType::RequestRedirect) {
        return Ok(vec![FieldError::not_supported(format!("{path}.type"), wire_name(&filter.r#type), &[REQUEST_REDIRECT_FILTER])]);
    }

    let Some(redirect) = filter.request_redirect.as_ref() else {
        return Err(InvariantViolation::MissingRequestRedirect { route: key.clone(), path: path.to_owned() });
    };
    let path = format!("{path}.requestRedirect");

    let mut errors = vec![];
    if let Some(scheme) = redirect.scheme.as_ref().map(wire_name) {
        if !SUPPORTED_REDIRECT_SCHEMES.contains(&scheme.as_str()) {
            errors.push(FieldError::not_supported(format!("{path}.scheme"), scheme, &SUPPORTED_REDIRECT_SCHEMES));
        }
    }

    if let Some(hostname) = redirect.hostname.as_deref() {
        if let Err(detail) = validate_hostname(hostname) {
            errors.push(FieldError::invalid(format!("{path}.hostname"), hostname, detail));
        }
    }

    if let Some(port) = redirect.port {
        if !(1..=65535).contains(&i64::from(port)) {
            errors.push(FieldError::invalid(format!("{path}.port"), port, "must be between 1 and 65535, inclusive"));
        }
    }

    if redirect.path.is_some() {
        errors.push(FieldError::forbidden(format!("{path}.path"), "path is not supported"));
    }

    if let Some(status_code) = redirect.status_code.as_ref().map(wire_name) {
        if !SUPPORTED_REDIRECT_STATUS_CODES.contains(&status_code.as_str()) {
            errors.push(FieldError::not_supported(format!("{path}.statusCode"), status_code, &SUPPORTED_REDIRECT_STATUS_CODES));
        }
    }

    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{
        conditions::{ConditionStatus, CONDITION_ACCEPTED, REASON_ACCEPTED, REASON_UNSUPPORTED_VALUE},
        test::http_route_from_yaml,
    };

    fn winner() -> ResourceKey {
        ResourceKey::gateway("gateway", "test")
    }

    fn route_with(spec: &str) -> HTTPRoute {
        http_route_from_yaml(&format!(
            r"
apiVersion: gateway.networking.k8s.io/v1
kind: HTTPRoute
metadata:
  name: hr
  namespace: test
spec:
{spec}
"
        ))
    }

    fn build(source: &HTTPRoute) -> Option<Route> {
        build_route(source, Some(&winner()), &BTreeSet::from([ResourceKey::gateway("ignored", "test")])).unwrap()
    }

    const PARENT: &str = "  parentRefs:
  - name: gateway
    sectionName: http";

    #[test]
    fn routes_without_relevant_parents_are_left_out() {
        assert!(build(&route_with("  hostnames: [foo.example.com]")).is_none());
        assert!(build(&route_with(
            "  parentRefs:
  - name: unrelated
    sectionName: http
  - name: gateway
    namespace: other
    sectionName: http
  - name: gateway
    kind: Service
    group: ''"
        ))
        .is_none());
    }

    #[test]
    fn parent_refs_keep_source_index() {
        let route = build(&route_with(
            "  parentRefs:
  - name: unrelated
  - name: gateway
    sectionName: http
  - name: ignored
    sectionName: http",
        ))
        .unwrap();
        assert_eq!(route.parent_refs.len(), 2);
        assert_eq!(route.parent_refs[0].idx, 1);
        assert_eq!(route.parent_refs[0].gateway, winner());
        assert_eq!(route.parent_refs[1].idx, 2);
        assert_eq!(route.parent_refs[1].section_name, "http");
        assert!(route.valid);
    }

    #[test]
    fn duplicate_section_name_is_an_invariant_violation() {
        let source = route_with(
            "  parentRefs:
  - name: gateway
    sectionName: http
  - name: gateway
    namespace: test
    sectionName: http",
        );
        let result = build_route(&source, Some(&winner()), &BTreeSet::new());
        assert!(matches!(result, Err(InvariantViolation::DuplicateSectionName { .. })));
    }

    #[test]
    fn wildcard_hostname_invalidates_route() {
        let route = build(&route_with(&format!("{PARENT}\n  hostnames: ['*.example.com']"))).unwrap();
        assert!(!route.valid);
        assert!(route.conditions.contains_reason(REASON_UNSUPPORTED_VALUE));
    }

    #[test]
    fn partially_invalid_rules() {
        let route = build(&route_with(&format!(
            "{PARENT}
  rules:
  - matches:
    - path:
        type: PathPrefix
        value: /coffee
  - matches:
    - path:
        type: RegularExpression
        value: /tea.*"
        )))
        .unwrap();
        assert!(route.valid);
        assert!(route.rules[0].is_valid());
        assert!(!route.rules[1].valid_matches);
        assert_eq!(route.backend_groups().count(), 1);
        let condition = route.conditions.iter().next().unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(
            condition.message,
            "Some rules are invalid: spec.rules[1].matches[0].path.type: Unsupported value: \"RegularExpression\": supported values: \"Exact\", \"PathPrefix\""
        );
    }

    #[test]
    fn all_rules_invalid() {
        let route = build(&route_with(&format!(
            "{PARENT}
  rules:
  - matches:
    - path:
        type: Exact
        value: coffee
      headers:
      - name: version
        type: RegularExpression
        value: v.*
  - filters:
    - type: RequestHeaderModifier
      requestHeaderModifier:
        set:
        - name: x
          value: y"
        )))
        .unwrap();
        assert!(!route.valid);
        assert!(!route.rules[0].valid_matches);
        assert!(route.rules[0].valid_filters);
        assert!(!route.rules[1].valid_filters);
        let condition = route.conditions.iter().next().unwrap();
        assert_eq!(condition.status, ConditionStatus::False);
        assert!(condition.message.starts_with("All rules are invalid: ["), "{}", condition.message);
    }

    #[test]
    fn request_redirect_validation() {
        let route = build(&route_with(&format!(
            "{PARENT}
  rules:
  - filters:
    - type: RequestRedirect
      requestRedirect:
        scheme: https
        hostname: foo.example.com
        port: 443
        statusCode: 301
  - filters:
    - type: RequestRedirect
      requestRedirect:
        statusCode: 302
        path:
          type: ReplaceFullPath
          replaceFullPath: /tea"
        )))
        .unwrap();
        assert!(route.rules[0].valid_filters);
        assert!(!route.rules[1].valid_filters);
        assert!(route.valid);
        let message = &route.conditions.iter().next().unwrap().message;
        assert!(message.contains("spec.rules[1].filters[0].requestRedirect.path: Forbidden"), "{message}");
    }

    #[test]
    fn missing_request_redirect_is_an_invariant_violation() {
        let source = route_with(&format!(
            "{PARENT}
  rules:
  - filters:
    - type: RequestRedirect"
        ));
        let result = build_route(&source, Some(&winner()), &BTreeSet::new());
        assert!(matches!(result, Err(InvariantViolation::MissingRequestRedirect { .. })));
    }

    #[test]
    fn valid_matches() {
        let route = build(&route_with(&format!(
            "{PARENT}
  rules:
  - matches:
    - path:
        type: Exact
        value: /coffee
      method: GET
      headers:
      - name: version
        value: v1
      queryParams:
      - name: user
        type: Exact
        value: alice"
        )))
        .unwrap();
        assert!(route.valid);
        assert!(route.rules[0].is_valid());
        assert!(route.conditions.is_empty());
    }

    #[test]
    fn parent_conditions_prefer_failures() {
        let mut route = build(&route_with(PARENT)).unwrap();
        let parent_ref = route.parent_refs[0].clone();
        let conditions = route.parent_conditions(&parent_ref);
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].reason, REASON_ACCEPTED);

        route.parent_refs[0].attachment = Some(ParentRefAttachment::failed(conditions::route::no_matching_parent()));
        let parent_ref = route.parent_refs[0].clone();
        let conditions = route.parent_conditions(&parent_ref);
        assert_eq!(conditions[0].type_, CONDITION_ACCEPTED);
        assert_eq!(conditions[0].status, ConditionStatus::False);
        assert!(!route.is_attached());
    }
}

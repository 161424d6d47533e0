use gateway_api::apis::standard::gatewayclasses::GatewayClass as KubeGatewayClass;
use serde::Serialize;
use tracing::{debug, warn};

use crate::common::{aggregate, conditions, ConditionSet, FieldError, ResourceKey};

const TARGET: &str = "kubvernor_graph::gateway_class";

pub const PARAMETERS_REF_GROUP: &str = "graph.kubvernor.io";
pub const PARAMETERS_REF_KIND: &str = "ProxyParameters";

#[derive(Clone, Debug, Serialize)]
pub struct GatewayClass {
    pub key: ResourceKey,
    #[serde(skip)]
    pub source: KubeGatewayClass,
    pub valid: bool,
    pub conditions: ConditionSet,
}

/// No class means the controller has nothing to serve, which is different from a class that is present but invalid.
pub fn build_gateway_class(gateway_class: Option<&KubeGatewayClass>, controller_name: &str) -> Option<GatewayClass> {
    let gateway_class = gateway_class?;
    let key = ResourceKey::from(gateway_class);

    let mut conditions = ConditionSet::new();
    if gateway_class.spec.controller_name != controller_name {
        let msg = format!("Spec.ControllerName must be {controller_name} got {}", gateway_class.spec.controller_name);
        warn!(target: TARGET, "GatewayClass {key} {msg}");
        conditions.push(conditions::gateway_class::invalid_parameters(&msg));
    }

    let errors = validate_parameters_ref(gateway_class);
    if !errors.is_empty() {
        let msg = aggregate(&errors);
        warn!(target: TARGET, "GatewayClass {key} has unsupported parametersRef {msg}");
        conditions.push(conditions::gateway_class::invalid_parameters(&msg));
    }

    let valid = conditions.is_empty();
    if valid {
        conditions.push(conditions::gateway_class::accepted());
    }
    debug!(target: TARGET, "GatewayClass {key} valid {valid}");

    Some(GatewayClass { key, source: gateway_class.clone(), valid, conditions })
}

fn validate_parameters_ref(gateway_class: &KubeGatewayClass) -> Vec<FieldError> {
    let Some(parameters_ref) = gateway_class.spec.parameters_ref.as_ref() else {
        return vec![];
    };
    let path = "spec.parametersRef";

    let mut errors = vec![];
    if parameters_ref.group != PARAMETERS_REF_GROUP {
        errors.push(FieldError::not_supported(format!("{path}.group"), &parameters_ref.group, &[PARAMETERS_REF_GROUP]));
    }
    if parameters_ref.kind != PARAMETERS_REF_KIND {
        errors.push(FieldError::not_supported(format!("{path}.kind"), &parameters_ref.kind, &[PARAMETERS_REF_KIND]));
    }
    if parameters_ref.namespace.as_deref().unwrap_or_default().is_empty() {
        errors.push(FieldError::required(format!("{path}.namespace"), "must be set"));
    }
    if parameters_ref.name.is_empty() {
        errors.push(FieldError::required(format!("{path}.name"), "cannot be empty"));
    }
    errors
}

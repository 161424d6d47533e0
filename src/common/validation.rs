use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use thiserror::Error;

const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

const DNS1123_SUBDOMAIN_PATTERN: &str = r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";

static DNS1123_SUBDOMAIN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(DNS1123_SUBDOMAIN_PATTERN));

/// A rejected field, rendered the way Kubernetes reports field errors in status messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    #[error("{path}: Invalid value: \"{value}\": {detail}")]
    Invalid { path: String, value: String, detail: String },
    #[error("{path}: Unsupported value: \"{value}\": supported values: {}", quoted(.supported))]
    NotSupported { path: String, value: String, supported: Vec<String> },
    #[error("{path}: Required value: {detail}")]
    Required { path: String, detail: String },
    #[error("{path}: Forbidden: {detail}")]
    Forbidden { path: String, detail: String },
    #[error("{path}: Too many: {actual}: must have at most {max} items")]
    TooMany { path: String, actual: usize, max: usize },
    #[error("{path}: Not found: \"{value}\"")]
    NotFound { path: String, value: String },
}

impl FieldError {
    pub fn invalid(path: impl Into<String>, value: impl ToString, detail: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            value: value.to_string(),
            detail: detail.into(),
        }
    }

    pub fn not_supported(path: impl Into<String>, value: impl ToString, supported: &[&str]) -> Self {
        Self::NotSupported {
            path: path.into(),
            value: value.to_string(),
            supported: supported.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    pub fn required(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Required { path: path.into(), detail: detail.into() }
    }

    pub fn forbidden(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Forbidden { path: path.into(), detail: detail.into() }
    }

    pub fn too_many(path: impl Into<String>, actual: usize, max: usize) -> Self {
        Self::TooMany { path: path.into(), actual, max }
    }

    pub fn not_found(path: impl Into<String>, value: impl ToString) -> Self {
        Self::NotFound { path: path.into(), value: value.to_string() }
    }
}

fn quoted(values: &[String]) -> String {
    values.iter().map(|value| format!("\"{value}\"")).join(", ")
}

/// Joins field errors into one status message; several errors are bracketed.
pub fn aggregate(errors: &[FieldError]) -> String {
    match errors {
        [] => String::new(),
        [single] => single.to_string(),
        many => format!("[{}]", many.iter().join(", ")),
    }
}

/// Accepts a precise hostname only. Wildcard hostnames are rejected.
pub fn validate_hostname(hostname: &str) -> Result<(), String> {
    if hostname.is_empty() {
        return Err("cannot be empty string".to_owned());
    }

    if hostname.contains('*') {
        return Err("wildcard hostnames are not supported".to_owned());
    }

    let mut problems = vec![];
    if hostname.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        problems.push(format!("must be no more than {DNS1123_SUBDOMAIN_MAX_LENGTH} characters"));
    }
    if !DNS1123_SUBDOMAIN.as_ref().is_ok_and(|pattern| pattern.is_match(hostname)) {
        problems.push(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character"
                .to_owned(),
        );
    }

    if problems.is_empty() { Ok(()) } else { Err(problems.join(", ")) }
}

/// Name of a generated enum value as it appears in the manifest.
pub fn wire_name<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

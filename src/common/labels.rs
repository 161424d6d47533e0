use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

pub type Map = BTreeMap<String, String>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("selector must be set when from is Selector")]
    Missing,
    #[error("{0:?} is not a valid label selector operator")]
    UnknownOperator(String),
    #[error("values: Required value: must be specified when operator is {operator:?} for key {key:?}")]
    MissingValues { key: String, operator: String },
    #[error("values: Forbidden: may not be specified when operator is {operator:?} for key {key:?}")]
    UnexpectedValues { key: String, operator: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

impl TryFrom<&str> for Operator {
    type Error = SelectorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(match value {
            "In" => Self::In,
            "NotIn" => Self::NotIn,
            "Exists" => Self::Exists,
            "DoesNotExist" => Self::DoesNotExist,
            _ => return Err(SelectorError::UnknownOperator(value.to_owned())),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Expression {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Expression {
    pub fn new(key: &str, operator: &str, values: Option<&[String]>) -> Result<Self, SelectorError> {
        let operator = Operator::try_from(operator)?;
        let values: BTreeSet<String> = values.unwrap_or_default().iter().cloned().collect();
        match operator {
            Operator::In | Operator::NotIn if values.is_empty() => {
                Err(SelectorError::MissingValues { key: key.to_owned(), operator: format!("{operator:?}") })
            },
            Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                Err(SelectorError::UnexpectedValues { key: key.to_owned(), operator: format!("{operator:?}") })
            },
            _ => Ok(Self { key: key.to_owned(), operator, values }),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels.get(&self.key).is_some_and(|v| self.values.contains(v)),
            Operator::NotIn => !labels.get(&self.key).is_some_and(|v| self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

/// A compiled Kubernetes label selector. An empty selector matches everything.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LabelSelector {
    match_labels: Map,
    match_expressions: Vec<Expression>,
}

impl LabelSelector {
    pub fn new<'a>(
        match_labels: Option<&Map>,
        match_expressions: impl IntoIterator<Item = (&'a str, &'a str, Option<&'a [String]>)>,
    ) -> Result<Self, SelectorError> {
        let match_expressions = match_expressions
            .into_iter()
            .map(|(key, operator, values)| Expression::new(key, operator, values))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { match_labels: match_labels.cloned().unwrap_or_default(), match_expressions })
    }

    pub fn matches(&self, labels: &Map) -> bool {
        self.match_labels.iter().all(|(k, v)| labels.get(k) == Some(v)) && self.match_expressions.iter().all(|expr| expr.matches(labels))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for LabelSelector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self {
            match_labels: iter.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
            match_expressions: vec![],
        }
    }
}

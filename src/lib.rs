mod common;
pub mod configuration;
pub mod graph;
pub mod relationship;

pub use common::{
    conditions, BackendGroup, BackendRef, Condition, ConditionStatus, Gateway, GatewayClass, InvariantViolation, Listener, ParentRef,
    ResolvedSecret, ResourceKey, Route,
};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

mod backends_resolver;
mod reference_grants_resolver;
mod secrets_resolver;

pub use backends_resolver::{add_backend_groups, BackendGroup, BackendRef};
pub use reference_grants_resolver::ReferenceGrantIndex;
pub use secrets_resolver::{ResolvedSecret, SecretResolver};
#[cfg(test)]
pub(crate) use secrets_resolver::{SECRET_TYPE_TLS, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY};

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use rustls_pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use serde::Serialize;
use tracing::debug;

use crate::common::ResourceKey;

const TARGET: &str = "kubvernor_graph::secrets";

pub const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Outcome of resolving one Secret. `error` is set when the Secret is missing or unusable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResolvedSecret {
    pub key: ResourceKey,
    pub path: String,
    pub error: Option<String>,
}

/// Validates TLS Secrets referenced by listeners and hands out the path the file collaborator writes them to.
///
/// Every Secret is validated once per build; later requests reuse the recorded outcome.
pub struct SecretResolver<'a> {
    cluster_secrets: &'a BTreeMap<ResourceKey, Secret>,
    secrets_directory: String,
    resolved_secrets: BTreeMap<ResourceKey, ResolvedSecret>,
}

impl<'a> SecretResolver<'a> {
    pub fn new(cluster_secrets: &'a BTreeMap<ResourceKey, Secret>, secrets_directory: &str) -> Self {
        Self {
            cluster_secrets,
            secrets_directory: secrets_directory.trim_end_matches('/').to_owned(),
            resolved_secrets: BTreeMap::new(),
        }
    }

    pub fn resolve(&mut self, key: &ResourceKey) -> Result<String, String> {
        let cluster_secrets = self.cluster_secrets;
        let secrets_directory = &self.secrets_directory;
        let resolved = self.resolved_secrets.entry(key.clone()).or_insert_with(|| {
            let error = validate_secret(cluster_secrets.get(key)).err();
            debug!(target: TARGET, "Resolved secret {key} error {error:?}");
            ResolvedSecret {
                key: key.clone(),
                path: format!("{secrets_directory}/{}_{}", key.namespace, key.name),
                error,
            }
        });

        match &resolved.error {
            None => Ok(resolved.path.clone()),
            Some(error) => Err(error.clone()),
        }
    }

    pub fn resolved_secrets(&self) -> impl Iterator<Item = &ResolvedSecret> {
        self.resolved_secrets.values()
    }

    pub fn into_resolved_secrets(self) -> BTreeMap<ResourceKey, ResolvedSecret> {
        self.resolved_secrets
    }
}

fn validate_secret(secret: Option<&Secret>) -> Result<(), String> {
    let Some(secret) = secret else {
        return Err("secret does not exist".to_owned());
    };

    let secret_type = secret.type_.as_deref().unwrap_or_default();
    if secret_type != SECRET_TYPE_TLS {
        return Err(format!("secret type must be \"{SECRET_TYPE_TLS}\" not \"{secret_type}\""));
    }

    let data = secret.data.as_ref();
    let certificate = data.and_then(|data| data.get(TLS_CERT_KEY));
    let private_key = data.and_then(|data| data.get(TLS_PRIVATE_KEY_KEY));

    match (certificate, private_key) {
        (Some(certificate), Some(private_key)) => {
            match (CertificateDer::from_pem_slice(&certificate.0), PrivateKeyDer::from_pem_slice(&private_key.0)) {
                (Ok(_), Ok(_)) => Ok(()),
                (Err(e), Ok(_)) => Err(format!("TLS secret is invalid: certificate: {e}")),
                (Ok(_), Err(e)) => Err(format!("TLS secret is invalid: private key: {e}")),
                (Err(e_cert), Err(e_key)) => Err(format!("TLS secret is invalid: certificate: {e_cert}, private key: {e_key}")),
            }
        },
        _ => Err(format!("TLS secret is invalid: {TLS_CERT_KEY} and {TLS_PRIVATE_KEY_KEY} must be set")),
    }
}

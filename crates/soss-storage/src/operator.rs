//! OpenDAL Operator factory for S3-compatible endpoints

use opendal::Operator;
use secrecy::{ExposeSecret, SecretString};
use soss_core::config::StorageConfig;
use soss_core::{SossError, SossResult};

/// Environment variables consulted for credentials, in order of precedence
const ACCESS_KEY_VARS: [&str; 3] = [
    "AWS_ACCESS_KEY_ID",
    "SOSS_ACCESS_KEY_ID",
    "OSS_ACCESS_KEY_ID",
];
const SECRET_KEY_VARS: [&str; 3] = [
    "AWS_SECRET_ACCESS_KEY",
    "SOSS_SECRET_ACCESS_KEY",
    "OSS_ACCESS_KEY_SECRET",
];

/// S3 access key pair
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: SecretString,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: SecretString::from(secret_access_key.into()),
        }
    }

    /// Read credentials from the process environment.
    pub fn from_env() -> SossResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`. `AWS_*` variables win over
    /// `SOSS_*`, which win over the legacy `OSS_ACCESS_KEY_ID` /
    /// `OSS_ACCESS_KEY_SECRET` pair; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> SossResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.is_empty()))
        };

        let access_key_id = first(&ACCESS_KEY_VARS).ok_or_else(|| {
            SossError::Config(format!(
                "missing S3 access key: set one of {}",
                ACCESS_KEY_VARS.join(", ")
            ))
        })?;
        let secret_access_key = first(&SECRET_KEY_VARS).ok_or_else(|| {
            SossError::Config(format!(
                "missing S3 secret key: set one of {}",
                SECRET_KEY_VARS.join(", ")
            ))
        })?;

        Ok(Self::new(access_key_id, secret_access_key))
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

/// Build an OpenDAL Operator for an S3-compatible endpoint.
///
/// Uses path-style addressing (the opendal default), which MinIO and most
/// self-hosted gateways require.
///
/// If `enforce_tls` is set and the endpoint uses HTTP this returns an error;
/// otherwise plaintext endpoints only log a warning.
pub fn build_operator(storage: &StorageConfig, creds: &Credentials) -> SossResult<Operator> {
    if storage.bucket.is_empty() {
        return Err(SossError::Config("storage.bucket must not be empty".into()));
    }

    if storage.endpoint.starts_with("http://") {
        if storage.enforce_tls {
            return Err(SossError::Config(format!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                storage.endpoint
            )));
        }
        tracing::warn!(
            endpoint = %storage.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&storage.endpoint)
        .region(&storage.region)
        .bucket(&storage.bucket)
        .access_key_id(&creds.access_key_id)
        .secret_access_key(creds.secret_access_key.expose_secret());

    let op = Operator::new(builder)
        .map_err(|e| SossError::Storage(format!("creating OpenDAL S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

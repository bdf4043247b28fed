// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment exactly once at startup and
//! turned into an immutable [`AppConfig`]. Components never read the
//! environment themselves; they receive the values they need (or a
//! [`crate::identity::ServiceIdentity`] built from them) at construction.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SERVICE_NAME` | Identity used in signed envelopes | `reporting-service` |
//! | `SERVICE_VERSION` | Version advertised on registration | crate version |
//! | `SERVICE_ENDPOINT` | Publicly reachable base URL of this service | Required for registration |
//! | `SERVICE_DESCRIPTION` | Free-text description sent on registration | built-in text |
//! | `SERVICE_ID` | Pre-assigned Coordinator id (skips registration) | Optional |
//! | `COORDINATOR_URL` | Coordinator base URL | Required |
//! | `COORDINATOR_SERVICE_NAME` | Signer identity expected on replies | `coordinator` |
//! | `PRIVATE_KEY` / `PRIVATE_KEY_PATH` | PEM private key (P-256) | Required |
//! | `COORDINATOR_PUBLIC_KEY` / `COORDINATOR_PUBLIC_KEY_PATH` | PEM public key | Optional |
//! | `SIGNATURE_NAMESPACE` | Prefix of every canonical message | `microservice` |
//! | `COORDINATOR_REPLY_VERIFICATION` | `warn` or `enforce` | `warn` |
//! | `PEER_REPLY_VERIFICATION` | `warn` or `enforce` | `enforce` |
//! | `DATABASE_URL` | Postgres connection string | Required |
//! | `DATABASE_MAX_CONNECTIONS` | Pool size | `5` |
//! | `SEED_STRATEGY` | `sentinel`, `versioned` or `off` | `sentinel` |
//! | `SNAPSHOT_SYNC_INTERVAL_SECS` | Peer refresh interval | `900` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fs;
use std::time::Duration;

use crate::error::ConfigurationError;

pub const SERVICE_NAME_ENV: &str = "SERVICE_NAME";
pub const SERVICE_VERSION_ENV: &str = "SERVICE_VERSION";
pub const SERVICE_ENDPOINT_ENV: &str = "SERVICE_ENDPOINT";
pub const SERVICE_DESCRIPTION_ENV: &str = "SERVICE_DESCRIPTION";
pub const SERVICE_ID_ENV: &str = "SERVICE_ID";
pub const COORDINATOR_URL_ENV: &str = "COORDINATOR_URL";
pub const COORDINATOR_SERVICE_NAME_ENV: &str = "COORDINATOR_SERVICE_NAME";
pub const PRIVATE_KEY_ENV: &str = "PRIVATE_KEY";
pub const PRIVATE_KEY_PATH_ENV: &str = "PRIVATE_KEY_PATH";
pub const COORDINATOR_PUBLIC_KEY_ENV: &str = "COORDINATOR_PUBLIC_KEY";
pub const COORDINATOR_PUBLIC_KEY_PATH_ENV: &str = "COORDINATOR_PUBLIC_KEY_PATH";
pub const SIGNATURE_NAMESPACE_ENV: &str = "SIGNATURE_NAMESPACE";
pub const COORDINATOR_REPLY_VERIFICATION_ENV: &str = "COORDINATOR_REPLY_VERIFICATION";
pub const PEER_REPLY_VERIFICATION_ENV: &str = "PEER_REPLY_VERIFICATION";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const DATABASE_MAX_CONNECTIONS_ENV: &str = "DATABASE_MAX_CONNECTIONS";
pub const SEED_STRATEGY_ENV: &str = "SEED_STRATEGY";
pub const SNAPSHOT_SYNC_INTERVAL_ENV: &str = "SNAPSHOT_SYNC_INTERVAL_SECS";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_SERVICE_NAME: &str = "reporting-service";
pub const DEFAULT_COORDINATOR_SERVICE_NAME: &str = "coordinator";
pub const DEFAULT_SIGNATURE_NAMESPACE: &str = "microservice";
pub const DEFAULT_SERVICE_DESCRIPTION: &str =
    "Reporting backend aggregating assessment, catalog, directory and analytics data";
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/health";

const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SNAPSHOT_SYNC_INTERVAL: Duration = Duration::from_secs(900);
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// How a failed signature check on an inbound reply is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Log a warning and accept the reply.
    Warn,
    /// Reject the reply with a signature error.
    Enforce,
}

impl VerificationMode {
    fn parse(name: &str, raw: &str) -> Result<Self, ConfigurationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "warn" | "soft" => Ok(Self::Warn),
            "enforce" | "strict" => Ok(Self::Enforce),
            other => Err(ConfigurationError::Invalid {
                name: name.to_string(),
                reason: format!("expected `warn` or `enforce`, got `{other}`"),
            }),
        }
    }
}

/// Single source of truth for how inbound reply signatures are handled.
///
/// Generic Coordinator replies and peer-data replies are governed separately;
/// the defaults keep generic replies permissive and peer data strict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustPolicy {
    pub coordinator_replies: VerificationMode,
    pub peer_replies: VerificationMode,
}

impl Default for TrustPolicy {
    fn default() -> Self {
        Self {
            coordinator_replies: VerificationMode::Warn,
            peer_replies: VerificationMode::Enforce,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStrategy {
    Sentinel,
    Versioned,
    Off,
}

impl SeedStrategy {
    fn parse(raw: &str) -> Result<Self, ConfigurationError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sentinel" => Ok(Self::Sentinel),
            "versioned" => Ok(Self::Versioned),
            "off" | "none" | "disabled" => Ok(Self::Off),
            other => Err(ConfigurationError::Invalid {
                name: SEED_STRATEGY_ENV.to_string(),
                reason: format!("unknown seed strategy `{other}`"),
            }),
        }
    }
}

/// Immutable process configuration.
///
/// Required-ness is enforced by the components that need a value (for example
/// the envelope client refuses to build without a Coordinator URL), so a
/// partially configured process can still serve health probes.
#[derive(Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub service_version: String,
    pub service_endpoint: Option<String>,
    pub service_description: String,
    pub service_id: Option<String>,
    pub coordinator_url: Option<String>,
    pub coordinator_service_name: String,
    pub private_key_pem: Option<String>,
    pub coordinator_public_key_pem: Option<String>,
    pub signature_namespace: String,
    pub trust_policy: TrustPolicy,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub seed_strategy: SeedStrategy,
    pub snapshot_sync_interval: Duration,
    pub host: String,
    pub port: u16,
    pub json_logs: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("service_name", &self.service_name)
            .field("service_version", &self.service_version)
            .field("service_endpoint", &self.service_endpoint)
            .field("service_id", &self.service_id)
            .field("coordinator_url", &self.coordinator_url)
            .field("coordinator_service_name", &self.coordinator_service_name)
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("coordinator_public_key", &self.coordinator_public_key_pem.is_some())
            .field("signature_namespace", &self.signature_namespace)
            .field("trust_policy", &self.trust_policy)
            .field("database_configured", &self.database_url.is_some())
            .field("seed_strategy", &self.seed_strategy)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let trust_policy = TrustPolicy {
            coordinator_replies: match get(COORDINATOR_REPLY_VERIFICATION_ENV) {
                Some(raw) => VerificationMode::parse(COORDINATOR_REPLY_VERIFICATION_ENV, &raw)?,
                None => TrustPolicy::default().coordinator_replies,
            },
            peer_replies: match get(PEER_REPLY_VERIFICATION_ENV) {
                Some(raw) => VerificationMode::parse(PEER_REPLY_VERIFICATION_ENV, &raw)?,
                None => TrustPolicy::default().peer_replies,
            },
        };

        let private_key_pem = load_pem(&get, PRIVATE_KEY_ENV, PRIVATE_KEY_PATH_ENV)?;
        let coordinator_public_key_pem = load_pem(
            &get,
            COORDINATOR_PUBLIC_KEY_ENV,
            COORDINATOR_PUBLIC_KEY_PATH_ENV,
        )?;

        let database_max_connections = match get(DATABASE_MAX_CONNECTIONS_ENV) {
            Some(raw) => parse_number(DATABASE_MAX_CONNECTIONS_ENV, &raw)?,
            None => DEFAULT_DATABASE_MAX_CONNECTIONS,
        };

        let snapshot_sync_interval = match get(SNAPSHOT_SYNC_INTERVAL_ENV) {
            Some(raw) => Duration::from_secs(parse_number(SNAPSHOT_SYNC_INTERVAL_ENV, &raw)?),
            None => DEFAULT_SNAPSHOT_SYNC_INTERVAL,
        };

        let port = match get(PORT_ENV) {
            Some(raw) => parse_number(PORT_ENV, &raw)?,
            None => DEFAULT_PORT,
        };

        let seed_strategy = match get(SEED_STRATEGY_ENV) {
            Some(raw) => SeedStrategy::parse(&raw)?,
            None => SeedStrategy::Sentinel,
        };

        Ok(Self {
            service_name: get(SERVICE_NAME_ENV).unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            service_version: get(SERVICE_VERSION_ENV)
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            service_endpoint: get(SERVICE_ENDPOINT_ENV),
            service_description: get(SERVICE_DESCRIPTION_ENV)
                .unwrap_or_else(|| DEFAULT_SERVICE_DESCRIPTION.to_string()),
            service_id: get(SERVICE_ID_ENV),
            coordinator_url: get(COORDINATOR_URL_ENV),
            coordinator_service_name: get(COORDINATOR_SERVICE_NAME_ENV)
                .unwrap_or_else(|| DEFAULT_COORDINATOR_SERVICE_NAME.to_string()),
            private_key_pem,
            coordinator_public_key_pem,
            signature_namespace: get(SIGNATURE_NAMESPACE_ENV)
                .unwrap_or_else(|| DEFAULT_SIGNATURE_NAMESPACE.to_string()),
            trust_policy,
            database_url: get(DATABASE_URL_ENV),
            database_max_connections,
            seed_strategy,
            snapshot_sync_interval,
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            json_logs: get(LOG_FORMAT_ENV)
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        })
    }

    /// Coordinator base URL or a configuration error naming the variable.
    pub fn require_coordinator_url(&self) -> Result<&str, ConfigurationError> {
        self.coordinator_url
            .as_deref()
            .ok_or_else(|| ConfigurationError::Missing(COORDINATOR_URL_ENV.to_string()))
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigurationError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| ConfigurationError::Missing(DATABASE_URL_ENV.to_string()))
    }
}

/// Read a PEM either inline (with `\n` escapes allowed) or from a file path.
fn load_pem<G>(get: &G, inline_var: &str, path_var: &str) -> Result<Option<String>, ConfigurationError>
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(pem) = get(inline_var) {
        return Ok(Some(pem.replace("\\n", "\n")));
    }

    let Some(path) = get(path_var) else {
        return Ok(None);
    };
    let pem = fs::read_to_string(&path).map_err(|e| ConfigurationError::Invalid {
        name: path_var.to_string(),
        reason: format!("failed to read {path}: {e}"),
    })?;
    let trimmed = pem.trim().to_string();
    if trimmed.is_empty() {
        return Err(ConfigurationError::Invalid {
            name: path_var.to_string(),
            reason: format!("{path} is empty"),
        });
    }
    Ok(Some(trimmed))
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigurationError> {
    raw.parse().map_err(|_| ConfigurationError::Invalid {
        name: name.to_string(),
        reason: format!("`{raw}` is not a valid number"),
    })
}

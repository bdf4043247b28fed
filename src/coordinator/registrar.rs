// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! One-time registration with the Coordinator at boot.
//!
//! Registration is advisory: [`ServiceRegistrar::register_service`] never
//! returns an error. Failures are classified for operators and logged, and
//! startup continues regardless.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::envelope::{excerpt, EnvelopeClient, DEFAULT_TIMEOUT};
use crate::config::{AppConfig, DEFAULT_HEALTH_CHECK_PATH, SERVICE_ENDPOINT_ENV};
use crate::error::RelayError;
use crate::retry::RetryPolicy;

pub const REGISTER_PATH: &str = "/register";

/// Body of `POST {coordinator}/register`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub service_name: String,
    pub version: String,
    pub endpoint: String,
    pub health_check: String,
    pub description: String,
    pub metadata: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationReply {
    #[serde(default, alias = "id")]
    service_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationStatus {
    Pending,
    Active,
    Other(String),
}

impl RegistrationStatus {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(s) if s.eq_ignore_ascii_case("pending") => Self::Pending,
            Some(s) if s.eq_ignore_ascii_case("active") => Self::Active,
            Some(s) => Self::Other(s.to_string()),
            None => Self::Other("unknown".to_string()),
        }
    }
}

/// Why a registration attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationFailure {
    /// 401: the Coordinator rejected our signature or does not know our key.
    #[error("Coordinator rejected the signature (401); check PRIVATE_KEY against the key registered for this service")]
    Unauthorized,

    #[error("Coordinator has no registration endpoint (404)")]
    EndpointMissing,

    #[error("Coordinator returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("no response from Coordinator: {0}")]
    Transport(String),

    #[error("registration not attempted: {0}")]
    Configuration(String),
}

impl RegistrationFailure {
    /// Configuration problems will not fix themselves between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RegistrationFailure::Configuration(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered {
        service_id: Option<String>,
        status: RegistrationStatus,
    },
    /// A service id was already configured.
    Skipped { service_id: String },
    Failed {
        attempts: u32,
        last_failure: RegistrationFailure,
    },
}

#[derive(Debug, Clone)]
pub struct ServiceRegistrar {
    client: EnvelopeClient,
    service_id: Option<String>,
    request: Result<RegistrationRequest, RegistrationFailure>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ServiceRegistrar {
    pub fn new(client: EnvelopeClient, config: &AppConfig) -> Self {
        let request = match config.service_endpoint.as_deref() {
            Some(endpoint) => Ok(RegistrationRequest {
                service_name: client.identity().service_name().to_string(),
                version: config.service_version.clone(),
                endpoint: endpoint.to_string(),
                health_check: DEFAULT_HEALTH_CHECK_PATH.to_string(),
                description: config.service_description.clone(),
                metadata: json!({
                    "signatureNamespace": config.signature_namespace,
                    "datasets": ["assessments", "courses", "directory", "analytics"],
                }),
            }),
            None => Err(RegistrationFailure::Configuration(format!(
                "{SERVICE_ENDPOINT_ENV} is not set"
            ))),
        };

        Self {
            client,
            service_id: config.service_id.clone(),
            request,
            retry: RetryPolicy::registration(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn request(&self) -> Option<&RegistrationRequest> {
        self.request.as_ref().ok()
    }

    /// Register once, retrying with backoff. Never fails.
    pub async fn register_service(&self) -> RegistrationOutcome {
        if let Some(service_id) = &self.service_id {
            info!(service_id = %service_id, "service id already configured, skipping registration");
            return RegistrationOutcome::Skipped {
                service_id: service_id.clone(),
            };
        }

        let request = match &self.request {
            Ok(request) => request,
            Err(failure) => {
                error!(error = %failure, "Coordinator registration skipped");
                return RegistrationOutcome::Failed {
                    attempts: 0,
                    last_failure: failure.clone(),
                };
            }
        };
        let payload = match serde_json::to_value(request) {
            Ok(payload) => payload,
            Err(e) => {
                let failure = RegistrationFailure::Configuration(e.to_string());
                error!(error = %failure, "Coordinator registration skipped");
                return RegistrationOutcome::Failed {
                    attempts: 0,
                    last_failure: failure,
                };
            }
        };

        let attempts = AtomicU32::new(0);
        let result = self
            .retry
            .run_while("coordinator_registration", RegistrationFailure::is_retryable, |_| {
                attempts.fetch_add(1, Ordering::Relaxed);
                self.attempt(&payload)
            })
            .await;
        let attempts = attempts.into_inner();

        match result {
            Ok((service_id, status)) => {
                info!(
                    service_id = service_id.as_deref().unwrap_or("<none>"),
                    status = ?status,
                    endpoint = %request.endpoint,
                    "registered with Coordinator"
                );
                RegistrationOutcome::Registered { service_id, status }
            }
            Err(last_failure) => {
                error!(
                    attempts,
                    error = %last_failure,
                    "Coordinator registration failed; continuing without it"
                );
                RegistrationOutcome::Failed {
                    attempts,
                    last_failure,
                }
            }
        }
    }

    /// Run [`Self::register_service`] in the background.
    pub fn spawn(self) -> JoinHandle<RegistrationOutcome> {
        tokio::spawn(async move { self.register_service().await })
    }

    async fn attempt(
        &self,
        payload: &Value,
    ) -> Result<(Option<String>, RegistrationStatus), RegistrationFailure> {
        let reply = self
            .client
            .send_signed(REGISTER_PATH, payload, self.timeout)
            .await
            .map_err(|e| match e {
                RelayError::Transport(t) => RegistrationFailure::Transport(t.to_string()),
                other => RegistrationFailure::Configuration(other.to_string()),
            })?;

        match reply.status {
            200..=299 => {
                let parsed: RegistrationReply = serde_json::from_slice(&reply.body).unwrap_or_else(|e| {
                    warn!(error = %e, "registration reply is not the expected JSON");
                    RegistrationReply::default()
                });
                Ok((
                    parsed.service_id,
                    RegistrationStatus::parse(parsed.status.as_deref()),
                ))
            }
            401 => Err(RegistrationFailure::Unauthorized),
            404 => Err(RegistrationFailure::EndpointMissing),
            status => Err(RegistrationFailure::Http {
                status,
                body: excerpt(&reply.body),
            }),
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed envelope exchange with the Coordinator relay.
//!
//! ## Outbound
//!
//! The envelope is serialized once; those exact bytes are both signed (via
//! the canonical message) and sent. Headers:
//!
//! - `X-Service-Name`: this service
//! - `X-Signature`: base64 P-256 signature
//!
//! ## Inbound
//!
//! When the reply carries `X-Service-Signature` and a Coordinator public key
//! is configured, the signature is checked against the raw body bytes. What
//! happens on failure is decided by [`TrustPolicy::coordinator_replies`]
//! (`warn` by default: log and accept).
//!
//! [`TrustPolicy::coordinator_replies`]: crate::config::TrustPolicy

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header::HeaderMap, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{AppConfig, VerificationMode, COORDINATOR_URL_ENV};
use crate::error::{ConfigurationError, ProtocolError, RelayError, SignatureError, TransportError};
use crate::identity::ServiceIdentity;

pub const SERVICE_NAME_HEADER: &str = "X-Service-Name";
pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const REPLY_SIGNATURE_HEADER: &str = "X-Service-Signature";

pub const DEFAULT_ENVELOPE_ENDPOINT: &str = "/api/fill-content-metrics/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ERROR_BODY_EXCERPT: usize = 512;

/// Request/response wrapper exchanged through the Coordinator.
///
/// `response` is a template: the peer fills in its placeholder values and
/// echoes the envelope back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub requester: String,
    pub payload: Value,
    pub response: Value,
}

#[derive(Debug, Clone)]
pub struct PostOptions {
    pub endpoint: String,
    pub timeout: Duration,
    /// Record the reply signature outcome without acting on it; the caller
    /// applies its own trust policy.
    pub defer_verification: bool,
}

impl Default for PostOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENVELOPE_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            defer_verification: false,
        }
    }
}

impl PostOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn deferring_verification(mut self) -> Self {
        self.defer_verification = true;
        self
    }
}

/// Result of checking the Coordinator's reply signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySignature {
    /// Reply carried no signature header.
    NotPresent,
    /// Signature present but no Coordinator public key configured.
    Unchecked,
    Valid,
    /// Failed verification and the policy let it through.
    Invalid,
}

/// Raw Coordinator reply, kept byte-exact for downstream verification.
#[derive(Debug, Clone)]
pub struct CoordinatorReply {
    pub status: u16,
    pub signer: Option<String>,
    pub signature: Option<String>,
    pub raw_body: Vec<u8>,
    pub signature_check: ReplySignature,
}

impl CoordinatorReply {
    pub fn json(&self) -> Result<Value, ProtocolError> {
        serde_json::from_slice(&self.raw_body).map_err(|e| ProtocolError::MalformedBody(e.to_string()))
    }
}

/// Unvalidated HTTP reply to a signed request.
#[derive(Debug)]
pub(crate) struct SignedReply {
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EnvelopeClient {
    identity: Arc<ServiceIdentity>,
    base_url: String,
    http: Client,
}

impl EnvelopeClient {
    pub fn new(identity: Arc<ServiceIdentity>, base_url: &str) -> Result<Self, ConfigurationError> {
        let parsed = Url::parse(base_url.trim()).map_err(|e| ConfigurationError::Invalid {
            name: COORDINATOR_URL_ENV.to_string(),
            reason: e.to_string(),
        })?;
        let http = Client::builder()
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                name: COORDINATOR_URL_ENV.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            identity,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(
        config: &AppConfig,
        identity: Arc<ServiceIdentity>,
    ) -> Result<Self, ConfigurationError> {
        Self::new(identity, config.require_coordinator_url()?)
    }

    pub fn identity(&self) -> &Arc<ServiceIdentity> {
        &self.identity
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a signed envelope and return the (soft-)verified reply.
    pub async fn post_to_coordinator(
        &self,
        envelope: &Envelope,
        options: &PostOptions,
    ) -> Result<CoordinatorReply, RelayError> {
        let payload = serde_json::to_value(envelope)
            .map_err(|e| SignatureError::InvalidInput(format!("envelope: {e}")))?;
        let path = normalize_endpoint(&options.endpoint);

        let reply = self.send_signed(&path, &payload, options.timeout).await?;
        if !(200..300).contains(&reply.status) {
            return Err(TransportError::Status {
                url: reply.url,
                status: reply.status,
                body: excerpt(&reply.body),
            }
            .into());
        }

        let signer = header_string(&reply.headers, SERVICE_NAME_HEADER);
        let signature = header_string(&reply.headers, REPLY_SIGNATURE_HEADER);
        let signature_check =
            self.check_reply_signature(&reply, signature.as_deref(), options.defer_verification)?;

        Ok(CoordinatorReply {
            status: reply.status,
            signer,
            signature,
            raw_body: reply.body,
            signature_check,
        })
    }

    fn check_reply_signature(
        &self,
        reply: &SignedReply,
        signature: Option<&str>,
        deferred: bool,
    ) -> Result<ReplySignature, SignatureError> {
        let Some(signature) = signature else {
            return Ok(ReplySignature::NotPresent);
        };

        match self.identity.verify_coordinator_body(&reply.body, signature) {
            None => {
                debug!(url = %reply.url, "no Coordinator public key configured, reply signature unchecked");
                Ok(ReplySignature::Unchecked)
            }
            Some(true) => Ok(ReplySignature::Valid),
            Some(false) if deferred => Ok(ReplySignature::Invalid),
            Some(false) => match self.identity.trust_policy().coordinator_replies {
                VerificationMode::Warn => {
                    warn!(
                        url = %reply.url,
                        coordinator = self.identity.coordinator_name(),
                        "Coordinator reply signature did not verify; accepting under warn policy"
                    );
                    Ok(ReplySignature::Invalid)
                }
                VerificationMode::Enforce => Err(SignatureError::VerificationFailed {
                    signer: self.identity.coordinator_name().to_string(),
                }),
            },
        }
    }

    /// Sign `payload` as this service and POST it to `path` on the Coordinator.
    ///
    /// Any HTTP status is returned as-is; only a missing response is an error.
    pub(crate) async fn send_signed(
        &self,
        path: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<SignedReply, RelayError> {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_vec(payload)
            .map_err(|e| SignatureError::InvalidInput(format!("payload: {e}")))?;
        let signature = self.identity.sign(payload)?;
        let request_id = Uuid::new_v4();

        info!(
            %request_id,
            url = %url,
            service = self.identity.service_name(),
            timeout_ms = timeout.as_millis() as u64,
            "sending signed request to Coordinator"
        );

        let response = self
            .http
            .post(&url)
            .timeout(timeout)
            .header(SERVICE_NAME_HEADER, self.identity.service_name())
            .header(SIGNATURE_HEADER, signature)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(&url, e))?
            .to_vec();

        debug!(%request_id, status, bytes = body.len(), "Coordinator replied");

        Ok(SignedReply {
            url,
            status,
            headers,
            body,
        })
    }
}

/// Collapse an endpoint to `/segment/.../` with exactly one trailing slash.
pub fn normalize_endpoint(endpoint: &str) -> String {
    let inner = endpoint.trim().trim_matches('/');
    if inner.is_empty() {
        "/".to_string()
    } else {
        format!("/{inner}/")
    }
}

pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(ERROR_BODY_EXCERPT).collect()
}

fn transport_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustPolicy;
    use crate::coordinator::log_capture::capture;
    use crate::coordinator::test_server::spawn;
    use crate::identity::test_support::{coordinator_signature, identity_with_coordinator};
    use axum::{
        body::Bytes,
        http::{HeaderMap as AxumHeaders, StatusCode},
        response::IntoResponse,
        routing::post,
        Router,
    };
    use serde_json::json;

    fn envelope() -> Envelope {
        Envelope {
            requester: "reporting-service".to_string(),
            payload: json!({ "action": "ping" }),
            response: json!({ "pong": null }),
        }
    }

    #[test]
    fn endpoints_are_normalized_to_single_trailing_slash() {
        assert_eq!(normalize_endpoint("api/fill-content-metrics"), "/api/fill-content-metrics/");
        assert_eq!(normalize_endpoint("/api/fill-content-metrics//"), "/api/fill-content-metrics/");
        assert_eq!(normalize_endpoint("  /x/ "), "/x/");
        assert_eq!(normalize_endpoint(""), "/");
        assert_eq!(normalize_endpoint("///"), "/");
    }

    #[test]
    fn missing_coordinator_url_is_fatal_configuration() {
        let (identity, _) = identity_with_coordinator(TrustPolicy::default());
        let config = AppConfig::from_lookup(|_| None).unwrap();
        let err = EnvelopeClient::from_config(&config, Arc::new(identity)).unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing(name) if name == COORDINATOR_URL_ENV));
    }

    #[tokio::test]
    async fn signed_reply_from_coordinator_is_verified() {
        let (identity, coordinator_key) = identity_with_coordinator(TrustPolicy::default());
        let identity = Arc::new(identity);

        let reply_body = json!({ "requester": "reporting-service", "response": { "pong": true } });
        let reply_signature = coordinator_signature(&coordinator_key, &reply_body);
        let router = Router::new().route(
            "/api/fill-content-metrics/",
            post(move |headers: AxumHeaders, body: Bytes| {
                let reply_body = reply_body.clone();
                let reply_signature = reply_signature.clone();
                async move {
                    let ok = headers.get("x-service-name").map(|v| v.as_bytes())
                        == Some(b"reporting-service".as_slice())
                        && headers.get("x-signature").is_some()
                        && serde_json::from_slice::<Value>(&body).is_ok();
                    if !ok {
                        return (StatusCode::BAD_REQUEST, "missing headers").into_response();
                    }
                    (
                        [
                            ("X-Service-Name", "coordinator".to_string()),
                            ("X-Service-Signature", reply_signature),
                        ],
                        serde_json::to_vec(&reply_body).unwrap(),
                    )
                        .into_response()
                }
            }),
        );
        let base = spawn(router).await;

        let client = EnvelopeClient::new(identity, &base).unwrap();
        let reply = client
            .post_to_coordinator(&envelope(), &PostOptions::default())
            .await
            .expect("reply");

        assert_eq!(reply.status, 200);
        assert_eq!(reply.signer.as_deref(), Some("coordinator"));
        assert_eq!(reply.signature_check, ReplySignature::Valid);
        assert_eq!(reply.json().unwrap()["response"]["pong"], json!(true));
    }

    #[tokio::test]
    async fn coordinator_verifies_our_signature_from_raw_body() {
        use crate::signing::keys::test_keys::generate_pem_pair;
        use crate::signing::{signing_key_from_pem, verifying_key_from_pem, SignatureEngine};

        let (private_pem, public_pem) = generate_pem_pair();
        let identity = Arc::new(ServiceIdentity::new(
            "reporting-service",
            signing_key_from_pem(&private_pem).unwrap(),
            "coordinator",
            None,
            "microservice",
            TrustPolicy::default(),
        ));
        let service_key = verifying_key_from_pem(&public_pem).unwrap();

        let router = Router::new().route(
            "/api/fill-content-metrics/",
            post(move |headers: AxumHeaders, body: Bytes| {
                let service_key = service_key.clone();
                async move {
                    let signature = headers
                        .get("x-signature")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let verified = SignatureEngine::new("microservice").verify_raw(
                        "reporting-service",
                        &service_key,
                        &body,
                        &signature,
                    );
                    let status = if verified { StatusCode::OK } else { StatusCode::UNAUTHORIZED };
                    (status, "{}").into_response()
                }
            }),
        );
        let base = spawn(router).await;

        let client = EnvelopeClient::new(identity, &base).unwrap();
        let reply = client
            .post_to_coordinator(&envelope(), &PostOptions::default())
            .await
            .expect("Coordinator accepted signature");
        assert_eq!(reply.signature_check, ReplySignature::NotPresent);
    }

    fn tampered_router(body: Value) -> Router {
        Router::new().route(
            "/api/fill-content-metrics/",
            post(move || {
                let body = body.clone();
                async move {
                    (
                        [
                            ("X-Service-Name", "coordinator"),
                            ("X-Service-Signature", "AAAAtamperedAAAA"),
                        ],
                        serde_json::to_vec(&body).unwrap(),
                    )
                        .into_response()
                }
            }),
        )
    }

    #[tokio::test]
    async fn tampered_reply_signature_is_soft_under_warn_policy() {
        let (logs, _guard) = capture();
        let (identity, _) = identity_with_coordinator(TrustPolicy::default());
        let base = spawn(tampered_router(json!({ "response": { "ok": true } }))).await;

        let client = EnvelopeClient::new(Arc::new(identity), &base).unwrap();
        let reply = client
            .post_to_coordinator(&envelope(), &PostOptions::default())
            .await
            .expect("soft policy still resolves");
        assert_eq!(reply.status, 200);
        assert_eq!(reply.signature_check, ReplySignature::Invalid);

        let output = logs.contents();
        assert!(output.contains("WARN"), "{output}");
        assert!(output.contains("reply signature did not verify"), "{output}");
    }

    #[tokio::test]
    async fn tampered_reply_signature_is_rejected_under_enforce_policy() {
        let policy = TrustPolicy {
            coordinator_replies: VerificationMode::Enforce,
            ..TrustPolicy::default()
        };
        let (identity, _) = identity_with_coordinator(policy);
        let base = spawn(tampered_router(json!({ "response": {} }))).await;

        let client = EnvelopeClient::new(Arc::new(identity), &base).unwrap();
        let err = client
            .post_to_coordinator(&envelope(), &PostOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Signature(SignatureError::VerificationFailed { .. })
        ));
    }

    #[tokio::test]
    async fn error_status_is_a_transport_error() {
        let (identity, _) = identity_with_coordinator(TrustPolicy::default());
        let router = Router::new().route(
            "/api/fill-content-metrics/",
            post(|| async { (StatusCode::BAD_GATEWAY, "upstream down") }),
        );
        let base = spawn(router).await;

        let client = EnvelopeClient::new(Arc::new(identity), &base).unwrap();
        let err = client
            .post_to_coordinator(&envelope(), &PostOptions::default())
            .await
            .unwrap_err();
        match err {
            RelayError::Transport(TransportError::Status { status, body, .. }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "upstream down");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_coordinator_is_a_transport_error() {
        let (identity, _) = identity_with_coordinator(TrustPolicy::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = EnvelopeClient::new(Arc::new(identity), &format!("http://{addr}")).unwrap();
        let err = client
            .post_to_coordinator(
                &envelope(),
                &PostOptions::default().with_timeout(Duration::from_secs(2)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}

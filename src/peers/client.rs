// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fetch pipeline for peer datasets relayed by the Coordinator.
//!
//! Every peer reply goes through the same checks, in order:
//!
//! 1. both `X-Service-Name` and `X-Service-Signature` are present
//! 2. the signer is the configured Coordinator (before the body is parsed)
//! 3. the signature verifies, per the `peer_replies` trust mode
//! 4. `response` is unwrapped at exactly the peer's [`ResponseEncoding`] depth
//! 5. the container field holds an array
//! 6. records missing expected keys are logged, then decoded into DTOs
//!
//! Only steps 1 to 5 fail the fetch. A record that does not decode is logged
//! and skipped; the rest of the dataset is kept.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::VerificationMode;
use crate::coordinator::envelope::{REPLY_SIGNATURE_HEADER, SERVICE_NAME_HEADER};
use crate::coordinator::{CoordinatorReply, Envelope, EnvelopeClient, PostOptions, ReplySignature};
use crate::error::{ProtocolError, RelayError, SignatureError};

pub const PEER_TIMEOUT: Duration = Duration::from_secs(180);

/// How deep a peer nests its filled `response` inside JSON strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseEncoding {
    /// `"response": { ... }`
    Object,
    /// `"response": "{ ... }"`
    StringEncoded,
    /// `"response": "\"{ ... }\""`
    DoubleStringEncoded,
}

impl ResponseEncoding {
    pub fn depth(self) -> usize {
        match self {
            ResponseEncoding::Object => 0,
            ResponseEncoding::StringEncoded => 1,
            ResponseEncoding::DoubleStringEncoded => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ResponseEncoding::Object => "object",
            ResponseEncoding::StringEncoded => "string-encoded",
            ResponseEncoding::DoubleStringEncoded => "double-string-encoded",
        }
    }
}

/// A dataset served by one peer through the Coordinator.
pub trait PeerDataset {
    /// Peer name used in logs and errors.
    const PEER: &'static str;
    const ENCODING: ResponseEncoding;
    /// Field of the unwrapped response holding the record array.
    const CONTAINER: &'static str;
    /// Keys every record is expected to carry.
    const REQUIRED_KEYS: &'static [&'static str];

    type Record: DeserializeOwned;

    /// `payload` of the request: action text plus parameters.
    fn payload() -> Value;

    /// `response` template with placeholder values for the peer to fill.
    fn response_template() -> Value;
}

#[derive(Debug, Clone)]
pub struct PeerClient {
    envelope: EnvelopeClient,
    options: PostOptions,
}

impl PeerClient {
    pub fn new(envelope: EnvelopeClient) -> Self {
        Self {
            envelope,
            options: PostOptions::default()
                .with_timeout(PEER_TIMEOUT)
                .deferring_verification(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Request dataset `D` and return its validated records.
    pub async fn fetch<D: PeerDataset>(&self) -> Result<Vec<D::Record>, RelayError> {
        let identity = self.envelope.identity();
        let envelope = Envelope {
            requester: identity.service_name().to_string(),
            payload: D::payload(),
            response: D::response_template(),
        };

        let reply = self.envelope.post_to_coordinator(&envelope, &self.options).await?;
        self.check_signer(&reply)?;
        self.check_signature(D::PEER, &reply)?;

        let body = reply.json()?;
        let records = extract_records(D::PEER, D::ENCODING, D::CONTAINER, &body)?;
        soft_validate(D::PEER, D::REQUIRED_KEYS, &records);

        let (decoded, skipped) = decode_records::<D::Record>(D::PEER, records);

        info!(peer = D::PEER, records = decoded.len(), skipped, "peer dataset fetched");
        Ok(decoded)
    }

    fn check_signer(&self, reply: &CoordinatorReply) -> Result<(), ProtocolError> {
        let signer = reply
            .signer
            .as_deref()
            .ok_or(ProtocolError::MissingHeader(SERVICE_NAME_HEADER))?;
        if reply.signature.is_none() {
            return Err(ProtocolError::MissingHeader(REPLY_SIGNATURE_HEADER));
        }

        let expected = self.envelope.identity().coordinator_name();
        if signer != expected {
            return Err(ProtocolError::UnexpectedSigner {
                expected: expected.to_string(),
                actual: signer.to_string(),
            });
        }
        Ok(())
    }

    fn check_signature(&self, peer: &'static str, reply: &CoordinatorReply) -> Result<(), RelayError> {
        let identity = self.envelope.identity();
        match reply.signature_check {
            ReplySignature::Valid => Ok(()),
            ReplySignature::Unchecked => {
                debug!(peer, "no Coordinator public key configured, peer reply unverified");
                Ok(())
            }
            ReplySignature::NotPresent => {
                Err(ProtocolError::MissingHeader(REPLY_SIGNATURE_HEADER).into())
            }
            ReplySignature::Invalid => match identity.trust_policy().peer_replies {
                VerificationMode::Enforce => Err(SignatureError::VerificationFailed {
                    signer: identity.coordinator_name().to_string(),
                }
                .into()),
                VerificationMode::Warn => {
                    warn!(peer, "peer reply signature did not verify; accepting under warn policy");
                    Ok(())
                }
            },
        }
    }
}

/// Unwrap `body.response` at exactly `encoding`'s depth and return the
/// records under `container`.
pub fn extract_records(
    peer: &'static str,
    encoding: ResponseEncoding,
    container: &str,
    body: &Value,
) -> Result<Vec<Value>, ProtocolError> {
    let response = body.get("response").ok_or_else(|| ProtocolError::WrongShape {
        peer,
        reason: "missing `response` field".to_string(),
    })?;

    let unexpected = || ProtocolError::UnexpectedEncoding {
        peer,
        expected: encoding.name(),
    };

    let mut current = response.clone();
    for _ in 0..encoding.depth() {
        let Value::String(text) = &current else {
            return Err(unexpected());
        };
        current = serde_json::from_str(text).map_err(|_| unexpected())?;
    }
    let Value::Object(mut fields) = current else {
        return Err(unexpected());
    };

    match fields.remove(container) {
        Some(Value::Array(records)) => Ok(records),
        Some(other) => Err(ProtocolError::WrongShape {
            peer,
            reason: format!("`{container}` is {}, expected an array", type_name(&other)),
        }),
        None => Err(ProtocolError::WrongShape {
            peer,
            reason: format!("missing `{container}`"),
        }),
    }
}

/// Log records missing expected keys. Never rejects.
pub fn soft_validate(peer: &'static str, required: &[&str], records: &[Value]) -> usize {
    let mut incomplete = 0;
    for (index, record) in records.iter().enumerate() {
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| record.get(*key).map_or(true, Value::is_null))
            .collect();
        if !missing.is_empty() {
            incomplete += 1;
            warn!(peer, index, missing = ?missing, "peer record is missing expected keys");
        }
    }
    incomplete
}

/// Decode each record on its own. Returns the decoded records and how many
/// were skipped.
pub fn decode_records<R: DeserializeOwned>(peer: &'static str, records: Vec<Value>) -> (Vec<R>, usize) {
    let mut decoded = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for (index, record) in records.into_iter().enumerate() {
        match serde_json::from_value(record) {
            Ok(record) => decoded.push(record),
            Err(e) => {
                skipped += 1;
                warn!(peer, index, error = %e, "peer record has unexpected field types, skipping");
            }
        }
    }
    (decoded, skipped)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Canonical message construction.
//!
//! Every signature in the envelope protocol covers the string
//! `<namespace>-<service>[-<sha256hex(json)>]`. The hash segment is omitted
//! when there is no payload (absent or JSON `null`).
//!
//! `serde_json::Value` keeps object keys in a `BTreeMap`, so serializing the
//! same object graph always yields the same bytes regardless of the order in
//! which keys were inserted.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::SignatureError;

/// Builds canonical messages for one signature namespace.
#[derive(Debug, Clone)]
pub struct MessageCanonicalizer {
    namespace: String,
}

impl MessageCanonicalizer {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Canonical message for `(service_name, payload)`.
    pub fn canonicalize(
        &self,
        service_name: &str,
        payload: Option<&Value>,
    ) -> Result<String, SignatureError> {
        let service_name = validate_service_name(service_name)?;
        match payload {
            None | Some(Value::Null) => Ok(self.base(service_name)),
            Some(value) => {
                let json = serde_json::to_string(value)
                    .map_err(|e| SignatureError::InvalidInput(format!("payload: {e}")))?;
                Ok(self.with_digest(service_name, json.as_bytes()))
            }
        }
    }

    /// Canonical message for an already-serialized JSON body.
    ///
    /// Equal to [`Self::canonicalize`] over the value that produced `body`.
    pub fn canonicalize_raw(&self, service_name: &str, body: &[u8]) -> Result<String, SignatureError> {
        let service_name = validate_service_name(service_name)?;
        Ok(self.with_digest(service_name, body))
    }

    fn base(&self, service_name: &str) -> String {
        format!("{}-{}", self.namespace, service_name)
    }

    fn with_digest(&self, service_name: &str, bytes: &[u8]) -> String {
        let digest = format!("{:x}", Sha256::digest(bytes));
        let message = format!("{}-{}", self.base(service_name), digest);
        tracing::trace!(service = service_name, digest = %digest, "canonical message built");
        message
    }
}

fn validate_service_name(service_name: &str) -> Result<&str, SignatureError> {
    if service_name.trim().is_empty() {
        return Err(SignatureError::InvalidInput(
            "service name must be a non-empty identifier".to_string(),
        ));
    }
    Ok(service_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonicalizer() -> MessageCanonicalizer {
        MessageCanonicalizer::new("microservice")
    }

    #[test]
    fn absent_and_null_payloads_use_base_form() {
        let c = canonicalizer();
        assert_eq!(c.canonicalize("svc", None).unwrap(), "microservice-svc");
        assert_eq!(c.canonicalize("svc", Some(&Value::Null)).unwrap(), "microservice-svc");
    }

    #[test]
    fn empty_object_differs_from_no_payload() {
        let c = canonicalizer();
        let empty = c.canonicalize("svc", Some(&json!({}))).unwrap();
        assert_ne!(empty, "microservice-svc");
        // sha256("{}")
        assert_eq!(
            empty,
            "microservice-svc-44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
    }

    #[test]
    fn canonicalization_is_deterministic_and_key_order_independent() {
        let c = canonicalizer();
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":2,"x":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":3,"y":2},"b":1}"#).unwrap();
        let first = c.canonicalize("reporting", Some(&a)).unwrap();
        assert_eq!(first, c.canonicalize("reporting", Some(&a)).unwrap());
        assert_eq!(first, c.canonicalize("reporting", Some(&b)).unwrap());
    }

    #[test]
    fn raw_body_matches_value_form() {
        let c = canonicalizer();
        let payload = json!({ "requester": "reporting", "payload": { "action": "x" } });
        let body = serde_json::to_vec(&payload).unwrap();
        assert_eq!(
            c.canonicalize("coordinator", Some(&payload)).unwrap(),
            c.canonicalize_raw("coordinator", &body).unwrap()
        );
    }

    #[test]
    fn empty_service_name_is_rejected() {
        let c = canonicalizer();
        assert!(matches!(
            c.canonicalize("", None),
            Err(SignatureError::InvalidInput(_))
        ));
        assert!(matches!(
            c.canonicalize_raw("   ", b"{}"),
            Err(SignatureError::InvalidInput(_))
        ));
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ECDSA P-256 signatures over canonical messages.
//!
//! Signatures are SHA-256 / P-256 in IEEE-P1363 form (`r || s`, 64 bytes),
//! base64-encoded. Verification always rebuilds the canonical message from
//! the service name and payload it is given; it never trusts a message string
//! shipped next to the signature.

use base64ct::{Base64, Encoding};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use serde_json::Value;

use super::canonical::MessageCanonicalizer;
use super::keys::{signing_key_from_pem, verifying_key_from_pem};
use crate::error::SignatureError;

#[derive(Debug, Clone)]
pub struct SignatureEngine {
    canonicalizer: MessageCanonicalizer,
}

impl SignatureEngine {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            canonicalizer: MessageCanonicalizer::new(namespace),
        }
    }

    pub fn canonicalizer(&self) -> &MessageCanonicalizer {
        &self.canonicalizer
    }

    /// Sign `(service_name, payload)` and return the base64 signature.
    pub fn sign(
        &self,
        service_name: &str,
        key: &SigningKey,
        payload: Option<&Value>,
    ) -> Result<String, SignatureError> {
        let message = self.canonicalizer.canonicalize(service_name, payload)?;
        let signature: Signature = key
            .try_sign(message.as_bytes())
            .map_err(|e| SignatureError::Signing(e.to_string()))?;
        Ok(Base64::encode_string(&signature.to_bytes()))
    }

    /// Same as [`Self::sign`] with a PEM-encoded private key.
    pub fn sign_pem(
        &self,
        service_name: &str,
        private_key_pem: &str,
        payload: Option<&Value>,
    ) -> Result<String, SignatureError> {
        let key = signing_key_from_pem(private_key_pem)?;
        self.sign(service_name, &key, payload)
    }

    /// Check a signature over `(service_name, payload)`. Never fails loudly.
    pub fn verify(
        &self,
        service_name: &str,
        key: &VerifyingKey,
        payload: Option<&Value>,
        signature_b64: &str,
    ) -> bool {
        match self.canonicalizer.canonicalize(service_name, payload) {
            Ok(message) => verify_message(key, &message, signature_b64),
            Err(e) => {
                tracing::debug!(error = %e, "verification skipped: invalid canonical input");
                false
            }
        }
    }

    /// Same as [`Self::verify`] with a PEM-encoded public key.
    pub fn verify_pem(
        &self,
        service_name: &str,
        public_key_pem: &str,
        payload: Option<&Value>,
        signature_b64: &str,
    ) -> bool {
        match verifying_key_from_pem(public_key_pem) {
            Ok(key) => self.verify(service_name, &key, payload, signature_b64),
            Err(e) => {
                tracing::debug!(error = %e, "verification skipped: unusable public key");
                false
            }
        }
    }

    /// Check a signature over a raw JSON body exactly as received.
    pub fn verify_raw(
        &self,
        service_name: &str,
        key: &VerifyingKey,
        body: &[u8],
        signature_b64: &str,
    ) -> bool {
        match self.canonicalizer.canonicalize_raw(service_name, body) {
            Ok(message) => verify_message(key, &message, signature_b64),
            Err(e) => {
                tracing::debug!(error = %e, "verification skipped: invalid canonical input");
                false
            }
        }
    }
}

fn verify_message(key: &VerifyingKey, message: &str, signature_b64: &str) -> bool {
    let Ok(bytes) = Base64::decode_vec(signature_b64.trim()) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&bytes) else {
        return false;
    };
    key.verify(message.as_bytes(), &signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::keys::test_keys::generate_pem_pair;
    use serde_json::json;

    fn engine() -> SignatureEngine {
        SignatureEngine::new("microservice")
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let (private_pem, public_pem) = generate_pem_pair();
        let payload = json!({ "requester": "reporting", "payload": { "action": "list" } });

        let signature = engine()
            .sign_pem("reporting", &private_pem, Some(&payload))
            .unwrap();
        assert!(engine().verify_pem("reporting", &public_pem, Some(&payload), &signature));
    }

    #[test]
    fn signature_is_p1363_sized() {
        let (private_pem, _) = generate_pem_pair();
        let signature = engine().sign_pem("reporting", &private_pem, None).unwrap();
        assert_eq!(Base64::decode_vec(&signature).unwrap().len(), 64);
    }

    #[test]
    fn signing_is_deterministic() {
        let (private_pem, _) = generate_pem_pair();
        let payload = json!({ "a": 1 });
        let one = engine().sign_pem("svc", &private_pem, Some(&payload)).unwrap();
        let two = engine().sign_pem("svc", &private_pem, Some(&payload)).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn changed_service_name_fails_verification() {
        let (private_pem, public_pem) = generate_pem_pair();
        let payload = json!({ "a": 1 });
        let signature = engine().sign_pem("svc", &private_pem, Some(&payload)).unwrap();
        assert!(!engine().verify_pem("other-svc", &public_pem, Some(&payload), &signature));
    }

    #[test]
    fn changed_payload_fails_verification() {
        let (private_pem, public_pem) = generate_pem_pair();
        let signature = engine()
            .sign_pem("svc", &private_pem, Some(&json!({ "a": 1 })))
            .unwrap();
        assert!(!engine().verify_pem("svc", &public_pem, Some(&json!({ "a": 2 })), &signature));
        assert!(!engine().verify_pem("svc", &public_pem, None, &signature));
    }

    #[test]
    fn flipped_signature_byte_fails_verification() {
        let (private_pem, public_pem) = generate_pem_pair();
        let payload = json!({ "a": 1 });
        let signature = engine().sign_pem("svc", &private_pem, Some(&payload)).unwrap();

        let mut bytes = Base64::decode_vec(&signature).unwrap();
        bytes[10] ^= 0x01;
        let tampered = Base64::encode_string(&bytes);
        assert!(!engine().verify_pem("svc", &public_pem, Some(&payload), &tampered));
    }

    #[test]
    fn malformed_inputs_return_false() {
        let (private_pem, public_pem) = generate_pem_pair();
        let signature = engine().sign_pem("svc", &private_pem, None).unwrap();

        assert!(!engine().verify_pem("svc", "garbage", None, &signature));
        assert!(!engine().verify_pem("svc", &public_pem, None, "%%% not base64"));
        assert!(!engine().verify_pem("svc", &public_pem, None, &Base64::encode_string(b"short")));
        assert!(!engine().verify_pem("", &public_pem, None, &signature));
    }

    #[test]
    fn signing_with_bad_key_is_an_error() {
        assert!(matches!(
            engine().sign_pem("svc", "garbage", None),
            Err(SignatureError::InvalidKey(_))
        ));
    }

    #[test]
    fn raw_body_verification_matches_value_signing() {
        let (private_pem, public_pem) = generate_pem_pair();
        let reply = json!({ "response": { "courses": [] }, "requester": "reporting" });
        let signature = engine()
            .sign_pem("coordinator", &private_pem, Some(&reply))
            .unwrap();

        let body = serde_json::to_vec(&reply).unwrap();
        let key = verifying_key_from_pem(&public_pem).unwrap();
        assert!(engine().verify_raw("coordinator", &key, &body, &signature));
        assert!(!engine().verify_raw("coordinator", &key, b"{\"tampered\":true}", &signature));
    }
}

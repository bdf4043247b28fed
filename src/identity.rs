// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The immutable signing identity of this service.
//!
//! Built once from [`AppConfig`] and shared through an `Arc`; every component
//! that signs or verifies receives it at construction.

use p256::ecdsa::{SigningKey, VerifyingKey};
use serde_json::Value;

use crate::config::{AppConfig, TrustPolicy, COORDINATOR_PUBLIC_KEY_ENV, PRIVATE_KEY_ENV};
use crate::error::{ConfigurationError, SignatureError};
use crate::signing::{signing_key_from_pem, verifying_key_from_pem, SignatureEngine};

pub struct ServiceIdentity {
    service_name: String,
    signing_key: SigningKey,
    coordinator_name: String,
    coordinator_key: Option<VerifyingKey>,
    engine: SignatureEngine,
    trust_policy: TrustPolicy,
}

impl std::fmt::Debug for ServiceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceIdentity")
            .field("service_name", &self.service_name)
            .field("coordinator_name", &self.coordinator_name)
            .field("coordinator_key", &self.coordinator_key.is_some())
            .field("trust_policy", &self.trust_policy)
            .finish_non_exhaustive()
    }
}

impl ServiceIdentity {
    pub fn new(
        service_name: impl Into<String>,
        signing_key: SigningKey,
        coordinator_name: impl Into<String>,
        coordinator_key: Option<VerifyingKey>,
        namespace: impl Into<String>,
        trust_policy: TrustPolicy,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            signing_key,
            coordinator_name: coordinator_name.into(),
            coordinator_key,
            engine: SignatureEngine::new(namespace),
            trust_policy,
        }
    }

    /// Build the identity, failing if the private key is absent or unusable.
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigurationError> {
        let private_pem = config
            .private_key_pem
            .as_deref()
            .ok_or_else(|| ConfigurationError::Missing(PRIVATE_KEY_ENV.to_string()))?;
        let signing_key = signing_key_from_pem(private_pem).map_err(|e| ConfigurationError::Invalid {
            name: PRIVATE_KEY_ENV.to_string(),
            reason: e.to_string(),
        })?;

        let coordinator_key = config
            .coordinator_public_key_pem
            .as_deref()
            .map(verifying_key_from_pem)
            .transpose()
            .map_err(|e| ConfigurationError::Invalid {
                name: COORDINATOR_PUBLIC_KEY_ENV.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::new(
            config.service_name.clone(),
            signing_key,
            config.coordinator_service_name.clone(),
            coordinator_key,
            config.signature_namespace.clone(),
            config.trust_policy,
        ))
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn coordinator_name(&self) -> &str {
        &self.coordinator_name
    }

    pub fn coordinator_key(&self) -> Option<&VerifyingKey> {
        self.coordinator_key.as_ref()
    }

    pub fn trust_policy(&self) -> TrustPolicy {
        self.trust_policy
    }

    pub fn engine(&self) -> &SignatureEngine {
        &self.engine
    }

    /// Sign a payload as this service.
    pub fn sign(&self, payload: &Value) -> Result<String, SignatureError> {
        self.engine
            .sign(&self.service_name, &self.signing_key, Some(payload))
    }

    /// Verify a raw reply body claimed to be signed by the Coordinator.
    ///
    /// Returns `None` when no Coordinator public key is configured.
    pub fn verify_coordinator_body(&self, body: &[u8], signature_b64: &str) -> Option<bool> {
        let key = self.coordinator_key.as_ref()?;
        Some(
            self.engine
                .verify_raw(&self.coordinator_name, key, body, signature_b64),
        )
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::keys::test_keys::generate_pem_pair;
    use std::collections::HashMap;

    fn config(vars: &[(&str, String)]) -> AppConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned()).unwrap()
    }

    #[test]
    fn missing_private_key_is_a_configuration_error() {
        let err = ServiceIdentity::from_config(&config(&[])).unwrap_err();
        assert!(matches!(err, ConfigurationError::Missing(name) if name == PRIVATE_KEY_ENV));
    }

    #[test]
    fn unusable_public_key_is_rejected() {
        let (private_pem, _) = generate_pem_pair();
        let err = ServiceIdentity::from_config(&config(&[
            (PRIVATE_KEY_ENV, private_pem),
            (COORDINATOR_PUBLIC_KEY_ENV, "garbage".to_string()),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Invalid { .. }));
    }

    #[test]
    fn identity_signs_as_configured_service() {
        let (private_pem, public_pem) = generate_pem_pair();
        let identity = ServiceIdentity::from_config(&config(&[
            (PRIVATE_KEY_ENV, private_pem),
            ("SERVICE_NAME", "analytics-reporting".to_string()),
        ]))
        .unwrap();

        let payload = serde_json::json!({ "hello": "world" });
        let signature = identity.sign(&payload).unwrap();
        assert!(identity
            .engine()
            .verify_pem("analytics-reporting", &public_pem, Some(&payload), &signature));
        assert!(identity.verify_coordinator_body(b"{}", &signature).is_none());
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! PEM key loading for P-256 envelope signing.

use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use p256::SecretKey;

use crate::error::SignatureError;

/// Parse a P-256 private key from PEM.
///
/// Accepts PKCS#8 (`BEGIN PRIVATE KEY`) and falls back to SEC1
/// (`BEGIN EC PRIVATE KEY`).
pub fn signing_key_from_pem(pem: &str) -> Result<SigningKey, SignatureError> {
    let pem = normalize_pem(pem);
    SigningKey::from_pkcs8_pem(&pem)
        .or_else(|_| SecretKey::from_sec1_pem(&pem).map(SigningKey::from))
        .map_err(|e| SignatureError::InvalidKey(format!("private key: {e}")))
}

/// Parse a P-256 public key from an SPKI PEM (`BEGIN PUBLIC KEY`).
pub fn verifying_key_from_pem(pem: &str) -> Result<VerifyingKey, SignatureError> {
    let pem = normalize_pem(pem);
    VerifyingKey::from_public_key_pem(&pem)
        .map_err(|e| SignatureError::InvalidKey(format!("public key: {e}")))
}

// Env-injected keys often arrive with literal `\n` and surrounding whitespace.
fn normalize_pem(pem: &str) -> String {
    pem.trim().replace("\\n", "\n")
}

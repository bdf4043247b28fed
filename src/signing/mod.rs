// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Envelope signing: canonical messages, P-256 keys and signatures.

pub mod canonical;
pub mod engine;
pub mod keys;

pub use canonical::MessageCanonicalizer;
pub use engine::SignatureEngine;
pub use keys::{signing_key_from_pem, verifying_key_from_pem};

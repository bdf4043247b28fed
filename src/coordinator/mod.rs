// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Coordinator relay integration: signed envelopes and service registration.

pub mod envelope;
pub mod registrar;

pub use envelope::{
    normalize_endpoint, CoordinatorReply, Envelope, EnvelopeClient, PostOptions, ReplySignature,
};
pub use registrar::{RegistrationFailure, RegistrationOutcome, RegistrationStatus, ServiceRegistrar};

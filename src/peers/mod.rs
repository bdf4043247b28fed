// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Peer data clients.
//!
//! Each peer dataset is a [`PeerDataset`] implementation: a request template,
//! the wire encoding of its reply and the DTO its records decode into.
//! [`PeerClient::fetch`] runs the shared verification pipeline.

pub mod analytics;
pub mod assessment;
pub mod catalog;
pub mod client;
pub mod directory;

pub use analytics::{LearnerProgress, LearnerProgressRecord};
pub use assessment::{AssessmentRecord, Assessments};
pub use catalog::{title_key, CourseRecord, Courses};
pub use client::{decode_records, PeerClient, PeerDataset, ResponseEncoding, PEER_TIMEOUT};
pub use directory::{Directory, DirectoryRecord};

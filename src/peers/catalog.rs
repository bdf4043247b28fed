// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Course catalog. Courses are identified by their normalized title because
//! catalog ids are not stable across catalog rebuilds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use unicode_normalization::UnicodeNormalization;

use super::client::{PeerDataset, ResponseEncoding};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CourseRecord {
    pub course_id: Option<String>,
    pub title: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub duration_hours: Option<f64>,
    pub published: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CourseRecord {
    /// Identity key derived from the title, if any.
    pub fn title_key(&self) -> Option<String> {
        self.title.as_deref().map(title_key).filter(|k| !k.is_empty())
    }
}

/// NFKC-normalize, lowercase and collapse whitespace.
pub fn title_key(title: &str) -> String {
    let normalized: String = title.nfkc().collect();
    normalized
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct Courses;

impl PeerDataset for Courses {
    const PEER: &'static str = "course-catalog";
    const ENCODING: ResponseEncoding = ResponseEncoding::StringEncoded;
    const CONTAINER: &'static str = "courses";
    const REQUIRED_KEYS: &'static [&'static str] = &["courseId", "title", "category"];

    type Record = CourseRecord;

    fn payload() -> Value {
        json!({
            "action": "List all catalog courses with category, level and duration.",
            "parameters": { "includeUnpublished": false }
        })
    }

    fn response_template() -> Value {
        json!({
            "courses": [{
                "courseId": "",
                "title": "",
                "category": "",
                "level": "",
                "durationHours": 0.0,
                "published": true,
                "updatedAt": null
            }]
        })
    }
}

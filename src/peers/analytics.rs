// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-learner course progress from the learning-analytics service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::client::{PeerDataset, ResponseEncoding};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerProgressRecord {
    pub user_id: Option<String>,
    pub course_id: Option<String>,
    pub progress_percent: Option<f64>,
    pub time_spent_minutes: Option<i64>,
    pub completed: Option<bool>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

pub struct LearnerProgress;

impl PeerDataset for LearnerProgress {
    const PEER: &'static str = "learning-analytics";
    const ENCODING: ResponseEncoding = ResponseEncoding::StringEncoded;
    const CONTAINER: &'static str = "learners";
    const REQUIRED_KEYS: &'static [&'static str] = &["userId", "courseId", "progressPercent"];

    type Record = LearnerProgressRecord;

    fn payload() -> Value {
        json!({
            "action": "Report progress and time spent for every learner in every enrolled course.",
            "parameters": { "window": "all" }
        })
    }

    fn response_template() -> Value {
        json!({
            "learners": [{
                "userId": "",
                "courseId": "",
                "progressPercent": 0.0,
                "timeSpentMinutes": 0,
                "completed": false,
                "lastActivityAt": null
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peers::client::extract_records;

    #[test]
    fn object_reply_is_rejected_for_string_encoded_peer() {
        let body = json!({ "response": { "learners": [] } });
        assert!(extract_records(
            LearnerProgress::PEER,
            LearnerProgress::ENCODING,
            LearnerProgress::CONTAINER,
            &body
        )
        .is_err());
    }

    #[test]
    fn string_encoded_reply_decodes() {
        let inner = json!({
            "learners": [{ "userId": "u1", "courseId": "c1", "progressPercent": 42.0 }]
        });
        let body = json!({ "response": inner.to_string() });
        let records = extract_records(
            LearnerProgress::PEER,
            LearnerProgress::ENCODING,
            LearnerProgress::CONTAINER,
            &body,
        )
        .unwrap();
        let record: LearnerProgressRecord = serde_json::from_value(records[0].clone()).unwrap();
        assert_eq!(record.progress_percent, Some(42.0));
        assert_eq!(record.time_spent_minutes, None);
    }
}

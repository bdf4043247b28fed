// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Exam attempts from the assessment service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::client::{PeerDataset, ResponseEncoding};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssessmentRecord {
    pub user_id: Option<String>,
    pub course_id: Option<String>,
    pub exam_type: Option<String>,
    pub attempt_number: Option<i64>,
    pub score: Option<f64>,
    pub max_score: Option<f64>,
    pub passed: Option<bool>,
    pub submitted_at: Option<DateTime<Utc>>,
}

/// The assessment peer double-encodes its `response`.
pub struct Assessments;

impl PeerDataset for Assessments {
    const PEER: &'static str = "assessment";
    const ENCODING: ResponseEncoding = ResponseEncoding::DoubleStringEncoded;
    const CONTAINER: &'static str = "assessments";
    const REQUIRED_KEYS: &'static [&'static str] =
        &["userId", "courseId", "examType", "attemptNumber", "score"];

    type Record = AssessmentRecord;

    fn payload() -> Value {
        json!({
            "action": "List every graded exam attempt with its score, per learner and course.",
            "parameters": { "includeRetakes": true }
        })
    }

    fn response_template() -> Value {
        json!({
            "assessments": [{
                "userId": "",
                "courseId": "",
                "examType": "",
                "attemptNumber": 0,
                "score": 0.0,
                "maxScore": 0.0,
                "passed": false,
                "submittedAt": null
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustPolicy;
    use crate::coordinator::EnvelopeClient;
    use crate::identity::test_support::identity_with_coordinator;
    use crate::peers::client::extract_records;
    use crate::peers::client::test_support::signed_coordinator;
    use crate::peers::PeerClient;
    use std::sync::Arc;

    #[test]
    fn template_keys_cover_required_keys() {
        let template = Assessments::response_template();
        let record = &template[Assessments::CONTAINER][0];
        for key in Assessments::REQUIRED_KEYS {
            assert!(record.get(*key).is_some(), "template lacks {key}");
        }
    }

    #[test]
    fn double_encoded_reply_decodes() {
        let inner = json!({
            "assessments": [{
                "userId": "u1",
                "courseId": "c1",
                "examType": "final",
                "attemptNumber": 2,
                "score": 87.5,
                "submittedAt": "2026-03-01T10:00:00Z"
            }]
        });
        let body = json!({ "response": Value::String(inner.to_string()).to_string() });

        let records = extract_records(
            Assessments::PEER,
            Assessments::ENCODING,
            Assessments::CONTAINER,
            &body,
        )
        .unwrap();
        let record: AssessmentRecord = serde_json::from_value(records[0].clone()).unwrap();
        assert_eq!(record.attempt_number, Some(2));
        assert_eq!(record.score, Some(87.5));
        assert!(record.passed.is_none());
        assert!(record.submitted_at.is_some());
    }

    #[tokio::test]
    async fn mistyped_attempt_does_not_drop_the_dataset() {
        let inner = json!({
            "assessments": [
                {
                    "userId": "u1",
                    "courseId": "c1",
                    "examType": "final",
                    "attemptNumber": 1,
                    "score": 91.0
                },
                {
                    "userId": 42,
                    "courseId": "c1",
                    "examType": "final",
                    "attemptNumber": "2"
                }
            ]
        });
        let body = json!({ "response": Value::String(inner.to_string()).to_string() });
        let (identity, coordinator_key) = identity_with_coordinator(TrustPolicy::default());
        let base = signed_coordinator(body, "coordinator", &coordinator_key).await;
        let envelope = EnvelopeClient::new(Arc::new(identity), &base).unwrap();

        let records = PeerClient::new(envelope).fetch::<Assessments>().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_id.as_deref(), Some("u1"));
        assert_eq!(records[0].score, Some(91.0));
    }
}

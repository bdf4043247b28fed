// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User directory.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::client::{PeerDataset, ResponseEncoding};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryRecord {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub department: Option<String>,
    pub active: Option<bool>,
}

pub struct Directory;

impl PeerDataset for Directory {
    const PEER: &'static str = "directory";
    const ENCODING: ResponseEncoding = ResponseEncoding::Object;
    const CONTAINER: &'static str = "users";
    const REQUIRED_KEYS: &'static [&'static str] = &["userId", "displayName", "role"];

    type Record = DirectoryRecord;

    fn payload() -> Value {
        json!({
            "action": "List all users with display name, role and department.",
            "parameters": { "includeInactive": true }
        })
    }

    fn response_template() -> Value {
        json!({
            "users": [{
                "userId": "",
                "displayName": "",
                "email": "",
                "role": "",
                "department": "",
                "active": true
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
    use crate::peers::client::test_support::signed_coordinator;
    use crate::peers::PeerClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn fetches_users_from_plain_object_response() {
        let (identity, coordinator_key) = identity_with_coordinator(TrustPolicy::default());
        let body = json!({
            "requester": "reporting-service",
            "response": {
                "users": [
                    { "userId": "u1", "displayName": "Ada", "role": "learner", "active": true },
                    { "userId": "u2", "role": "instructor" }
                ]
            }
        });
        let base = signed_coordinator(body, "coordinator", &coordinator_key).await;
        let client = PeerClient::new(EnvelopeClient::new(Arc::new(identity), &base).unwrap());

        let users = client.fetch::<Directory>().await.unwrap();

        assert_eq!(users.len(), 2);
        assert_eq!(users[0].display_name.as_deref(), Some("Ada"));
        assert_eq!(users[1].display_name, None);
        assert_eq!(users[1].role.as_deref(), Some("instructor"));
    }
}

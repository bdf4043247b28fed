// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Snapshot table mappings for the peer datasets.

use super::snapshot::{complete_identity, Cell, SnapshotRecord, SnapshotSchema};
use crate::peers::{AssessmentRecord, CourseRecord, DirectoryRecord, LearnerProgressRecord};

impl SnapshotRecord for AssessmentRecord {
    const SCHEMA: SnapshotSchema = SnapshotSchema {
        table: "assessment_snapshots",
        key_columns: &["user_id", "course_id", "exam_type", "attempt_number"],
        value_columns: &["score", "max_score", "passed", "submitted_at"],
    };

    fn identity(&self) -> Option<Vec<Cell>> {
        complete_identity(vec![
            Cell::Text(self.user_id.clone()),
            Cell::Text(self.course_id.clone()),
            Cell::Text(self.exam_type.clone()),
            Cell::BigInt(self.attempt_number),
        ])
    }

    fn values(&self) -> Vec<Cell> {
        vec![
            Cell::Double(self.score),
            Cell::Double(self.max_score),
            Cell::Bool(self.passed),
            Cell::Timestamp(self.submitted_at),
        ]
    }
}

// Courses are keyed on the normalized title; the peer's own id is a value.
impl SnapshotRecord for CourseRecord {
    const SCHEMA: SnapshotSchema = SnapshotSchema {
        table: "course_snapshots",
        key_columns: &["title_key"],
        value_columns: &[
            "course_id",
            "title",
            "category",
            "level",
            "duration_hours",
            "published",
            "source_updated_at",
        ],
    };

    fn identity(&self) -> Option<Vec<Cell>> {
        complete_identity(vec![Cell::Text(self.title_key())])
    }

    fn values(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.course_id.clone()),
            Cell::Text(self.title.clone()),
            Cell::Text(self.category.clone()),
            Cell::Text(self.level.clone()),
            Cell::Double(self.duration_hours),
            Cell::Bool(self.published),
            Cell::Timestamp(self.updated_at),
        ]
    }
}

impl SnapshotRecord for DirectoryRecord {
    const SCHEMA: SnapshotSchema = SnapshotSchema {
        table: "directory_snapshots",
        key_columns: &["user_id"],
        value_columns: &["display_name", "email", "role", "department", "active"],
    };

    fn identity(&self) -> Option<Vec<Cell>> {
        complete_identity(vec![Cell::Text(self.user_id.clone())])
    }

    fn values(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.display_name.clone()),
            Cell::Text(self.email.clone()),
            Cell::Text(self.role.clone()),
            Cell::Text(self.department.clone()),
            Cell::Bool(self.active),
        ]
    }
}

impl SnapshotRecord for LearnerProgressRecord {
    const SCHEMA: SnapshotSchema = SnapshotSchema {
        table: "learner_progress_snapshots",
        key_columns: &["user_id", "course_id"],
        value_columns: &[
            "progress_percent",
            "time_spent_minutes",
            "completed",
            "last_activity_at",
        ],
    };

    fn identity(&self) -> Option<Vec<Cell>> {
        complete_identity(vec![
            Cell::Text(self.user_id.clone()),
            Cell::Text(self.course_id.clone()),
        ])
    }

    fn values(&self) -> Vec<Cell> {
        vec![
            Cell::Double(self.progress_percent),
            Cell::BigInt(self.time_spent_minutes),
            Cell::Bool(self.completed),
            Cell::Timestamp(self.last_activity_at),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_arity<R: SnapshotRecord>(record: &R) {
        assert_eq!(record.values().len(), R::SCHEMA.value_columns.len());
        if let Some(identity) = record.identity() {
            assert_eq!(identity.len(), R::SCHEMA.key_columns.len());
        }
    }

    #[test]
    fn cells_line_up_with_columns() {
        check_arity(&AssessmentRecord {
            user_id: Some("u".into()),
            course_id: Some("c".into()),
            exam_type: Some("final".into()),
            attempt_number: Some(1),
            ..Default::default()
        });
        check_arity(&CourseRecord {
            title: Some("Rust".into()),
            ..Default::default()
        });
        check_arity(&DirectoryRecord {
            user_id: Some("u".into()),
            ..Default::default()
        });
        check_arity(&LearnerProgressRecord {
            user_id: Some("u".into()),
            course_id: Some("c".into()),
            ..Default::default()
        });
    }

    #[test]
    fn partial_identity_is_rejected() {
        let attempt = AssessmentRecord {
            user_id: Some("u".into()),
            course_id: Some("c".into()),
            exam_type: Some("final".into()),
            attempt_number: None,
            ..Default::default()
        };
        assert!(attempt.identity().is_none());
        assert!(DirectoryRecord::default().identity().is_none());
    }

    #[test]
    fn course_identity_is_the_title_key() {
        let course = CourseRecord {
            course_id: Some("c-17".into()),
            title: Some("  Data   STRUCTURES ".into()),
            ..Default::default()
        };
        assert_eq!(
            course.identity(),
            Some(vec![Cell::Text(Some("data structures".into()))])
        );
    }
}

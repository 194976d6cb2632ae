use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSubject {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject_id: Uuid,
    /// Share of completed chapters, 0–100.
    pub percentage: Decimal,
    /// Final 1–5 grade, 0 until a quarter assessment is finished.
    pub rating: Decimal,
    pub is_completed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserChapter {
    pub id: Uuid,
    pub user_subject_id: Uuid,
    pub chapter_id: Uuid,
    pub percentage: Decimal,
    pub rating: Decimal,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserLesson {
    pub id: Uuid,
    pub user_subject_id: Uuid,
    pub lesson_id: Uuid,
    pub status: String,
    pub rating: Decimal,
    pub percentage: Decimal,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserLesson {
    pub fn lesson_status(&self) -> LessonStatus {
        match self.status.as_str() {
            "in_progress" => LessonStatus::InProgress,
            "finished" => LessonStatus::Finished,
            _ => LessonStatus::NotStarted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    NotStarted,
    InProgress,
    Finished,
}

impl LessonStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonStatus::NotStarted => "not_started",
            LessonStatus::InProgress => "in_progress",
            LessonStatus::Finished => "finished",
        }
    }
}

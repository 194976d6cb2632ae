use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::content::MatchingPair;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserTask {
    pub id: Uuid,
    pub user_lesson_id: Uuid,
    pub task_id: Uuid,
    pub rating: Decimal,
    pub is_completed: bool,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserVideo {
    pub id: Uuid,
    pub user_task_id: Uuid,
    pub video_id: Uuid,
    pub watched_seconds: i32,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserWritten {
    pub id: Uuid,
    pub user_task_id: Uuid,
    pub written_id: Uuid,
    pub answer: String,
    pub is_submitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserTextGap {
    pub id: Uuid,
    pub user_task_id: Uuid,
    pub text_gap_id: Uuid,
    pub answer: Option<String>,
    pub is_correct: bool,
}

/// Selected options of one test question.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserAnswer {
    pub id: Uuid,
    pub user_task_id: Uuid,
    pub question_id: Uuid,
    #[sqlx(skip)]
    #[serde(default)]
    pub option_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserMatching {
    pub id: Uuid,
    pub user_task_id: Uuid,
    pub pair_id: Uuid,
    pub selected_right: String,
    pub is_correct: bool,
}

impl UserMatching {
    /// Stores the selection and re-evaluates correctness against the pair.
    pub fn check_answer(&mut self, pair: &MatchingPair, selected: &str) -> bool {
        self.selected_right = selected.trim().to_string();
        self.is_correct = self.selected_right == pair.right_item.trim();
        self.is_correct
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserTableAnswer {
    pub id: Uuid,
    pub user_task_id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    pub checked: bool,
    pub is_submitted: bool,
}

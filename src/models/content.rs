use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subject {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Chapter {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lesson {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub chapter_id: Uuid,
    pub title: String,
    pub lesson_type: String,
    pub quarter: i16,
    pub order: i32,
}

impl Lesson {
    pub fn kind(&self) -> LessonType {
        self.lesson_type.parse().unwrap_or(LessonType::Lesson)
    }
}

/// How a lesson contributes to the aggregated grades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    /// Regular lesson.
    Lesson,
    /// Formative assessment closing a chapter (БЖБ).
    Chapter,
    /// Summative assessment of a quarter (ТЖБ).
    Quarter,
}

impl LessonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonType::Lesson => "lesson",
            LessonType::Chapter => "chapter",
            LessonType::Quarter => "quarter",
        }
    }
}

impl FromStr for LessonType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lesson" => Ok(LessonType::Lesson),
            "chapter" => Ok(LessonType::Chapter),
            "quarter" => Ok(LessonType::Quarter),
            other => Err(format!("unknown lesson type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub lesson_id: Uuid,
    pub task_type: String,
    /// Maximum achievable rating.
    pub rating: i32,
    pub order: i32,
}

impl Task {
    /// `None` for task types this service does not know how to grade.
    pub fn kind(&self) -> Option<TaskType> {
        self.task_type.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Video,
    Written,
    TextGap,
    Test,
    Matching,
    Table,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Video => "video",
            TaskType::Written => "written",
            TaskType::TextGap => "text_gap",
            TaskType::Test => "test",
            TaskType::Matching => "matching",
            TaskType::Table => "table",
        }
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(TaskType::Video),
            "written" => Ok(TaskType::Written),
            "text_gap" => Ok(TaskType::TextGap),
            "test" => Ok(TaskType::Test),
            "matching" => Ok(TaskType::Matching),
            "table" => Ok(TaskType::Table),
            other => Err(format!("unknown task type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Video {
    pub id: Uuid,
    pub task_id: Uuid,
    pub url: String,
    pub duration: i32,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Written {
    pub id: Uuid,
    pub task_id: Uuid,
    pub instruction: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TextGap {
    pub id: Uuid,
    pub task_id: Uuid,
    pub prompt: String,
    #[serde(skip_serializing)]
    pub correct_answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub task_id: Uuid,
    pub text: String,
    pub question_type: String,
    pub order: i32,
}

impl Question {
    pub fn kind(&self) -> QuestionType {
        match self.question_type.as_str() {
            "multiple" => QuestionType::Multiple,
            _ => QuestionType::Simple,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Simple,
    Multiple,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnswerOption {
    pub id: Uuid,
    pub question_id: Uuid,
    pub text: Option<String>,
    #[serde(skip_serializing)]
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MatchingPair {
    pub id: Uuid,
    pub task_id: Uuid,
    pub left_item: String,
    pub right_item: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TableRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TableColumn {
    pub id: Uuid,
    pub task_id: Uuid,
    pub title: String,
    pub order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TableCell {
    pub id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    pub correct: bool,
}

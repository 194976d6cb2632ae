use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::content::{
    AnswerOption, Chapter, Lesson, Question, Subject, TableColumn, TableRow, Task, TextGap, Video,
    Written,
};
use crate::models::feedback::StatusMessage;
use crate::models::progress::{UserChapter, UserLesson, UserSubject};
use crate::models::user_task::{UserAnswer, UserTask, UserTextGap, UserVideo, UserWritten};
use crate::utils::form::FieldValue;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EnrolledSubject {
    pub user_subject_id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub percentage: Decimal,
    pub rating: Decimal,
    pub is_completed: bool,
}

/// A subject of the catalogue with the student's enrollment, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub subject: Subject,
    pub user_subject: Option<UserSubject>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterOutline {
    pub chapter: Chapter,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDetail {
    pub subject: Subject,
    pub user_subject: Option<UserSubject>,
    pub chapters: Vec<ChapterOutline>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollResponse {
    pub user_subject: UserSubject,
    pub message: StatusMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonProgress {
    pub lesson: Lesson,
    pub user_lesson: UserLesson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterProgress {
    pub chapter: Chapter,
    pub user_chapter: Option<UserChapter>,
    pub lessons: Vec<LessonProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectProgress {
    pub subject: Subject,
    pub user_subject: UserSubject,
    pub chapters: Vec<ChapterProgress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonActionResponse {
    pub user_lesson: UserLesson,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_user_task_id: Option<Uuid>,
    pub message: StatusMessage,
}

/// Raw form submission: field name to one or many values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct SubmitTaskRequest {
    #[serde(default)]
    #[validate(length(max = 2000))]
    #[schema(value_type = Object)]
    pub fields: HashMap<String, FieldValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitTaskResponse {
    pub user_task_id: Uuid,
    pub rating: Decimal,
    pub max_rating: i32,
    pub is_completed: bool,
    pub message: StatusMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchingLeft {
    pub user_matching_id: Uuid,
    pub left_item: String,
    pub selected_right: String,
}

/// Answer rows of a task together with what the student needs to render them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskContent {
    Video {
        videos: Vec<Video>,
        answers: Vec<UserVideo>,
    },
    Written {
        prompts: Vec<Written>,
        answers: Vec<UserWritten>,
    },
    TextGap {
        gaps: Vec<TextGap>,
        answers: Vec<UserTextGap>,
    },
    Test {
        questions: Vec<Question>,
        options: Vec<AnswerOption>,
        answers: Vec<UserAnswer>,
    },
    Matching {
        items: Vec<MatchingLeft>,
        right_choices: Vec<String>,
    },
    Table {
        rows: Vec<TableRow>,
        columns: Vec<TableColumn>,
        answers: Vec<Vec<bool>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        correct: Option<Vec<Vec<bool>>>,
    },
    Unsupported,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskView {
    pub user_task: UserTask,
    pub task: Task,
    pub content: TaskContent,
}

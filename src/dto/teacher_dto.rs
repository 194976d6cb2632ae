use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct GradeTaskRequest {
    #[validate(range(min = 0.0, max = 1000.0))]
    pub rating: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    /// Restricts the report to one class, e.g. `7A`.
    pub class: Option<String>,
    /// 1 to 4; anything else falls back to 1.
    pub quarter: Option<String>,
}

/// Raw per-subject averages straight from the database.
#[derive(Debug, Clone, FromRow)]
pub struct SubjectAverages {
    pub subject_id: Uuid,
    pub title: String,
    pub students: i64,
    pub subject_rating: Option<Decimal>,
    pub subject_percentage: Option<Decimal>,
    pub chapter_rating: Option<Decimal>,
    pub chapter_percentage: Option<Decimal>,
    pub lesson_rating: Option<Decimal>,
    pub lesson_percentage: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SubjectOverview {
    pub subject_id: Uuid,
    pub title: String,
    pub students: i64,
    pub subject_avg_rating: Decimal,
    pub subject_avg_percentage: Decimal,
    pub chapter_avg_rating: Decimal,
    pub chapter_avg_percentage: Decimal,
    pub lesson_avg_rating: Decimal,
    pub lesson_avg_percentage: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TeacherOverview {
    pub subjects_count: i64,
    pub enrollments_count: i64,
    pub subjects: Vec<SubjectOverview>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReportStudentRow {
    pub user_subject_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub user_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScoreBands {
    /// Below 40%.
    pub low: i64,
    /// 40% up to 85%.
    pub mid: i64,
    /// 85% and above.
    pub high: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AssessmentReport {
    pub lesson_id: Uuid,
    pub title: String,
    pub lesson_type: String,
    pub students: i64,
    pub max_score: i64,
    pub bands: ScoreBands,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct StudentReport {
    pub user_id: Uuid,
    pub user_subject_id: Uuid,
    pub full_name: String,
    pub user_class: Option<String>,
    pub quarter_avg_percentage: Decimal,
    pub chapter_avg_percentage: Decimal,
    pub chapter_avg_rating: Decimal,
    pub lesson_avg_percentage: Decimal,
    pub lesson_avg_rating: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportStatistics {
    pub subject_avg_percentage: Decimal,
    pub subject_avg_rating: Decimal,
    pub chapter_avg_percentage: Decimal,
    pub chapter_avg_rating: Decimal,
    pub lesson_avg_percentage: Decimal,
    pub lesson_avg_rating: Decimal,
    pub total_chapters: i64,
    pub completed_chapters: i64,
    pub total_lessons: i64,
    pub completed_lessons: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubjectReport {
    pub subject_id: Uuid,
    pub title: String,
    pub selected_class: Option<String>,
    pub selected_quarter: i16,
    pub available_classes: Vec<String>,
    pub assessments: Vec<AssessmentReport>,
    pub students: Vec<StudentReport>,
    pub statistics: ReportStatistics,
}

use axum::{response::IntoResponse, Json};
use utoipa::OpenApi;

use crate::dto::{student_dto, teacher_dto};
use crate::models::feedback::{MessageLevel, StatusMessage};
use crate::routes::{export, student, teacher};

#[derive(OpenApi)]
#[openapi(
    paths(
        student::catalog,
        student::subject_detail,
        student::list_subjects,
        student::enroll,
        student::subject_progress,
        student::start_lesson,
        student::finish_lesson,
        student::get_task,
        student::submit_task,
        teacher::overview,
        teacher::subject_report,
        teacher::grade_task,
        export::export_subject_report,
    ),
    components(schemas(
        MessageLevel,
        StatusMessage,
        student_dto::EnrolledSubject,
        student_dto::SubmitTaskRequest,
        student_dto::SubmitTaskResponse,
        teacher_dto::GradeTaskRequest,
        teacher_dto::TeacherOverview,
        teacher_dto::SubjectOverview,
        teacher_dto::SubjectReport,
        teacher_dto::AssessmentReport,
        teacher_dto::StudentReport,
        teacher_dto::ReportStatistics,
        teacher_dto::ScoreBands,
    )),
    tags((name = "learning-backend", description = "Grading and progress API"))
)]
pub struct ApiDoc;

pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::student_dto::{
    CatalogEntry, EnrollResponse, EnrolledSubject, LessonActionResponse, SubjectDetail,
    SubmitTaskRequest, SubmitTaskResponse,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::utils::form::FormData;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/student/catalog",
    responses(
        (status = 200, description = "All subjects with the student's enrollment, if any"),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[axum::debug_handler]
pub async fn catalog(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<CatalogEntry>>> {
    let entries = state.progress_service.catalog(claims.user_id()?).await?;
    Ok(Json(entries))
}

#[utoipa::path(
    get,
    path = "/api/student/catalog/{subject_id}",
    params(
        ("subject_id" = Uuid, Path, description = "Subject ID")
    ),
    responses(
        (status = 200, description = "Subject outline with the student's enrollment, if any"),
        (status = 404, description = "Subject not found")
    )
)]
#[axum::debug_handler]
pub async fn subject_detail(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(subject_id): Path<Uuid>,
) -> Result<Json<SubjectDetail>> {
    let detail = state
        .progress_service
        .subject_detail(claims.user_id()?, subject_id)
        .await?;
    Ok(Json(detail))
}

#[utoipa::path(
    get,
    path = "/api/student/subjects",
    responses(
        (status = 200, description = "Subjects the student is enrolled in", body = Vec<EnrolledSubject>),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[axum::debug_handler]
pub async fn list_subjects(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<EnrolledSubject>>> {
    let subjects = state.progress_service.list_subjects(claims.user_id()?).await?;
    Ok(Json(subjects))
}

#[utoipa::path(
    post,
    path = "/api/student/subjects/{subject_id}/enroll",
    params(
        ("subject_id" = Uuid, Path, description = "Subject ID")
    ),
    responses(
        (status = 200, description = "Enrolled, or already enrolled"),
        (status = 404, description = "Subject not found")
    )
)]
#[axum::debug_handler]
pub async fn enroll(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(subject_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state
        .enrollment_service
        .enroll(claims.user_id()?, subject_id)
        .await?;
    Ok(Json(EnrollResponse {
        user_subject: outcome.user_subject,
        message: outcome.message,
    }))
}

#[utoipa::path(
    get,
    path = "/api/student/user-subjects/{id}",
    params(
        ("id" = Uuid, Path, description = "UserSubject ID")
    ),
    responses(
        (status = 200, description = "Subject progress grouped by chapter"),
        (status = 404, description = "Not enrolled")
    )
)]
#[axum::debug_handler]
pub async fn subject_progress(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let progress = state
        .progress_service
        .subject_progress(claims.user_id()?, id)
        .await?;
    Ok(Json(progress))
}

#[utoipa::path(
    post,
    path = "/api/student/user-lessons/{id}/start",
    params(
        ("id" = Uuid, Path, description = "UserLesson ID")
    ),
    responses(
        (status = 200, description = "Lesson started; returns the first task"),
        (status = 404, description = "Lesson not found")
    )
)]
#[axum::debug_handler]
pub async fn start_lesson(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state
        .enrollment_service
        .start_lesson(claims.user_id()?, id)
        .await?;
    Ok(Json(LessonActionResponse {
        user_lesson: outcome.user_lesson,
        first_user_task_id: outcome.first_user_task_id,
        message: outcome.message,
    }))
}

#[utoipa::path(
    post,
    path = "/api/student/user-lessons/{id}/finish",
    params(
        ("id" = Uuid, Path, description = "UserLesson ID")
    ),
    responses(
        (status = 200, description = "Lesson finished and grades recomputed"),
        (status = 404, description = "Lesson not found")
    )
)]
#[axum::debug_handler]
pub async fn finish_lesson(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let outcome = state
        .aggregation_service
        .finish_lesson(claims.user_id()?, id)
        .await?;
    Ok(Json(LessonActionResponse {
        user_lesson: outcome.user_lesson,
        first_user_task_id: None,
        message: outcome.message,
    }))
}

#[utoipa::path(
    get,
    path = "/api/student/user-tasks/{id}",
    params(
        ("id" = Uuid, Path, description = "UserTask ID")
    ),
    responses(
        (status = 200, description = "Task with its answer rows"),
        (status = 404, description = "Task not found")
    )
)]
#[axum::debug_handler]
pub async fn get_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state
        .submission_service
        .get_task_view(claims.user_id()?, id)
        .await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/api/student/user-tasks/{id}/submit",
    params(
        ("id" = Uuid, Path, description = "UserTask ID")
    ),
    request_body = SubmitTaskRequest,
    responses(
        (status = 200, description = "Submission graded", body = SubmitTaskResponse),
        (status = 400, description = "Invalid payload"),
        (status = 404, description = "Task not found")
    )
)]
#[axum::debug_handler]
pub async fn submit_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitTaskRequest>,
) -> Result<Json<SubmitTaskResponse>> {
    payload.validate()?;
    let form = FormData::from(payload.fields);
    let result = state
        .submission_service
        .submit(claims.user_id()?, id, &form)
        .await?;
    Ok(Json(result))
}

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::dto::teacher_dto::{GradeTaskRequest, ReportQuery, SubjectReport, TeacherOverview};
use crate::error::{Error, Result};
use crate::services::statistics_service::parse_quarter;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/teacher/overview",
    responses(
        (status = 200, description = "Per-subject averages", body = TeacherOverview),
        (status = 403, description = "Not a teacher")
    )
)]
#[axum::debug_handler]
pub async fn overview(State(state): State<AppState>) -> Result<Json<TeacherOverview>> {
    let overview = state.statistics_service.overview().await?;
    Ok(Json(overview))
}

#[utoipa::path(
    get,
    path = "/api/teacher/subjects/{id}/report",
    params(
        ("id" = Uuid, Path, description = "Subject ID"),
        ReportQuery
    ),
    responses(
        (status = 200, description = "Quarter report", body = SubjectReport),
        (status = 404, description = "Subject not found")
    )
)]
#[axum::debug_handler]
pub async fn subject_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<SubjectReport>> {
    let quarter = parse_quarter(query.quarter.as_deref());
    let report = state
        .statistics_service
        .subject_report(id, query.class, quarter)
        .await?;
    Ok(Json(report))
}

#[utoipa::path(
    post,
    path = "/api/teacher/user-tasks/{id}/grade",
    params(
        ("id" = Uuid, Path, description = "UserTask ID")
    ),
    request_body = GradeTaskRequest,
    responses(
        (status = 200, description = "Rating stored; a finished lesson is recomputed"),
        (status = 400, description = "Rating outside the task range or not a written task"),
        (status = 404, description = "Task not found")
    )
)]
#[axum::debug_handler]
pub async fn grade_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GradeTaskRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let rating = Decimal::from_f64_retain(payload.rating)
        .ok_or_else(|| Error::BadRequest("Rating is not a finite number".to_string()))?;
    let graded = state.submission_service.grade_manually(id, rating).await?;
    Ok(Json(graded))
}

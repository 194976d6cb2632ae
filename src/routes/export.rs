use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::dto::teacher_dto::ReportQuery;
use crate::services::export_service::ExportService;
use crate::services::statistics_service::parse_quarter;
use crate::{error::Result, AppState};

/// Export a subject quarter report as XLSX
#[utoipa::path(
    get,
    path = "/api/teacher/subjects/{id}/report/export",
    params(
        ("id" = Uuid, Path, description = "Subject ID"),
        ReportQuery
    ),
    responses(
        (status = 200, description = "XLSX workbook", content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 404, description = "Subject not found")
    )
)]
pub async fn export_subject_report(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse> {
    let quarter = parse_quarter(query.quarter.as_deref());
    let report = state
        .statistics_service
        .subject_report(id, query.class, quarter)
        .await?;

    let buffer = ExportService::generate_report_xlsx(&report)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        ExportService::report_filename(&report)
    );

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buffer,
    ))
}

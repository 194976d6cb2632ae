pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::middleware::{auth, cors::permissive_cors, rate_limit};
use crate::services::{
    aggregation_service::AggregationService, enrollment_service::EnrollmentService,
    progress_service::ProgressService, statistics_service::StatisticsService,
    submission_service::SubmissionService,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub enrollment_service: EnrollmentService,
    pub submission_service: SubmissionService,
    pub aggregation_service: AggregationService,
    pub progress_service: ProgressService,
    pub statistics_service: StatisticsService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Self {
        Self {
            enrollment_service: EnrollmentService::new(pool.clone()),
            submission_service: SubmissionService::new(pool.clone()),
            aggregation_service: AggregationService::new(pool.clone()),
            progress_service: ProgressService::new(pool.clone()),
            statistics_service: StatisticsService::new(pool.clone()),
            pool,
        }
    }
}

/// Full HTTP surface. Requires the configuration to be initialized.
pub fn build_router(state: AppState) -> Router {
    let config = config::get_config();

    let base_routes = Router::new()
        .route("/health", get(routes::health::health))
        .route("/api-docs/openapi.json", get(routes::docs::openapi_json));

    let student_api = Router::new()
        .route("/api/student/catalog", get(routes::student::catalog))
        .route(
            "/api/student/catalog/:subject_id",
            get(routes::student::subject_detail),
        )
        .route("/api/student/subjects", get(routes::student::list_subjects))
        .route(
            "/api/student/subjects/:subject_id/enroll",
            post(routes::student::enroll),
        )
        .route(
            "/api/student/user-subjects/:id",
            get(routes::student::subject_progress),
        )
        .route(
            "/api/student/user-lessons/:id/start",
            post(routes::student::start_lesson),
        )
        .route(
            "/api/student/user-lessons/:id/finish",
            post(routes::student::finish_lesson),
        )
        .route("/api/student/user-tasks/:id", get(routes::student::get_task))
        .route(
            "/api/student/user-tasks/:id/submit",
            post(routes::student::submit_task),
        )
        .layer(axum::middleware::from_fn(auth::require_student))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::new_rps_state(config.student_rps),
            rate_limit::rps_middleware,
        ));

    let teacher_api = Router::new()
        .route("/api/teacher/overview", get(routes::teacher::overview))
        .route(
            "/api/teacher/subjects/:id/report",
            get(routes::teacher::subject_report),
        )
        .route(
            "/api/teacher/subjects/:id/report/export",
            get(routes::export::export_subject_report),
        )
        .route(
            "/api/teacher/user-tasks/:id/grade",
            post(routes::teacher::grade_task),
        )
        .layer(axum::middleware::from_fn(auth::require_teacher))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::new_rps_state(config.teacher_rps),
            rate_limit::rps_middleware,
        ));

    base_routes
        .merge(student_api)
        .merge(teacher_api)
        .with_state(state)
        .layer(permissive_cors())
        .layer(TraceLayer::new_for_http())
}

pub mod aggregation_service;
pub mod enrollment_service;
pub mod export_service;
pub mod grading_service;
pub mod progress_service;
pub mod scoring;
pub mod statistics_service;
pub mod submission_service;

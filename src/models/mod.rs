pub mod content;
pub mod feedback;
pub mod progress;
pub mod user;
pub mod user_task;

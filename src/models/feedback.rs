use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// User-facing outcome of an action. Clients render their own text from `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusMessage {
    pub level: MessageLevel,
    pub code: String,
}

impl StatusMessage {
    pub fn new(level: MessageLevel, code: &str) -> Self {
        Self {
            level,
            code: code.to_string(),
        }
    }

    pub fn success(code: &str) -> Self {
        Self::new(MessageLevel::Success, code)
    }

    pub fn info(code: &str) -> Self {
        Self::new(MessageLevel::Info, code)
    }

    pub fn warning(code: &str) -> Self {
        Self::new(MessageLevel::Warning, code)
    }

    pub fn error(code: &str) -> Self {
        Self::new(MessageLevel::Error, code)
    }
}

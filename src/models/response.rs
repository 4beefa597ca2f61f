use serde::{Deserialize, Serialize};

/// Standard envelope returned by the user and template services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<PaginationMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationMeta {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub page: u64,
    #[serde(default)]
    pub total_pages: u64,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub has_previous: bool,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message,
            meta: None,
        }
    }

    pub fn error(error: String, message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            message,
            meta: None,
        }
    }

    /// Best human-readable reason for an unsuccessful envelope.
    pub fn failure_reason(&self) -> String {
        match (&self.error, self.message.is_empty()) {
            (Some(error), true) => error.clone(),
            (Some(error), false) => format!("{}: {}", error, self.message),
            (None, false) => self.message.clone(),
            (None, true) => "no reason given".to_string(),
        }
    }
}

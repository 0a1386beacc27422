use serde::{Deserialize, Serialize};

use crate::types::SessionData;

/// Envelope status for a successful call
pub const STATUS_OK: i32 = 200;
/// Envelope status for a missing required parameter
pub const STATUS_NOT_FOUND: i32 = 404;
/// Envelope status for every other failure
pub const STATUS_FAILED: i32 = 20001;

/// JSON envelope returned by every REST endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse<T = String> {
    pub status: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: STATUS_OK,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_status(STATUS_FAILED, message)
    }

    pub fn with_status(status: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Query parameters of `/rest/api/v1/transform_stream`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartQuery {
    /// Source stream to pull
    pub url: Option<String>,
    /// Sink to push to; generated from the media host when absent
    pub output: Option<String>,
    /// Present (with any value) when the relay should be replayed after it dies
    #[serde(rename = "auto-replay")]
    pub auto_replay: Option<String>,
}

impl StartQuery {
    pub fn auto_replay(&self) -> bool {
        self.auto_replay.is_some()
    }
}

/// Query parameters of `/rest/api/v1/stop`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopQuery {
    pub url: Option<String>,
}

/// Body of `/rest/api/v1/sessions`
pub type SessionList = ApiResponse<Vec<SessionData>>;

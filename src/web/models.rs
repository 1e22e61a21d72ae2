// Response bodies for the web API

use super::error::EditError;
use serde::Serialize;

pub const HEALTH_MESSAGE: &str = "AI Editor API is running";

#[derive(Serialize, Debug, Clone)]
pub struct HealthResponse {
    pub message: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            message: HEALTH_MESSAGE,
        }
    }
}

/// Uniform envelope returned by `POST /edit-image`.
/// Exactly one of `image_url` and `error` is set.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EditResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EditResponse {
    pub fn success(image_url: String) -> Self {
        Self {
            success: true,
            image_url: Some(image_url),
            error: None,
        }
    }

    pub fn failure(error: &EditError) -> Self {
        Self {
            success: false,
            image_url: None,
            error: Some(error.to_string()),
        }
    }
}

// Error type for the edit endpoint.
// Every variant is reported to the client through the same JSON envelope;
// the tag only drives logging.

use crate::inference::UpstreamError;
use axum::extract::multipart::{MultipartError, MultipartRejection};

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// Missing, empty or unreadable form data.
    #[error("{0}")]
    Input(String),

    /// The inference service failed or returned something unusable.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl EditError {
    pub fn kind(&self) -> &'static str {
        match self {
            EditError::Input(_) => "input",
            EditError::Upstream(_) => "upstream",
        }
    }
}

impl From<MultipartRejection> for EditError {
    fn from(err: MultipartRejection) -> Self {
        EditError::Input(format!("Invalid multipart request: {}", err.body_text()))
    }
}

impl From<MultipartError> for EditError {
    fn from(err: MultipartError) -> Self {
        EditError::Input(format!("Failed to read multipart field: {}", err.body_text()))
    }
}

// API handlers for the web server

use super::{
    error::EditError,
    extract_request_data::extract_edit_request,
    models::{EditResponse, HealthResponse},
};
use crate::inference::{ImageEditor, InferenceInput, SharedImageEditor, UpstreamError};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use tracing::{debug, error, info};
use uuid::Uuid;

// --- GET / ---
// Liveness probe
pub async fn home() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

// --- POST /edit-image ---
// Edits the uploaded image according to the prompt. Failures are reported in
// the response envelope with status 200.
pub async fn edit_image(
    State(editor): State<SharedImageEditor>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<EditResponse> {
    let request_id = Uuid::new_v4();

    match run_edit(editor.as_ref(), multipart, request_id).await {
        Ok(image_url) => {
            info!("Edit succeeded: request_id={}, image_url={}", request_id, image_url);
            Json(EditResponse::success(image_url))
        }
        Err(err) => {
            error!(
                "Edit failed: request_id={}, kind={}, error={}",
                request_id,
                err.kind(),
                err
            );
            Json(EditResponse::failure(&err))
        }
    }
}

async fn run_edit(
    editor: &dyn ImageEditor,
    multipart: Result<Multipart, MultipartRejection>,
    request_id: Uuid,
) -> Result<String, EditError> {
    let request = extract_edit_request(multipart?).await?;

    info!(
        "Processing prompt: {:?}, request_id={}",
        request.prompt, request_id
    );
    debug!(
        "Upload: {} bytes of {}, request_id={}",
        request.image_bytes.len(),
        request.content_type,
        request_id
    );

    let input = InferenceInput::from_request(&request);
    drop(request);

    let outputs = editor.edit(&input).await?;
    debug!("Inference returned {} output(s), request_id={}", outputs.len(), request_id);

    outputs
        .into_iter()
        .next()
        .ok_or(EditError::Upstream(UpstreamError::EmptyOutput))
}

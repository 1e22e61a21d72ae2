use axum::extract::Multipart;
use mime::Mime;
use tracing::{debug, warn};

use super::error::EditError;
use crate::inference::EditRequest;

const PROMPT_FIELD: &str = "prompt";
const IMAGE_FIELD: &str = "image";

struct UploadedImage {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

/// Reads the whole multipart form and validates it into an [`EditRequest`].
pub async fn extract_edit_request(mut multipart: Multipart) -> Result<EditRequest, EditError> {
    let mut prompt_opt: Option<String> = None;
    let mut image_opt: Option<UploadedImage> = None;
    let mut ignored_fields = 0;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(PROMPT_FIELD) => {
                if prompt_opt.is_some() {
                    warn!("Multiple 'prompt' fields found in multipart request, using the last one");
                }
                prompt_opt = Some(field.text().await?);
            }
            Some(IMAGE_FIELD) => {
                if image_opt.is_some() {
                    warn!("Multiple 'image' fields found in multipart request, using the last one");
                }

                let content_type = field.content_type().map(str::to_string);
                debug!(
                    "Received image {:?} with content type: {:?}",
                    field.file_name(),
                    content_type
                );

                let bytes = field.bytes().await?.to_vec();
                image_opt = Some(UploadedImage {
                    bytes,
                    content_type,
                });
            }
            other => {
                debug!("Ignoring multipart field: {}", other.unwrap_or("unnamed"));
                ignored_fields += 1;
            }
        }
    }

    if ignored_fields > 0 {
        debug!(
            "Ignored {} unknown fields in multipart request",
            ignored_fields
        );
    }

    let prompt = prompt_opt
        .ok_or_else(|| EditError::Input("Missing 'prompt' field in multipart request.".into()))?;
    if prompt.trim().is_empty() {
        return Err(EditError::Input("Field 'prompt' must not be empty.".into()));
    }

    let image = image_opt
        .ok_or_else(|| EditError::Input("Missing 'image' field in multipart request.".into()))?;
    if image.bytes.is_empty() {
        return Err(EditError::Input("Uploaded 'image' field is empty.".into()));
    }

    let content_type = validate_content_type(image.content_type)?;

    Ok(EditRequest {
        prompt,
        image_bytes: image.bytes,
        content_type,
    })
}

// The declared type goes verbatim into the data URI, so it must at least
// be a well-formed MIME type. Surrounding whitespace is ignored for the check
// only.
fn validate_content_type(content_type: Option<String>) -> Result<String, EditError> {
    let content_type = content_type
        .filter(|ct| !ct.trim().is_empty())
        .ok_or_else(|| {
            EditError::Input("Uploaded 'image' field has no content type.".into())
        })?;

    content_type.trim().parse::<Mime>().map_err(|e| {
        EditError::Input(format!(
            "Uploaded 'image' field has an invalid content type '{}': {}",
            content_type, e
        ))
    })?;

    Ok(content_type)
}

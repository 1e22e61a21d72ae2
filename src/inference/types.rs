// Request data flowing from the edit endpoint to the inference service.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Serialize;

/// Number of denoising steps sent with every edit.
pub const NUM_INFERENCE_STEPS: u32 = 20;

/// How strongly the output should follow the input image.
pub const IMAGE_GUIDANCE_SCALE: f32 = 1.5;

/// A validated upload, held in memory for the duration of one request.
#[derive(Debug, Clone)]
pub struct EditRequest {
    pub prompt: String,
    pub image_bytes: Vec<u8>,
    pub content_type: String,
}

/// Input object for the instruct-pix2pix model.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InferenceInput {
    pub image: String,
    pub prompt: String,
    pub num_inference_steps: u32,
    pub image_guidance_scale: f32,
}

impl InferenceInput {
    pub fn from_request(request: &EditRequest) -> Self {
        Self {
            image: data_uri(&request.content_type, &request.image_bytes),
            prompt: request.prompt.clone(),
            num_inference_steps: NUM_INFERENCE_STEPS,
            image_guidance_scale: IMAGE_GUIDANCE_SCALE,
        }
    }
}

/// Encodes `bytes` as `data:<content_type>;base64,<payload>`.
pub fn data_uri(content_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

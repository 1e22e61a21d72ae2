// Client side of the hosted image-editing model.
// The edit endpoint only sees the `ImageEditor` trait, so it can run
// against the real service or a stub.

mod error;
mod replicate;
mod types;

pub use error::UpstreamError;
pub use replicate::{ModelRef, ReplicateClient, ReplicateConfig};
pub use types::{EditRequest, InferenceInput};

use async_trait::async_trait;
use std::sync::Arc;

/// Versioned instruct-pix2pix model used when none is configured.
pub const DEFAULT_MODEL: &str =
    "timbrooks/instruct-pix2pix:30c1d0b916a6f8efce20493f5d61ee27491ab2a60437c13c588468b9810ec23f";

/// Runs one image edit and returns the output URLs in order.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    async fn edit(&self, input: &InferenceInput) -> Result<Vec<String>, UpstreamError>;
}

pub type SharedImageEditor = Arc<dyn ImageEditor>;

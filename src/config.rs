use crate::inference::{DEFAULT_MODEL, ModelRef, ReplicateConfig, UpstreamError};
use crate::web::MAX_UPLOAD_SIZE_BYTES;
use clap::Parser;
use std::time::Duration;

/// Command line arguments for ai-editor-server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    /// Hostname/IP to bind the server to.
    /// If this option is specified without value, it will default to "*", meaning the server will listen on all interfaces.
    #[arg(long, env = "AI_EDITOR_SERVER_HOST", default_value = "localhost", num_args = 0..=1, default_missing_value = "*")]
    pub host: String,

    /// Port number to listen on.
    #[arg(short, long, env = "AI_EDITOR_SERVER_PORT", default_value_t = 8000)]
    pub port: u16,

    /// API token for the Replicate inference service.
    #[arg(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    pub replicate_api_token: String,

    /// Model reference in `owner/name` or `owner/name:version` form.
    #[arg(long, env = "AI_EDITOR_SERVER_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Base URL of the Replicate HTTP API.
    #[arg(long, env = "REPLICATE_BASE_URL", default_value = "https://api.replicate.com")]
    pub replicate_base_url: String,

    /// Delay between status checks while a prediction is running, in milliseconds.
    #[arg(long, env = "AI_EDITOR_SERVER_POLL_INTERVAL_MS", default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Maximum accepted request body size in bytes.
    #[arg(long, env = "AI_EDITOR_SERVER_MAX_UPLOAD_BYTES", default_value_t = MAX_UPLOAD_SIZE_BYTES)]
    pub max_upload_bytes: usize,

    /// Log at debug level.
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

impl AppConfig {
    pub fn replicate_config(&self) -> Result<ReplicateConfig, UpstreamError> {
        Ok(ReplicateConfig {
            api_token: self.replicate_api_token.clone(),
            model: self.model.parse::<ModelRef>()?,
            base_url: self.replicate_base_url.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        })
    }
}

// Failures raised while talking to the hosted inference service.

/// Errors from the inference service or the HTTP transport in front of it.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Connection, TLS, timeout or body decoding failure.
    #[error("{0}")]
    Network(#[from] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("inference API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The prediction ran and reported an error.
    #[error("{0}")]
    PredictionFailed(String),

    #[error("prediction {0} was canceled")]
    PredictionCanceled(String),

    #[error("inference service returned no output")]
    EmptyOutput,

    #[error("malformed response from inference service: {0}")]
    MalformedResponse(String),

    /// Model reference not in `owner/name[:version]` form.
    #[error("invalid model reference: {0}")]
    InvalidModelRef(String),
}

/// Errors from the REST alert sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The sink configuration is unusable.
    #[error("sink: invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP request could not be performed.
    #[error("sink: request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("sink: API error: status={status}, body={body}")]
    Api { status: u16, body: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no handler found")]
    NotFound,

    #[error("handler already in requested state")]
    AlreadyInState,

    #[error("handler is immutable")]
    Immutable,

    #[error("handler still has {live_calls} live calls")]
    Busy { live_calls: usize },

    #[error("duplicate pattern '{0}'")]
    DuplicatePattern(String),

    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("{} configuration entries failed: {}", .0.len(), .0.join("; "))]
    PartialFailure(Vec<String>),
}

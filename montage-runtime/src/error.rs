use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown section '{section}' in montage '{montage}'")]
    InvalidSection { montage: String, section: String },

    #[error("invalid state: {message}")]
    InvalidState { message: String },

    #[error("not ready: {phase}")]
    NotReady { phase: String },

    #[error("'{operation}' called from the wrong thread or phase")]
    ThreadViolation { operation: String },

    #[error("handler '{handler}' failed: {message}")]
    HandlerFailure { handler: String, message: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("failed to build worker pool: {message}")]
    WorkerPool { message: String },

    #[error("update task finished without returning its frame state")]
    WorkerLost,

    #[cfg(feature = "json")]
    #[error("failed to parse runtime config JSON: {message}")]
    JsonParse { message: String },
}

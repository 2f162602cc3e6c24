use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or malformed configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Model-serving failure
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Login or logout failure
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Document could not be attached
    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    /// Anything else, e.g. a stopped controller
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not open the database
    #[error("Database connection failed: {message}")]
    Connection {
        /// Underlying cause
        message: String,
    },

    /// A statement failed
    #[error("Query failed: {message}")]
    Query {
        /// Underlying cause
        message: String,
    },

    /// Embedded migrations failed to apply
    #[error("Migration failed: {message}")]
    Migration {
        /// Underlying cause
        message: String,
    },

    /// A conversation snapshot could not be encoded
    #[error("Snapshot encoding failed for {key}: {message}")]
    Snapshot {
        /// Snapshot key
        key: String,
        /// Underlying cause
        message: String,
    },

    /// Raw driver error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Model-serving API errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// Opening the stream failed after all retries
    #[error("Model unavailable: {message} (retries: {retries})")]
    Unavailable {
        /// Last error seen
        message: String,
        /// Attempts made
        retries: u32,
    },

    /// Non-success HTTP status or an error object in the stream
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP or API status code
        status: u16,
        /// Error body or message
        message: String,
    },

    /// Response did not have the expected shape
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// What was wrong
        message: String,
    },

    /// No data arrived within the configured window
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout
        timeout_ms: u64,
    },

    /// The stream broke or carried an undecodable chunk
    #[error("Stream interrupted: {message}")]
    Stream {
        /// Underlying cause
        message: String,
    },

    /// Transport error from the HTTP client
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login with a blank name
    #[error("Username cannot be empty")]
    EmptyUsername,

    /// Identity could not be read or written
    #[error("Session storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Document attachment errors
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// No file at the path
    #[error("File not found: {path}")]
    NotFound {
        /// Requested path
        path: String,
    },

    /// The path has no extension to infer a type from
    #[error("File has no extension: {path}")]
    NoExtension {
        /// Requested path
        path: String,
    },

    /// Extension is not a supported document type
    #[error("Unsupported document type: .{extension}")]
    UnsupportedType {
        /// Offending extension
        extension: String,
    },

    /// File exceeds the upload limit
    #[error("File too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size in bytes
        size: u64,
        /// Limit in bytes
        max: u64,
    },

    /// Reading the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for model-serving operations
pub type ModelResult<T> = Result<T, ModelError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for attachment loading
pub type AttachmentResult<T> = Result<T, AttachmentError>;

use thiserror::Error;

use crate::client::session::MoveRejection;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error types shared by the directory service and the tree client.
#[derive(Debug, Error)]
pub enum AppError {
    /// I/O errors from filesystem operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required request field was missing or empty.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is well-formed but not allowed in the current state.
    #[error("Refused: {0}")]
    Refused(String),

    /// Catalog store failure.
    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    /// Derived variant generation failed.
    #[error("Image error: {0}")]
    Image(String),

    /// The remote call could not be delivered or decoded.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote service answered with `success: false`.
    #[error("Remote error: {0}")]
    Remote(String),

    /// A directory move was rejected locally; no request was sent.
    #[error("Move rejected: {0}")]
    Rejected(MoveRejection),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(String),

    /// Path does not resolve inside the content root.
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl AppError {
    /// Stable short code used in wire error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Io(_) => "filesystem",
            AppError::Validation(_) => "validation",
            AppError::Refused(_) => "refused",
            AppError::Catalog(_) => "catalog",
            AppError::Image(_) => "image",
            AppError::Transport(_) => "transport",
            AppError::Remote(_) => "remote",
            AppError::Rejected(_) => "rejected",
            AppError::Config(_) => "config",
            AppError::InvalidPath(_) => "invalid_path",
        }
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Image(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));
        assert!(app_err.to_string().contains("file not found"));
        assert_eq!(app_err.kind(), "filesystem");
    }

    #[test]
    fn validation_error_display() {
        let err = AppError::Validation("name is required".into());
        assert_eq!(err.to_string(), "Validation error: name is required");
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn refusal_is_distinct_from_filesystem_error() {
        let err = AppError::Refused("directory still contains 2 records".into());
        assert_eq!(err.kind(), "refused");
        assert!(!matches!(err, AppError::Io(_)));
    }

    #[test]
    fn rejected_move_display() {
        let err = AppError::Rejected(MoveRejection::Cycle);
        assert!(err.to_string().starts_with("Move rejected: "));
        assert_eq!(err.kind(), "rejected");
    }

    #[test]
    fn invalid_path_error_display() {
        let err = AppError::InvalidPath("../outside".into());
        assert_eq!(err.to_string(), "Invalid path: ../outside");
    }
}

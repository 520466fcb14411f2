use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    #[error("Yapi error {errcode}: {errmsg}")]
    Api { errcode: i64, errmsg: String },

    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn auth(reason: impl Into<String>) -> Self {
        Self::Auth {
            reason: reason.into(),
        }
    }

    pub fn api(errcode: i64, errmsg: impl Into<String>) -> Self {
        Self::Api {
            errcode,
            errmsg: errmsg.into(),
        }
    }

    pub fn upload_failed(reason: impl Into<String>) -> Self {
        Self::UploadFailed {
            reason: reason.into(),
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, AppError::Auth { .. })
    }
}

/// Full error chain as text, attached to per-item error notifications.
pub fn error_chain(error: &AppError) -> String {
    use std::error::Error;

    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str("\ncaused by: ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = AppError::api(40011, "please login");
        assert_eq!(error.to_string(), "Yapi error 40011: please login");

        let error = AppError::validation("url", "Server URL is required");
        assert_eq!(
            error.to_string(),
            "Validation error: url - Server URL is required"
        );
    }

    #[test]
    fn test_error_chain_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = AppError::from(io);
        let chain = error_chain(&error);
        assert!(chain.starts_with("IO error:"));
        assert!(chain.contains("denied"));
    }

    #[test]
    fn test_is_auth_error() {
        assert!(AppError::auth("bad password").is_auth_error());
        assert!(!AppError::upload_failed("boom").is_auth_error());
    }
}

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for classroom-repos
#[derive(Error, Debug)]
pub enum ClassroomError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing configuration
    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    /// TOML parsing errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the GitHub API
    #[error("GitHub API error ({status}): {message}")]
    RemoteApi { status: u16, message: String },

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Roster, project or report table errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Regex errors
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A project, repository or file that was asked for does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Directory expected on disk is missing
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// `git` exited with a non-zero status
    #[error("`{command}` failed: {stderr}")]
    LocalProcess { command: String, stderr: String },

    /// Bad user-supplied value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for classroom-repos operations
pub type Result<T> = std::result::Result<T, ClassroomError>;

impl ClassroomError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new invalid-argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Setup failures that must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::MissingConfig(_))
    }

    /// The HTTP status carried by an API error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RemoteApi { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_are_fatal() {
        assert!(ClassroomError::config("no organization").is_fatal());
        assert!(ClassroomError::MissingConfig("github_token".into()).is_fatal());
        assert!(!ClassroomError::not_found("lab").is_fatal());
        assert!(!ClassroomError::RemoteApi {
            status: 404,
            message: "Not Found".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_remote_api_display() {
        let err = ClassroomError::RemoteApi {
            status: 422,
            message: "name already exists".into(),
        };
        assert_eq!(err.to_string(), "GitHub API error (422): name already exists");
        assert_eq!(err.status(), Some(422));
    }
}

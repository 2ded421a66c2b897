//! Error types with operator-facing hints and stable exit codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit status for a successful operation.
pub const EXIT_SUCCESS: i32 = 0;

/// Error categories reported by lifecycle and backup operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    GeneralError,
    ConfigError,
    NotRunning,
    AlreadyRunning,
    NotImplemented,
}

impl ErrorCode {
    /// Process exit status for this category.
    ///
    /// `AlreadyRunning` shares the general status; scripts only need to tell
    /// config and liveness problems apart from everything else.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::GeneralError | ErrorCode::AlreadyRunning => 1,
            ErrorCode::ConfigError => 2,
            ErrorCode::NotRunning => 3,
            ErrorCode::NotImplemented => 99,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::GeneralError => write!(f, "GENERAL_ERROR"),
            ErrorCode::ConfigError => write!(f, "CONFIG_ERROR"),
            ErrorCode::NotRunning => write!(f, "NOT_RUNNING"),
            ErrorCode::AlreadyRunning => write!(f, "ALREADY_RUNNING"),
            ErrorCode::NotImplemented => write!(f, "NOT_IMPLEMENTED"),
        }
    }
}

/// An error with a category, a message and an optional hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McrError {
    pub code: ErrorCode,
    pub message: String,
    pub suggestion: Option<String>,
}

/// Result alias used throughout mcr.
pub type Result<T> = std::result::Result<T, McrError>;

impl fmt::Display for McrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (hint: {})", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for McrError {}

impl McrError {
    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::GeneralError,
            message: message.into(),
            suggestion: None,
        }
    }

    /// A subprocess failed; stderr is appended when it carries anything.
    pub fn command_failed_with_stderr(message: impl Into<String>, stderr: Option<&str>) -> Self {
        let msg = message.into();
        let full_message = match stderr {
            Some(err) if !err.trim().is_empty() => format!("{}\nstderr: {}", msg, err.trim()),
            _ => msg,
        };
        Self {
            code: ErrorCode::GeneralError,
            message: full_message,
            suggestion: Some("Check that tmux is installed and on your PATH".into()),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ConfigError,
            message: message.into(),
            suggestion: Some("See 'mcr mkconfig' for an example configuration".into()),
        }
    }

    pub fn unknown_server(name: &str) -> Self {
        Self {
            code: ErrorCode::ConfigError,
            message: format!("No server section found for '{}'", name),
            suggestion: Some("Run 'mcr list' to see configured servers".into()),
        }
    }

    pub fn not_running(name: &str) -> Self {
        Self {
            code: ErrorCode::NotRunning,
            message: format!("Server '{}' is not running", name),
            suggestion: Some(format!("Start it first with 'mcr start {}'", name)),
        }
    }

    pub fn already_running(name: &str) -> Self {
        Self {
            code: ErrorCode::AlreadyRunning,
            message: format!("Server '{}' is already running", name),
            suggestion: Some(format!(
                "Use 'mcr restart {}' or stop it before starting again",
                name
            )),
        }
    }

    /// The stop sequence ran but the session never went away.
    pub fn stop_timeout(name: &str, wait_secs: u64) -> Self {
        Self {
            code: ErrorCode::GeneralError,
            message: format!(
                "Server '{}' still running {} seconds after 'stop' was sent",
                name, wait_secs
            ),
            suggestion: Some(format!(
                "The server may still be shutting down; check 'mcr status {}' or attach to investigate",
                name
            )),
        }
    }

    pub fn not_implemented(feature: &str) -> Self {
        Self {
            code: ErrorCode::NotImplemented,
            message: format!("{} is not implemented", feature),
            suggestion: None,
        }
    }
}

//! Observable server state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a server's session currently exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Running,
    Stopped,
}

impl ServerStatus {
    pub fn is_running(self) -> bool {
        self == ServerStatus::Running
    }
}

impl From<bool> for ServerStatus {
    fn from(running: bool) -> Self {
        if running {
            ServerStatus::Running
        } else {
            ServerStatus::Stopped
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerStatus::Running => write!(f, "running"),
            ServerStatus::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ServerStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(ServerStatus::from(false).to_string(), "stopped");
        assert!(ServerStatus::from(true).is_running());
    }
}

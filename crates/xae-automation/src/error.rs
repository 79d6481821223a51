use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("automation root unavailable: {0}")]
    RootUnavailable(String),

    #[error("{message} (code 0x{code:08X})")]
    ServerFault { code: i32, message: String },

    #[error("project not found in solution: {0}")]
    ProjectNotFound(String),

    #[error("configuration interface unavailable on project: {0}")]
    ConfigInterfaceUnavailable(String),

    #[error("runtime did not report started within {0:?}")]
    RuntimeNotStarted(Duration),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AutomationError {
    /// Build a [`ServerFault`](Self::ServerFault) from a numeric server
    /// error code and a human-readable message.
    pub fn fault(code: i32, message: impl Into<String>) -> Self {
        Self::ServerFault {
            code,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AutomationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_fault_code_is_displayed_in_hex() {
        let err = AutomationError::fault(0x8000_4005_u32 as i32, "open failed");
        assert_eq!(err.to_string(), "open failed (code 0x80004005)");
    }
}

//! DFU error types for the object transfer.

use thiserror::Error;

use super::config::ResultCode;

/// Result type alias for DFU operations.
pub type DfuResult<T> = Result<T, DfuError>;

/// Errors that can occur while transferring a DFU object.
#[derive(Debug, Error)]
pub enum DfuError {
    /// No matching successful response arrived in time.
    #[error("Timeout after {timeout_ms}ms waiting for response to opcode 0x{op_code:02X}")]
    NotificationTimeout { op_code: u8, timeout_ms: u64 },

    /// The device responded to a different operation than the one awaited.
    #[error("Unexpected notification: expected response to opcode 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedNotification { expected: u8, actual: u8 },

    /// The device reported a non-success result for the awaited operation.
    #[error("Opcode 0x{op_code:02X} failed with result 0x{code:02X} - {}", describe_result(.code))]
    CommandError { op_code: u8, code: u8 },

    /// `read_next` was called without an active listening session.
    #[error("Not listening for control point notifications")]
    NotListening,

    /// Transfer was aborted by the caller before the next packet.
    #[error("Transfer aborted")]
    Aborted,

    /// Device-reported offset diverges from the local expectation.
    #[error("Invalid offset: expected {expected}, device reported {actual}")]
    InvalidOffset { expected: u32, actual: u32 },

    /// Device-reported CRC32 diverges from the local expectation.
    #[error("Invalid CRC32: expected 0x{expected:08X}, device reported 0x{actual:08X}")]
    InvalidCrc { expected: u32, actual: u32 },

    /// A checksum response too short to carry offset and CRC32.
    #[error("Malformed response to opcode 0x{op_code:02X}: {len} bytes")]
    MalformedResponse { op_code: u8, len: usize },

    /// Transfer configuration cannot be used.
    #[error("Invalid transfer configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The data channel rejected a packet write.
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error for persisted settings.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_result(code: &u8) -> &'static str {
    ResultCode::describe(*code)
}

impl DfuError {
    /// Check if this error is retriable by restarting from the last validated checkpoint.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            DfuError::NotificationTimeout { .. }
                | DfuError::InvalidOffset { .. }
                | DfuError::InvalidCrc { .. }
                | DfuError::Transport { .. }
        )
    }

    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            DfuError::Io(_) => "DFU-002",
            DfuError::Json(_) => "DFU-004",
            DfuError::NotificationTimeout { .. } => "DFU-021",
            DfuError::UnexpectedNotification { .. } => "DFU-024",
            DfuError::NotListening => "DFU-025",
            DfuError::CommandError { .. } => "DFU-030",
            DfuError::MalformedResponse { .. } => "DFU-031",
            DfuError::Transport { .. } => "DFU-051",
            DfuError::InvalidOffset { .. } => "DFU-060",
            DfuError::InvalidCrc { .. } => "DFU-062",
            DfuError::InvalidConfig { .. } => "DFU-080",
            DfuError::Aborted => "DFU-099",
        }
    }
}

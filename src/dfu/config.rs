//! Configuration constants for the Nordic Secure DFU transfer.

use std::time::Duration;

// ============================================================================
// GATT Characteristics
// ============================================================================

/// DFU Control Point characteristic (write + notify).
pub const CONTROL_POINT_UUID: u128 = 0x8EC90001_F315_4F60_9FB8_838830DAEA50;

/// DFU Packet characteristic (write without response).
pub const PACKET_UUID: u128 = 0x8EC90002_F315_4F60_9FB8_838830DAEA50;

// ============================================================================
// Transfer Defaults
// ============================================================================

/// Default packet payload size (ATT MTU 23 minus the 3-byte ATT header).
pub const DEFAULT_MTU_SIZE: usize = 20;

/// Default packet receipt notification interval. 0 disables checkpoints.
pub const DEFAULT_PRN: u16 = 0;

// ============================================================================
// Notification Timing
// ============================================================================

/// Ceiling for a single control point response.
pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_millis(20_000);

/// Interval between scans of the notification buffer.
pub const NOTIFICATION_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// Control Point Responses
// ============================================================================

/// First byte of every control point response notification.
pub const RESPONSE_MARKER: u8 = 0x60;

/// Length of a checksum-class response: marker, opcode, result, offset, crc.
pub const CHECKSUM_RESPONSE_LEN: usize = 11;

/// Secure DFU control point opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuOpcode {
    ProtocolVersion = 0x00,
    /// Create a command or data object
    Create = 0x01,
    /// Set packet receipt notification interval
    SetPrn = 0x02,
    /// Report current offset and CRC32 of the selected object
    CalculateCrc = 0x03,
    /// Execute (commit) the current object
    Execute = 0x04,
    /// Select an object type and report its state
    Select = 0x06,
    MtuGet = 0x07,
    Write = 0x08,
    Ping = 0x09,
    HardwareVersion = 0x0A,
    FirmwareVersion = 0x0B,
    Abort = 0x0C,
}

impl DfuOpcode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Result codes carried in byte 2 of a control point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    Invalid = 0x00,
    Success = 0x01,
    OpcodeNotSupported = 0x02,
    InvalidParameter = 0x03,
    InsufficientResources = 0x04,
    InvalidObject = 0x05,
    UnsupportedType = 0x07,
    OperationNotPermitted = 0x08,
    OperationFailed = 0x0A,
    ExtendedError = 0x0B,
}

impl ResultCode {
    /// Parse a result code from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ResultCode::Invalid),
            0x01 => Some(ResultCode::Success),
            0x02 => Some(ResultCode::OpcodeNotSupported),
            0x03 => Some(ResultCode::InvalidParameter),
            0x04 => Some(ResultCode::InsufficientResources),
            0x05 => Some(ResultCode::InvalidObject),
            0x07 => Some(ResultCode::UnsupportedType),
            0x08 => Some(ResultCode::OperationNotPermitted),
            0x0A => Some(ResultCode::OperationFailed),
            0x0B => Some(ResultCode::ExtendedError),
            _ => None,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            ResultCode::Invalid => "Invalid opcode",
            ResultCode::Success => "Operation successful",
            ResultCode::OpcodeNotSupported => "Opcode not supported",
            ResultCode::InvalidParameter => "Missing or invalid parameter",
            ResultCode::InsufficientResources => "Not enough memory for the data object",
            ResultCode::InvalidObject => "Data object does not match firmware requirements",
            ResultCode::UnsupportedType => "Not a valid object type for a Create request",
            ResultCode::OperationNotPermitted => "Operation not permitted in current state",
            ResultCode::OperationFailed => "Operation failed",
            ResultCode::ExtendedError => "Extended error",
        }
    }

    /// Describe a raw result byte, including codes outside the table.
    pub fn describe(byte: u8) -> &'static str {
        Self::from_byte(byte)
            .map(|code| code.description())
            .unwrap_or("Unknown result code")
    }
}

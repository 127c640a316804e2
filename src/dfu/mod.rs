//! Nordic Secure DFU object transfer over BLE.
//!
//! This module pushes one DFU object (init packet or firmware data) to a
//! peripheral through the DFU Packet characteristic, validating progress
//! against the CRC32 the device reports on the DFU Control Point.
//!
//! # Transfer Overview
//!
//! 1. **Segmentation** - Object bytes are split into MTU-sized packets
//! 2. **Listening** - Control point notifications are buffered for the
//!    whole transfer
//! 3. **Writing** - Packets go out strictly in order; abort is checked
//!    before each one
//! 4. **Validation** - Every PRN packets the device reports offset and
//!    CRC32, which must match the locally computed values
//! 5. **Resumption** - The final offset/CRC32 is returned so a later
//!    transfer can pick up where this one stopped
//!
//! Creating and executing objects on the control point is left to the
//! caller.
//!
//! # Example
//!
//! ```ignore
//! use ble_dfu_transfer::dfu::{Checkpoint, ObjectWriter, PrnPacketWriter};
//!
//! let mut writer = ObjectWriter::new(link.clone(), PrnPacketWriter::new(link.data()));
//! writer.set_mtu_size(244);
//! writer.set_prn(12);
//!
//! let reached = writer.write_object(&firmware[..4096], Checkpoint::default()).await?;
//! println!("{} bytes, CRC32 0x{:08X}", reached.offset, reached.crc32);
//! ```

pub mod config;
mod error;
mod notifications;
mod object_writer;
mod packet;
mod transport;

// Errors
pub use error::{DfuError, DfuResult};

// Collaborator seams
pub use transport::{DataChannel, Notification, NotificationSource, SubscriptionId};

// Packet writing
pub use packet::{split_into_packets, Checkpoint, PacketWriter, PrnPacketWriter};

// Correlation and orchestration
pub use notifications::{Listening, NotificationCorrelator};
pub use object_writer::{AbortHandle, ObjectWriter, TransferStage};

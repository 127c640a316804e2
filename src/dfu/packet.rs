//! Data packet segmentation and running-integrity tracking.
//!
//! Firmware objects are written to the DFU Packet characteristic in chunks
//! no larger than the negotiated MTU. The packet writer keeps a running
//! offset and CRC32 across writes and, every PRN packets, hands back the
//! state the device is expected to report.

use std::future::Future;
use std::slice::Chunks;

use serde::{Deserialize, Serialize};

use super::config::CHECKSUM_RESPONSE_LEN;
use super::error::{DfuError, DfuResult};
use super::transport::DataChannel;

/// Cumulative transfer state: bytes written and CRC32 over those bytes.
///
/// Persist the last validated checkpoint to resume an interrupted object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub offset: u32,
    pub crc32: u32,
}

impl Checkpoint {
    pub fn new(offset: u32, crc32: u32) -> Self {
        Self { offset, crc32 }
    }

    /// Decode the offset and CRC32 carried by a checksum-class response.
    ///
    /// Layout: `[marker, opcode, result, offset(4, LE), crc32(4, LE)]`
    pub fn from_response(payload: &[u8]) -> DfuResult<Self> {
        if payload.len() < CHECKSUM_RESPONSE_LEN {
            return Err(DfuError::MalformedResponse {
                op_code: payload.get(1).copied().unwrap_or(0),
                len: payload.len(),
            });
        }

        let offset = u32::from_le_bytes([payload[3], payload[4], payload[5], payload[6]]);
        let crc32 = u32::from_le_bytes([payload[7], payload[8], payload[9], payload[10]]);

        Ok(Self { offset, crc32 })
    }
}

/// Split an object into ordered packets of at most `mtu_size` bytes.
pub fn split_into_packets(data: &[u8], mtu_size: usize) -> DfuResult<Chunks<'_, u8>> {
    if mtu_size == 0 {
        return Err(DfuError::InvalidConfig {
            reason: "MTU size must be at least 1 byte".into(),
        });
    }
    Ok(data.chunks(mtu_size))
}

/// Packet-level writer that tracks running offset/CRC32 and PRN cadence.
pub trait PacketWriter: Send {
    /// Set the running offset. Also restarts the PRN count.
    fn set_offset(&mut self, offset: u32);

    /// Set the running CRC32 (resumes the checksum from this value).
    fn set_crc32(&mut self, crc32: u32);

    /// Packets between checkpoints; 0 disables them.
    fn set_prn(&mut self, prn: u16);

    /// Current running state.
    fn checkpoint(&self) -> Checkpoint;

    /// Write one packet, returning the expected device state when a
    /// checkpoint is due.
    fn write_packet(
        &mut self,
        packet: &[u8],
    ) -> impl Future<Output = DfuResult<Option<Checkpoint>>> + Send;
}

/// Standard [`PacketWriter`] over a [`DataChannel`].
pub struct PrnPacketWriter<D: DataChannel> {
    channel: D,
    offset: u32,
    crc32: u32,
    prn: u16,
    packets_since_checkpoint: u16,
}

impl<D: DataChannel> PrnPacketWriter<D> {
    pub fn new(channel: D) -> Self {
        Self {
            channel,
            offset: 0,
            crc32: 0,
            prn: 0,
            packets_since_checkpoint: 0,
        }
    }
}

impl<D: DataChannel> PacketWriter for PrnPacketWriter<D> {
    fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
        self.packets_since_checkpoint = 0;
    }

    fn set_crc32(&mut self, crc32: u32) {
        self.crc32 = crc32;
    }

    fn set_prn(&mut self, prn: u16) {
        self.prn = prn;
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.offset, self.crc32)
    }

    async fn write_packet(&mut self, packet: &[u8]) -> DfuResult<Option<Checkpoint>> {
        self.channel.write(packet).await?;

        let mut hasher = crc32fast::Hasher::new_with_initial(self.crc32);
        hasher.update(packet);
        self.crc32 = hasher.finalize();
        self.offset = self.offset.wrapping_add(packet.len() as u32);

        if self.prn == 0 {
            return Ok(None);
        }

        self.packets_since_checkpoint += 1;
        if self.packets_since_checkpoint >= self.prn {
            self.packets_since_checkpoint = 0;
            return Ok(Some(self.checkpoint()));
        }

        Ok(None)
    }
}

//! Object transfer over the DFU Packet characteristic.
//!
//! Writes one object (init packet or firmware chunk) that the control point
//! layer has already created or selected:
//! 1. Split the data into MTU-sized packets
//! 2. Seed the packet writer with the resume offset/CRC32
//! 3. Listen for control point notifications
//! 4. Write packets strictly in order, checking for abort before each one
//! 5. At every PRN checkpoint, compare the device's offset/CRC32 with ours
//! 6. Stop listening on every exit path

use std::slice::Chunks;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::config::{DfuOpcode, DEFAULT_MTU_SIZE, DEFAULT_PRN};
use super::error::{DfuError, DfuResult};
use super::notifications::{Listening, NotificationCorrelator};
use super::packet::{split_into_packets, Checkpoint, PacketWriter};
use super::transport::NotificationSource;
use crate::settings::TransferSettings;

/// Object transfer progress stages for UI feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "data")]
pub enum TransferStage {
    /// Listening and about to write the first packet.
    Starting { offset: u32, total: usize },
    /// A packet was accepted by the link.
    Uploading { sent: usize, total: usize },
    /// Device confirmed offset and CRC32 at a checkpoint.
    Validated { offset: u32, crc32: u32 },
    /// Every packet written.
    Complete { offset: u32, crc32: u32 },
}

impl TransferStage {
    /// Get a percentage estimate for this stage.
    pub fn percent(&self) -> f32 {
        match self {
            TransferStage::Starting { .. } => 0.0,
            TransferStage::Uploading { sent, total } => {
                if *total == 0 {
                    100.0
                } else {
                    (*sent as f32 / *total as f32) * 100.0
                }
            }
            // Validation doesn't move the progress bar
            TransferStage::Validated { .. } => -1.0,
            TransferStage::Complete { .. } => 100.0,
        }
    }

    /// Get a human-readable message for this stage.
    pub fn message(&self) -> String {
        match self {
            TransferStage::Starting { offset, total } => {
                if *offset == 0 {
                    format!("Sending {} bytes...", total)
                } else {
                    format!("Resuming at offset {}, sending {} bytes...", offset, total)
                }
            }
            TransferStage::Uploading { sent, total } => {
                let percent = if *total == 0 { 100 } else { (sent * 100) / total };
                format!("Uploading object... {}%", percent)
            }
            TransferStage::Validated { offset, crc32 } => {
                format!("Checkpoint OK at offset {} (CRC32 0x{:08X})", offset, crc32)
            }
            TransferStage::Complete { offset, .. } => {
                format!("Object transferred, {} bytes total", offset)
            }
        }
    }
}

/// Cooperative cancellation flag shared with an [`ObjectWriter`].
///
/// Checked before each packet; a write already in flight completes.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Sequences packet writes for one object at a time and validates
/// device-reported checkpoints.
pub struct ObjectWriter<S: NotificationSource, W: PacketWriter> {
    correlator: NotificationCorrelator<S>,
    packet_writer: W,
    mtu_size: usize,
    prn: u16,
    abort: AbortHandle,
}

impl<S: NotificationSource, W: PacketWriter> ObjectWriter<S, W> {
    /// Create a writer with default MTU (20), PRN (0) and response timing.
    pub fn new(source: Arc<S>, packet_writer: W) -> Self {
        Self {
            correlator: NotificationCorrelator::new(source),
            packet_writer,
            mtu_size: DEFAULT_MTU_SIZE,
            prn: DEFAULT_PRN,
            abort: AbortHandle::default(),
        }
    }

    /// Create a writer from persisted settings.
    pub fn with_settings(
        source: Arc<S>,
        packet_writer: W,
        settings: &TransferSettings,
    ) -> DfuResult<Self> {
        settings.validate()?;
        let correlator = NotificationCorrelator::new(source)
            .with_timing(settings.notification_timeout(), settings.poll_interval());

        Ok(Self {
            correlator,
            packet_writer,
            mtu_size: settings.mtu_size,
            prn: settings.prn,
            abort: AbortHandle::default(),
        })
    }

    /// Packet size for subsequent transfers.
    pub fn set_mtu_size(&mut self, mtu_size: usize) {
        self.mtu_size = mtu_size;
    }

    /// Checkpoint cadence for subsequent transfers.
    pub fn set_prn(&mut self, prn: u16) {
        self.prn = prn;
    }

    pub fn mtu_size(&self) -> usize {
        self.mtu_size
    }

    pub fn prn(&self) -> u16 {
        self.prn
    }

    /// Stop before the next packet. Stays set until [`clear_abort`](Self::clear_abort).
    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn clear_abort(&self) {
        self.abort.clear();
    }

    /// Handle for aborting from another task while a transfer runs.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Transfer `data` starting from `start`, resolving with the final state.
    pub async fn write_object(&mut self, data: &[u8], start: Checkpoint) -> DfuResult<Checkpoint> {
        self.write_object_with_progress(data, start, |_| {}).await
    }

    /// Transfer `data` starting from `start`, reporting progress stages.
    ///
    /// Any failure ends the transfer; retrying means calling again from the
    /// last validated checkpoint.
    pub async fn write_object_with_progress<F>(
        &mut self,
        data: &[u8],
        start: Checkpoint,
        on_progress: F,
    ) -> DfuResult<Checkpoint>
    where
        F: Fn(TransferStage),
    {
        let packets = split_into_packets(data, self.mtu_size)?;

        self.packet_writer.set_offset(start.offset);
        self.packet_writer.set_crc32(start.crc32);
        self.packet_writer.set_prn(self.prn);

        // Dropping the upload, on return or cancellation, stops listening
        let mut upload = Upload {
            listening: self.correlator.listen(),
            packet_writer: &mut self.packet_writer,
            abort: &self.abort,
        };
        let result = upload.send_packets(packets, start, data.len(), &on_progress).await;
        drop(upload);

        match result {
            Ok(reached) => {
                on_progress(TransferStage::Complete {
                    offset: reached.offset,
                    crc32: reached.crc32,
                });
                Ok(reached)
            }
            Err(err) => {
                warn!(start = start.offset, error = %err, "object transfer failed");
                Err(err)
            }
        }
    }
}

/// One `write_object` call's borrow of the writer's state.
struct Upload<'a, S: NotificationSource, W: PacketWriter> {
    listening: Listening<'a, S>,
    packet_writer: &'a mut W,
    abort: &'a AbortHandle,
}

impl<S: NotificationSource, W: PacketWriter> Upload<'_, S, W> {
    async fn send_packets<F>(
        &mut self,
        packets: Chunks<'_, u8>,
        start: Checkpoint,
        total: usize,
        on_progress: &F,
    ) -> DfuResult<Checkpoint>
    where
        F: Fn(TransferStage),
    {
        on_progress(TransferStage::Starting {
            offset: start.offset,
            total,
        });

        let mut sent = 0;
        for packet in packets {
            if self.abort.is_aborted() {
                return Err(DfuError::Aborted);
            }

            let validated = self.send_packet(packet).await?;
            sent += packet.len();
            on_progress(TransferStage::Uploading { sent, total });

            if let Some(checkpoint) = validated {
                on_progress(TransferStage::Validated {
                    offset: checkpoint.offset,
                    crc32: checkpoint.crc32,
                });
            }
        }

        Ok(self.packet_writer.checkpoint())
    }

    /// Write one packet and validate the checkpoint it closes, if any.
    async fn send_packet(&mut self, packet: &[u8]) -> DfuResult<Option<Checkpoint>> {
        match self.packet_writer.write_packet(packet).await? {
            Some(expected) => {
                self.validate_checkpoint(expected).await?;
                Ok(Some(expected))
            }
            None => Ok(None),
        }
    }

    async fn validate_checkpoint(&mut self, expected: Checkpoint) -> DfuResult<()> {
        let payload = self
            .listening
            .read_next(DfuOpcode::CalculateCrc.as_byte())
            .await?;
        let reported = Checkpoint::from_response(&payload)?;

        if reported.offset != expected.offset {
            return Err(DfuError::InvalidOffset {
                expected: expected.offset,
                actual: reported.offset,
            });
        }
        if reported.crc32 != expected.crc32 {
            return Err(DfuError::InvalidCrc {
                expected: expected.crc32,
                actual: reported.crc32,
            });
        }

        debug!(offset = reported.offset, crc32 = reported.crc32, "checkpoint validated");
        Ok(())
    }
}

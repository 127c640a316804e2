use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::UnboundedSender;

use crate::dfu::config::{DfuOpcode, CONTROL_POINT_UUID, RESPONSE_MARKER};
use crate::dfu::{
    DataChannel, DfuError, DfuResult, Notification, NotificationSource, SubscriptionId,
};

/// Build a bare control point response: `[0x60, opcode, result]`.
pub fn response(op_code: u8, result: u8) -> Vec<u8> {
    vec![RESPONSE_MARKER, op_code, result]
}

/// Build a CALCULATE_CRC response carrying offset and CRC32.
pub fn checksum_response(result: u8, offset: u32, crc32: u32) -> Vec<u8> {
    let mut value = response(DfuOpcode::CalculateCrc.as_byte(), result);
    value.extend_from_slice(&offset.to_le_bytes());
    value.extend_from_slice(&crc32.to_le_bytes());
    value
}

/// Misbehaviour injected at a given checkpoint of a [`FakeDevice`].
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Report this offset instead of the real one.
    ReportOffset(u32),
    /// Flip bits in the reported CRC32.
    CorruptCrc,
    /// Answer with this result code.
    ResultCode(u8),
    /// Answer as if responding to this opcode.
    WrongOpcode(u8),
    /// Send nothing.
    Silent,
}

#[derive(Default)]
struct DeviceState {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, UnboundedSender<Notification>)>,
    subscribe_count: usize,
    unsubscribe_count: usize,
    packets: Vec<Vec<u8>>,
    offset: u32,
    crc32: u32,
    prn: u16,
    packets_since_notification: u16,
    checkpoints: usize,
    faults: Vec<(usize, Fault)>,
    chatter: bool,
}

impl DeviceState {
    fn broadcast(&self, notification: Notification) {
        for (_, sink) in &self.subscribers {
            let _ = sink.send(notification.clone());
        }
    }

    fn receive(&mut self, packet: &[u8]) {
        self.packets.push(packet.to_vec());

        let mut hasher = crc32fast::Hasher::new_with_initial(self.crc32);
        hasher.update(packet);
        self.crc32 = hasher.finalize();
        self.offset += packet.len() as u32;

        if self.prn == 0 {
            return;
        }
        self.packets_since_notification += 1;
        if self.packets_since_notification < self.prn {
            return;
        }
        self.packets_since_notification = 0;
        self.checkpoints += 1;

        if self.chatter {
            self.broadcast(Notification::new(CONTROL_POINT_UUID, [0x11, 0x00]));
            self.broadcast(Notification::new(0xFEED, [RESPONSE_MARKER, 0x06, 0x01]));
        }

        let fault = self
            .faults
            .iter()
            .find(|(at, _)| *at == self.checkpoints)
            .map(|(_, fault)| *fault);

        let value = match fault {
            None => checksum_response(0x01, self.offset, self.crc32),
            Some(Fault::ReportOffset(offset)) => checksum_response(0x01, offset, self.crc32),
            Some(Fault::CorruptCrc) => checksum_response(0x01, self.offset, !self.crc32),
            Some(Fault::ResultCode(code)) => response(DfuOpcode::CalculateCrc.as_byte(), code),
            Some(Fault::WrongOpcode(op_code)) => response(op_code, 0x01),
            Some(Fault::Silent) => return,
        };
        self.broadcast(Notification::new(CONTROL_POINT_UUID, value));
    }
}

/// Simulated DFU peripheral.
///
/// Acts as the notification source and, through [`FakeDevice::data_channel`],
/// as the packet sink. Keeps its own running offset/CRC32 and notifies a
/// CALCULATE_CRC response every PRN packets, like the bootloader does.
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prn(self, prn: u16) -> Self {
        self.state.lock().unwrap().prn = prn;
        self
    }

    /// Start from an object that already holds `offset` bytes with `crc32`.
    pub fn resumed_at(self, offset: u32, crc32: u32) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.offset = offset;
            state.crc32 = crc32;
        }
        self
    }

    /// Misbehave on the `checkpoint`-th notification (1-based).
    pub fn fault_at(self, checkpoint: usize, fault: Fault) -> Self {
        self.state.lock().unwrap().faults.push((checkpoint, fault));
        self
    }

    /// Emit unrelated notifications ahead of every checkpoint response.
    pub fn chatty(self) -> Self {
        self.state.lock().unwrap().chatter = true;
        self
    }

    pub fn notify(&self, channel: u128, value: impl Into<Vec<u8>>) {
        self.state
            .lock()
            .unwrap()
            .broadcast(Notification::new(channel, value));
    }

    pub fn data_channel(&self) -> FakeDataChannel {
        FakeDataChannel {
            device: self.clone(),
        }
    }

    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().packets.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        self.state.lock().unwrap().subscribe_count
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.state.lock().unwrap().unsubscribe_count
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state.lock().unwrap().subscribers.len()
    }
}

impl NotificationSource for FakeDevice {
    fn subscribe(&self, sink: UnboundedSender<Notification>) -> SubscriptionId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        state.subscribe_count += 1;
        let id = SubscriptionId(state.next_id);
        state.subscribers.push((id, sink));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = self.state.lock().unwrap();
        state.unsubscribe_count += 1;
        state.subscribers.retain(|(existing, _)| *existing != id);
    }
}

/// Packet characteristic of a [`FakeDevice`].
pub struct FakeDataChannel {
    device: FakeDevice,
}

impl DataChannel for FakeDataChannel {
    async fn write(&mut self, packet: &[u8]) -> DfuResult<()> {
        self.device.state.lock().unwrap().receive(packet);
        Ok(())
    }
}

/// Data channel that only records what was written.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    packets: Arc<Mutex<Vec<Vec<u8>>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl RecordingChannel {
    pub fn fail_writes(&self, reason: &str) {
        *self.failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn packets(&self) -> Vec<Vec<u8>> {
        self.packets.lock().unwrap().clone()
    }
}

impl DataChannel for RecordingChannel {
    async fn write(&mut self, packet: &[u8]) -> DfuResult<()> {
        if let Some(reason) = self.failure.lock().unwrap().clone() {
            return Err(DfuError::Transport { reason });
        }
        self.packets.lock().unwrap().push(packet.to_vec());
        Ok(())
    }
}

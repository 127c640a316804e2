//! BLE transport seams for DFU communication.
//!
//! The link itself (connection, GATT discovery, characteristic writes) lives
//! outside this crate. These traits are the two capabilities the transfer
//! needs from it, which also lets tests drive the transfer with a simulated
//! device.

use std::future::Future;

use tokio::sync::mpsc::UnboundedSender;

#[cfg(test)]
use mockall::automock;

use super::error::DfuResult;

/// A notification received from the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Characteristic the notification originated from.
    pub channel: u128,
    /// Raw notification value.
    pub value: Vec<u8>,
}

impl Notification {
    pub fn new(channel: u128, value: impl Into<Vec<u8>>) -> Self {
        Self {
            channel,
            value: value.into(),
        }
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Source of inbound notifications, shared by every listener on the link.
///
/// Every notification received while a subscription is active must be sent
/// to its sink in arrival order. After `unsubscribe` the sink is dropped.
#[cfg_attr(test, automock)]
pub trait NotificationSource: Send + Sync {
    /// Start delivering notifications to `sink`.
    fn subscribe(&self, sink: UnboundedSender<Notification>) -> SubscriptionId;

    /// Stop delivering notifications for `id`. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Write-without-response channel to the DFU Packet characteristic.
pub trait DataChannel: Send {
    /// Write a single packet. Resolves once the link has accepted it.
    fn write(&mut self, packet: &[u8]) -> impl Future<Output = DfuResult<()>> + Send;
}

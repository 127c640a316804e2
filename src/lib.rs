//! Reliable DFU object transfer over notification-based BLE links.
//!
//! See [`dfu`] for the transfer itself and [`settings`] for persisted
//! transfer configuration.

pub mod dfu;
pub mod settings;

#[cfg(test)]
mod test_helpers;

pub use dfu::{Checkpoint, DfuError, DfuResult, ObjectWriter, TransferStage};
pub use settings::{SettingsManager, TransferSettings};

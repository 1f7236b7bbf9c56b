//! Device state machine
//!
//! ```text
//! Off ──on_init──▶ On
//!  │                │
//!  └──(failure)──▶ Fault ──on_init──▶ On | Fault
//!
//! On | Fault ──on_shutdown──▶ Off
//! ```
//!
//! The status text travels with the state: a Fault always carries the
//! description of the failure that caused it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Not initialized, or shut down.
    Off,
    /// Operational; requests are accepted.
    On,
    /// Bring-up failed; requests are refused until re-initialization.
    Fault,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceState::Off => "OFF",
            DeviceState::On => "ON",
            DeviceState::Fault => "FAULT",
        };
        write!(f, "{}", label)
    }
}

/// State plus status text, shared between request paths.
///
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct StatusCell {
    inner: RwLock<(DeviceState, String)>,
}

impl Default for StatusCell {
    fn default() -> Self {
        Self {
            inner: RwLock::new((DeviceState::Off, "Device is off".to_string())),
        }
    }
}

impl StatusCell {
    /// New cell in the Off state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> DeviceState {
        self.inner.read().0
    }

    /// Current status text.
    pub fn status(&self) -> String {
        self.inner.read().1.clone()
    }

    /// Set state and status text together.
    pub fn set(&self, state: DeviceState, status: impl Into<String>) {
        *self.inner.write() = (state, status.into());
    }
}

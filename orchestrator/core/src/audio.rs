//! Audio Device Ownership
//!
//! The microphone/speaker pair is exclusively owned by the current live
//! connection. Only the connection manager acquires or releases it; a second
//! acquisition while a lease is outstanding is an [`AudioError::DeviceBusy`],
//! which is what makes duplicate audio capture across a provider switch
//! structurally impossible.
//!
//! The core is headless: a lease is the logical capture token. Actual sample
//! capture and playback happen at the UI edge, gated on holding the lease.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// Reported state of the capture devices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioDeviceState {
    /// No lease outstanding
    Released,
    /// The mic/speaker pair is held by the live connection
    Held,
}

/// The process-wide microphone/speaker pair
#[derive(Debug, Default)]
pub struct AudioDevices {
    held: AtomicBool,
}

impl AudioDevices {
    /// Create released devices
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive ownership of the pair
    ///
    /// # Errors
    ///
    /// Returns [`AudioError::DeviceBusy`] if a lease is already outstanding.
    pub fn acquire(self: &Arc<Self>) -> Result<AudioLease, AudioError> {
        if self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AudioError::DeviceBusy);
        }
        Ok(AudioLease {
            devices: Arc::clone(self),
        })
    }

    /// Current device state
    #[must_use]
    pub fn state(&self) -> AudioDeviceState {
        if self.held.load(Ordering::SeqCst) {
            AudioDeviceState::Held
        } else {
            AudioDeviceState::Released
        }
    }
}

/// Exclusive capture token, released on drop
#[derive(Debug)]
pub struct AudioLease {
    devices: Arc<AudioDevices>,
}

impl Drop for AudioLease {
    fn drop(&mut self) {
        self.devices.held.store(false, Ordering::SeqCst);
    }
}

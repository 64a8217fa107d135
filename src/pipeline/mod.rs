//! The real-time conversation pipeline: endpointer and driver.

pub mod driver;
pub mod endpointer;

pub use driver::ConversationDriver;
pub use endpointer::Endpointer;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Conversation driver state, observed by the endpointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DriverState {
    /// Waiting for speech onset.
    Idle = 0,
    /// Accumulating an utterance.
    Listening = 1,
    /// Transcribing / thinking / running tools.
    Processing = 2,
    /// Playing the reply; input frames are discarded.
    Speaking = 3,
}

impl DriverState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Listening,
            2 => Self::Processing,
            3 => Self::Speaking,
            _ => Self::Idle,
        }
    }
}

/// Shared handle to the driver state.
///
/// The only state crossing the audio-thread boundary besides the frame
/// queue. Plain relaxed loads/stores are enough: a stale read at most
/// costs one extra buffered frame.
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<AtomicU8>,
}

impl StateHandle {
    /// Create a handle starting in [`DriverState::Idle`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current driver state.
    pub fn get(&self) -> DriverState {
        DriverState::from_u8(self.inner.load(Ordering::Relaxed))
    }

    /// Update the driver state.
    pub fn set(&self, state: DriverState) {
        self.inner.store(state as u8, Ordering::Relaxed);
    }
}

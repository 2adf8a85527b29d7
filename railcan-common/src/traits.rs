//! Traits for the station's external collaborators

use crate::devices::EnrolledLoco;
use crate::messages::CanFrame;

/// Error type for CAN send operations containing the failed frame
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub struct CanSendError(pub CanFrame);

impl core::fmt::Display for CanSendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Failed to send CAN frame: {:?}", self.0)
    }
}

impl core::error::Error for CanSendError {}

/// A synchronous CAN sender
pub trait CanSender {
    /// Transmit one extended (29-bit ID) frame of exactly `frame.dlc` payload bytes
    fn send(&mut self, frame: CanFrame) -> Result<(), CanSendError>;
}

/// A synchronous, non-blocking CAN receiver
///
/// Implementations deliver extended, non-RTR frames only; RTR and standard (11-bit ID)
/// traffic must be discarded before it reaches the station.
pub trait CanReceiver {
    /// Return the next pending frame, or `None` when the receive queue is empty
    fn try_recv(&mut self) -> Option<CanFrame>;
}

/// Durable registry of enrolled locos, keyed by a 1-based storage index
///
/// The registry is append-only from the station's perspective: addresses are never
/// reused, and [`LocoStore::allocate_next_address`] always returns one past the current
/// maximum.
pub trait LocoStore {
    /// Number of locos currently stored
    fn count(&self) -> u8;

    /// Load the loco at `index`, or `None` when `index` exceeds [`LocoStore::count`]
    fn load(&self, index: u8) -> Option<EnrolledLoco>;

    /// Store a loco, assigning a fresh index when its current one is unset or out of the
    /// valid range, and return the record as stored
    fn save(&mut self, loco: EnrolledLoco) -> EnrolledLoco;

    /// The next free local address: `count() + 1`, or 1 when the registry is empty
    fn allocate_next_address(&self) -> u8 {
        let count = self.count();
        if count == 0 {
            1
        } else {
            count.saturating_add(1)
        }
    }
}

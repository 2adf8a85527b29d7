//! A command station node for the Märklin-style model railway CAN protocol
//!
//! This crate implements the protocol framing and command/response correlation engine of
//! a command station: it encodes logical commands into 29-bit extended CAN frames, tracks
//! the single outstanding request with a timeout, and runs the discovery/bind handshake
//! that enrolls newly detected MFX decoders ("locos") under local addresses. It is
//! no_std compatible and performs no heap allocation.
//!
//! The physical CAN controller and the persistent loco registry are external
//! collaborators, abstracted behind the [`CanSender`](common::traits::CanSender),
//! [`CanReceiver`](common::traits::CanReceiver), and
//! [`LocoStore`](common::traits::LocoStore) traits.
//!
//! # Getting started
//!
//! Create a [`CommandStation`] from a [`StationConfig`], a sender, and a registry, then
//! drive it from a single polling loop:
//!
//! ```ignore
//! let mut station = CommandStation::new(StationConfig::new(0x4711EEF0), can_tx, store);
//!
//! station.issue(LogicalCommand::Ping)?;
//! loop {
//!     if let Some(timeout) = station.poll(&mut can_rx, elapsed_ms()) {
//!         warn!("no response for {:?}", timeout.command);
//!     }
//! }
//! ```
//!
//! There is exactly one outstanding request at a time by design; issuing a new command
//! overwrites the previous wait state. Responses are correlated to the pending request by
//! command code only -- the protocol carries no transaction ID.
#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
#![warn(missing_docs)]

mod binder;
mod station;

pub use railcan_common as common;

pub use binder::{BindError, DiscoveryBinder};
pub use station::{
    CommandStation, PendingCommand, RxOutcome, SendError, StationConfig, TimeoutEvent,
    DEFAULT_TIMEOUT_MS, MAX_DEVICES,
};

//! Common functionality shared among the railcan crates.
//!
//! Most users will have no reason to depend on this crate directly, as it is re-exported by
//! `railcan-station`.
#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs, missing_copy_implementations)]

pub mod codec;
pub mod devices;
pub mod hash;
pub mod messages;
pub mod traits;

pub use devices::{Device, EnrolledLoco};

pub use messages::{CanFrame, FrameStatus};

#![crate_type = "lib"]
#![deny(trivial_numeric_casts)]
#![allow(clippy::implicit_hasher, clippy::module_inception)]

//! A client for a two-party payment channel.
//!
//! The channel is opened against a remote peer through a relay, funded by an
//! on-chain funding transaction, and then advanced one co-signed round at a
//! time: off-chain transfers, on-chain deposits and withdrawals, and a final
//! shutdown round. Either side may leave and later reestablish the channel
//! from its last co-signed state.

#[macro_use]
extern crate log;

mod channel;
mod handle;
mod negotiation;
mod poi;
mod setup;
mod transition;
mod types;

#[cfg(test)]
mod tests;

pub use self::handle::{open_channel, ChannelHandle};
pub use self::setup::SetupError;
pub use self::transition::TransitionError;
pub use self::types::{
    ChannelError, ChannelEvent, ChannelStatus, LeaveOutcome, OnChainNotify, OpenChannelError,
    UpdateOutcome,
};

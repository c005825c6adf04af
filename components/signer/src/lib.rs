#![crate_type = "lib"]
#![allow(clippy::module_inception, clippy::new_without_default)]

mod client;
pub mod messages;
mod signer;

pub use self::client::{SignerClient, SignerClientError};
pub use self::signer::{create_signer, ChannelSign};

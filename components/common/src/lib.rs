#![crate_type = "lib"]
#![allow(
    clippy::too_many_arguments,
    clippy::module_inception,
    clippy::new_without_default
)]

#[macro_use]
pub mod b64_array;
#[macro_use]
pub mod define_fixed_bytes;

pub mod canonical_serialize;
pub mod conn;
pub mod dummy_connector;
pub mod multi_consumer;
pub mod ser_string;

#![crate_type = "lib"]
#![allow(clippy::module_inception, clippy::new_without_default)]

pub mod hash;

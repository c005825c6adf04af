//! The time tick broadcast service.
//!
//! The timer is based on a broadcast model: it sends a time tick to all
//! registered clients periodically. Channel round timeouts are counted in
//! ticks, which allows tests to drive time deterministically through
//! `create_timer_incoming`.

#![crate_type = "lib"]
#![allow(clippy::module_inception, clippy::new_without_default)]

#[macro_use]
extern crate log;

mod timer;

pub use self::timer::{
    create_timer, create_timer_incoming, TimerClient, TimerClientError, TimerError, TimerTick,
};

//! Countdown timer primitive driven by guest time.

mod periodic;

pub use periodic::{PeriodicTimer, TimerMode};

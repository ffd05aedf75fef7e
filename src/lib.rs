#![forbid(unsafe_code)]

//! Marin SoC board emulation.
//!
//! The board itself lives in [`machine`]; the peripheral models in [`devices`]. This crate only
//! ties them together for the end-to-end tests under `tests/`.

pub use marin_devices as devices;
pub use marin_machine as machine;

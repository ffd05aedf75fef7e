//! Versioned, deterministic snapshot encoding for Marin devices.

pub mod io;

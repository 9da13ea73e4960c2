//! Settings storage and persistence module.
//!
//! Handles saving and loading the tuner settings to/from disk.

pub mod settings;

pub use settings::*;

//! Core of the Telegram message relay: link parsing, album discovery and the cascading
//! delivery engine.
//!
//! Framework-agnostic. The Telegram client lives behind the ports in [`ports`],
//! implemented in the adapter crate.

pub mod access;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod forward;
pub mod link;
pub mod logging;
pub mod message;
pub mod ports;
pub mod relay;
pub mod resolver;
pub mod temp_files;
pub mod throttle;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};

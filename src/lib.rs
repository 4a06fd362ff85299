#![forbid(unsafe_code)]

//! Preset-driven model loading for TabbyAPI-compatible servers.
//!
//! Named presets are sparse parameter sets persisted as JSON and overlaid on
//! built-in defaults. They are edited as flagged text fields and resolved into
//! load requests that carry only the parameters the user opted into.

pub mod api;
pub mod config;
pub mod connection;
pub mod constants;
pub mod error;
pub mod fields;
pub mod logging;
pub mod session;
pub mod templates;

pub use error::{Error, Result};

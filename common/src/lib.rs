//! Reachability primitives shared by the bot and the CLI.
//!
//! This crate provides:
//! - Parsing of free-text `host[:port]` tokens
//! - A single-shot TCP connect probe
//! - The persisted endpoint status type
extern crate alloc;
extern crate core;

mod address;
mod probe;
mod status;

pub use address::*;
pub use probe::*;
pub use status::*;

//! Uses the single integration test approach.
//!
//! This improves parallelism when running the tests, and reduces the number of binaries that have to be built (and linked)

extern crate alloc;
extern crate core;

mod cli;
mod common;
mod monitoring;

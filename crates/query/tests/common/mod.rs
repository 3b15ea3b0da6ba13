//! Shared infrastructure for the integration tests.

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;
#[macro_use]
pub mod harness;

pub use assertions::*;
pub use fixtures::*;
pub use harness::*;

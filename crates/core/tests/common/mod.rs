//! Common test utilities for integration tests.
//!
//! - Fixtures: model source directories and a fake conversion toolchain
//! - Mock executors: scripted steps that record how they were run
//! - Assertions over emitted events

pub mod assertions;
pub mod fixtures;
pub mod mock_executors;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_executors::*;

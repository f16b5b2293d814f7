//! Common test utilities for the diff harness
//!
//! Mock backends that stand in for the two go-cpe-dictionary servers.

mod mock_backend;

pub use mock_backend::*;

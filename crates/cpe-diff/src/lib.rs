//! CPE Server-Mode Differential Testing Library
//!
//! This crate samples a list of `vendor|product` keys and asks two running
//! go-cpe-dictionary servers the same question, reporting every key where
//! their JSON answers disagree. It is used to check that a storage backend
//! swap (RDB vs Redis) preserves observable API behavior.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐      ┌─────────────────┐
//! │  Old backend    │      │  New backend    │
//! │  :1325          │      │  :1326          │
//! └────────┬────────┘      └────────┬────────┘
//!          │                        │
//!          └──────────┬─────────────┘
//!                     │  GET /cpes/{vendor}/{product}
//!              ┌──────▼──────┐
//!              │ DiffHarness │ ── sampler ── integration/cpe.txt
//!              └──────┬──────┘
//!                     │  mismatches
//!              ┌──────▼──────┐
//!              │ integration/│
//!              │ diff/<mode> │
//!              └─────────────┘
//! ```

pub mod client;
pub mod compare;
pub mod config;
pub mod error;
pub mod harness;
pub mod report;
pub mod retry;
pub mod sampler;

pub use config::{Mode, RunConfig};
pub use error::{FetchError, HarnessError, HarnessResult};
pub use harness::{CancelSignal, DiffHarness, KeyOutcome, RunSummary};
pub use sampler::ComparisonKey;

//! Shared helpers for the relbox benchmarks.

pub mod utils;

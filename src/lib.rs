//! MOMENTUM — Tiered rescoring engine for tradable digital assets
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod scoring;
pub mod oracle;
pub mod store;
pub mod engine;

//! BIDSCOUT: auction discovery, item valuation and bid-ceiling analysis.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod auction;
pub mod config;
pub mod data;
pub mod engine;
pub mod fetch;
pub mod llm;
pub mod strategy;
pub mod types;

//! Analysis engine: classification, valuation, advice and the worker pool
//! that ties them together.

pub mod advisor;
pub mod analyzer;
pub mod orchestrator;
pub mod parser;
pub mod valuation;

pub use analyzer::{AnalysisReport, AnalysisRequest, Analyzer};

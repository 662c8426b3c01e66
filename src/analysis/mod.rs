//! Analysis result handling.
//!
//! Tools do the analysis; this module folds what they report into a report.

pub mod aggregator;

pub use aggregator::*;

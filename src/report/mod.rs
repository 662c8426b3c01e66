//! Report generation.
//!
//! This module renders a finished run as JSON or Markdown.

pub mod generator;

pub use generator::*;

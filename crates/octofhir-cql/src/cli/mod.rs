//! CLI functionality for the data requirements tool
//!
//! - Batch analysis of ELM JSON files
//! - Library resolution from the file system
//! - Output formatting

pub mod analyze;
pub mod output;
pub mod resolver;

//! Data requirements analysis for Clinical Quality Language (CQL)
//!
//! This crate bundles:
//! - The ELM (Expression Logical Model) library model
//! - Data requirements analysis over ELM libraries
//! - A command-line tool that analyzes ELM JSON files (`cli` feature)
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_cql::{DataRequirementsProcessor, InMemoryLibraryResolver, from_json};
//!
//! let library = from_json(&std::fs::read_to_string("Measure.json")?)?;
//! let processor = DataRequirementsProcessor::new(Arc::new(InMemoryLibraryResolver::new()));
//! let module = processor.gather_data_requirements(Some(&library), None)?;
//! ```

// Re-export all public APIs from internal crates
pub use octofhir_cql_elm as elm;
pub use octofhir_cql_requirements as requirements;

// Convenience re-exports
pub use octofhir_cql_elm::{Library, from_json};
pub use octofhir_cql_requirements::{
    DataRequirementsProcessor, ElmRequirements, InMemoryLibraryResolver, LibraryResolver,
    ModuleDefinition, RequirementsError, RequirementsOptions, RequirementsResult,
};

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;

//! Data requirements analysis for CQL
//!
//! Given a translated (ELM) library, this crate computes what the logic
//! depends on: the data it retrieves, the terminology it uses (code systems,
//! value sets, codes, concepts), its parameters, and the expressions,
//! functions and libraries it reaches through references.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_cql_requirements::{DataRequirementsProcessor, InMemoryLibraryResolver};
//!
//! let resolver = Arc::new(InMemoryLibraryResolver::new().with_library(helpers));
//! let processor = DataRequirementsProcessor::new(resolver);
//! let module = processor
//!     .gather_data_requirements(Some(&library), Some(&["Initial Population"]))?
//!     .expect("library given");
//! ```
//!
//! # Architecture
//!
//! - [`ElmRequirementsVisitor`] walks ELM and reports into a
//!   [`RequirementsContext`], which owns every piece of per-run state
//! - [`QueryContext`] tracks query aliases and attributes inferred
//!   conditions to the alias they constrain
//! - [`ElmRequirements`] deduplicates what was reported
//! - [`ModuleDefinition`] renders the result as a FHIR `Library`
//!
//! Only conjunctive conditions are pushed down to aliases. A disjunction is
//! kept on the query requirement but never split across data requirements.

pub mod context;
pub mod error;
pub mod module_definition;
pub mod processor;
pub mod query_context;
pub mod requirement;
pub mod requirements;
pub mod resolver;
pub mod visitor;

pub use context::{
    DEFAULT_MAX_DEPTH, DefinitionKind, ElementKey, LibraryId, LibraryScope, QueryScope,
    RequirementsContext, RequirementsOptions,
};
pub use error::{RequirementsError, RequirementsResult};
pub use module_definition::{
    CodeFilter, ModuleDataRequirement, ModuleDefinition, ParameterDefinition, ParameterUse,
    RelatedArtifact,
};
pub use processor::DataRequirementsProcessor;
pub use query_context::{AliasContext, QueryAnalysis, QueryContext};
pub use requirement::{
    ConditionRequirement, ConjunctiveRequirement, DataRequirement, DisjunctiveRequirement,
    ElmElement, ElmRequirement, LibraryIdentifier, QueryRequirement, Requirement,
};
pub use requirements::{ElmRequirements, RequirementCategory, library_canonical};
pub use resolver::{InMemoryLibraryResolver, LibraryResolver};
pub use visitor::ElmRequirementsVisitor;

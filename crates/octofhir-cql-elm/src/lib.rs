//! CQL ELM (Expression Logical Model) representation
//!
//! This crate provides:
//! - ELM data structures for translated CQL libraries (HL7 ELM JSON)
//! - JSON reading, with or without the `{"library": ...}` envelope
//! - Child traversal over expressions and a generic [`ElmVisitor`]

pub mod expression;
pub mod library;
pub mod serialize;
pub mod traversal;
pub mod visitor;

pub use expression::*;
pub use library::*;
pub use serialize::{JsonSerializer, SerializeError, from_json};
pub use visitor::ElmVisitor;

//! Common test utilities for requirements analysis
//!
//! ELM JSON builders for the shapes the tests need, plus helpers that wire
//! libraries into a processor.

#![allow(dead_code)]

use std::sync::Arc;

use octofhir_cql_elm::{Library, from_json};
use octofhir_cql_requirements::{
    DataRequirementsProcessor, ElmRequirements, InMemoryLibraryResolver, RequirementsResult,
};
use serde_json::{Value, json};

pub const FHIR: &str = "http://hl7.org/fhir";
pub const ELM_TYPES: &str = "urn:hl7-org:elm-types:r1";

// ============================================================================
// Libraries
// ============================================================================

/// Build a library from its identifier and the remaining top-level sections
pub fn library(id: &str, version: &str, mut body: Value) -> Library {
    body["identifier"] = json!({"id": id, "version": version});
    from_json(&body.to_string()).expect("valid library")
}

pub fn defs(defs: Vec<Value>) -> Value {
    json!({"def": defs})
}

pub fn using_fhir() -> Value {
    json!({"localIdentifier": "FHIR", "uri": FHIR, "version": "4.0.1"})
}

pub fn include(local: &str, path: &str, version: &str) -> Value {
    json!({"localIdentifier": local, "path": path, "version": version})
}

pub fn value_set_def(name: &str, id: &str) -> Value {
    json!({"name": name, "id": id, "accessLevel": "Public"})
}

pub fn code_system_def(name: &str, id: &str) -> Value {
    json!({"name": name, "id": id, "accessLevel": "Public"})
}

pub fn code_def(name: &str, id: &str, code_system: &str) -> Value {
    json!({"name": name, "id": id, "accessLevel": "Public", "codeSystem": {"name": code_system}})
}

pub fn parameter_def(name: &str, type_specifier: Value) -> Value {
    json!({"name": name, "accessLevel": "Public", "parameterTypeSpecifier": type_specifier})
}

pub fn expression_def(name: &str, expression: Value) -> Value {
    json!({"name": name, "context": "Patient", "accessLevel": "Public", "expression": expression})
}

pub fn function_def(name: &str, operands: &[&str], expression: Value) -> Value {
    let operand: Vec<Value> = operands
        .iter()
        .map(|o| json!({"name": o, "operandTypeSpecifier": named_type(ELM_TYPES, "Integer")}))
        .collect();
    json!({
        "type": "FunctionDef",
        "name": name,
        "context": "Patient",
        "accessLevel": "Public",
        "operand": operand,
        "expression": expression
    })
}

// ============================================================================
// Types
// ============================================================================

pub fn named_type(namespace: &str, name: &str) -> Value {
    json!({"type": "NamedTypeSpecifier", "name": format!("{{{}}}{}", namespace, name)})
}

pub fn list_type(element: Value) -> Value {
    json!({"type": "ListTypeSpecifier", "elementType": element})
}

pub fn interval_type(point: Value) -> Value {
    json!({"type": "IntervalTypeSpecifier", "pointType": point})
}

// ============================================================================
// Expressions
// ============================================================================

pub fn retrieve(data_type: &str) -> Value {
    json!({"type": "Retrieve", "dataType": format!("{{{}}}{}", FHIR, data_type)})
}

pub fn retrieve_in(data_type: &str, value_set: &str) -> Value {
    json!({
        "type": "Retrieve",
        "dataType": format!("{{{}}}{}", FHIR, data_type),
        "templateId": format!("{}/StructureDefinition/{}", FHIR, data_type),
        "codeProperty": "code",
        "codes": value_set_ref(value_set)
    })
}

pub fn value_set_ref(name: &str) -> Value {
    json!({"type": "ValueSetRef", "name": name})
}

pub fn qualified_value_set_ref(library: &str, name: &str) -> Value {
    json!({"type": "ValueSetRef", "libraryName": library, "name": name})
}

pub fn code_ref(name: &str) -> Value {
    json!({"type": "CodeRef", "name": name})
}

pub fn in_value_set(code: Value, valueset: Value) -> Value {
    json!({"type": "InValueSet", "code": code, "valueset": valueset})
}

pub fn expression_ref(name: &str) -> Value {
    json!({"type": "ExpressionRef", "name": name})
}

pub fn qualified_ref(library: &str, name: &str) -> Value {
    json!({"type": "ExpressionRef", "libraryName": library, "name": name})
}

pub fn parameter_ref(name: &str) -> Value {
    json!({"type": "ParameterRef", "name": name})
}

pub fn function_ref(name: &str, operands: Vec<Value>) -> Value {
    json!({"type": "FunctionRef", "name": name, "operand": operands})
}

pub fn operand_ref(name: &str) -> Value {
    json!({"type": "OperandRef", "name": name})
}

/// Property scoped to a query alias, as the translator emits inside queries
pub fn property(alias: &str, path: &str) -> Value {
    json!({"type": "Property", "scope": alias, "path": path})
}

/// Property navigated from an alias reference
pub fn alias_property(alias: &str, path: &str) -> Value {
    json!({"type": "Property", "path": path, "source": {"type": "AliasRef", "name": alias}})
}

pub fn string(value: &str) -> Value {
    json!({"type": "Literal", "valueType": format!("{{{}}}String", ELM_TYPES), "value": value})
}

pub fn integer(value: i64) -> Value {
    json!({"type": "Literal", "valueType": format!("{{{}}}Integer", ELM_TYPES), "value": value.to_string()})
}

pub fn binary(op: &str, left: Value, right: Value) -> Value {
    json!({"type": op, "operand": [left, right]})
}

pub fn unary(op: &str, operand: Value) -> Value {
    json!({"type": op, "operand": operand})
}

pub fn query(alias: &str, source: Value, where_clause: Option<Value>) -> Value {
    let mut query = json!({
        "type": "Query",
        "source": [{"alias": alias, "expression": source}]
    });
    if let Some(where_clause) = where_clause {
        query["where"] = where_clause;
    }
    query
}

/// Add a return clause to a query
pub fn returning(mut query: Value, expression: Value) -> Value {
    query["return"] = json!({"expression": expression});
    query
}

pub fn relationship(kind: &str, alias: &str, source: Value, such_that: Value) -> Value {
    json!({"type": kind, "alias": alias, "expression": source, "suchThat": such_that})
}

// ============================================================================
// Processing
// ============================================================================

pub fn processor(libraries: Vec<Library>) -> DataRequirementsProcessor {
    DataRequirementsProcessor::new(Arc::new(InMemoryLibraryResolver::new().with_libraries(libraries)))
}

/// Gather requirements of the whole library, with no includes available
pub fn gather(library: &Library) -> RequirementsResult<ElmRequirements> {
    processor(Vec::new())
        .gather_requirements(Some(library), None)
        .map(|r| r.expect("library given"))
}

/// Names of the expression definitions reported, in report order
pub fn expression_names(requirements: &ElmRequirements) -> Vec<String> {
    requirements
        .expressions()
        .filter_map(|r| match &r.element {
            octofhir_cql_requirements::ElmElement::ExpressionDef(def) => Some(def.name.clone()),
            _ => None,
        })
        .collect()
}

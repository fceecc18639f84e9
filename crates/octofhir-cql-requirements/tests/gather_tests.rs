//! Gathering requirements across definitions and libraries

mod common;

use common::*;
use octofhir_cql_requirements::{
    ElmElement, LibraryIdentifier, RequirementsError, RequirementsOptions,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;

// ============================================================================
// Entry points
// ============================================================================

#[test]
fn test_no_library_yields_nothing() {
    let processor = processor(Vec::new());
    assert_eq!(processor.gather_requirements(None, None), Ok(None));
    assert_eq!(processor.gather_data_requirements(None, None), Ok(None));
}

#[test]
fn test_empty_library() {
    let lib = library("Empty", "1.0.0", json!({}));
    let requirements = gather(&lib).unwrap();
    assert!(requirements.is_empty());
    assert_eq!(requirements.library(), &LibraryIdentifier::new("Empty", Some("1.0.0")));
}

#[test]
fn test_whole_library_reports_every_definition() {
    let lib = library(
        "Measure",
        "1.0.0",
        json!({
            "usings": defs(vec![using_fhir()]),
            "codeSystems": defs(vec![code_system_def("LOINC", "http://loinc.org")]),
            "valueSets": defs(vec![value_set_def("Inpatient", "http://example.org/vs/inpatient")]),
            "codes": defs(vec![code_def("Heart rate", "8867-4", "LOINC")]),
            "contexts": defs(vec![json!({"name": "Patient"})]),
            "statements": defs(vec![
                expression_def("Encounters", retrieve("Encounter")),
                expression_def("Conditions", retrieve("Condition")),
            ]),
        }),
    );
    let requirements = gather(&lib).unwrap();

    assert_eq!(requirements.usings().count(), 1);
    assert_eq!(requirements.code_systems().count(), 1);
    assert_eq!(requirements.value_sets().count(), 1);
    assert_eq!(requirements.codes().count(), 1);
    assert_eq!(requirements.contexts().count(), 1);
    assert_eq!(expression_names(&requirements), vec!["Encounters", "Conditions"]);

    let types: Vec<_> = requirements
        .retrieve_exprs()
        .map(|r| r.local_data_type().to_string())
        .collect();
    assert_eq!(types, vec!["Encounter", "Condition"]);
}

// ============================================================================
// Closure over references
// ============================================================================

fn chained_library() -> octofhir_cql_elm::Library {
    library(
        "Chain",
        "1.0.0",
        json!({
            "valueSets": defs(vec![
                value_set_def("Inpatient", "http://example.org/vs/inpatient"),
                value_set_def("Unused", "http://example.org/vs/unused"),
            ]),
            "statements": defs(vec![
                expression_def("Inpatient Encounters", retrieve_in("Encounter", "Inpatient")),
                expression_def("Has Inpatient", unary("Exists", expression_ref("Inpatient Encounters"))),
                expression_def("Conditions", retrieve("Condition")),
            ]),
        }),
    )
}

#[test]
fn test_named_expressions_follow_references() {
    let lib = chained_library();
    let requirements = processor(Vec::new())
        .gather_requirements(Some(&lib), Some(&["Has Inpatient"]))
        .unwrap()
        .unwrap();

    assert_eq!(
        expression_names(&requirements),
        vec!["Has Inpatient", "Inpatient Encounters"]
    );
    let value_sets: Vec<_> = requirements
        .value_sets()
        .filter_map(|r| match &r.element {
            ElmElement::ValueSetDef(def) => Some(def.name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(value_sets, vec!["Inpatient"]);
    assert_eq!(requirements.retrieves().len(), 1);
}

#[test]
fn test_unknown_expression_name_is_an_error() {
    let lib = chained_library();
    let result = processor(Vec::new()).gather_requirements(Some(&lib), Some(&["Missing"]));
    assert_eq!(
        result,
        Err(RequirementsError::definition_not_found(
            &LibraryIdentifier::new("Chain", Some("1.0.0")),
            "Missing"
        ))
    );
}

#[test]
fn test_unresolved_reference_is_an_error() {
    let lib = library(
        "Broken",
        "1.0.0",
        json!({"statements": defs(vec![expression_def("A", expression_ref("Nowhere"))])}),
    );
    let err = gather(&lib).unwrap_err();
    assert!(matches!(err, RequirementsError::DefinitionNotFound { ref name, .. } if name == "Nowhere"));
    assert!(!err.is_fault());
}

#[test]
fn test_gathering_is_idempotent() {
    let lib = chained_library();
    let processor = processor(Vec::new());
    let first = processor.gather_requirements(Some(&lib), None).unwrap();
    let second = processor.gather_requirements(Some(&lib), None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_shared_references_are_reported_once() {
    let lib = library(
        "Shared",
        "1.0.0",
        json!({
            "valueSets": defs(vec![value_set_def("Diabetes", "http://example.org/vs/diabetes")]),
            "statements": defs(vec![
                expression_def("A", retrieve_in("Condition", "Diabetes")),
                expression_def("B", retrieve_in("Observation", "Diabetes")),
                expression_def("C", binary("And", expression_ref("A"), expression_ref("B"))),
            ]),
        }),
    );
    let requirements = gather(&lib).unwrap();
    assert_eq!(requirements.value_sets().count(), 1);
    assert_eq!(expression_names(&requirements), vec!["A", "B", "C"]);
}

#[rstest]
#[case("diabetes")]
#[case("DIABETES")]
fn test_value_set_resolution_ignores_case(#[case] reference: &str) {
    let lib = library(
        "Terminology",
        "1.0.0",
        json!({
            "valueSets": defs(vec![value_set_def("Diabetes", "http://example.org/vs/diabetes")]),
            "statements": defs(vec![expression_def("A", retrieve_in("Condition", reference))]),
        }),
    );
    let requirements = processor(Vec::new())
        .gather_requirements(Some(&lib), Some(&["A"]))
        .unwrap()
        .unwrap();
    assert_eq!(requirements.value_sets().count(), 1);
}

// ============================================================================
// Functions and recursion
// ============================================================================

#[test]
fn test_recursive_function_terminates() {
    let lib = library(
        "Recursive",
        "1.0.0",
        json!({
            "statements": defs(vec![
                function_def(
                    "Countdown",
                    &["n"],
                    function_ref("Countdown", vec![binary("Subtract", operand_ref("n"), integer(1))]),
                ),
                expression_def("Result", function_ref("Countdown", vec![integer(10)])),
            ]),
        }),
    );
    let requirements = processor(Vec::new())
        .gather_requirements(Some(&lib), Some(&["Result"]))
        .unwrap()
        .unwrap();
    assert_eq!(requirements.functions().count(), 1);
    assert_eq!(expression_names(&requirements), vec!["Result"]);
}

#[test]
fn test_every_overload_is_reported() {
    let lib = library(
        "Overloads",
        "1.0.0",
        json!({
            "statements": defs(vec![
                function_def("Score", &["a"], operand_ref("a")),
                function_def("Score", &["a", "b"], binary("Add", operand_ref("a"), operand_ref("b"))),
                expression_def("Result", function_ref("Score", vec![integer(1)])),
            ]),
        }),
    );
    let requirements = processor(Vec::new())
        .gather_requirements(Some(&lib), Some(&["Result"]))
        .unwrap()
        .unwrap();
    assert_eq!(requirements.functions().count(), 2);
}

#[test]
fn test_nesting_deeper_than_the_limit_fails() {
    let mut nested = json!({"type": "Literal", "valueType": "{urn:hl7-org:elm-types:r1}Boolean", "value": "true"});
    for _ in 0..10 {
        nested = unary("Not", nested);
    }
    let lib = library(
        "Deep",
        "1.0.0",
        json!({"statements": defs(vec![expression_def("Deep", nested)])}),
    );

    let result = processor(Vec::new())
        .with_options(RequirementsOptions::new().with_max_depth(4))
        .gather_requirements(Some(&lib), None);
    assert_eq!(result, Err(RequirementsError::RecursionLimit { max_depth: 4 }));

    assert!(gather(&lib).is_ok());
}

// ============================================================================
// Included libraries
// ============================================================================

fn common_library() -> octofhir_cql_elm::Library {
    library(
        "Common",
        "2.0.0",
        json!({
            "valueSets": defs(vec![value_set_def("Inpatient", "http://example.org/vs/inpatient")]),
            "statements": defs(vec![
                expression_def("Inpatient Encounters", retrieve_in("Encounter", "Inpatient")),
                expression_def("Unused", retrieve("Procedure")),
            ]),
        }),
    )
}

fn including_library() -> octofhir_cql_elm::Library {
    library(
        "Measure",
        "1.0.0",
        json!({
            "includes": defs(vec![include("Common", "Common", "2.0.0")]),
            "statements": defs(vec![
                expression_def("Encounters", qualified_ref("Common", "Inpatient Encounters")),
            ]),
        }),
    )
}

#[test]
fn test_requirements_are_attributed_to_their_library() {
    let measure = LibraryIdentifier::new("Measure", Some("1.0.0"));
    let common = LibraryIdentifier::new("Common", Some("2.0.0"));

    let requirements = processor(vec![common_library()])
        .gather_requirements(Some(&including_library()), None)
        .unwrap()
        .unwrap();

    let includes: Vec<_> = requirements.includes().map(|r| r.library.clone()).collect();
    assert_eq!(includes, vec![measure.clone()]);

    let expressions: Vec<_> = requirements
        .expressions()
        .map(|r| r.library.clone())
        .collect();
    assert_eq!(expressions, vec![measure, common.clone()]);

    assert_eq!(requirements.value_sets().next().map(|r| &r.library), Some(&common));
    assert_eq!(requirements.retrieves().len(), 1);
    assert_eq!(requirements.retrieves()[0].library, common);
}

#[test]
fn test_unreferenced_definitions_of_included_libraries_are_skipped() {
    let requirements = processor(vec![common_library()])
        .gather_requirements(Some(&including_library()), None)
        .unwrap()
        .unwrap();
    assert!(!expression_names(&requirements).contains(&"Unused".to_string()));
}

#[test]
fn test_missing_included_library_is_an_error() {
    let result = processor(Vec::new()).gather_requirements(Some(&including_library()), None);
    assert!(matches!(result, Err(RequirementsError::LibraryNotFound { .. })));
}

#[test]
fn test_unknown_include_alias_is_an_error() {
    let lib = library(
        "Measure",
        "1.0.0",
        json!({"statements": defs(vec![expression_def("A", qualified_ref("Nope", "B"))])}),
    );
    let result = gather(&lib);
    assert!(matches!(result, Err(RequirementsError::IncludeNotFound { ref name, .. }) if name == "Nope"));
}

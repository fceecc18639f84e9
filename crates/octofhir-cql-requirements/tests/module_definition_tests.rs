//! Module definition output

mod common;

use common::*;
use octofhir_cql_elm::Library;
use octofhir_cql_requirements::{ModuleDefinition, ParameterUse};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn measure() -> Library {
    let mut encounters = expression_def(
        "Encounters",
        query(
            "E",
            retrieve_in("Encounter", "Inpatient"),
            Some(binary("Equal", property("E", "status"), string("finished"))),
        ),
    );
    encounters["resultTypeSpecifier"] = list_type(named_type(FHIR, "Encounter"));

    let mut has_encounters = expression_def("Has Encounters", unary("Exists", expression_ref("Encounters")));
    has_encounters["resultTypeName"] = json!("{urn:hl7-org:elm-types:r1}Boolean");

    library(
        "Measure",
        "1.0.0",
        json!({
            "usings": defs(vec![using_fhir()]),
            "includes": defs(vec![include("Common", "Common", "2.0.0")]),
            "valueSets": defs(vec![value_set_def("Inpatient", "http://example.org/vs/inpatient")]),
            "parameters": defs(vec![parameter_def(
                "Measurement Period",
                interval_type(named_type(ELM_TYPES, "DateTime")),
            )]),
            "statements": defs(vec![
                encounters,
                has_encounters,
                expression_def("Conditions", qualified_ref("Common", "Active Conditions")),
            ]),
        }),
    )
}

fn common_library() -> Library {
    library(
        "Common",
        "2.0.0",
        json!({
            "statements": defs(vec![expression_def(
                "Active Conditions",
                query(
                    "C",
                    retrieve("Condition"),
                    Some(binary("Equal", property("C", "clinicalStatus"), string("active"))),
                ),
            )]),
        }),
    )
}

fn module(expressions: Option<&[&str]>) -> ModuleDefinition {
    processor(vec![common_library()])
        .gather_data_requirements(Some(&measure()), expressions)
        .unwrap()
        .unwrap()
}

#[test]
fn test_header() {
    let module = module(None);
    assert_eq!(module.resource_type, "Library");
    assert_eq!(module.name, "Measure");
    assert_eq!(module.version.as_deref(), Some("1.0.0"));
    assert_eq!(module.library_type.coding[0].code, "module-definition");
}

#[test]
fn test_related_artifacts() {
    let resources: Vec<_> = module(None)
        .related_artifact
        .into_iter()
        .map(|a| (a.display, a.resource))
        .collect();
    assert_eq!(
        resources,
        vec![
            ("Library Common".to_string(), "Library/Common|2.0.0".to_string()),
            ("Value set Inpatient".to_string(), "http://example.org/vs/inpatient".to_string()),
            (
                "Parameter Measurement Period".to_string(),
                "Library/Measure|1.0.0#Measurement Period".to_string()
            ),
            ("Expression Encounters".to_string(), "Library/Measure|1.0.0#Encounters".to_string()),
            (
                "Expression Has Encounters".to_string(),
                "Library/Measure|1.0.0#Has Encounters".to_string()
            ),
            ("Expression Conditions".to_string(), "Library/Measure|1.0.0#Conditions".to_string()),
            (
                "Expression Active Conditions".to_string(),
                "Library/Common|2.0.0#Active Conditions".to_string()
            ),
        ]
    );
}

#[test]
fn test_parameters() {
    let parameters: Vec<_> = module(None)
        .parameter
        .into_iter()
        .map(|p| (p.name, p.parameter_use, p.max, p.parameter_type))
        .collect();
    assert_eq!(
        parameters,
        vec![
            (
                "Measurement Period".to_string(),
                ParameterUse::In,
                "1".to_string(),
                Some("Period".to_string())
            ),
            (
                "Encounters".to_string(),
                ParameterUse::Out,
                "*".to_string(),
                Some("Encounter".to_string())
            ),
            (
                "Has Encounters".to_string(),
                ParameterUse::Out,
                "1".to_string(),
                Some("boolean".to_string())
            ),
        ]
    );
}

#[test]
fn test_out_parameters_follow_requested_expressions() {
    let names: Vec<_> = module(Some(&["Has Encounters"]))
        .parameter
        .into_iter()
        .filter(|p| p.parameter_use == ParameterUse::Out)
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Has Encounters"]);
}

#[test]
fn test_data_requirements() {
    let value = serde_json::to_value(module(None).data_requirement).unwrap();
    assert_eq!(
        value,
        json!([
            {
                "type": "Encounter",
                "profile": ["http://hl7.org/fhir/StructureDefinition/Encounter"],
                "mustSupport": ["status"],
                "codeFilter": [{"path": "code", "valueSet": "http://example.org/vs/inpatient"}]
            },
            {
                "type": "Condition",
                "mustSupport": ["clinicalStatus"]
            }
        ])
    );
}

#[test]
fn test_requested_expressions_narrow_data_requirements() {
    let module = module(Some(&["Conditions"]));
    let types: Vec<_> = module.data_requirement.iter().map(|d| d.data_type.as_str()).collect();
    assert_eq!(types, vec!["Condition"]);
    assert!(
        !module
            .related_artifact
            .iter()
            .any(|a| a.display == "Value set Inpatient")
    );
}

// ============================================================================
// Code filters
// ============================================================================

fn data_requirements_of(statements: Vec<Value>) -> Value {
    let lib = library(
        "Terminology",
        "1.0.0",
        json!({
            "codeSystems": defs(vec![code_system_def("SNOMED", "http://snomed.info/sct")]),
            "valueSets": defs(vec![
                value_set_def("VS1", "http://a/1"),
                value_set_def("VS2", "http://a/2"),
            ]),
            "codes": defs(vec![code_def("Diabetes Code", "44054006", "SNOMED")]),
            "statements": defs(statements),
        }),
    );
    let module = processor(Vec::new())
        .gather_data_requirements(Some(&lib), None)
        .unwrap()
        .unwrap();
    serde_json::to_value(module.data_requirement).unwrap()
}

#[test]
fn test_differing_filters_on_one_type_are_dropped() {
    let value = data_requirements_of(vec![
        expression_def("A", retrieve_in("Condition", "VS1")),
        expression_def("B", retrieve_in("Condition", "VS2")),
        expression_def("C", retrieve("Condition")),
    ]);
    assert_eq!(
        value,
        json!([{
            "type": "Condition",
            "profile": ["http://hl7.org/fhir/StructureDefinition/Condition"]
        }])
    );
}

#[test]
fn test_shared_filter_on_one_type_is_kept() {
    let value = data_requirements_of(vec![
        expression_def("A", retrieve_in("Condition", "VS1")),
        expression_def("B", query("C", retrieve_in("Condition", "VS1"), None)),
    ]);
    assert_eq!(
        value,
        json!([{
            "type": "Condition",
            "profile": ["http://hl7.org/fhir/StructureDefinition/Condition"],
            "codeFilter": [{"path": "code", "valueSet": "http://a/1"}]
        }])
    );
}

#[test]
fn test_alias_value_set_condition_becomes_code_filter() {
    let value = data_requirements_of(vec![expression_def(
        "Q",
        query(
            "C",
            retrieve("Condition"),
            Some(in_value_set(property("C", "code"), value_set_ref("VS1"))),
        ),
    )]);
    assert_eq!(
        value,
        json!([{
            "type": "Condition",
            "mustSupport": ["code"],
            "codeFilter": [{"path": "code", "valueSet": "http://a/1"}]
        }])
    );
}

#[test]
fn test_alias_code_condition_becomes_code_filter() {
    let value = data_requirements_of(vec![expression_def(
        "Q",
        query(
            "C",
            retrieve("Condition"),
            Some(binary(
                "Equivalent",
                property("C", "code"),
                unary("ToConcept", code_ref("Diabetes Code")),
            )),
        ),
    )]);
    assert_eq!(
        value,
        json!([{
            "type": "Condition",
            "mustSupport": ["code"],
            "codeFilter": [{
                "path": "code",
                "code": [{"system": "http://snomed.info/sct", "code": "44054006"}]
            }]
        }])
    );
}

#[test]
fn test_disjunctive_value_sets_give_no_code_filter() {
    let value = data_requirements_of(vec![expression_def(
        "Q",
        query(
            "C",
            retrieve("Condition"),
            Some(binary(
                "Or",
                in_value_set(property("C", "code"), value_set_ref("VS1")),
                in_value_set(property("C", "code"), value_set_ref("VS2")),
            )),
        ),
    )]);
    assert_eq!(value, json!([{"type": "Condition", "mustSupport": ["code"]}]));
}

#[test]
fn test_qualified_value_set_resolves_through_include() {
    let mut qualified = retrieve_in("Condition", "Diabetes");
    qualified["codes"] = qualified_value_set_ref("Common", "Diabetes");
    let measure = library(
        "Measure",
        "1.0.0",
        json!({
            "includes": defs(vec![include("Common", "Common", "2.0.0")]),
            "valueSets": defs(vec![value_set_def("Diabetes", "http://example.org/vs/local")]),
            "statements": defs(vec![
                expression_def("Conditions", qualified),
                expression_def("Observations", retrieve_in("Observation", "Diabetes")),
            ]),
        }),
    );
    let common = library(
        "Common",
        "2.0.0",
        json!({
            "valueSets": defs(vec![value_set_def("Diabetes", "http://example.org/vs/common")]),
        }),
    );

    let module = processor(vec![common])
        .gather_data_requirements(Some(&measure), None)
        .unwrap()
        .unwrap();
    let filters: Vec<_> = module
        .data_requirement
        .iter()
        .map(|d| (d.data_type.as_str(), d.code_filter[0].value_set.as_deref()))
        .collect();
    assert_eq!(
        filters,
        vec![
            ("Condition", Some("http://example.org/vs/common")),
            ("Observation", Some("http://example.org/vs/local")),
        ]
    );
}

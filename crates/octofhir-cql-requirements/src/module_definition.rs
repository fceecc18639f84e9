//! FHIR-shaped module definition
//!
//! Summarizes gathered requirements as a `Library` resource of type
//! `module-definition`: the artifacts the logic depends on, its parameters
//! and the data it retrieves.

use indexmap::{IndexMap, IndexSet};
use octofhir_cql_elm::{Expression, Retrieve, TypeSpecifier, local_name};
use serde::Serialize;

use crate::requirement::{ConditionRequirement, ElmElement, LibraryIdentifier};
use crate::requirements::{ElmRequirements, library_canonical};
use crate::visitor::strip_conversions;

pub const LIBRARY_TYPE_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/library-type";
pub const MODULE_DEFINITION_CODE: &str = "module-definition";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelatedArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub display: String,
    pub resource: String,
}

impl RelatedArtifact {
    pub fn depends_on(display: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            artifact_type: "depends-on".to_string(),
            display: display.into(),
            resource: resource.into(),
        }
    }
}

/// Direction of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterUse {
    In,
    Out,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterDefinition {
    pub name: String,
    #[serde(rename = "use")]
    pub parameter_use: ParameterUse,
    pub min: u32,
    pub max: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub parameter_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFilter {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<Coding>,
}

/// Data of one type the logic retrieves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDataRequirement {
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profile: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub must_support: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub code_filter: Vec<CodeFilter>,
}

/// `Library` resource describing what a piece of logic depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDefinition {
    pub resource_type: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub library_type: CodeableConcept,
    pub related_artifact: Vec<RelatedArtifact>,
    pub parameter: Vec<ParameterDefinition>,
    pub data_requirement: Vec<ModuleDataRequirement>,
}

impl ModuleDefinition {
    /// Build the summary. `expressions` limits the `out` parameters to the
    /// named root-library expressions.
    pub fn from_requirements(requirements: &ElmRequirements, expressions: Option<&[&str]>) -> Self {
        let root = requirements.library();
        Self {
            resource_type: "Library".to_string(),
            name: root.id.clone(),
            version: root.version.clone(),
            library_type: CodeableConcept {
                coding: vec![Coding {
                    system: LIBRARY_TYPE_SYSTEM.to_string(),
                    code: MODULE_DEFINITION_CODE.to_string(),
                }],
            },
            related_artifact: related_artifacts(requirements),
            parameter: parameters(requirements, expressions),
            data_requirement: data_requirements(requirements),
        }
    }

    /// True when the logic depends on nothing
    pub fn is_empty(&self) -> bool {
        self.related_artifact.is_empty() && self.parameter.is_empty() && self.data_requirement.is_empty()
    }
}

fn versioned(id: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{}|{}", id, version),
        None => id.to_string(),
    }
}

fn definition_resource(library: &LibraryIdentifier, name: &str) -> String {
    format!("{}#{}", library_canonical(library), name)
}

fn related_artifacts(requirements: &ElmRequirements) -> Vec<RelatedArtifact> {
    let mut seen = IndexSet::new();
    let mut artifacts = Vec::new();
    let mut push = |artifact: RelatedArtifact| {
        if seen.insert(artifact.resource.clone()) {
            artifacts.push(artifact);
        }
    };

    for requirement in requirements.includes() {
        if let ElmElement::IncludeDef(def) = &requirement.element {
            let target = def.library_identifier(requirement.library.system.as_deref());
            push(RelatedArtifact::depends_on(
                format!("Library {}", def.local_identifier),
                library_canonical(&target),
            ));
        }
    }
    for requirement in requirements.code_systems() {
        if let ElmElement::CodeSystemDef(def) = &requirement.element {
            push(RelatedArtifact::depends_on(
                format!("Code system {}", def.name),
                versioned(&def.id, def.version.as_deref()),
            ));
        }
    }
    for requirement in requirements.value_sets() {
        if let ElmElement::ValueSetDef(def) = &requirement.element {
            push(RelatedArtifact::depends_on(
                format!("Value set {}", def.name),
                versioned(&def.id, def.version.as_deref()),
            ));
        }
    }
    for requirement in requirements.codes() {
        if let ElmElement::CodeDef(def) = &requirement.element {
            push(RelatedArtifact::depends_on(
                format!("Code {}", def.name),
                definition_resource(&requirement.library, &def.name),
            ));
        }
    }
    for requirement in requirements.concepts() {
        if let ElmElement::ConceptDef(def) = &requirement.element {
            push(RelatedArtifact::depends_on(
                format!("Concept {}", def.name),
                definition_resource(&requirement.library, &def.name),
            ));
        }
    }
    for requirement in requirements.parameters() {
        if let ElmElement::ParameterDef(def) = &requirement.element {
            push(RelatedArtifact::depends_on(
                format!("Parameter {}", def.name),
                definition_resource(&requirement.library, &def.name),
            ));
        }
    }
    for requirement in requirements.expressions() {
        if let ElmElement::ExpressionDef(def) = &requirement.element {
            push(RelatedArtifact::depends_on(
                format!("Expression {}", def.name),
                definition_resource(&requirement.library, &def.name),
            ));
        }
    }
    for requirement in requirements.functions() {
        if let ElmElement::FunctionDef(def) = &requirement.element {
            push(RelatedArtifact::depends_on(
                format!("Function {}", def.signature()),
                definition_resource(&requirement.library, &def.name),
            ));
        }
    }
    artifacts
}

/// FHIR type for a CQL named type. System types map to FHIR primitives and
/// data types; model types keep their local name.
fn fhir_type_name(name: &str) -> Option<String> {
    let mapped = match local_name(name) {
        "Any" => return None,
        "Boolean" => "boolean",
        "Integer" | "Long" => "integer",
        "Decimal" => "decimal",
        "String" => "string",
        "Date" => "date",
        "DateTime" => "dateTime",
        "Time" => "time",
        "Quantity" => "Quantity",
        "Ratio" => "Ratio",
        "Code" => "Coding",
        "Concept" => "CodeableConcept",
        other => other,
    };
    Some(mapped.to_string())
}

/// FHIR type and whether values repeat
pub fn fhir_type(specifier: &TypeSpecifier) -> Option<(String, bool)> {
    match specifier {
        TypeSpecifier::Named(named) => fhir_type_name(&named.name).map(|t| (t, false)),
        TypeSpecifier::List { element_type } => fhir_type(element_type).map(|(t, _)| (t, true)),
        TypeSpecifier::Interval { point_type } => {
            let TypeSpecifier::Named(point) = point_type.as_ref() else {
                return None;
            };
            match point.local_name() {
                "Date" | "DateTime" => Some(("Period".to_string(), false)),
                "Quantity" | "Integer" | "Decimal" => Some(("Range".to_string(), false)),
                _ => None,
            }
        }
        TypeSpecifier::Tuple { .. } | TypeSpecifier::Choice { .. } => None,
    }
}

fn resolve_type(specifier: Option<&TypeSpecifier>, name: Option<&str>) -> Option<(String, bool)> {
    specifier
        .and_then(fhir_type)
        .or_else(|| name.and_then(fhir_type_name).map(|t| (t, false)))
}

fn parameter(name: &str, parameter_use: ParameterUse, resolved: Option<(String, bool)>) -> ParameterDefinition {
    let repeats = resolved.as_ref().is_some_and(|(_, repeats)| *repeats);
    ParameterDefinition {
        name: name.to_string(),
        parameter_use,
        min: 0,
        max: if repeats { "*" } else { "1" }.to_string(),
        parameter_type: resolved.map(|(t, _)| t),
    }
}

fn parameters(requirements: &ElmRequirements, expressions: Option<&[&str]>) -> Vec<ParameterDefinition> {
    let mut names = IndexSet::new();
    let mut result = Vec::new();

    for (_, def) in requirements.parameter_defs() {
        if names.insert((ParameterUse::In, def.name.clone())) {
            let resolved = resolve_type(
                def.parameter_type_specifier.as_ref(),
                def.result_type_name.as_deref(),
            );
            result.push(parameter(&def.name, ParameterUse::In, resolved));
        }
    }

    let root = requirements.library();
    for requirement in requirements.expressions() {
        let ElmElement::ExpressionDef(def) = &requirement.element else {
            continue;
        };
        if &requirement.library != root {
            continue;
        }
        if expressions.is_some_and(|wanted| !wanted.contains(&def.name.as_str())) {
            continue;
        }
        let Some(resolved) = resolve_type(
            def.result_type_specifier.as_ref(),
            def.result_type_name.as_deref(),
        ) else {
            continue;
        };
        if names.insert((ParameterUse::Out, def.name.clone())) {
            result.push(parameter(&def.name, ParameterUse::Out, Some(resolved)));
        }
    }
    result
}

fn coding(requirements: &ElmRequirements, library: &LibraryIdentifier, code: &Expression) -> Option<Coding> {
    match code {
        Expression::CodeRef(reference) => {
            let (code_library, def) = requirements.resolve_code(library, reference)?;
            let system = requirements.resolve_code_system(code_library, def.code_system.as_ref()?)?;
            Some(Coding {
                system: system.id.clone(),
                code: def.id.clone(),
            })
        }
        Expression::Code(code) => {
            let system = requirements.resolve_code_system(library, &code.system)?;
            Some(Coding {
                system: system.id.clone(),
                code: code.code.clone(),
            })
        }
        _ => None,
    }
}

/// Filter on `path` for a value set or code(s) referenced from `library`.
/// None when the terminology does not resolve to something a server can
/// filter on.
fn terminology_filter(
    requirements: &ElmRequirements,
    library: &LibraryIdentifier,
    path: &str,
    terminology: &Expression,
) -> Option<CodeFilter> {
    let (value_set, code) = match strip_conversions(terminology) {
        Expression::ValueSetRef(reference) => {
            let def = requirements.resolve_value_set(library, reference)?;
            (Some(versioned(&def.id, def.version.as_deref())), Vec::new())
        }
        Expression::List(list) => {
            let codes = list
                .elements
                .iter()
                .map(|element| coding(requirements, library, strip_conversions(element)))
                .collect::<Option<Vec<_>>>()?;
            (None, codes)
        }
        other => (None, vec![coding(requirements, library, other)?]),
    };
    if value_set.is_none() && code.is_empty() {
        return None;
    }
    Some(CodeFilter {
        path: path.to_string(),
        value_set,
        code,
    })
}

fn retrieve_filter(
    requirements: &ElmRequirements,
    library: &LibraryIdentifier,
    retrieve: &Retrieve,
) -> Option<CodeFilter> {
    let path = retrieve.code_property.as_deref().unwrap_or("code");
    terminology_filter(requirements, library, path, retrieve.codes.as_deref()?)
}

fn condition_filter(requirements: &ElmRequirements, condition: &ConditionRequirement) -> Option<CodeFilter> {
    match &condition.element {
        Expression::InValueSet(_)
        | Expression::AnyInValueSet(_)
        | Expression::Equal(_)
        | Expression::Equivalent(_)
        | Expression::In(_) => terminology_filter(
            requirements,
            &condition.library,
            &condition.property.path,
            &condition.comparand,
        ),
        _ => None,
    }
}

/// One evaluation of a retrieve and the code filters that hold for the data
/// it must return
struct RetrieveUse<'a> {
    library: &'a LibraryIdentifier,
    retrieve: &'a Retrieve,
    filters: Vec<CodeFilter>,
    matched: bool,
}

/// Code filters of every retrieve, in visit order. A retrieve feeding a
/// query alias also carries the terminology conditions on that alias.
fn retrieve_uses(requirements: &ElmRequirements) -> Vec<(&Retrieve, Vec<CodeFilter>)> {
    let mut aliased = Vec::new();
    for query in requirements.query_requirements() {
        for data in &query.data_requirements {
            let Some(retrieve) = data.retrieve() else {
                continue;
            };
            let mut filters: Vec<CodeFilter> =
                retrieve_filter(requirements, &data.library, retrieve).into_iter().collect();
            for filter in data
                .conditions
                .iter()
                .filter_map(|condition| condition_filter(requirements, condition))
            {
                if !filters.contains(&filter) {
                    filters.push(filter);
                }
            }
            aliased.push(RetrieveUse {
                library: &data.library,
                retrieve,
                filters,
                matched: false,
            });
        }
    }

    let mut uses = Vec::new();
    for requirement in requirements.retrieves() {
        let Some(retrieve) = requirement.element.as_retrieve() else {
            continue;
        };
        let alias_use = aliased
            .iter_mut()
            .find(|u| !u.matched && u.library == &requirement.library && u.retrieve == retrieve);
        let filters = match alias_use {
            Some(alias_use) => {
                alias_use.matched = true;
                std::mem::take(&mut alias_use.filters)
            }
            None => retrieve_filter(requirements, &requirement.library, retrieve)
                .into_iter()
                .collect(),
        };
        uses.push((retrieve, filters));
    }
    uses
}

/// One entry per retrieved type. Code filters are ANDed, so an entry keeps
/// only the filters every retrieve of its type applies.
fn data_requirements(requirements: &ElmRequirements) -> Vec<ModuleDataRequirement> {
    let mut by_type: IndexMap<String, ModuleDataRequirement> = IndexMap::new();
    let mut common_filters: IndexMap<String, Vec<CodeFilter>> = IndexMap::new();

    for (retrieve, filters) in retrieve_uses(requirements) {
        let data_type = retrieve.local_data_type().to_string();
        let entry = by_type
            .entry(data_type.clone())
            .or_insert_with(|| ModuleDataRequirement {
                data_type: data_type.clone(),
                profile: Vec::new(),
                must_support: Vec::new(),
                code_filter: Vec::new(),
            });

        if let Some(profile) = &retrieve.template_id {
            if !entry.profile.contains(profile) {
                entry.profile.push(profile.clone());
            }
        }

        common_filters
            .entry(data_type)
            .and_modify(|common| common.retain(|f| filters.contains(f)))
            .or_insert(filters);
    }

    for query in requirements.query_requirements() {
        for data in &query.data_requirements {
            let Some(retrieve) = data.retrieve() else {
                continue;
            };
            if let Some(entry) = by_type.get_mut(retrieve.local_data_type()) {
                for path in &data.properties {
                    if !entry.must_support.contains(path) {
                        entry.must_support.push(path.clone());
                    }
                }
            }
        }
    }

    for (data_type, filters) in common_filters {
        if let Some(entry) = by_type.get_mut(&data_type) {
            entry.code_filter = filters;
        }
    }
    by_type.into_values().collect()
}

//! Collected requirements of one analysis run

use indexmap::IndexMap;
use octofhir_cql_elm::{
    CodeDef, CodeRef, CodeSystemDef, CodeSystemRef, ParameterDef, Retrieve, ValueSetDef, ValueSetRef,
};

use crate::requirement::{ElmElement, LibraryIdentifier, QueryRequirement, Requirement};

/// Kind of definition a requirement points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequirementCategory {
    Using,
    Include,
    Context,
    CodeSystem,
    ValueSet,
    Code,
    Concept,
    Parameter,
    Expression,
    Function,
}

/// Deduplication key: library, category and a category-specific name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RequirementKey {
    library: LibraryIdentifier,
    category: RequirementCategory,
    key: String,
}

fn versioned(name: &str, version: Option<&str>) -> String {
    match version {
        Some(version) => format!("{}|{}", name, version),
        None => name.to_string(),
    }
}

/// Canonical `Library/{id}|{version}` reference, namespaced when the
/// identifier carries a system
pub fn library_canonical(identifier: &LibraryIdentifier) -> String {
    let path = format!("Library/{}", identifier.id);
    let path = match &identifier.system {
        Some(system) => format!("{}/{}", system.trim_end_matches('/'), path),
        None => path,
    };
    versioned(&path, identifier.version.as_deref())
}

fn categorize(element: &ElmElement, library: &LibraryIdentifier) -> Option<(RequirementCategory, String)> {
    use RequirementCategory as C;

    let entry = match element {
        ElmElement::UsingDef(def) => (C::Using, versioned(&def.uri, def.version.as_deref())),
        ElmElement::IncludeDef(def) => {
            let target = def.library_identifier(library.system.as_deref());
            (C::Include, library_canonical(&target))
        }
        ElmElement::ContextDef(def) => (C::Context, def.name.clone()),
        ElmElement::CodeSystemDef(def) => (C::CodeSystem, def.name.to_lowercase()),
        ElmElement::ValueSetDef(def) => (C::ValueSet, def.name.to_lowercase()),
        ElmElement::CodeDef(def) => (C::Code, def.name.to_lowercase()),
        ElmElement::ConceptDef(def) => (C::Concept, def.name.to_lowercase()),
        ElmElement::ParameterDef(def) => (C::Parameter, def.name.to_lowercase()),
        ElmElement::ExpressionDef(def) => (C::Expression, def.name.clone()),
        ElmElement::FunctionDef(def) => (C::Function, def.signature()),
        ElmElement::Expression(_) => return None,
    };
    Some(entry)
}

/// Deduplicated requirements gathered from a root library and everything it
/// references
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElmRequirements {
    library: LibraryIdentifier,
    requirements: IndexMap<RequirementKey, Requirement>,
    retrieves: Vec<Requirement>,
    query_requirements: Vec<QueryRequirement>,
    /// (referencing library, include alias) -> library the alias resolved to
    include_targets: IndexMap<(LibraryIdentifier, String), LibraryIdentifier>,
}

impl ElmRequirements {
    pub fn new(library: LibraryIdentifier) -> Self {
        Self {
            library,
            ..Default::default()
        }
    }

    /// Identifier of the root library
    pub fn library(&self) -> &LibraryIdentifier {
        &self.library
    }

    /// File a requirement under its category.
    ///
    /// Definitions are deduplicated per library; retrieves and other bare
    /// expressions are kept in report order.
    pub fn report_requirement(&mut self, requirement: Requirement) {
        match categorize(&requirement.element, &requirement.library) {
            Some((category, key)) => {
                let key = RequirementKey {
                    library: requirement.library.clone(),
                    category,
                    key,
                };
                self.requirements.entry(key).or_insert(requirement);
            }
            None => {
                if requirement.element.as_retrieve().is_some() {
                    self.retrieves.push(requirement);
                }
            }
        }
    }

    pub fn report_query_requirement(&mut self, requirement: QueryRequirement) {
        self.query_requirements.push(requirement);
    }

    /// Record the library `local_identifier` resolved to from `library`
    pub fn report_include_target(
        &mut self,
        library: &LibraryIdentifier,
        local_identifier: &str,
        target: &LibraryIdentifier,
    ) {
        self.include_targets
            .entry((library.clone(), local_identifier.to_string()))
            .or_insert_with(|| target.clone());
    }

    /// Library a reference written in `library` points into
    pub fn referenced_library<'a>(
        &'a self,
        library: &'a LibraryIdentifier,
        library_name: Option<&str>,
    ) -> Option<&'a LibraryIdentifier> {
        match library_name {
            None => Some(library),
            Some(local) => self
                .include_targets
                .get(&(library.clone(), local.to_string())),
        }
    }

    fn definition(
        &self,
        library: &LibraryIdentifier,
        category: RequirementCategory,
        name: &str,
    ) -> Option<&Requirement> {
        self.requirements.get(&RequirementKey {
            library: library.clone(),
            category,
            key: name.to_lowercase(),
        })
    }

    /// Requirements of one category, in report order
    pub fn by_category(
        &self,
        category: RequirementCategory,
    ) -> impl Iterator<Item = &Requirement> + '_ {
        self.requirements
            .iter()
            .filter(move |(key, _)| key.category == category)
            .map(|(_, requirement)| requirement)
    }

    /// All deduplicated definition requirements, in report order
    pub fn definitions(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.requirements.values()
    }

    pub fn usings(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Using)
    }

    pub fn includes(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Include)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Context)
    }

    pub fn code_systems(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::CodeSystem)
    }

    pub fn value_sets(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::ValueSet)
    }

    pub fn codes(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Code)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Concept)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Parameter)
    }

    pub fn expressions(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Expression)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Requirement> + '_ {
        self.by_category(RequirementCategory::Function)
    }

    /// Retrieve requirements, in visit order
    pub fn retrieves(&self) -> &[Requirement] {
        &self.retrieves
    }

    pub fn query_requirements(&self) -> &[QueryRequirement] {
        &self.query_requirements
    }

    /// Value set declared in `library` under `name` (case-insensitive)
    pub fn value_set_def(&self, library: &LibraryIdentifier, name: &str) -> Option<&ValueSetDef> {
        match &self.definition(library, RequirementCategory::ValueSet, name)?.element {
            ElmElement::ValueSetDef(def) => Some(def),
            _ => None,
        }
    }

    /// Value set a reference written in `library` names
    pub fn resolve_value_set(&self, library: &LibraryIdentifier, reference: &ValueSetRef) -> Option<&ValueSetDef> {
        let target = self.referenced_library(library, reference.library_name.as_deref())?;
        self.value_set_def(target, &reference.name)
    }

    /// Code system a reference written in `library` names
    pub fn resolve_code_system(
        &self,
        library: &LibraryIdentifier,
        reference: &CodeSystemRef,
    ) -> Option<&CodeSystemDef> {
        let target = self.referenced_library(library, reference.library_name.as_deref())?;
        match &self.definition(target, RequirementCategory::CodeSystem, &reference.name)?.element {
            ElmElement::CodeSystemDef(def) => Some(def),
            _ => None,
        }
    }

    /// Code a reference written in `library` names, with the library
    /// declaring it
    pub fn resolve_code(
        &self,
        library: &LibraryIdentifier,
        reference: &CodeRef,
    ) -> Option<(&LibraryIdentifier, &CodeDef)> {
        let target = self.referenced_library(library, reference.library_name.as_deref())?;
        let requirement = self.definition(target, RequirementCategory::Code, &reference.name)?;
        match &requirement.element {
            ElmElement::CodeDef(def) => Some((&requirement.library, def)),
            _ => None,
        }
    }

    /// Parameter definitions across all libraries
    pub fn parameter_defs(&self) -> impl Iterator<Item = (&LibraryIdentifier, &ParameterDef)> + '_ {
        self.parameters().filter_map(|r| match &r.element {
            ElmElement::ParameterDef(def) => Some((&r.library, def)),
            _ => None,
        })
    }

    /// Retrieve expressions, in visit order
    pub fn retrieve_exprs(&self) -> impl Iterator<Item = &Retrieve> + '_ {
        self.retrieves.iter().filter_map(|r| r.element.as_retrieve())
    }

    /// Number of distinct definition requirements plus retrieves
    pub fn len(&self) -> usize {
        self.requirements.len() + self.retrieves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.retrieves.is_empty() && self.query_requirements.is_empty()
    }
}

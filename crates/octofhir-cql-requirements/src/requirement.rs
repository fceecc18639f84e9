//! Requirement algebra
//!
//! A requirement ties an ELM element to the library it was found in.
//! Expression requirements describe what a boolean expression says about the
//! data it filters: a [`ConditionRequirement`] compares a property of a query
//! alias to a comparand, and conjunctions/disjunctions of those are kept
//! flattened. [`QueryRequirement`] and [`DataRequirement`] carry the per-alias
//! result of analyzing a query.

use indexmap::IndexSet;
use octofhir_cql_elm::{
    CodeDef, CodeSystemDef, ConceptDef, ContextDef, Expression, ExpressionDef, FunctionDef,
    IncludeDef, ParameterDef, Property, Query, Retrieve, UsingDef, ValueSetDef,
    VersionedIdentifier,
};

/// Identifier of a library taking part in an analysis run
pub type LibraryIdentifier = VersionedIdentifier;

/// An ELM element a requirement points at
#[derive(Debug, Clone, PartialEq)]
pub enum ElmElement {
    UsingDef(UsingDef),
    IncludeDef(IncludeDef),
    ContextDef(ContextDef),
    CodeSystemDef(CodeSystemDef),
    ValueSetDef(ValueSetDef),
    CodeDef(CodeDef),
    ConceptDef(ConceptDef),
    ParameterDef(ParameterDef),
    ExpressionDef(ExpressionDef),
    FunctionDef(FunctionDef),
    Expression(Expression),
}

impl ElmElement {
    pub fn as_retrieve(&self) -> Option<&Retrieve> {
        match self {
            Self::Expression(expr) => expr.as_retrieve(),
            _ => None,
        }
    }
}

/// An element together with the library it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub library: LibraryIdentifier,
    pub element: ElmElement,
}

impl Requirement {
    pub fn new(library: LibraryIdentifier, element: ElmElement) -> Self {
        Self { library, element }
    }
}

/// `property <op> comparand`, where the property is rooted at a query alias
///
/// `property` is normalized: `scope` names the alias and `path` is the full
/// dotted path from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionRequirement {
    pub library: LibraryIdentifier,
    /// The comparison the condition was inferred from
    pub element: Expression,
    pub property: Property,
    pub comparand: Expression,
}

impl ConditionRequirement {
    /// Alias the condition constrains
    pub fn alias(&self) -> Option<&str> {
        self.property.scope.as_deref()
    }

    /// Re-root the condition at `alias`, prefixing its path with `path`
    pub fn requalify(&self, alias: &str, path: &str) -> Self {
        Self {
            property: Property::scoped(alias, format!("{}.{}", path, self.property.path)),
            ..self.clone()
        }
    }
}

/// Flattened conjunction
#[derive(Debug, Clone, PartialEq)]
pub struct ConjunctiveRequirement {
    pub library: LibraryIdentifier,
    pub element: Expression,
    pub arguments: Vec<ElmRequirement>,
}

/// Flattened disjunction
#[derive(Debug, Clone, PartialEq)]
pub struct DisjunctiveRequirement {
    pub library: LibraryIdentifier,
    pub element: Expression,
    pub arguments: Vec<ElmRequirement>,
}

/// What a query requires of the data behind each of its aliases
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequirement {
    pub library: LibraryIdentifier,
    pub element: Query,
    /// Conjuncts gathered from where and relationship clauses
    pub requirements: Vec<ElmRequirement>,
    pub data_requirements: Vec<DataRequirement>,
}

impl QueryRequirement {
    /// Data requirement of the named alias
    pub fn data_requirement(&self, alias: &str) -> Option<&DataRequirement> {
        self.data_requirements
            .iter()
            .find(|dr| dr.alias.as_deref() == Some(alias))
    }

    /// True when `requirement` is one of the query's conjuncts, a condition
    /// attributed to one of its aliases, or one of its data requirements.
    pub fn has_requirement(&self, requirement: &ElmRequirement) -> bool {
        if self.requirements.contains(requirement) {
            return true;
        }
        match requirement {
            ElmRequirement::Condition(condition) => self
                .data_requirements
                .iter()
                .any(|dr| dr.conditions.contains(condition)),
            ElmRequirement::Data(data) => self.data_requirements.contains(data),
            _ => false,
        }
    }
}

/// Data accessed through one alias or retrieve
#[derive(Debug, Clone, PartialEq)]
pub struct DataRequirement {
    pub library: LibraryIdentifier,
    pub alias: Option<String>,
    pub source: Expression,
    pub conditions: Vec<ConditionRequirement>,
    /// Property paths read from the source, in first-seen order
    pub properties: IndexSet<String>,
}

impl DataRequirement {
    pub fn for_alias(library: LibraryIdentifier, alias: impl Into<String>, source: Expression) -> Self {
        Self {
            library,
            alias: Some(alias.into()),
            source,
            conditions: Vec::new(),
            properties: IndexSet::new(),
        }
    }

    pub fn for_retrieve(library: LibraryIdentifier, retrieve: &Retrieve) -> Self {
        Self {
            library,
            alias: None,
            source: Expression::Retrieve(retrieve.clone()),
            conditions: Vec::new(),
            properties: IndexSet::new(),
        }
    }

    /// Add a condition unless an equal one is already present
    pub fn add_condition(&mut self, condition: ConditionRequirement) {
        if !self.conditions.contains(&condition) {
            self.conditions.push(condition);
        }
    }

    pub fn report_property(&mut self, path: impl Into<String>) {
        self.properties.insert(path.into());
    }

    /// The retrieve feeding this requirement, if the source is one
    pub fn retrieve(&self) -> Option<&Retrieve> {
        self.source.as_retrieve()
    }
}

/// Any requirement produced by the analysis
#[derive(Debug, Clone, PartialEq)]
pub enum ElmRequirement {
    Element(Requirement),
    Condition(ConditionRequirement),
    Conjunctive(ConjunctiveRequirement),
    Disjunctive(DisjunctiveRequirement),
    Query(QueryRequirement),
    Data(DataRequirement),
}

impl ElmRequirement {
    pub fn library(&self) -> &LibraryIdentifier {
        match self {
            Self::Element(r) => &r.library,
            Self::Condition(r) => &r.library,
            Self::Conjunctive(r) => &r.library,
            Self::Disjunctive(r) => &r.library,
            Self::Query(r) => &r.library,
            Self::Data(r) => &r.library,
        }
    }

    /// Combine two sides of an `and`
    ///
    /// A missing side contributes nothing, so the other side survives alone.
    pub fn and(
        library: &LibraryIdentifier,
        element: &Expression,
        left: Option<Self>,
        right: Option<Self>,
    ) -> Option<Self> {
        match (left, right) {
            (None, None) => None,
            (Some(side), None) | (None, Some(side)) => Some(side),
            (Some(left), Some(right)) => {
                let mut arguments = Vec::new();
                for side in [left, right] {
                    match side {
                        Self::Conjunctive(c) => arguments.extend(c.arguments),
                        other => arguments.push(other),
                    }
                }
                Some(Self::Conjunctive(ConjunctiveRequirement {
                    library: library.clone(),
                    element: element.clone(),
                    arguments,
                }))
            }
        }
    }

    /// Combine two sides of an `or`
    ///
    /// An unconstrained side leaves the whole disjunction unconstrained.
    pub fn or(
        library: &LibraryIdentifier,
        element: &Expression,
        left: Option<Self>,
        right: Option<Self>,
    ) -> Option<Self> {
        let (left, right) = (left?, right?);
        let mut arguments = Vec::new();
        for side in [left, right] {
            match side {
                Self::Disjunctive(d) => arguments.extend(d.arguments),
                other => arguments.push(other),
            }
        }
        Some(Self::Disjunctive(DisjunctiveRequirement {
            library: library.clone(),
            element: element.clone(),
            arguments,
        }))
    }

    /// Keep only what constrains `alias`.
    ///
    /// Conjunctions keep their matching conditions; a disjunction survives
    /// only when every branch does.
    pub fn retain_scoped(self, alias: &str) -> Option<Self> {
        match self {
            Self::Condition(c) if c.alias() == Some(alias) => Some(Self::Condition(c)),
            Self::Conjunctive(mut c) => {
                c.arguments = c
                    .arguments
                    .into_iter()
                    .filter_map(|arg| arg.retain_scoped(alias))
                    .collect();
                match c.arguments.len() {
                    0 => None,
                    1 => c.arguments.pop(),
                    _ => Some(Self::Conjunctive(c)),
                }
            }
            Self::Disjunctive(d) => {
                let kept: Vec<_> = d
                    .arguments
                    .iter()
                    .cloned()
                    .filter_map(|arg| arg.retain_scoped(alias))
                    .collect();
                (kept == d.arguments).then_some(Self::Disjunctive(d))
            }
            _ => None,
        }
    }
}

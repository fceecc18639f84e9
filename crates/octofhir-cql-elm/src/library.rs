//! ELM library structure and definitions
//!
//! Libraries arrive already translated, so the model is read-only: it
//! deserializes HL7 ELM JSON and offers name-based lookups over the
//! definition lists.

use std::fmt;

use serde::Deserialize;

use crate::expression::{CodeRef, CodeSystemRef, Expression};

// ============================================================================
// Library Structure
// ============================================================================

/// ELM Library - the root element containing a compiled CQL library
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub identifier: VersionedIdentifier,
    pub schema_identifier: Option<VersionedIdentifier>,
    pub usings: Option<DefList<UsingDef>>,
    pub includes: Option<DefList<IncludeDef>>,
    pub parameters: Option<DefList<ParameterDef>>,
    pub code_systems: Option<DefList<CodeSystemDef>>,
    pub value_sets: Option<DefList<ValueSetDef>>,
    pub codes: Option<DefList<CodeDef>>,
    pub concepts: Option<DefList<ConceptDef>>,
    pub contexts: Option<DefList<ContextDef>>,
    /// Expression and function definitions, in declaration order
    pub statements: Option<DefList<StatementDef>>,
}

/// Versioned identifier for libraries and schemas
///
/// `system` carries the namespace URI. Equality and hashing are over all
/// three parts, which makes the identifier usable as a resolution key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct VersionedIdentifier {
    pub id: String,
    pub system: Option<String>,
    pub version: Option<String>,
}

impl VersionedIdentifier {
    pub fn new(id: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            id: id.into(),
            system: None,
            version: version.map(str::to_string),
        }
    }

    /// Set the namespace URI
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

impl fmt::Display for VersionedIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(system) = &self.system {
            write!(f, "{}/", system)?;
        }
        write!(f, "{}", self.id)?;
        if let Some(version) = &self.version {
            write!(f, "|{}", version)?;
        }
        Ok(())
    }
}

/// Container for a list of definitions (`{"def": [...]}` in ELM JSON)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DefList<T> {
    #[serde(rename = "def", default = "Vec::new")]
    pub defs: Vec<T>,
}

impl<T> Default for DefList<T> {
    fn default() -> Self {
        Self { defs: Vec::new() }
    }
}

fn defs<T>(list: &Option<DefList<T>>) -> &[T] {
    list.as_ref().map_or(&[], |l| l.defs.as_slice())
}

fn find_ignore_case<'a, T>(
    items: &'a [T],
    name: &str,
    key: impl Fn(&T) -> &str,
) -> Option<(usize, &'a T)> {
    items
        .iter()
        .enumerate()
        .find(|(_, item)| key(item) == name)
        .or_else(|| {
            items
                .iter()
                .enumerate()
                .find(|(_, item)| key(item).eq_ignore_ascii_case(name))
        })
}

impl Library {
    pub fn usings(&self) -> &[UsingDef] {
        defs(&self.usings)
    }

    pub fn includes(&self) -> &[IncludeDef] {
        defs(&self.includes)
    }

    pub fn parameters(&self) -> &[ParameterDef] {
        defs(&self.parameters)
    }

    pub fn code_systems(&self) -> &[CodeSystemDef] {
        defs(&self.code_systems)
    }

    pub fn value_sets(&self) -> &[ValueSetDef] {
        defs(&self.value_sets)
    }

    pub fn codes(&self) -> &[CodeDef] {
        defs(&self.codes)
    }

    pub fn concepts(&self) -> &[ConceptDef] {
        defs(&self.concepts)
    }

    pub fn contexts(&self) -> &[ContextDef] {
        defs(&self.contexts)
    }

    pub fn statements(&self) -> &[StatementDef] {
        defs(&self.statements)
    }

    /// Find an include by its local identifier
    pub fn resolve_include(&self, local_identifier: &str) -> Option<(usize, &IncludeDef)> {
        self.includes()
            .iter()
            .enumerate()
            .find(|(_, def)| def.local_identifier == local_identifier)
    }

    /// Find an expression definition by name.
    ///
    /// Function definitions sharing the name are skipped.
    pub fn resolve_expression_def(&self, name: &str) -> Option<(usize, &ExpressionDef)> {
        self.statements()
            .iter()
            .enumerate()
            .find_map(|(index, stmt)| match stmt {
                StatementDef::Expression(def) if def.name == name => Some((index, def)),
                _ => None,
            })
    }

    /// All function overloads declared under `name`, in declaration order
    pub fn resolve_function_defs<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (usize, &'a FunctionDef)> + 'a {
        self.statements()
            .iter()
            .enumerate()
            .filter_map(move |(index, stmt)| match stmt {
                StatementDef::Function(def) if def.name == name => Some((index, def)),
                _ => None,
            })
    }

    // Terminology and parameter names match case-insensitively when no exact
    // match exists.

    pub fn resolve_parameter_def(&self, name: &str) -> Option<(usize, &ParameterDef)> {
        find_ignore_case(self.parameters(), name, |d| d.name.as_str())
    }

    pub fn resolve_code_system_def(&self, name: &str) -> Option<(usize, &CodeSystemDef)> {
        find_ignore_case(self.code_systems(), name, |d| d.name.as_str())
    }

    pub fn resolve_value_set_def(&self, name: &str) -> Option<(usize, &ValueSetDef)> {
        find_ignore_case(self.value_sets(), name, |d| d.name.as_str())
    }

    pub fn resolve_code_def(&self, name: &str) -> Option<(usize, &CodeDef)> {
        find_ignore_case(self.codes(), name, |d| d.name.as_str())
    }

    pub fn resolve_concept_def(&self, name: &str) -> Option<(usize, &ConceptDef)> {
        find_ignore_case(self.concepts(), name, |d| d.name.as_str())
    }

    /// True when the library declares nothing at all
    pub fn is_empty(&self) -> bool {
        self.usings().is_empty()
            && self.includes().is_empty()
            && self.parameters().is_empty()
            && self.code_systems().is_empty()
            && self.value_sets().is_empty()
            && self.codes().is_empty()
            && self.concepts().is_empty()
            && self.contexts().is_empty()
            && self.statements().is_empty()
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// Using definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsingDef {
    pub local_identifier: String,
    pub uri: String,
    pub version: Option<String>,
}

/// Include definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeDef {
    pub local_identifier: String,
    /// Library name, optionally prefixed with a namespace URI (`uri/Name`)
    pub path: String,
    pub version: Option<String>,
}

impl IncludeDef {
    /// Identifier of the included library.
    ///
    /// A path without a namespace inherits `namespace` from the including
    /// library.
    pub fn library_identifier(&self, namespace: Option<&str>) -> VersionedIdentifier {
        match self.path.rsplit_once('/') {
            Some((system, id)) => VersionedIdentifier {
                id: id.to_string(),
                system: Some(system.to_string()),
                version: self.version.clone(),
            },
            None => VersionedIdentifier {
                id: self.path.clone(),
                system: namespace.map(str::to_string),
                version: self.version.clone(),
            },
        }
    }
}

/// Parameter definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDef {
    pub name: String,
    pub access_level: Option<AccessModifier>,
    pub parameter_type_specifier: Option<TypeSpecifier>,
    pub result_type_name: Option<String>,
    #[serde(rename = "default")]
    pub default_expr: Option<Box<Expression>>,
}

/// Code system definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystemDef {
    pub name: String,
    /// Code system URI
    pub id: String,
    pub version: Option<String>,
    pub access_level: Option<AccessModifier>,
}

/// Value set definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetDef {
    pub name: String,
    /// Value set canonical URL
    pub id: String,
    pub version: Option<String>,
    pub access_level: Option<AccessModifier>,
    pub code_system: Option<Vec<CodeSystemRef>>,
}

/// Code definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeDef {
    pub name: String,
    /// The code value
    pub id: String,
    pub display: Option<String>,
    pub access_level: Option<AccessModifier>,
    pub code_system: Option<CodeSystemRef>,
}

/// Concept definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptDef {
    pub name: String,
    pub display: Option<String>,
    pub access_level: Option<AccessModifier>,
    #[serde(default)]
    pub code: Vec<CodeRef>,
}

/// Context definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContextDef {
    pub name: String,
}

/// A statement: an expression or a function definition
///
/// ELM JSON marks function definitions with `"type": "FunctionDef"`;
/// everything else in `statements` is an expression definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StatementDef {
    Function(FunctionDef),
    Expression(ExpressionDef),
}

impl StatementDef {
    pub fn name(&self) -> &str {
        match self {
            Self::Function(def) => &def.name,
            Self::Expression(def) => &def.name,
        }
    }

    pub fn expression(&self) -> Option<&Expression> {
        match self {
            Self::Function(def) => def.expression.as_deref(),
            Self::Expression(def) => def.expression.as_deref(),
        }
    }
}

/// Expression definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDef {
    pub name: String,
    pub context: Option<String>,
    pub access_level: Option<AccessModifier>,
    pub expression: Option<Box<Expression>>,
    pub result_type_name: Option<String>,
    pub result_type_specifier: Option<TypeSpecifier>,
}

/// Marker for the `"type": "FunctionDef"` discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FunctionDefTag {
    FunctionDef,
}

/// Function definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDef {
    #[serde(rename = "type")]
    pub tag: FunctionDefTag,
    pub name: String,
    pub context: Option<String>,
    pub access_level: Option<AccessModifier>,
    pub fluent: Option<bool>,
    pub external: Option<bool>,
    #[serde(default)]
    pub operand: Vec<OperandDef>,
    pub result_type_name: Option<String>,
    pub result_type_specifier: Option<TypeSpecifier>,
    pub expression: Option<Box<Expression>>,
}

impl FunctionDef {
    /// Name plus operand types, distinguishing overloads
    pub fn signature(&self) -> String {
        let operands: Vec<String> = self
            .operand
            .iter()
            .map(|op| {
                op.operand_type_specifier
                    .as_ref()
                    .map(TypeSpecifier::to_string)
                    .or_else(|| op.operand_type.clone())
                    .unwrap_or_else(|| op.name.clone())
            })
            .collect();
        format!("{}({})", self.name, operands.join(", "))
    }
}

/// Operand definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperandDef {
    pub name: String,
    pub operand_type: Option<String>,
    pub operand_type_specifier: Option<TypeSpecifier>,
}

/// Access modifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AccessModifier {
    Public,
    Private,
}

// ============================================================================
// Type Specifiers
// ============================================================================

/// Type specifier
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum TypeSpecifier {
    #[serde(rename = "NamedTypeSpecifier")]
    Named(NamedTypeSpecifier),
    #[serde(rename = "ListTypeSpecifier", rename_all = "camelCase")]
    List { element_type: Box<TypeSpecifier> },
    #[serde(rename = "IntervalTypeSpecifier", rename_all = "camelCase")]
    Interval { point_type: Box<TypeSpecifier> },
    #[serde(rename = "TupleTypeSpecifier")]
    Tuple {
        #[serde(default)]
        element: Vec<TupleElementDefinition>,
    },
    #[serde(rename = "ChoiceTypeSpecifier")]
    Choice {
        #[serde(default)]
        choice: Vec<TypeSpecifier>,
    },
}

impl fmt::Display for TypeSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(named) => write!(f, "{}", named.local_name()),
            Self::List { element_type } => write!(f, "List<{}>", element_type),
            Self::Interval { point_type } => write!(f, "Interval<{}>", point_type),
            Self::Tuple { element } => {
                let names: Vec<&str> = element.iter().map(|e| e.name.as_str()).collect();
                write!(f, "Tuple{{{}}}", names.join(", "))
            }
            Self::Choice { choice } => {
                let types: Vec<String> = choice.iter().map(ToString::to_string).collect();
                write!(f, "Choice<{}>", types.join(", "))
            }
        }
    }
}

/// Named type specifier, e.g. `{urn:hl7-org:elm-types:r1}DateTime`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedTypeSpecifier {
    pub namespace: Option<String>,
    pub name: String,
}

impl NamedTypeSpecifier {
    /// Type name with any `{namespace}` qualifier removed
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }
}

/// Strip a `{namespace}` QName prefix
pub fn local_name(qualified: &str) -> &str {
    qualified
        .rsplit_once('}')
        .map_or(qualified, |(_, local)| local)
}

/// Tuple element definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleElementDefinition {
    pub name: String,
    pub element_type: Option<Box<TypeSpecifier>>,
}

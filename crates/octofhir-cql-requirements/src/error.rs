//! Errors raised while gathering data requirements

use thiserror::Error;

use crate::requirement::LibraryIdentifier;

/// Result type for requirements analysis
pub type RequirementsResult<T> = Result<T, RequirementsError>;

/// Errors that can occur during requirements analysis
///
/// Context faults indicate a traversal that entered and exited scopes out of
/// order. Resolution errors come from libraries or definitions that could not
/// be found.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequirementsError {
    /// Library stack popped or read while empty
    #[error("No library in scope")]
    LibraryStackEmpty,

    /// An alias definition started while another was still open
    #[error("Alias definition already in progress for '{alias}'")]
    AliasDefinitionActive { alias: String },

    /// Alias definition exited without a matching enter
    #[error("No alias definition in progress")]
    NoAliasDefinition,

    /// Query context read or exited outside a query
    #[error("No query context in scope")]
    NoQueryContext,

    /// Alias not active in the current query
    #[error("Unknown alias: {name}")]
    UnknownAlias { name: String },

    /// Maximum recursion depth exceeded
    #[error("Maximum recursion depth of {max_depth} exceeded")]
    RecursionLimit { max_depth: usize },

    /// Library could not be resolved
    #[error("Library not found: {identifier}")]
    LibraryNotFound { identifier: String },

    /// Include local name not declared by the library
    #[error("Include '{name}' not found in library {library}")]
    IncludeNotFound { library: String, name: String },

    /// Named definition not declared by the library
    #[error("Definition '{name}' not found in library {library}")]
    DefinitionNotFound { library: String, name: String },

    /// Library resolver failure
    #[error("Library resolver error: {message}")]
    Resolver { message: String },
}

impl RequirementsError {
    pub fn alias_definition_active(alias: impl Into<String>) -> Self {
        Self::AliasDefinitionActive { alias: alias.into() }
    }

    pub fn unknown_alias(name: impl Into<String>) -> Self {
        Self::UnknownAlias { name: name.into() }
    }

    pub fn library_not_found(identifier: &LibraryIdentifier) -> Self {
        Self::LibraryNotFound {
            identifier: identifier.to_string(),
        }
    }

    pub fn include_not_found(library: &LibraryIdentifier, name: impl Into<String>) -> Self {
        Self::IncludeNotFound {
            library: library.to_string(),
            name: name.into(),
        }
    }

    pub fn definition_not_found(library: &LibraryIdentifier, name: impl Into<String>) -> Self {
        Self::DefinitionNotFound {
            library: library.to_string(),
            name: name.into(),
        }
    }

    pub fn resolver(message: impl Into<String>) -> Self {
        Self::Resolver {
            message: message.into(),
        }
    }

    /// True for context faults, which point at a traversal bug rather than
    /// bad input
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::LibraryStackEmpty
                | Self::AliasDefinitionActive { .. }
                | Self::NoAliasDefinition
                | Self::NoQueryContext
                | Self::UnknownAlias { .. }
                | Self::RecursionLimit { .. }
        )
    }
}

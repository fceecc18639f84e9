//! Library resolution
//!
//! Analysis follows references into included libraries, which it obtains
//! through a [`LibraryResolver`]. Resolvers are shared between runs, so they
//! must be `Send + Sync`.

use std::sync::Arc;

use octofhir_cql_elm::Library;
use parking_lot::RwLock;

use crate::error::{RequirementsError, RequirementsResult};
use crate::requirement::LibraryIdentifier;

/// Source of compiled ELM libraries
pub trait LibraryResolver: Send + Sync {
    /// Resolve a library by identifier
    fn resolve_library(&self, identifier: &LibraryIdentifier) -> RequirementsResult<Arc<Library>>;

    /// Resolve the library `library` includes under `local_name`
    fn resolve_include(&self, library: &Library, local_name: &str) -> RequirementsResult<Arc<Library>> {
        let (_, include) = library
            .resolve_include(local_name)
            .ok_or_else(|| RequirementsError::include_not_found(&library.identifier, local_name))?;
        let target = include.library_identifier(library.identifier.system.as_deref());
        self.resolve_library(&target)
    }
}

/// True when `library` satisfies a request for `identifier`.
///
/// A missing version or namespace on the request matches any.
pub fn identifier_matches(identifier: &LibraryIdentifier, library: &LibraryIdentifier) -> bool {
    identifier.id == library.id
        && identifier
            .version
            .as_ref()
            .is_none_or(|v| library.version.as_ref() == Some(v))
        && match (&identifier.system, &library.system) {
            (Some(requested), Some(actual)) => requested == actual,
            _ => true,
        }
}

/// Resolver over libraries held in memory
#[derive(Debug, Default)]
pub struct InMemoryLibraryResolver {
    libraries: RwLock<Vec<Arc<Library>>>,
}

impl InMemoryLibraryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(self, library: Library) -> Self {
        self.add_library(library);
        self
    }

    pub fn with_libraries(self, libraries: impl IntoIterator<Item = Library>) -> Self {
        for library in libraries {
            self.add_library(library);
        }
        self
    }

    pub fn add_library(&self, library: Library) {
        self.libraries.write().push(Arc::new(library));
    }

    pub fn len(&self) -> usize {
        self.libraries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.read().is_empty()
    }
}

impl LibraryResolver for InMemoryLibraryResolver {
    fn resolve_library(&self, identifier: &LibraryIdentifier) -> RequirementsResult<Arc<Library>> {
        self.libraries
            .read()
            .iter()
            .find(|library| identifier_matches(identifier, &library.identifier))
            .cloned()
            .ok_or_else(|| RequirementsError::library_not_found(identifier))
    }
}

//! Library resolution from the file system

use anyhow::{Context, Result};
use octofhir_cql_elm::{Library, from_json};
use octofhir_cql_requirements::resolver::identifier_matches;
use octofhir_cql_requirements::{LibraryIdentifier, LibraryResolver, RequirementsError, RequirementsResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolver that finds ELM JSON libraries in search paths and caches them
pub struct FileLibraryResolver {
    /// Search paths for libraries
    search_paths: Vec<PathBuf>,
    /// Parsed libraries (canonical path -> library)
    cache: RwLock<HashMap<PathBuf, Arc<Library>>>,
}

impl FileLibraryResolver {
    /// Create a resolver over `search_paths`, the `CQL_LIBRARY_PATH`
    /// entries and the current directory
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        let mut paths = search_paths;

        if let Ok(env_path) = std::env::var("CQL_LIBRARY_PATH") {
            for path in std::env::split_paths(&env_path) {
                if !path.as_os_str().is_empty() {
                    paths.push(path);
                }
            }
        }

        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        if !paths.contains(&current_dir) {
            paths.push(current_dir);
        }

        Self {
            search_paths: paths,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// File names tried for `identifier`, most specific first
    fn candidates(identifier: &LibraryIdentifier) -> Vec<String> {
        let name = &identifier.id;
        match &identifier.version {
            Some(version) => vec![
                format!("{}-{}.json", name, version),
                format!("{}_{}.json", name, version),
                format!("{}.json", name),
            ],
            None => vec![format!("{}.json", name)],
        }
    }

    /// Find the file holding `identifier` in the search paths
    pub fn find(&self, identifier: &LibraryIdentifier) -> Option<PathBuf> {
        Self::candidates(identifier).into_iter().find_map(|filename| {
            self.search_paths
                .iter()
                .map(|dir| dir.join(&filename))
                .find(|candidate| candidate.is_file())
        })
    }

    /// Load and parse an ELM JSON file, at most once per path
    pub fn load(&self, path: &Path) -> Result<Arc<Library>> {
        let canonical_path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve path: {}", path.display()))?;

        if let Some(library) = self.cache.read().get(&canonical_path) {
            return Ok(Arc::clone(library));
        }

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read file: {}", canonical_path.display()))?;
        let library = Arc::new(
            from_json(&content)
                .with_context(|| format!("Failed to parse ELM: {}", canonical_path.display()))?,
        );
        log::debug!("Loaded {} from {}", library.identifier, canonical_path.display());

        self.cache
            .write()
            .insert(canonical_path, Arc::clone(&library));
        Ok(library)
    }

    /// Clear the cache
    pub fn clear_cache(&self) {
        self.cache.write().clear();
    }

    /// Get the search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }
}

impl Default for FileLibraryResolver {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl LibraryResolver for FileLibraryResolver {
    fn resolve_library(&self, identifier: &LibraryIdentifier) -> RequirementsResult<Arc<Library>> {
        let path = self
            .find(identifier)
            .ok_or_else(|| RequirementsError::library_not_found(identifier))?;
        let library = self
            .load(&path)
            .map_err(|e| RequirementsError::resolver(format!("{:#}", e)))?;

        if !identifier_matches(identifier, &library.identifier) {
            return Err(RequirementsError::resolver(format!(
                "{} declares library {}, expected {}",
                path.display(),
                library.identifier,
                identifier
            )));
        }
        Ok(library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_library(dir: &Path, filename: &str, id: &str, version: &str) -> PathBuf {
        let path = dir.join(filename);
        let mut file = File::create(&path).unwrap();
        let library = json!({"library": {"identifier": {"id": id, "version": version}}});
        write!(file, "{}", library).unwrap();
        path
    }

    #[test]
    fn test_resolve_file() {
        let temp_dir = TempDir::new().unwrap();
        write_library(temp_dir.path(), "Common-1.0.0.json", "Common", "1.0.0");

        let resolver = FileLibraryResolver::new(vec![temp_dir.path().to_path_buf()]);
        let library = resolver
            .resolve_library(&LibraryIdentifier::new("Common", Some("1.0.0")))
            .unwrap();
        assert_eq!(library.identifier.id, "Common");
    }

    #[test]
    fn test_unversioned_file_name() {
        let temp_dir = TempDir::new().unwrap();
        write_library(temp_dir.path(), "Common.json", "Common", "2.0.0");

        let resolver = FileLibraryResolver::new(vec![temp_dir.path().to_path_buf()]);
        assert!(
            resolver
                .resolve_library(&LibraryIdentifier::new("Common", Some("2.0.0")))
                .is_ok()
        );
        assert!(
            resolver
                .resolve_library(&LibraryIdentifier::new("Common", None))
                .is_ok()
        );
    }

    #[test]
    fn test_version_mismatch_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        write_library(temp_dir.path(), "Common.json", "Common", "2.0.0");

        let resolver = FileLibraryResolver::new(vec![temp_dir.path().to_path_buf()]);
        let err = resolver
            .resolve_library(&LibraryIdentifier::new("Common", Some("1.0.0")))
            .unwrap_err();
        assert!(matches!(err, RequirementsError::Resolver { .. }));
    }

    #[test]
    fn test_missing_library() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = FileLibraryResolver::new(vec![temp_dir.path().to_path_buf()]);
        let err = resolver
            .resolve_library(&LibraryIdentifier::new("NoSuchLibrary", Some("9.9.9")))
            .unwrap_err();
        assert!(matches!(err, RequirementsError::LibraryNotFound { .. }));
    }

    #[test]
    fn test_cache() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_library(temp_dir.path(), "Common.json", "Common", "1.0.0");

        let resolver = FileLibraryResolver::new(vec![temp_dir.path().to_path_buf()]);
        let first = resolver.load(&path).unwrap();

        write_library(temp_dir.path(), "Common.json", "Common", "2.0.0");

        // Second load should return the cached library
        let second = resolver.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        resolver.clear_cache();
        let third = resolver.load(&path).unwrap();
        assert_eq!(third.identifier.version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_invalid_json_has_context() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Broken.json");
        fs::write(&path, "{not json").unwrap();

        let resolver = FileLibraryResolver::new(vec![temp_dir.path().to_path_buf()]);
        let err = resolver.load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse ELM"));
    }
}

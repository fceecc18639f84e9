//! Batch data requirements analysis of ELM JSON files

use anyhow::{Context, Result, bail};
use octofhir_cql_requirements::{DataRequirementsProcessor, ModuleDefinition, RequirementsOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::output::{self, OutputFormat};
use super::resolver::FileLibraryResolver;

/// Configuration for an analysis run
#[derive(Debug, Clone, Default)]
pub struct AnalyzeConfig {
    /// ELM JSON files to analyze
    pub files: Vec<PathBuf>,
    /// Expressions to restrict the analysis to (all when empty)
    pub expressions: Vec<String>,
    /// Library search paths
    pub library_paths: Vec<PathBuf>,
    /// Maximum expression nesting depth
    pub max_depth: Option<usize>,
    pub output_format: OutputFormat,
    pub output_file: Option<PathBuf>,
}

/// Analyze one ELM file
pub fn analyze_file(
    processor: &DataRequirementsProcessor,
    resolver: &FileLibraryResolver,
    path: &Path,
    expressions: Option<&[&str]>,
) -> Result<ModuleDefinition> {
    let library = resolver.load(path)?;
    log::info!("Analyzing {} ({})", library.identifier, path.display());

    processor
        .gather_data_requirements(Some(library.as_ref()), expressions)
        .with_context(|| format!("Failed to gather requirements of {}", path.display()))?
        .context("No library to analyze")
}

/// Analyze every configured file.
///
/// A failing file is reported and skipped; the run fails at the end if any
/// file did.
pub fn analyze(config: AnalyzeConfig) -> Result<Vec<ModuleDefinition>> {
    if config.files.is_empty() {
        bail!("No input files");
    }

    // Included libraries usually sit next to the files that include them
    let mut search_paths = config.library_paths.clone();
    for file in &config.files {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            let parent = parent.to_path_buf();
            if !search_paths.contains(&parent) {
                search_paths.push(parent);
            }
        }
    }
    let resolver = Arc::new(FileLibraryResolver::new(search_paths));
    log::debug!("Library search paths: {:?}", resolver.search_paths());

    let mut options = RequirementsOptions::new();
    if let Some(max_depth) = config.max_depth {
        options = options.with_max_depth(max_depth);
    }
    let processor = DataRequirementsProcessor::new(resolver.clone()).with_options(options);

    let names: Vec<&str> = config.expressions.iter().map(String::as_str).collect();
    let expressions = (!names.is_empty()).then_some(names.as_slice());

    let mut modules = Vec::new();
    let mut failed = 0;
    for file in &config.files {
        match analyze_file(&processor, &resolver, file, expressions) {
            Ok(module) => {
                if module.is_empty() {
                    eprintln!(
                        "{}",
                        output::format_warning(&format!("{} has no data requirements", file.display()))
                    );
                }
                modules.push(module);
            }
            Err(e) => {
                failed += 1;
                eprintln!("{}", output::format_error(&e.context(file.display().to_string())));
            }
        }
    }

    if !modules.is_empty() {
        let content = output::format_modules(&modules, config.output_format)?;
        output::write_output(&content, config.output_file.as_deref())?;
    }

    if failed > 0 {
        bail!("{} of {} files failed", failed, config.files.len());
    }
    Ok(modules)
}

//! Data requirements processor
//!
//! Entry point of the crate. Each call runs a fresh analysis over one root
//! library; the processor itself only holds the resolver and options, so it
//! can be shared across threads.

use std::sync::Arc;

use octofhir_cql_elm::{ElmVisitor, Library};

use crate::context::{RequirementsContext, RequirementsOptions};
use crate::error::{RequirementsError, RequirementsResult};
use crate::module_definition::ModuleDefinition;
use crate::requirements::ElmRequirements;
use crate::resolver::LibraryResolver;
use crate::visitor::ElmRequirementsVisitor;

/// Gathers the data requirements of ELM libraries
#[derive(Clone)]
pub struct DataRequirementsProcessor {
    resolver: Arc<dyn LibraryResolver>,
    options: RequirementsOptions,
}

impl DataRequirementsProcessor {
    pub fn new(resolver: Arc<dyn LibraryResolver>) -> Self {
        Self {
            resolver,
            options: RequirementsOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequirementsOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RequirementsOptions {
        &self.options
    }

    /// Gather the requirements of `library`.
    ///
    /// With `expressions`, only the named expression definitions and what
    /// they transitively reference are analyzed; otherwise every definition
    /// of the library is. Returns `None` when there is no library.
    pub fn gather_requirements(
        &self,
        library: Option<&Library>,
        expressions: Option<&[&str]>,
    ) -> RequirementsResult<Option<ElmRequirements>> {
        let Some(library) = library else {
            return Ok(None);
        };
        let root = Arc::new(library.clone());
        log::debug!("Gathering requirements for {}", root.identifier);

        let (mut ctx, root_id) =
            RequirementsContext::new(Arc::clone(&self.resolver), self.options.clone(), Arc::clone(&root));
        {
            let mut scope = ctx.enter_library(root_id);
            let visitor = ElmRequirementsVisitor;
            match expressions {
                Some(names) => {
                    for name in names {
                        let (index, def) = root
                            .resolve_expression_def(name)
                            .ok_or_else(|| RequirementsError::definition_not_found(&root.identifier, *name))?;
                        visitor.visit_expression_def(index, def, &mut *scope)?;
                    }
                }
                None => {
                    visitor.visit_library(&root, &mut *scope)?;
                }
            }
        }

        let requirements = ctx.into_requirements();
        log::debug!(
            "Gathered {} requirements and {} query requirements for {}",
            requirements.len(),
            requirements.query_requirements().len(),
            root.identifier
        );
        Ok(Some(requirements))
    }

    /// Gather requirements and summarize them as a module definition
    pub fn gather_data_requirements(
        &self,
        library: Option<&Library>,
        expressions: Option<&[&str]>,
    ) -> RequirementsResult<Option<ModuleDefinition>> {
        let requirements = self.gather_requirements(library, expressions)?;
        Ok(requirements.map(|r| ModuleDefinition::from_requirements(&r, expressions)))
    }
}

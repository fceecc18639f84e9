//! Requirements context
//!
//! All mutable state of one analysis run: the libraries loaded so far, the
//! library and query stacks, the visited set and the collected requirements.
//! Library and query scopes are entered through guards that restore the
//! stacks when dropped, so an early return through `?` cannot leave a stale
//! scope behind.

use std::collections::{HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use octofhir_cql_elm::{
    CodeRef, CodeSystemRef, ConceptRef, ElmVisitor, Expression, ExpressionRef, FunctionRef, Library,
    ParameterRef, Property, Query, Retrieve, ValueSetRef,
};

use crate::error::{RequirementsError, RequirementsResult};
use crate::query_context::{AliasContext, QueryAnalysis, QueryContext};
use crate::requirement::{ElmElement, LibraryIdentifier, QueryRequirement, Requirement};
use crate::requirements::ElmRequirements;
use crate::resolver::LibraryResolver;
use crate::visitor::{ElmRequirementsVisitor, property_root};

/// Default maximum expression nesting depth
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Options for an analysis run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementsOptions {
    /// Maximum expression nesting depth, counted across library boundaries
    pub max_depth: usize,
}

impl Default for RequirementsOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl RequirementsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Position of a library in the run's library arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryId(usize);

/// Definition list a definition lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Using,
    Include,
    CodeSystem,
    ValueSet,
    Code,
    Concept,
    Parameter,
    Context,
    Statement,
}

/// Identity of a definition within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementKey {
    pub library: LibraryId,
    pub kind: DefinitionKind,
    pub index: usize,
}

/// State of one analysis run
pub struct RequirementsContext {
    resolver: Arc<dyn LibraryResolver>,
    options: RequirementsOptions,
    libraries: Vec<Arc<Library>>,
    library_index: HashMap<LibraryIdentifier, LibraryId>,
    library_stack: Vec<LibraryId>,
    query_stack: Vec<QueryContext>,
    visited: HashSet<ElementKey>,
    requirements: ElmRequirements,
    depth: usize,
}

impl RequirementsContext {
    /// Create a context for analyzing `root`
    pub fn new(
        resolver: Arc<dyn LibraryResolver>,
        options: RequirementsOptions,
        root: Arc<Library>,
    ) -> (Self, LibraryId) {
        let mut ctx = Self {
            resolver,
            options,
            libraries: Vec::new(),
            library_index: HashMap::new(),
            library_stack: Vec::new(),
            query_stack: Vec::new(),
            visited: HashSet::new(),
            requirements: ElmRequirements::new(root.identifier.clone()),
            depth: 0,
        };
        let root_id = ctx.register_library(root);
        (ctx, root_id)
    }

    pub fn options(&self) -> &RequirementsOptions {
        &self.options
    }

    pub fn requirements(&self) -> &ElmRequirements {
        &self.requirements
    }

    pub fn into_requirements(self) -> ElmRequirements {
        self.requirements
    }

    // ========================================================================
    // Libraries
    // ========================================================================

    /// Add a library to the arena, or return the id it already has
    pub fn register_library(&mut self, library: Arc<Library>) -> LibraryId {
        if let Some(id) = self.library_index.get(&library.identifier) {
            return *id;
        }
        let id = LibraryId(self.libraries.len());
        self.library_index.insert(library.identifier.clone(), id);
        self.libraries.push(library);
        id
    }

    /// Library registered under `id`
    pub fn library(&self, id: LibraryId) -> Arc<Library> {
        Arc::clone(&self.libraries[id.0])
    }

    /// Resolve a library through the resolver, at most once per identifier
    pub fn resolve_library(&mut self, identifier: &LibraryIdentifier) -> RequirementsResult<LibraryId> {
        if let Some(id) = self.library_index.get(identifier) {
            return Ok(*id);
        }
        log::debug!("Resolving library {}", identifier);
        let library = self.resolver.resolve_library(identifier)?;
        let id = self.register_library(library);
        self.library_index.insert(identifier.clone(), id);
        Ok(id)
    }

    /// Push `id` onto the library stack for the lifetime of the guard
    pub fn enter_library(&mut self, id: LibraryId) -> LibraryScope<'_> {
        self.library_stack.push(id);
        LibraryScope { ctx: self }
    }

    /// Pop the library stack
    pub fn exit_library(&mut self) -> RequirementsResult<LibraryId> {
        self.library_stack
            .pop()
            .ok_or(RequirementsError::LibraryStackEmpty)
    }

    pub fn current_library_id(&self) -> RequirementsResult<LibraryId> {
        self.library_stack
            .last()
            .copied()
            .ok_or(RequirementsError::LibraryStackEmpty)
    }

    pub fn current_library(&self) -> RequirementsResult<Arc<Library>> {
        Ok(self.library(self.current_library_id()?))
    }

    pub fn current_library_identifier(&self) -> RequirementsResult<LibraryIdentifier> {
        Ok(self.current_library()?.identifier.clone())
    }

    // ========================================================================
    // Visited set and recursion guard
    // ========================================================================

    fn element_key(&self, kind: DefinitionKind, index: usize) -> RequirementsResult<ElementKey> {
        Ok(ElementKey {
            library: self.current_library_id()?,
            kind,
            index,
        })
    }

    pub fn is_visited(&self, kind: DefinitionKind, index: usize) -> RequirementsResult<bool> {
        Ok(self.visited.contains(&self.element_key(kind, index)?))
    }

    /// Mark a definition of the current library visited. Returns false when
    /// it already was.
    pub fn mark_visited(&mut self, kind: DefinitionKind, index: usize) -> RequirementsResult<bool> {
        let key = self.element_key(kind, index)?;
        Ok(self.visited.insert(key))
    }

    pub fn enter_recursion(&mut self) -> RequirementsResult<()> {
        if self.depth >= self.options.max_depth {
            return Err(RequirementsError::RecursionLimit {
                max_depth: self.options.max_depth,
            });
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit_recursion(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ========================================================================
    // Reporting definitions
    // ========================================================================

    /// File `element`, a definition of the current library
    pub fn report_element(&mut self, element: ElmElement) -> RequirementsResult<()> {
        let library = self.current_library_identifier()?;
        self.requirements
            .report_requirement(Requirement::new(library, element));
        Ok(())
    }

    pub fn report_retrieve(&mut self, retrieve: &Retrieve) -> RequirementsResult<()> {
        self.report_element(ElmElement::Expression(Expression::Retrieve(retrieve.clone())))
    }

    pub fn report_query_requirement(&mut self, requirement: QueryRequirement) {
        self.requirements.report_query_requirement(requirement);
    }

    /// Record the path of `property` on the in-scope alias it is rooted at
    pub fn report_property(&mut self, property: &Property) {
        if let Some((alias, path)) = property_root(property) {
            if let Some(alias_ctx) = self.resolve_alias_mut(&alias) {
                alias_ctx.data_requirement.report_property(path);
            }
        }
    }

    // ========================================================================
    // Reporting references
    // ========================================================================

    /// Run `f` with the library a reference points into on top of the stack.
    ///
    /// A qualified reference resolves the include, visits the IncludeDef and
    /// enters the target library until `f` returns.
    fn with_referenced_library<T>(
        &mut self,
        library_name: Option<&str>,
        f: impl FnOnce(&mut RequirementsContext, &Library) -> RequirementsResult<T>,
    ) -> RequirementsResult<T> {
        let current = self.current_library()?;
        let Some(local_name) = library_name else {
            return f(self, current.as_ref());
        };

        let (index, include) = current
            .resolve_include(local_name)
            .ok_or_else(|| RequirementsError::include_not_found(&current.identifier, local_name))?;
        ElmRequirementsVisitor.visit_include_def(index, include, self)?;

        let target = include.library_identifier(current.identifier.system.as_deref());
        log::trace!("Following reference into {} via '{}'", target, local_name);
        let id = self.resolve_library(&target)?;
        let library = self.library(id);
        self.requirements
            .report_include_target(&current.identifier, local_name, &library.identifier);
        let mut scope = self.enter_library(id);
        f(&mut *scope, library.as_ref())
    }

    pub fn report_code_system_ref(&mut self, reference: &CodeSystemRef) -> RequirementsResult<()> {
        self.with_referenced_library(reference.library_name.as_deref(), |ctx, library| {
            let (index, def) = library
                .resolve_code_system_def(&reference.name)
                .ok_or_else(|| RequirementsError::definition_not_found(&library.identifier, &reference.name))?;
            ElmRequirementsVisitor.visit_code_system_def(index, def, ctx)?;
            Ok(())
        })
    }

    pub fn report_value_set_ref(&mut self, reference: &ValueSetRef) -> RequirementsResult<()> {
        self.with_referenced_library(reference.library_name.as_deref(), |ctx, library| {
            let (index, def) = library
                .resolve_value_set_def(&reference.name)
                .ok_or_else(|| RequirementsError::definition_not_found(&library.identifier, &reference.name))?;
            ElmRequirementsVisitor.visit_value_set_def(index, def, ctx)?;
            Ok(())
        })
    }

    pub fn report_code_ref(&mut self, reference: &CodeRef) -> RequirementsResult<()> {
        self.with_referenced_library(reference.library_name.as_deref(), |ctx, library| {
            let (index, def) = library
                .resolve_code_def(&reference.name)
                .ok_or_else(|| RequirementsError::definition_not_found(&library.identifier, &reference.name))?;
            ElmRequirementsVisitor.visit_code_def(index, def, ctx)?;
            Ok(())
        })
    }

    pub fn report_concept_ref(&mut self, reference: &ConceptRef) -> RequirementsResult<()> {
        self.with_referenced_library(reference.library_name.as_deref(), |ctx, library| {
            let (index, def) = library
                .resolve_concept_def(&reference.name)
                .ok_or_else(|| RequirementsError::definition_not_found(&library.identifier, &reference.name))?;
            ElmRequirementsVisitor.visit_concept_def(index, def, ctx)?;
            Ok(())
        })
    }

    pub fn report_parameter_ref(&mut self, reference: &ParameterRef) -> RequirementsResult<()> {
        self.with_referenced_library(reference.library_name.as_deref(), |ctx, library| {
            let (index, def) = library
                .resolve_parameter_def(&reference.name)
                .ok_or_else(|| RequirementsError::definition_not_found(&library.identifier, &reference.name))?;
            ElmRequirementsVisitor.visit_parameter_def(index, def, ctx)?;
            Ok(())
        })
    }

    pub fn report_expression_ref(&mut self, reference: &ExpressionRef) -> RequirementsResult<()> {
        self.with_referenced_library(reference.library_name.as_deref(), |ctx, library| {
            let (index, def) = library
                .resolve_expression_def(&reference.name)
                .ok_or_else(|| RequirementsError::definition_not_found(&library.identifier, &reference.name))?;
            ElmRequirementsVisitor.visit_expression_def(index, def, ctx)?;
            Ok(())
        })
    }

    /// Visit every overload declared under the function's name
    pub fn report_function_ref(&mut self, reference: &FunctionRef) -> RequirementsResult<()> {
        self.with_referenced_library(reference.library_name.as_deref(), |ctx, library| {
            let mut found = false;
            for (index, def) in library.resolve_function_defs(&reference.name) {
                found = true;
                ElmRequirementsVisitor.visit_function_def(index, def, ctx)?;
            }
            if !found {
                return Err(RequirementsError::definition_not_found(
                    &library.identifier,
                    &reference.name,
                ));
            }
            Ok(())
        })
    }

    // ========================================================================
    // Query contexts
    // ========================================================================

    /// Push a query context for the lifetime of the guard
    pub fn enter_query_context(&mut self, query: &Query) -> RequirementsResult<QueryScope<'_>> {
        let library = self.current_library_identifier()?;
        self.query_stack.push(QueryContext::new(library, query));
        Ok(QueryScope {
            ctx: self,
            done: false,
        })
    }

    /// Pop the query stack
    pub fn exit_query_context(&mut self) -> RequirementsResult<QueryContext> {
        self.query_stack.pop().ok_or(RequirementsError::NoQueryContext)
    }

    pub fn current_query_context(&self) -> RequirementsResult<&QueryContext> {
        self.query_stack.last().ok_or(RequirementsError::NoQueryContext)
    }

    pub fn current_query_context_mut(&mut self) -> RequirementsResult<&mut QueryContext> {
        self.query_stack
            .last_mut()
            .ok_or(RequirementsError::NoQueryContext)
    }

    pub fn in_query_context(&self) -> bool {
        !self.query_stack.is_empty()
    }

    /// Find an active alias, innermost query first
    pub fn resolve_alias(&self, name: &str) -> Option<&AliasContext> {
        self.query_stack
            .iter()
            .rev()
            .find_map(|query| query.resolve_alias(name))
    }

    pub fn resolve_alias_mut(&mut self, name: &str) -> Option<&mut AliasContext> {
        self.query_stack
            .iter_mut()
            .rev()
            .find_map(|query| query.resolve_alias_mut(name))
    }
}

/// Library scope; pops the library stack on drop
pub struct LibraryScope<'a> {
    ctx: &'a mut RequirementsContext,
}

impl Deref for LibraryScope<'_> {
    type Target = RequirementsContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for LibraryScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for LibraryScope<'_> {
    fn drop(&mut self) {
        self.ctx.library_stack.pop();
    }
}

/// Query scope; pops the query stack on drop unless finished
pub struct QueryScope<'a> {
    ctx: &'a mut RequirementsContext,
    done: bool,
}

impl QueryScope<'_> {
    /// Pop the query context and analyze it
    pub fn finish(mut self) -> RequirementsResult<QueryAnalysis> {
        self.done = true;
        let query = self.ctx.exit_query_context()?;
        Ok(query.analyze_data_requirements())
    }
}

impl Deref for QueryScope<'_> {
    type Target = RequirementsContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for QueryScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for QueryScope<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.ctx.query_stack.pop();
        }
    }
}

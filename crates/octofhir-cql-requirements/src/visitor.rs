//! Requirements visitor
//!
//! Walks ELM with a [`RequirementsContext`], reporting every definition it
//! reaches and inferring what boolean expressions require of query aliases.
//! The visitor is stateless; everything it learns goes into the context.
//!
//! A comparison yields a condition when one side is a property rooted at an
//! in-scope alias (possibly wrapped in implicit conversions) and the other is
//! a comparand: a literal, parameter, terminology reference, or a selector
//! built only from those. `and` conjoins, `or` disjoins, and every other node
//! visits its children and contributes nothing itself.
//!
//! A nested query never writes conditions into an enclosing alias. The
//! conditions it places on enclosing aliases come back with its result and
//! reach them only if the surrounding expression lets them through: `and` and
//! `exists` do, `or` keeps them in an undistributed disjunction, and `not` or
//! any other operator drops them.

use octofhir_cql_elm::{
    CodeDef, CodeSystemDef, ConceptDef, ContextDef, ElmVisitor, Expression, ExpressionDef,
    FunctionDef, IncludeDef, ParameterDef, Property, Query, RelationshipKind, Retrieve, UsingDef,
    ValueSetDef,
};

use crate::context::{DefinitionKind, RequirementsContext};
use crate::error::{RequirementsError, RequirementsResult};
use crate::query_context::QueryAnalysis;
use crate::requirement::{
    ConditionRequirement, DataRequirement, ElmElement, ElmRequirement, LibraryIdentifier,
    QueryRequirement,
};

type Visit = RequirementsResult<Option<ElmRequirement>>;

type Combine =
    fn(&LibraryIdentifier, &Expression, Option<ElmRequirement>, Option<ElmRequirement>) -> Option<ElmRequirement>;

/// Visitor that gathers requirements into a [`RequirementsContext`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ElmRequirementsVisitor;

impl ElmVisitor<RequirementsContext> for ElmRequirementsVisitor {
    type Output = Option<ElmRequirement>;
    type Error = RequirementsError;

    fn default_result(&self, _ctx: &mut RequirementsContext) -> Self::Output {
        None
    }

    fn aggregate_result(&self, aggregate: Self::Output, next: Self::Output) -> Self::Output {
        next.or(aggregate)
    }

    fn visit_using_def(&self, index: usize, def: &UsingDef, ctx: &mut RequirementsContext) -> Visit {
        if ctx.mark_visited(DefinitionKind::Using, index)? {
            ctx.report_element(ElmElement::UsingDef(def.clone()))?;
        }
        Ok(None)
    }

    fn visit_include_def(&self, index: usize, def: &IncludeDef, ctx: &mut RequirementsContext) -> Visit {
        if ctx.mark_visited(DefinitionKind::Include, index)? {
            ctx.report_element(ElmElement::IncludeDef(def.clone()))?;
        }
        Ok(None)
    }

    fn visit_code_system_def(
        &self,
        index: usize,
        def: &CodeSystemDef,
        ctx: &mut RequirementsContext,
    ) -> Visit {
        if ctx.mark_visited(DefinitionKind::CodeSystem, index)? {
            ctx.report_element(ElmElement::CodeSystemDef(def.clone()))?;
        }
        Ok(None)
    }

    fn visit_value_set_def(&self, index: usize, def: &ValueSetDef, ctx: &mut RequirementsContext) -> Visit {
        if !ctx.mark_visited(DefinitionKind::ValueSet, index)? {
            return Ok(None);
        }
        ctx.report_element(ElmElement::ValueSetDef(def.clone()))?;
        for code_system in def.code_system.iter().flatten() {
            ctx.report_code_system_ref(code_system)?;
        }
        Ok(None)
    }

    fn visit_code_def(&self, index: usize, def: &CodeDef, ctx: &mut RequirementsContext) -> Visit {
        if !ctx.mark_visited(DefinitionKind::Code, index)? {
            return Ok(None);
        }
        ctx.report_element(ElmElement::CodeDef(def.clone()))?;
        if let Some(code_system) = &def.code_system {
            ctx.report_code_system_ref(code_system)?;
        }
        Ok(None)
    }

    fn visit_concept_def(&self, index: usize, def: &ConceptDef, ctx: &mut RequirementsContext) -> Visit {
        if !ctx.mark_visited(DefinitionKind::Concept, index)? {
            return Ok(None);
        }
        ctx.report_element(ElmElement::ConceptDef(def.clone()))?;
        for code in &def.code {
            ctx.report_code_ref(code)?;
        }
        Ok(None)
    }

    fn visit_parameter_def(
        &self,
        index: usize,
        def: &ParameterDef,
        ctx: &mut RequirementsContext,
    ) -> Visit {
        if !ctx.mark_visited(DefinitionKind::Parameter, index)? {
            return Ok(None);
        }
        ctx.report_element(ElmElement::ParameterDef(def.clone()))?;
        if let Some(default) = &def.default_expr {
            self.visit_expression(default, ctx)?;
        }
        Ok(None)
    }

    fn visit_context_def(&self, index: usize, def: &ContextDef, ctx: &mut RequirementsContext) -> Visit {
        if ctx.mark_visited(DefinitionKind::Context, index)? {
            ctx.report_element(ElmElement::ContextDef(def.clone()))?;
        }
        Ok(None)
    }

    fn visit_expression_def(
        &self,
        index: usize,
        def: &ExpressionDef,
        ctx: &mut RequirementsContext,
    ) -> Visit {
        if !ctx.mark_visited(DefinitionKind::Statement, index)? {
            return Ok(None);
        }
        log::trace!("Visiting expression definition '{}'", def.name);
        ctx.report_element(ElmElement::ExpressionDef(def.clone()))?;
        if let Some(expr) = &def.expression {
            self.visit_expression(expr, ctx)?;
        }
        Ok(None)
    }

    fn visit_function_def(
        &self,
        index: usize,
        def: &FunctionDef,
        ctx: &mut RequirementsContext,
    ) -> Visit {
        if !ctx.mark_visited(DefinitionKind::Statement, index)? {
            return Ok(None);
        }
        log::trace!("Visiting function definition '{}'", def.signature());
        ctx.report_element(ElmElement::FunctionDef(def.clone()))?;
        if let Some(expr) = &def.expression {
            self.visit_expression(expr, ctx)?;
        }
        Ok(None)
    }

    fn visit_expression(&self, expr: &Expression, ctx: &mut RequirementsContext) -> Visit {
        ctx.enter_recursion()?;
        let result = self.visit_node(expr, ctx);
        ctx.exit_recursion();
        result
    }
}

impl ElmRequirementsVisitor {
    fn visit_node(&self, expr: &Expression, ctx: &mut RequirementsContext) -> Visit {
        match expr {
            // === References ===
            Expression::ExpressionRef(r) => {
                ctx.report_expression_ref(r)?;
                Ok(None)
            }
            Expression::FunctionRef(r) => {
                self.visit_children(expr, ctx)?;
                ctx.report_function_ref(r)?;
                Ok(None)
            }
            Expression::ParameterRef(r) => {
                ctx.report_parameter_ref(r)?;
                Ok(None)
            }
            Expression::ValueSetRef(r) => {
                ctx.report_value_set_ref(r)?;
                Ok(None)
            }
            Expression::CodeSystemRef(r) => {
                ctx.report_code_system_ref(r)?;
                Ok(None)
            }
            Expression::CodeRef(r) => {
                ctx.report_code_ref(r)?;
                Ok(None)
            }
            Expression::ConceptRef(r) => {
                ctx.report_concept_ref(r)?;
                Ok(None)
            }
            Expression::Code(code) => {
                ctx.report_code_system_ref(&code.system)?;
                Ok(None)
            }
            Expression::Concept(concept) => {
                for code in &concept.code {
                    ctx.report_code_system_ref(&code.system)?;
                }
                Ok(None)
            }
            Expression::Property(property) => {
                ctx.report_property(property);
                self.visit_children(expr, ctx)?;
                Ok(None)
            }

            // === Data access ===
            Expression::Retrieve(retrieve) => self.visit_retrieve(retrieve, expr, ctx),
            Expression::Query(query) => self.visit_query(query, ctx),
            // A non-empty operand satisfies every condition it carries
            Expression::Exists(u) => self.visit_expression(&u.operand, ctx),

            // === Logical ===
            Expression::And(b) => self.visit_logical(expr, &b.operand, ElmRequirement::and, ctx),
            Expression::Or(b) => self.visit_logical(expr, &b.operand, ElmRequirement::or, ctx),

            // === Comparisons ===
            Expression::Equal(b)
            | Expression::Equivalent(b)
            | Expression::NotEqual(b)
            | Expression::Less(b)
            | Expression::Greater(b)
            | Expression::LessOrEqual(b)
            | Expression::GreaterOrEqual(b)
            | Expression::In(b)
            | Expression::Contains(b)
            | Expression::IncludedIn(b)
            | Expression::Includes(b)
            | Expression::ProperIn(b)
            | Expression::ProperIncludedIn(b)
            | Expression::Overlaps(b)
            | Expression::Before(b)
            | Expression::After(b) => self.visit_comparison(expr, b.operands(), ctx),
            Expression::SameAs(p) | Expression::SameOrBefore(p) | Expression::SameOrAfter(p) => {
                self.visit_comparison(expr, p.operands(), ctx)
            }

            // === Terminology membership ===
            Expression::InValueSet(e) => {
                self.visit_children(expr, ctx)?;
                match (&e.valueset, &e.valueset_expression) {
                    (Some(valueset), _) => {
                        ctx.report_value_set_ref(valueset)?;
                        let comparand = Expression::ValueSetRef(valueset.clone());
                        infer_condition(ctx, expr, &e.code, &comparand)
                    }
                    (None, Some(valueset)) => infer_condition(ctx, expr, &e.code, valueset),
                    (None, None) => Ok(None),
                }
            }
            Expression::AnyInValueSet(e) => {
                self.visit_children(expr, ctx)?;
                match (&e.valueset, &e.valueset_expression) {
                    (Some(valueset), _) => {
                        ctx.report_value_set_ref(valueset)?;
                        let comparand = Expression::ValueSetRef(valueset.clone());
                        infer_condition(ctx, expr, &e.codes, &comparand)
                    }
                    (None, Some(valueset)) => infer_condition(ctx, expr, &e.codes, valueset),
                    (None, None) => Ok(None),
                }
            }
            Expression::InCodeSystem(e) => {
                self.visit_children(expr, ctx)?;
                match (&e.codesystem, &e.codesystem_expression) {
                    (Some(codesystem), _) => {
                        ctx.report_code_system_ref(codesystem)?;
                        let comparand = Expression::CodeSystemRef(codesystem.clone());
                        infer_condition(ctx, expr, &e.code, &comparand)
                    }
                    (None, Some(codesystem)) => infer_condition(ctx, expr, &e.code, codesystem),
                    (None, None) => Ok(None),
                }
            }
            Expression::AnyInCodeSystem(e) => {
                self.visit_children(expr, ctx)?;
                match (&e.codesystem, &e.codesystem_expression) {
                    (Some(codesystem), _) => {
                        ctx.report_code_system_ref(codesystem)?;
                        let comparand = Expression::CodeSystemRef(codesystem.clone());
                        infer_condition(ctx, expr, &e.codes, &comparand)
                    }
                    (None, Some(codesystem)) => infer_condition(ctx, expr, &e.codes, codesystem),
                    (None, None) => Ok(None),
                }
            }

            _ => {
                self.visit_children(expr, ctx)?;
                Ok(None)
            }
        }
    }

    fn visit_logical(
        &self,
        expr: &Expression,
        operands: &[Expression],
        combine: Combine,
        ctx: &mut RequirementsContext,
    ) -> Visit {
        let [left, right] = operands else {
            self.visit_children(expr, ctx)?;
            return Ok(None);
        };
        let left = self.visit_expression(left, ctx)?;
        let right = self.visit_expression(right, ctx)?;
        let library = ctx.current_library_identifier()?;
        Ok(combine(&library, expr, left, right))
    }

    fn visit_comparison(
        &self,
        expr: &Expression,
        operands: Option<(&Expression, &Expression)>,
        ctx: &mut RequirementsContext,
    ) -> Visit {
        self.visit_children(expr, ctx)?;
        let Some((left, right)) = operands else {
            return Ok(None);
        };
        if let Some(condition) = infer_condition(ctx, expr, left, right)? {
            return Ok(Some(condition));
        }
        infer_condition(ctx, expr, right, left)
    }

    fn visit_retrieve(&self, retrieve: &Retrieve, expr: &Expression, ctx: &mut RequirementsContext) -> Visit {
        ctx.report_retrieve(retrieve)?;
        self.visit_children(expr, ctx)?;
        let library = ctx.current_library_identifier()?;
        Ok(Some(ElmRequirement::Data(DataRequirement::for_retrieve(
            library, retrieve,
        ))))
    }

    fn visit_query(&self, query: &Query, ctx: &mut RequirementsContext) -> Visit {
        let mut scope = ctx.enter_query_context(query)?;

        for source in &query.source {
            scope
                .current_query_context_mut()?
                .enter_alias_definition_context(&source.alias, &source.expression)?;
            self.visit_expression(&source.expression, &mut *scope)?;
            scope
                .current_query_context_mut()?
                .exit_alias_definition_context()?;
        }

        for let_clause in &query.let_clause {
            self.visit_expression(&let_clause.expression, &mut *scope)?;
        }

        for relationship in &query.relationship {
            scope
                .current_query_context_mut()?
                .enter_alias_definition_context(&relationship.alias, &relationship.expression)?;
            self.visit_expression(&relationship.expression, &mut *scope)?;
            scope
                .current_query_context_mut()?
                .exit_alias_definition_context()?;

            let such_that = self.visit_expression(&relationship.such_that, &mut *scope)?;
            // Conditions on the outer aliases are negated by `without`
            let such_that = match relationship.kind {
                RelationshipKind::With => such_that,
                RelationshipKind::Without => {
                    such_that.and_then(|r| r.retain_scoped(&relationship.alias))
                }
            };
            let query_ctx = scope.current_query_context_mut()?;
            query_ctx.report_query_requirements(such_that);
            query_ctx.descope_alias(&relationship.alias)?;
        }

        if let Some(where_clause) = &query.where_clause {
            let requirement = self.visit_expression(where_clause, &mut *scope)?;
            scope
                .current_query_context_mut()?
                .report_query_requirements(requirement);
        }

        if let Some(return_clause) = &query.return_clause {
            let returned = self.visit_expression(&return_clause.expression, &mut *scope)?;
            // A nested query returned per row still filters through its source
            if matches!(*return_clause.expression, Expression::Query(_)) {
                scope
                    .current_query_context_mut()?
                    .report_query_requirements(returned);
            }
        }

        if let Some(aggregate) = &query.aggregate {
            if let Some(starting) = &aggregate.starting {
                self.visit_expression(starting, &mut *scope)?;
            }
            self.visit_expression(&aggregate.expression, &mut *scope)?;
        }

        if let Some(sort) = &query.sort {
            for by in &sort.by {
                if let Some(expr) = &by.expression {
                    self.visit_expression(expr, &mut *scope)?;
                }
            }
        }

        let QueryAnalysis {
            requirement,
            unresolved,
        } = scope.finish()?;

        let mut outward = Vec::new();
        for condition in unresolved {
            let enclosed = condition
                .alias()
                .is_some_and(|alias| ctx.resolve_alias(alias).is_some());
            if enclosed {
                outward.push(condition);
            } else {
                log::trace!("Condition on {:?} has no enclosing alias", condition.alias());
            }
        }
        outward.extend(infer_from_nested_query(query, &requirement, ctx));
        ctx.report_query_requirement(requirement.clone());

        // Conditions on enclosing aliases travel with the result
        let library = ctx.current_library_identifier()?;
        let element = Expression::Query(query.clone());
        Ok(outward.into_iter().fold(
            Some(ElmRequirement::Query(requirement)),
            |result, condition| {
                ElmRequirement::and(&library, &element, result, Some(ElmRequirement::Condition(condition)))
            },
        ))
    }
}

/// Requalify an inner query's conditions onto the outer alias its single
/// source navigates from, e.g. `E.diagnosis D where D.rank = 1` constrains
/// `E.diagnosis.rank`. Properties read through the inner alias are recorded on
/// the outer alias directly.
fn infer_from_nested_query(
    query: &Query,
    requirement: &QueryRequirement,
    ctx: &mut RequirementsContext,
) -> Vec<ConditionRequirement> {
    let [source] = query.source.as_slice() else {
        return Vec::new();
    };
    let Some(property) = source.expression.as_property() else {
        return Vec::new();
    };
    let Some((outer_alias, outer_path)) = property_root(property) else {
        return Vec::new();
    };
    let Some(inner) = requirement.data_requirement(&source.alias) else {
        return Vec::new();
    };
    let Some(outer) = ctx.resolve_alias_mut(&outer_alias) else {
        return Vec::new();
    };

    for path in &inner.properties {
        outer
            .data_requirement
            .report_property(format!("{}.{}", outer_path, path));
    }
    inner
        .conditions
        .iter()
        .map(|condition| condition.requalify(&outer_alias, &outer_path))
        .collect()
}

/// Condition for `property_side <op> comparand_side`, if the shapes allow one
fn infer_condition(
    ctx: &RequirementsContext,
    element: &Expression,
    property_side: &Expression,
    comparand_side: &Expression,
) -> Visit {
    let Some(property) = strip_conversions(property_side).as_property() else {
        return Ok(None);
    };
    let Some((alias, path)) = property_root(property) else {
        return Ok(None);
    };
    if ctx.resolve_alias(&alias).is_none() || !is_comparand(comparand_side) {
        return Ok(None);
    }
    Ok(Some(ElmRequirement::Condition(ConditionRequirement {
        library: ctx.current_library_identifier()?,
        element: element.clone(),
        property: Property::scoped(alias, path),
        comparand: comparand_side.clone(),
    })))
}

/// Alias a property is rooted at, with the full dotted path from it
pub fn property_root(property: &Property) -> Option<(String, String)> {
    if let Some(scope) = &property.scope {
        return Some((scope.clone(), property.path.clone()));
    }
    match property.source.as_deref()? {
        Expression::AliasRef(alias) => Some((alias.name.clone(), property.path.clone())),
        Expression::Property(inner) => {
            let (alias, path) = property_root(inner)?;
            Some((alias, format!("{}.{}", path, property.path)))
        }
        _ => None,
    }
}

/// Implicit conversions the translator inserts are FHIRHelpers calls
fn is_conversion_function(library_name: Option<&str>) -> bool {
    library_name == Some("FHIRHelpers")
}

/// Peel implicit conversions (FHIRHelpers calls, `To*` operators, `As`)
pub fn strip_conversions(expr: &Expression) -> &Expression {
    match expr {
        Expression::FunctionRef(f) => match f.operand.as_slice() {
            [operand] if is_conversion_function(f.library_name.as_deref()) => {
                strip_conversions(operand)
            }
            _ => expr,
        },
        Expression::ToBoolean(u)
        | Expression::ToConcept(u)
        | Expression::ToDate(u)
        | Expression::ToDateTime(u)
        | Expression::ToDecimal(u)
        | Expression::ToInteger(u)
        | Expression::ToLong(u)
        | Expression::ToQuantity(u)
        | Expression::ToRatio(u)
        | Expression::ToString(u)
        | Expression::ToTime(u)
        | Expression::ToList(u) => strip_conversions(&u.operand),
        Expression::As(t) => strip_conversions(&t.operand),
        _ => expr,
    }
}

/// True for values fixed independently of the data being filtered
pub fn is_comparand(expr: &Expression) -> bool {
    let stripped = strip_conversions(expr);
    if !std::ptr::eq(stripped, expr) {
        return is_comparand(stripped);
    }
    match expr {
        Expression::Literal(_)
        | Expression::ParameterRef(_)
        | Expression::ValueSetRef(_)
        | Expression::CodeSystemRef(_)
        | Expression::CodeRef(_)
        | Expression::ConceptRef(_)
        | Expression::Code(_)
        | Expression::Concept(_)
        | Expression::Quantity(_)
        | Expression::Ratio(_)
        | Expression::Now(_)
        | Expression::Today(_)
        | Expression::TimeOfDay(_) => true,
        Expression::Interval(i) => [&i.low, &i.high]
            .into_iter()
            .all(|bound| bound.as_deref().is_none_or(is_comparand)),
        Expression::List(l) => l.elements.iter().all(is_comparand),
        Expression::Date(_) | Expression::DateTime(_) | Expression::Time(_) => {
            expr.children().into_iter().all(is_comparand)
        }
        Expression::Start(u) | Expression::End(u) | Expression::Negate(u) => is_comparand(&u.operand),
        Expression::Add(b) | Expression::Subtract(b) => b.operand.iter().all(is_comparand),
        _ => false,
    }
}

//! Query and alias scoping
//!
//! A [`QueryContext`] lives for the duration of one query visit. Aliases are
//! defined one at a time (sources, then relationship clauses), stay active
//! while the rest of the query is visited and are folded into data
//! requirements when the query is analyzed.

use octofhir_cql_elm::{Expression, Query};

use crate::error::{RequirementsError, RequirementsResult};
use crate::requirement::{
    ConditionRequirement, DataRequirement, ElmRequirement, LibraryIdentifier, QueryRequirement,
};

/// An alias and the data requirement accumulated for it
#[derive(Debug, Clone, PartialEq)]
pub struct AliasContext {
    pub alias: String,
    pub data_requirement: DataRequirement,
}

impl AliasContext {
    pub fn new(library: LibraryIdentifier, alias: impl Into<String>, source: &Expression) -> Self {
        let alias = alias.into();
        Self {
            data_requirement: DataRequirement::for_alias(library, alias.clone(), source.clone()),
            alias,
        }
    }

    pub fn source(&self) -> &Expression {
        &self.data_requirement.source
    }
}

/// Outcome of analyzing a query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnalysis {
    pub requirement: QueryRequirement,
    /// Conditions on aliases this query does not define
    pub unresolved: Vec<ConditionRequirement>,
}

/// Per-query analysis state
#[derive(Debug, Clone)]
pub struct QueryContext {
    library: LibraryIdentifier,
    query: Query,
    aliases: Vec<AliasContext>,
    definition: Option<AliasContext>,
    descoped: Vec<DataRequirement>,
    requirements: Option<ElmRequirement>,
}

impl QueryContext {
    pub fn new(library: LibraryIdentifier, query: &Query) -> Self {
        Self {
            library,
            query: query.clone(),
            aliases: Vec::new(),
            definition: None,
            descoped: Vec::new(),
            requirements: None,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Start defining `alias`. Only one definition may be open at a time.
    pub fn enter_alias_definition_context(
        &mut self,
        alias: &str,
        source: &Expression,
    ) -> RequirementsResult<()> {
        if let Some(open) = &self.definition {
            return Err(RequirementsError::alias_definition_active(&open.alias));
        }
        self.definition = Some(AliasContext::new(self.library.clone(), alias, source));
        Ok(())
    }

    /// Commit the open alias definition
    pub fn exit_alias_definition_context(&mut self) -> RequirementsResult<()> {
        let alias = self
            .definition
            .take()
            .ok_or(RequirementsError::NoAliasDefinition)?;
        self.aliases.push(alias);
        Ok(())
    }

    pub fn in_alias_definition(&self) -> bool {
        self.definition.is_some()
    }

    /// Active aliases, in definition order
    pub fn aliases(&self) -> &[AliasContext] {
        &self.aliases
    }

    pub fn resolve_alias(&self, name: &str) -> Option<&AliasContext> {
        self.aliases.iter().find(|a| a.alias == name)
    }

    pub fn resolve_alias_mut(&mut self, name: &str) -> Option<&mut AliasContext> {
        self.aliases.iter_mut().find(|a| a.alias == name)
    }

    /// End the scope of `name`, keeping its data requirement for analysis
    pub fn descope_alias(&mut self, name: &str) -> RequirementsResult<()> {
        let position = self
            .aliases
            .iter()
            .position(|a| a.alias == name)
            .ok_or_else(|| RequirementsError::unknown_alias(name))?;
        let alias = self.aliases.remove(position);
        self.descoped.push(alias.data_requirement);
        Ok(())
    }

    /// AND-merge `requirement` into the query's requirements
    pub fn report_query_requirements(&mut self, requirement: Option<ElmRequirement>) {
        let element = Expression::Query(self.query.clone());
        self.requirements =
            ElmRequirement::and(&self.library, &element, self.requirements.take(), requirement);
    }

    /// Fold the remaining aliases into data requirements and attribute each
    /// condition to the alias it constrains.
    pub fn analyze_data_requirements(mut self) -> QueryAnalysis {
        self.descoped
            .extend(self.aliases.drain(..).map(|a| a.data_requirement));

        let mut unresolved = Vec::new();
        let conjuncts = match self.requirements.take() {
            Some(ElmRequirement::Conjunctive(c)) => c.arguments,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        for requirement in &conjuncts {
            self.distribute(requirement, &mut unresolved);
        }

        QueryAnalysis {
            requirement: QueryRequirement {
                library: self.library,
                element: self.query,
                requirements: conjuncts,
                data_requirements: self.descoped,
            },
            unresolved,
        }
    }

    fn distribute(&mut self, requirement: &ElmRequirement, unresolved: &mut Vec<ConditionRequirement>) {
        match requirement {
            ElmRequirement::Conjunctive(c) => {
                for argument in &c.arguments {
                    self.distribute(argument, unresolved);
                }
            }
            ElmRequirement::Condition(condition) => {
                let target = self
                    .descoped
                    .iter_mut()
                    .find(|dr| dr.alias.as_deref() == condition.alias());
                match target {
                    Some(dr) => dr.add_condition(condition.clone()),
                    None => unresolved.push(condition.clone()),
                }
            }
            ElmRequirement::Disjunctive(d) => {
                log::debug!(
                    "Disjunctive requirement with {} branches not distributed",
                    d.arguments.len()
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_cql_elm::{AliasedQuerySource, Literal, Property, Retrieve};
    use pretty_assertions::assert_eq;

    fn lib() -> LibraryIdentifier {
        LibraryIdentifier::new("Test", Some("1.0.0"))
    }

    fn retrieve(data_type: &str) -> Expression {
        Expression::Retrieve(Retrieve {
            element: Default::default(),
            data_type: format!("{{http://hl7.org/fhir}}{}", data_type),
            template_id: None,
            id_expression: None,
            code_property: None,
            codes: None,
            date_property: None,
            date_range: None,
            context: None,
        })
    }

    fn query() -> Query {
        Query {
            element: Default::default(),
            source: vec![AliasedQuerySource {
                expression: Box::new(retrieve("Encounter")),
                alias: "E".to_string(),
            }],
            let_clause: Vec::new(),
            relationship: Vec::new(),
            where_clause: None,
            return_clause: None,
            aggregate: None,
            sort: None,
        }
    }

    fn condition(alias: &str, path: &str) -> ConditionRequirement {
        ConditionRequirement {
            library: lib(),
            element: retrieve("Encounter"),
            property: Property::scoped(alias, path),
            comparand: Expression::Literal(Literal {
                element: Default::default(),
                value_type: "{urn:hl7-org:elm-types:r1}String".to_string(),
                value: Some("finished".to_string()),
            }),
        }
    }

    #[test]
    fn test_exit_without_enter_faults() {
        let mut ctx = QueryContext::new(lib(), &query());
        assert_eq!(
            ctx.exit_alias_definition_context(),
            Err(RequirementsError::NoAliasDefinition)
        );
    }

    #[test]
    fn test_reentrant_alias_definition_faults() {
        let mut ctx = QueryContext::new(lib(), &query());
        ctx.enter_alias_definition_context("E", &retrieve("Encounter"))
            .unwrap();
        let err = ctx
            .enter_alias_definition_context("C", &retrieve("Condition"))
            .unwrap_err();
        assert_eq!(err, RequirementsError::alias_definition_active("E"));
        assert!(err.is_fault());
    }

    #[test]
    fn test_alias_resolves_only_after_commit() {
        let mut ctx = QueryContext::new(lib(), &query());
        ctx.enter_alias_definition_context("E", &retrieve("Encounter"))
            .unwrap();
        assert!(ctx.resolve_alias("E").is_none());
        ctx.exit_alias_definition_context().unwrap();
        assert!(ctx.resolve_alias("E").is_some());
    }

    #[test]
    fn test_descope_unknown_alias_faults() {
        let mut ctx = QueryContext::new(lib(), &query());
        assert_eq!(
            ctx.descope_alias("X"),
            Err(RequirementsError::unknown_alias("X"))
        );
    }

    #[test]
    fn test_conditions_distributed_by_alias() {
        let mut ctx = QueryContext::new(lib(), &query());
        ctx.enter_alias_definition_context("E", &retrieve("Encounter"))
            .unwrap();
        ctx.exit_alias_definition_context().unwrap();
        ctx.report_query_requirements(Some(ElmRequirement::Condition(condition("E", "status"))));
        ctx.report_query_requirements(Some(ElmRequirement::Condition(condition("P", "gender"))));

        let analysis = ctx.analyze_data_requirements();
        let encounter = analysis.requirement.data_requirement("E").unwrap();
        assert_eq!(encounter.conditions, vec![condition("E", "status")]);
        assert_eq!(analysis.unresolved, vec![condition("P", "gender")]);
        assert!(
            analysis
                .requirement
                .has_requirement(&ElmRequirement::Condition(condition("E", "status")))
        );
    }

    #[test]
    fn test_disjunction_not_distributed() {
        let mut ctx = QueryContext::new(lib(), &query());
        ctx.enter_alias_definition_context("E", &retrieve("Encounter"))
            .unwrap();
        ctx.exit_alias_definition_context().unwrap();
        let either = ElmRequirement::or(
            &lib(),
            &retrieve("Encounter"),
            Some(ElmRequirement::Condition(condition("E", "status"))),
            Some(ElmRequirement::Condition(condition("E", "class"))),
        );
        ctx.report_query_requirements(either);

        let analysis = ctx.analyze_data_requirements();
        let encounter = analysis.requirement.data_requirement("E").unwrap();
        assert!(encounter.conditions.is_empty());
        assert!(analysis.unresolved.is_empty());
    }
}

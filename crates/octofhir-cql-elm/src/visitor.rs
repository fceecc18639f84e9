//! Generic ELM visitor
//!
//! `ElmVisitor` walks a library's definitions in declaration order and
//! recurses into expressions through [`Expression::children`]. State lives in
//! the context `C` threaded through every call, so visitors themselves are
//! usually zero-sized. Each definition hook receives the definition's position
//! in its list, which callers can use as a stable identity.

use crate::expression::Expression;
use crate::library::{
    CodeDef, CodeSystemDef, ConceptDef, ContextDef, ExpressionDef, FunctionDef, IncludeDef,
    Library, ParameterDef, StatementDef, UsingDef, ValueSetDef,
};

pub trait ElmVisitor<C> {
    type Output;
    type Error;

    /// Result for a node that contributes nothing
    fn default_result(&self, ctx: &mut C) -> Self::Output;

    /// Combine the running result with the result of the next child
    fn aggregate_result(&self, aggregate: Self::Output, next: Self::Output) -> Self::Output;

    /// Visit every definition: usings, includes, code systems, value sets,
    /// codes, concepts, parameters, contexts, then statements.
    fn visit_library(&self, library: &Library, ctx: &mut C) -> Result<Self::Output, Self::Error> {
        let mut result = self.default_result(ctx);
        for (index, def) in library.usings().iter().enumerate() {
            let next = self.visit_using_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, def) in library.includes().iter().enumerate() {
            let next = self.visit_include_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, def) in library.code_systems().iter().enumerate() {
            let next = self.visit_code_system_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, def) in library.value_sets().iter().enumerate() {
            let next = self.visit_value_set_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, def) in library.codes().iter().enumerate() {
            let next = self.visit_code_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, def) in library.concepts().iter().enumerate() {
            let next = self.visit_concept_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, def) in library.parameters().iter().enumerate() {
            let next = self.visit_parameter_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, def) in library.contexts().iter().enumerate() {
            let next = self.visit_context_def(index, def, ctx)?;
            result = self.aggregate_result(result, next);
        }
        for (index, stmt) in library.statements().iter().enumerate() {
            let next = match stmt {
                StatementDef::Expression(def) => self.visit_expression_def(index, def, ctx)?,
                StatementDef::Function(def) => self.visit_function_def(index, def, ctx)?,
            };
            result = self.aggregate_result(result, next);
        }
        Ok(result)
    }

    fn visit_using_def(
        &self,
        _index: usize,
        _def: &UsingDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        Ok(self.default_result(ctx))
    }

    fn visit_include_def(
        &self,
        _index: usize,
        _def: &IncludeDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        Ok(self.default_result(ctx))
    }

    fn visit_code_system_def(
        &self,
        _index: usize,
        _def: &CodeSystemDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        Ok(self.default_result(ctx))
    }

    fn visit_value_set_def(
        &self,
        _index: usize,
        _def: &ValueSetDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        Ok(self.default_result(ctx))
    }

    fn visit_code_def(
        &self,
        _index: usize,
        _def: &CodeDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        Ok(self.default_result(ctx))
    }

    fn visit_concept_def(
        &self,
        _index: usize,
        _def: &ConceptDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        Ok(self.default_result(ctx))
    }

    fn visit_parameter_def(
        &self,
        _index: usize,
        def: &ParameterDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        match &def.default_expr {
            Some(expr) => self.visit_expression(expr, ctx),
            None => Ok(self.default_result(ctx)),
        }
    }

    fn visit_context_def(
        &self,
        _index: usize,
        _def: &ContextDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        Ok(self.default_result(ctx))
    }

    fn visit_expression_def(
        &self,
        _index: usize,
        def: &ExpressionDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        match &def.expression {
            Some(expr) => self.visit_expression(expr, ctx),
            None => Ok(self.default_result(ctx)),
        }
    }

    fn visit_function_def(
        &self,
        _index: usize,
        def: &FunctionDef,
        ctx: &mut C,
    ) -> Result<Self::Output, Self::Error> {
        match &def.expression {
            Some(expr) => self.visit_expression(expr, ctx),
            None => Ok(self.default_result(ctx)),
        }
    }

    fn visit_expression(&self, expr: &Expression, ctx: &mut C) -> Result<Self::Output, Self::Error> {
        self.visit_children(expr, ctx)
    }

    /// Visit the direct children of `expr` and fold their results
    fn visit_children(&self, expr: &Expression, ctx: &mut C) -> Result<Self::Output, Self::Error> {
        let mut result = self.default_result(ctx);
        for child in expr.children() {
            let next = self.visit_expression(child, ctx)?;
            result = self.aggregate_result(result, next);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::convert::Infallible;

    /// Collects retrieve data types in visit order
    struct RetrieveCollector;

    impl ElmVisitor<Vec<String>> for RetrieveCollector {
        type Output = usize;
        type Error = Infallible;

        fn default_result(&self, _ctx: &mut Vec<String>) -> usize {
            0
        }

        fn aggregate_result(&self, aggregate: usize, next: usize) -> usize {
            aggregate + next
        }

        fn visit_expression(
            &self,
            expr: &Expression,
            ctx: &mut Vec<String>,
        ) -> Result<usize, Infallible> {
            if let Expression::Retrieve(r) = expr {
                ctx.push(r.local_data_type().to_string());
                let nested = self.visit_children(expr, ctx)?;
                return Ok(nested + 1);
            }
            self.visit_children(expr, ctx)
        }
    }

    #[test]
    fn test_visit_library_statements_in_order() {
        let library: Library = serde_json::from_value(json!({
            "identifier": {"id": "Test", "version": "1.0.0"},
            "statements": {"def": [
                {
                    "name": "Encounters",
                    "expression": {"type": "Retrieve", "dataType": "{http://hl7.org/fhir}Encounter"}
                },
                {
                    "type": "FunctionDef",
                    "name": "Conditions",
                    "operand": [],
                    "expression": {
                        "type": "Union",
                        "operand": [
                            {"type": "Retrieve", "dataType": "{http://hl7.org/fhir}Condition"},
                            {"type": "Retrieve", "dataType": "{http://hl7.org/fhir}Observation"}
                        ]
                    }
                }
            ]}
        }))
        .unwrap();

        let mut seen = Vec::new();
        let count = RetrieveCollector.visit_library(&library, &mut seen).unwrap();
        assert_eq!(count, 3);
        assert_eq!(seen, vec!["Encounter", "Condition", "Observation"]);
    }
}

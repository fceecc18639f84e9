//! Generic child traversal over ELM expressions
//!
//! `children()` lists the direct sub-expressions of a node in source order,
//! which is the order every visitor walks them in.

use crate::expression::{
    AggregateClause, Expression, IntervalExpression, Query, RelationshipClause, Retrieve,
    SortByItem,
};

fn push_opt<'a>(out: &mut Vec<&'a Expression>, expr: &'a Option<Box<Expression>>) {
    if let Some(expr) = expr {
        out.push(expr);
    }
}

impl Expression {
    /// Direct child expressions, in source order
    pub fn children(&self) -> Vec<&Expression> {
        let mut out: Vec<&Expression> = Vec::new();
        match self {
            // Leaves
            Self::Null(_)
            | Self::Literal(_)
            | Self::ExpressionRef(_)
            | Self::ParameterRef(_)
            | Self::ValueSetRef(_)
            | Self::CodeSystemRef(_)
            | Self::CodeRef(_)
            | Self::ConceptRef(_)
            | Self::OperandRef(_)
            | Self::AliasRef(_)
            | Self::QueryLetRef(_)
            | Self::IdentifierRef(_)
            | Self::MinValue(_)
            | Self::MaxValue(_)
            | Self::Now(_)
            | Self::Today(_)
            | Self::TimeOfDay(_)
            | Self::Current(_)
            | Self::Iteration(_)
            | Self::Total(_)
            | Self::Code(_)
            | Self::Concept(_)
            | Self::Quantity(_)
            | Self::Ratio(_) => {}

            Self::FunctionRef(f) => out.extend(f.operand.iter()),
            Self::Property(p) => push_opt(&mut out, &p.source),

            Self::Ceiling(u)
            | Self::Floor(u)
            | Self::Truncate(u)
            | Self::Abs(u)
            | Self::Negate(u)
            | Self::Ln(u)
            | Self::Exp(u)
            | Self::Successor(u)
            | Self::Predecessor(u)
            | Self::Precision(u)
            | Self::Not(u)
            | Self::IsNull(u)
            | Self::IsTrue(u)
            | Self::IsFalse(u)
            | Self::Length(u)
            | Self::Upper(u)
            | Self::Lower(u)
            | Self::DateFrom(u)
            | Self::TimeFrom(u)
            | Self::TimezoneFrom(u)
            | Self::TimezoneOffsetFrom(u)
            | Self::Start(u)
            | Self::End(u)
            | Self::PointFrom(u)
            | Self::Width(u)
            | Self::Size(u)
            | Self::Exists(u)
            | Self::Flatten(u)
            | Self::Distinct(u)
            | Self::SingletonFrom(u)
            | Self::ToBoolean(u)
            | Self::ToChars(u)
            | Self::ToConcept(u)
            | Self::ToDate(u)
            | Self::ToDateTime(u)
            | Self::ToDecimal(u)
            | Self::ToInteger(u)
            | Self::ToLong(u)
            | Self::ToList(u)
            | Self::ToQuantity(u)
            | Self::ToRatio(u)
            | Self::ToString(u)
            | Self::ToTime(u)
            | Self::ConvertsToBoolean(u)
            | Self::ConvertsToDate(u)
            | Self::ConvertsToDateTime(u)
            | Self::ConvertsToDecimal(u)
            | Self::ConvertsToInteger(u)
            | Self::ConvertsToLong(u)
            | Self::ConvertsToQuantity(u)
            | Self::ConvertsToRatio(u)
            | Self::ConvertsToString(u)
            | Self::ConvertsToTime(u) => out.push(&u.operand),

            Self::Add(b)
            | Self::Subtract(b)
            | Self::Multiply(b)
            | Self::Divide(b)
            | Self::TruncatedDivide(b)
            | Self::Modulo(b)
            | Self::Log(b)
            | Self::Power(b)
            | Self::Equal(b)
            | Self::Equivalent(b)
            | Self::NotEqual(b)
            | Self::Less(b)
            | Self::Greater(b)
            | Self::LessOrEqual(b)
            | Self::GreaterOrEqual(b)
            | Self::And(b)
            | Self::Or(b)
            | Self::Xor(b)
            | Self::Implies(b)
            | Self::Indexer(b)
            | Self::StartsWith(b)
            | Self::EndsWith(b)
            | Self::Matches(b)
            | Self::Contains(b)
            | Self::In(b)
            | Self::Includes(b)
            | Self::IncludedIn(b)
            | Self::ProperContains(b)
            | Self::ProperIn(b)
            | Self::ProperIncludes(b)
            | Self::ProperIncludedIn(b)
            | Self::Before(b)
            | Self::After(b)
            | Self::Meets(b)
            | Self::MeetsBefore(b)
            | Self::MeetsAfter(b)
            | Self::Overlaps(b)
            | Self::OverlapsBefore(b)
            | Self::OverlapsAfter(b)
            | Self::Starts(b)
            | Self::Ends(b)
            | Self::Times(b) => out.extend(b.operand.iter()),

            Self::Coalesce(n)
            | Self::Concatenate(n)
            | Self::ReplaceMatches(n)
            | Self::Collapse(n)
            | Self::Expand(n)
            | Self::Union(n)
            | Self::Intersect(n)
            | Self::Except(n) => out.extend(n.operand.iter()),

            Self::DurationBetween(p)
            | Self::DifferenceBetween(p)
            | Self::SameAs(p)
            | Self::SameOrBefore(p)
            | Self::SameOrAfter(p)
            | Self::CalculateAgeAt(p) => out.extend(p.operand.iter()),

            Self::Round(r) => {
                out.push(&r.operand);
                push_opt(&mut out, &r.precision);
            }
            Self::LowBoundary(b) | Self::HighBoundary(b) => {
                out.push(&b.operand);
                push_opt(&mut out, &b.precision);
            }
            Self::If(i) => {
                out.push(&i.condition);
                out.push(&i.then);
                out.push(&i.else_clause);
            }
            Self::Case(c) => {
                push_opt(&mut out, &c.comparand);
                for item in &c.case_item {
                    out.push(&item.when);
                    out.push(&item.then);
                }
                push_opt(&mut out, &c.else_clause);
            }

            Self::Combine(c) => {
                out.push(&c.source);
                push_opt(&mut out, &c.separator);
            }
            Self::Split(s) => {
                out.push(&s.string_to_split);
                push_opt(&mut out, &s.separator);
            }
            Self::SplitOnMatches(s) => {
                out.push(&s.string_to_split);
                out.push(&s.separator_pattern);
            }
            Self::PositionOf(p) | Self::LastPositionOf(p) => {
                out.push(&p.pattern);
                out.push(&p.string);
            }
            Self::Substring(s) => {
                out.push(&s.string_to_sub);
                out.push(&s.start_index);
                push_opt(&mut out, &s.length);
            }

            Self::Date(d) => {
                out.push(&d.year);
                push_opt(&mut out, &d.month);
                push_opt(&mut out, &d.day);
            }
            Self::DateTime(d) => {
                out.push(&d.year);
                for part in [
                    &d.month,
                    &d.day,
                    &d.hour,
                    &d.minute,
                    &d.second,
                    &d.millisecond,
                    &d.timezone_offset,
                ] {
                    push_opt(&mut out, part);
                }
            }
            Self::Time(t) => {
                out.push(&t.hour);
                push_opt(&mut out, &t.minute);
                push_opt(&mut out, &t.second);
                push_opt(&mut out, &t.millisecond);
            }
            Self::DateTimeComponentFrom(d) => out.push(&d.operand),

            Self::Interval(i) => interval_children(i, &mut out),
            Self::List(l) => out.extend(l.elements.iter()),
            Self::Filter(f) => {
                out.push(&f.source);
                out.push(&f.condition);
            }
            Self::First(f) | Self::Last(f) => out.push(&f.source),
            Self::Slice(s) => {
                out.push(&s.source);
                out.push(&s.start_index);
                push_opt(&mut out, &s.end_index);
            }
            Self::IndexOf(i) => {
                out.push(&i.source);
                out.push(&i.element_to_find);
            }
            Self::Sort(s) => {
                out.push(&s.source);
                sort_children(&s.by, &mut out);
            }
            Self::ForEach(f) | Self::Repeat(f) => {
                out.push(&f.source);
                out.push(&f.element_expr);
            }

            Self::Aggregate(a)
            | Self::Count(a)
            | Self::Sum(a)
            | Self::Product(a)
            | Self::Min(a)
            | Self::Max(a)
            | Self::Avg(a)
            | Self::GeometricMean(a)
            | Self::Median(a)
            | Self::Mode(a)
            | Self::Variance(a)
            | Self::StdDev(a)
            | Self::PopulationVariance(a)
            | Self::PopulationStdDev(a)
            | Self::AllTrue(a)
            | Self::AnyTrue(a) => {
                push_opt(&mut out, &a.source);
                push_opt(&mut out, &a.iteration);
                push_opt(&mut out, &a.starting);
            }

            Self::As(t) | Self::Convert(t) | Self::Is(t) | Self::CanConvert(t) => {
                out.push(&t.operand)
            }

            Self::InCodeSystem(i) => {
                out.push(&i.code);
                push_opt(&mut out, &i.codesystem_expression);
            }
            Self::AnyInCodeSystem(i) => {
                out.push(&i.codes);
                push_opt(&mut out, &i.codesystem_expression);
            }
            Self::InValueSet(i) => {
                out.push(&i.code);
                push_opt(&mut out, &i.valueset_expression);
            }
            Self::AnyInValueSet(i) => {
                out.push(&i.codes);
                push_opt(&mut out, &i.valueset_expression);
            }
            Self::CalculateAge(c) => out.push(&c.operand),

            Self::Query(q) => query_children(q, &mut out),
            Self::Retrieve(r) => retrieve_children(r, &mut out),

            Self::Tuple(t) => out.extend(t.elements.iter().map(|e| e.value.as_ref())),
            Self::Instance(i) => out.extend(i.elements.iter().map(|e| e.value.as_ref())),
            Self::Message(m) => {
                out.push(&m.source);
                for part in [&m.condition, &m.code, &m.severity, &m.message] {
                    push_opt(&mut out, part);
                }
            }
        }
        out
    }
}

fn interval_children<'a>(i: &'a IntervalExpression, out: &mut Vec<&'a Expression>) {
    push_opt(out, &i.low);
    push_opt(out, &i.low_closed_expression);
    push_opt(out, &i.high);
    push_opt(out, &i.high_closed_expression);
}

fn sort_children<'a>(by: &'a [SortByItem], out: &mut Vec<&'a Expression>) {
    for item in by {
        push_opt(out, &item.expression);
    }
}

fn relationship_children<'a>(rel: &'a RelationshipClause, out: &mut Vec<&'a Expression>) {
    out.push(&rel.expression);
    out.push(&rel.such_that);
}

fn aggregate_clause_children<'a>(agg: &'a AggregateClause, out: &mut Vec<&'a Expression>) {
    push_opt(out, &agg.starting);
    out.push(&agg.expression);
}

/// Sources, then let, relationship, where, return, aggregate and sort clauses
fn query_children<'a>(q: &'a Query, out: &mut Vec<&'a Expression>) {
    out.extend(q.source.iter().map(|s| s.expression.as_ref()));
    out.extend(q.let_clause.iter().map(|l| l.expression.as_ref()));
    for rel in &q.relationship {
        relationship_children(rel, out);
    }
    push_opt(out, &q.where_clause);
    if let Some(ret) = &q.return_clause {
        out.push(&ret.expression);
    }
    if let Some(agg) = &q.aggregate {
        aggregate_clause_children(agg, out);
    }
    if let Some(sort) = &q.sort {
        sort_children(&sort.by, out);
    }
}

fn retrieve_children<'a>(r: &'a Retrieve, out: &mut Vec<&'a Expression>) {
    push_opt(out, &r.id_expression);
    push_opt(out, &r.codes);
    push_opt(out, &r.date_range);
    push_opt(out, &r.context);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn expr(value: serde_json::Value) -> Expression {
        serde_json::from_value(value).unwrap()
    }

    fn names(children: &[&Expression]) -> Vec<String> {
        children
            .iter()
            .map(|c| match c {
                Expression::Literal(l) => l.value.clone().unwrap_or_default(),
                Expression::AliasRef(a) => a.name.clone(),
                Expression::Retrieve(r) => r.local_data_type().to_string(),
                other => format!("{:?}", other),
            })
            .collect()
    }

    fn lit(v: &str) -> serde_json::Value {
        json!({"type": "Literal", "valueType": "{urn:hl7-org:elm-types:r1}Integer", "value": v})
    }

    #[test]
    fn test_binary_operands_in_order() {
        let e = expr(json!({"type": "Add", "operand": [lit("1"), lit("2")]}));
        assert_eq!(names(&e.children()), vec!["1", "2"]);
    }

    #[test]
    fn test_leaf_has_no_children() {
        let e = expr(lit("7"));
        assert!(e.children().is_empty());
    }

    #[test]
    fn test_if_children() {
        let e = expr(json!({
            "type": "If",
            "condition": lit("1"),
            "then": lit("2"),
            "else": lit("3"),
        }));
        assert_eq!(names(&e.children()), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_query_clause_order() {
        let e = expr(json!({
            "type": "Query",
            "source": [{
                "alias": "C",
                "expression": {"type": "Retrieve", "dataType": "{http://hl7.org/fhir}Condition"}
            }],
            "let": [{"identifier": "x", "expression": lit("1")}],
            "relationship": [{
                "type": "With",
                "alias": "E",
                "expression": {"type": "Retrieve", "dataType": "{http://hl7.org/fhir}Encounter"},
                "suchThat": lit("2")
            }],
            "where": lit("3"),
            "return": {"expression": {"type": "AliasRef", "name": "C"}}
        }));
        assert_eq!(
            names(&e.children()),
            vec!["Condition", "1", "Encounter", "2", "3", "C"]
        );
    }

    #[test]
    fn test_retrieve_codes_child() {
        let e = expr(json!({
            "type": "Retrieve",
            "dataType": "{http://hl7.org/fhir}Observation",
            "codes": {"type": "ValueSetRef", "name": "Vitals"}
        }));
        let children = e.children();
        assert_eq!(children.len(), 1);
        assert!(matches!(children[0], Expression::ValueSetRef(v) if v.name == "Vitals"));
    }
}

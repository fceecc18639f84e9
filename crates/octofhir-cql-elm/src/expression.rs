//! ELM expression nodes
//!
//! One enum variant per ELM expression type, tagged by the `type` field of
//! the ELM JSON. Operand shapes are shared where ELM shares them (unary,
//! binary, n-ary).

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::library::TypeSpecifier;

// ============================================================================
// Base Element
// ============================================================================

/// Attributes common to every ELM node
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub local_id: Option<String>,
    /// Source position, `line:col-line:col`
    pub locator: Option<String>,
    pub result_type_name: Option<String>,
    pub result_type_specifier: Option<TypeSpecifier>,
}

// ============================================================================
// Expressions
// ============================================================================

/// The main Expression enum containing all ELM expression types
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Expression {
    // === Literals ===
    Null(NullLiteral),
    Literal(Literal),

    // === References ===
    ExpressionRef(ExpressionRef),
    FunctionRef(FunctionRef),
    ParameterRef(ParameterRef),
    ValueSetRef(ValueSetRef),
    CodeSystemRef(CodeSystemRef),
    CodeRef(CodeRef),
    ConceptRef(ConceptRef),
    OperandRef(OperandRef),
    AliasRef(AliasRef),
    QueryLetRef(QueryLetRef),
    IdentifierRef(IdentifierRef),
    Property(Property),

    // === Arithmetic ===
    Add(BinaryExpression),
    Subtract(BinaryExpression),
    Multiply(BinaryExpression),
    Divide(BinaryExpression),
    TruncatedDivide(BinaryExpression),
    Modulo(BinaryExpression),
    Ceiling(UnaryExpression),
    Floor(UnaryExpression),
    Truncate(UnaryExpression),
    Abs(UnaryExpression),
    Negate(UnaryExpression),
    Round(RoundExpression),
    Ln(UnaryExpression),
    Exp(UnaryExpression),
    Log(BinaryExpression),
    Power(BinaryExpression),
    Successor(UnaryExpression),
    Predecessor(UnaryExpression),
    MinValue(MinMaxValueExpression),
    MaxValue(MinMaxValueExpression),
    Precision(UnaryExpression),
    LowBoundary(BoundaryExpression),
    HighBoundary(BoundaryExpression),

    // === Comparison ===
    Equal(BinaryExpression),
    Equivalent(BinaryExpression),
    NotEqual(BinaryExpression),
    Less(BinaryExpression),
    Greater(BinaryExpression),
    LessOrEqual(BinaryExpression),
    GreaterOrEqual(BinaryExpression),

    // === Logical ===
    And(BinaryExpression),
    Or(BinaryExpression),
    Xor(BinaryExpression),
    Implies(BinaryExpression),
    Not(UnaryExpression),

    // === Nullological ===
    IsNull(UnaryExpression),
    IsTrue(UnaryExpression),
    IsFalse(UnaryExpression),
    Coalesce(NaryExpression),
    If(IfExpression),
    Case(CaseExpression),

    // === String ===
    Concatenate(NaryExpression),
    Combine(CombineExpression),
    Split(SplitExpression),
    SplitOnMatches(SplitOnMatchesExpression),
    Length(UnaryExpression),
    Upper(UnaryExpression),
    Lower(UnaryExpression),
    Indexer(BinaryExpression),
    PositionOf(PositionOfExpression),
    LastPositionOf(PositionOfExpression),
    Substring(SubstringExpression),
    StartsWith(BinaryExpression),
    EndsWith(BinaryExpression),
    Matches(BinaryExpression),
    ReplaceMatches(NaryExpression),

    // === DateTime ===
    Now(LeafExpression),
    Today(LeafExpression),
    TimeOfDay(LeafExpression),
    Date(DateExpression),
    DateTime(DateTimeExpression),
    Time(TimeExpression),
    DateFrom(UnaryExpression),
    TimeFrom(UnaryExpression),
    TimezoneFrom(UnaryExpression),
    TimezoneOffsetFrom(UnaryExpression),
    DateTimeComponentFrom(DateTimeComponentFromExpression),
    DurationBetween(PrecisionBinaryExpression),
    DifferenceBetween(PrecisionBinaryExpression),
    SameAs(PrecisionBinaryExpression),
    SameOrBefore(PrecisionBinaryExpression),
    SameOrAfter(PrecisionBinaryExpression),

    // === Interval ===
    Interval(IntervalExpression),
    Start(UnaryExpression),
    End(UnaryExpression),
    PointFrom(UnaryExpression),
    Width(UnaryExpression),
    Size(UnaryExpression),
    Contains(BinaryExpression),
    In(BinaryExpression),
    Includes(BinaryExpression),
    IncludedIn(BinaryExpression),
    ProperContains(BinaryExpression),
    ProperIn(BinaryExpression),
    ProperIncludes(BinaryExpression),
    ProperIncludedIn(BinaryExpression),
    Before(BinaryExpression),
    After(BinaryExpression),
    Meets(BinaryExpression),
    MeetsBefore(BinaryExpression),
    MeetsAfter(BinaryExpression),
    Overlaps(BinaryExpression),
    OverlapsBefore(BinaryExpression),
    OverlapsAfter(BinaryExpression),
    Starts(BinaryExpression),
    Ends(BinaryExpression),
    Collapse(NaryExpression),
    Expand(NaryExpression),
    Union(NaryExpression),
    Intersect(NaryExpression),
    Except(NaryExpression),

    // === List ===
    List(ListExpression),
    Exists(UnaryExpression),
    Times(BinaryExpression),
    Filter(FilterExpression),
    First(FirstLastExpression),
    Last(FirstLastExpression),
    Slice(SliceExpression),
    IndexOf(IndexOfExpression),
    Flatten(UnaryExpression),
    Sort(SortExpression),
    ForEach(ForEachExpression),
    Repeat(ForEachExpression),
    Distinct(UnaryExpression),
    Current(ScopedLeafExpression),
    Iteration(ScopedLeafExpression),
    Total(ScopedLeafExpression),
    SingletonFrom(UnaryExpression),

    // === Aggregate ===
    Aggregate(AggregateExpression),
    Count(AggregateExpression),
    Sum(AggregateExpression),
    Product(AggregateExpression),
    Min(AggregateExpression),
    Max(AggregateExpression),
    Avg(AggregateExpression),
    GeometricMean(AggregateExpression),
    Median(AggregateExpression),
    Mode(AggregateExpression),
    Variance(AggregateExpression),
    StdDev(AggregateExpression),
    PopulationVariance(AggregateExpression),
    PopulationStdDev(AggregateExpression),
    AllTrue(AggregateExpression),
    AnyTrue(AggregateExpression),

    // === Type Operations ===
    As(TypeOperatorExpression),
    Convert(TypeOperatorExpression),
    Is(TypeOperatorExpression),
    CanConvert(TypeOperatorExpression),
    ToBoolean(UnaryExpression),
    ToChars(UnaryExpression),
    ToConcept(UnaryExpression),
    ToDate(UnaryExpression),
    ToDateTime(UnaryExpression),
    ToDecimal(UnaryExpression),
    ToInteger(UnaryExpression),
    ToLong(UnaryExpression),
    ToList(UnaryExpression),
    ToQuantity(UnaryExpression),
    ToRatio(UnaryExpression),
    ToString(UnaryExpression),
    ToTime(UnaryExpression),
    ConvertsToBoolean(UnaryExpression),
    ConvertsToDate(UnaryExpression),
    ConvertsToDateTime(UnaryExpression),
    ConvertsToDecimal(UnaryExpression),
    ConvertsToInteger(UnaryExpression),
    ConvertsToLong(UnaryExpression),
    ConvertsToQuantity(UnaryExpression),
    ConvertsToRatio(UnaryExpression),
    ConvertsToString(UnaryExpression),
    ConvertsToTime(UnaryExpression),

    // === Clinical ===
    Code(CodeLiteralExpression),
    Concept(ConceptLiteralExpression),
    Quantity(QuantityExpression),
    Ratio(RatioExpression),
    InCodeSystem(InCodeSystemExpression),
    AnyInCodeSystem(AnyInCodeSystemExpression),
    InValueSet(InValueSetExpression),
    AnyInValueSet(AnyInValueSetExpression),
    CalculateAge(CalculateAgeExpression),
    CalculateAgeAt(PrecisionBinaryExpression),

    // === Query ===
    Query(Query),
    Retrieve(Retrieve),

    // === Structured values ===
    Tuple(TupleExpression),
    Instance(InstanceExpression),

    // === Message ===
    Message(MessageExpression),
}

impl Expression {
    pub fn as_property(&self) -> Option<&Property> {
        match self {
            Self::Property(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_retrieve(&self) -> Option<&Retrieve> {
        match self {
            Self::Retrieve(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&Query> {
        match self {
            Self::Query(q) => Some(q),
            _ => None,
        }
    }
}

// ============================================================================
// References
// ============================================================================

/// Null literal
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NullLiteral {
    #[serde(flatten)]
    pub element: Element,
}

/// Literal value, kept in its lexical form
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Literal {
    #[serde(flatten)]
    pub element: Element,
    pub value_type: String,
    pub value: Option<String>,
}

/// Reference to an expression definition, possibly in an included library
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
}

/// Function invocation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
    #[serde(default)]
    pub operand: Vec<Expression>,
    pub signature: Option<Vec<TypeSpecifier>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
    pub preserve: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystemRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
}

/// Reference to a function operand or query-local name
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperandRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
}

/// Reference to a query source alias
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryLetRef {
    #[serde(flatten)]
    pub element: Element,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifierRef {
    #[serde(flatten)]
    pub element: Element,
    pub library_name: Option<String>,
    pub name: String,
}

/// Property access
///
/// The navigated object is either `source` or, inside a query, the alias
/// named by `scope`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(flatten)]
    pub element: Element,
    pub source: Option<Box<Expression>>,
    pub path: String,
    pub scope: Option<String>,
}

impl Property {
    /// A property path rooted directly at a query alias
    pub fn scoped(alias: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            element: Element::default(),
            source: None,
            path: path.into(),
            scope: Some(alias.into()),
        }
    }
}

// ============================================================================
// Operator Shapes
// ============================================================================

/// Operator without operands (`Now`, `Today`, `TimeOfDay`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LeafExpression {
    #[serde(flatten)]
    pub element: Element,
}

/// Iteration variables (`$this`, `$index`, `$total`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScopedLeafExpression {
    #[serde(flatten)]
    pub element: Element,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UnaryExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BinaryExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Vec<Expression>,
}

impl BinaryExpression {
    /// Left and right operands, when exactly two are present
    pub fn operands(&self) -> Option<(&Expression, &Expression)> {
        match self.operand.as_slice() {
            [left, right] => Some((left, right)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NaryExpression {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default)]
    pub operand: Vec<Expression>,
}

/// Binary operator carrying a date/time precision
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PrecisionBinaryExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Vec<Expression>,
    pub precision: Option<DateTimePrecision>,
}

impl PrecisionBinaryExpression {
    pub fn operands(&self) -> Option<(&Expression, &Expression)> {
        match self.operand.as_slice() {
            [left, right] => Some((left, right)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IfExpression {
    #[serde(flatten)]
    pub element: Element,
    pub condition: Box<Expression>,
    pub then: Box<Expression>,
    #[serde(rename = "else")]
    pub else_clause: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseExpression {
    #[serde(flatten)]
    pub element: Element,
    pub comparand: Option<Box<Expression>>,
    #[serde(default)]
    pub case_item: Vec<CaseItem>,
    #[serde(rename = "else")]
    pub else_clause: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaseItem {
    pub when: Box<Expression>,
    pub then: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoundExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    pub precision: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinMaxValueExpression {
    #[serde(flatten)]
    pub element: Element,
    pub value_type: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoundaryExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    pub precision: Option<Box<Expression>>,
}

// ============================================================================
// String Operations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CombineExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub separator: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitExpression {
    #[serde(flatten)]
    pub element: Element,
    pub string_to_split: Box<Expression>,
    pub separator: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitOnMatchesExpression {
    #[serde(flatten)]
    pub element: Element,
    pub string_to_split: Box<Expression>,
    pub separator_pattern: Box<Expression>,
}

/// PositionOf / LastPositionOf
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionOfExpression {
    #[serde(flatten)]
    pub element: Element,
    pub pattern: Box<Expression>,
    pub string: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubstringExpression {
    #[serde(flatten)]
    pub element: Element,
    pub string_to_sub: Box<Expression>,
    pub start_index: Box<Expression>,
    pub length: Option<Box<Expression>>,
}

// ============================================================================
// DateTime Operations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateExpression {
    #[serde(flatten)]
    pub element: Element,
    pub year: Box<Expression>,
    pub month: Option<Box<Expression>>,
    pub day: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateTimeExpression {
    #[serde(flatten)]
    pub element: Element,
    pub year: Box<Expression>,
    pub month: Option<Box<Expression>>,
    pub day: Option<Box<Expression>>,
    pub hour: Option<Box<Expression>>,
    pub minute: Option<Box<Expression>>,
    pub second: Option<Box<Expression>>,
    pub millisecond: Option<Box<Expression>>,
    pub timezone_offset: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimeExpression {
    #[serde(flatten)]
    pub element: Element,
    pub hour: Box<Expression>,
    pub minute: Option<Box<Expression>>,
    pub second: Option<Box<Expression>>,
    pub millisecond: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DateTimeComponentFromExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    pub precision: DateTimePrecision,
}

/// DateTime precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DateTimePrecision {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

// ============================================================================
// Interval and List Operations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalExpression {
    #[serde(flatten)]
    pub element: Element,
    pub low: Option<Box<Expression>>,
    pub low_closed_expression: Option<Box<Expression>>,
    pub high: Option<Box<Expression>>,
    pub high_closed_expression: Option<Box<Expression>>,
    pub low_closed: Option<bool>,
    pub high_closed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListExpression {
    #[serde(flatten)]
    pub element: Element,
    pub type_specifier: Option<TypeSpecifier>,
    #[serde(rename = "element", default)]
    pub elements: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub condition: Box<Expression>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstLastExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub order_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub start_index: Box<Expression>,
    pub end_index: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndexOfExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(rename = "element")]
    pub element_to_find: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(default)]
    pub by: Vec<SortByItem>,
}

/// ForEach / Repeat
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ForEachExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    #[serde(rename = "element")]
    pub element_expr: Box<Expression>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregateExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Option<Box<Expression>>,
    pub iteration: Option<Box<Expression>>,
    pub starting: Option<Box<Expression>>,
    pub path: Option<String>,
}

// ============================================================================
// Type Operations
// ============================================================================

/// As / Convert / Is / CanConvert
///
/// Only the operand matters for traversal; the target type is kept in
/// whichever attribute form the translator emitted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeOperatorExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    pub as_type: Option<String>,
    pub as_type_specifier: Option<TypeSpecifier>,
    pub to_type: Option<String>,
    pub to_type_specifier: Option<TypeSpecifier>,
    pub is_type: Option<String>,
    pub is_type_specifier: Option<TypeSpecifier>,
    pub strict: Option<bool>,
}

// ============================================================================
// Clinical Operations
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CodeLiteralExpression {
    #[serde(flatten)]
    pub element: Element,
    pub system: CodeSystemRef,
    pub code: String,
    pub display: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConceptLiteralExpression {
    #[serde(flatten)]
    pub element: Element,
    #[serde(default)]
    pub code: Vec<CodeLiteralExpression>,
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuantityExpression {
    #[serde(flatten)]
    pub element: Element,
    pub value: Option<Decimal>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RatioExpression {
    #[serde(flatten)]
    pub element: Element,
    pub numerator: QuantityExpression,
    pub denominator: QuantityExpression,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InCodeSystemExpression {
    #[serde(flatten)]
    pub element: Element,
    pub code: Box<Expression>,
    pub codesystem: Option<CodeSystemRef>,
    pub codesystem_expression: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyInCodeSystemExpression {
    #[serde(flatten)]
    pub element: Element,
    pub codes: Box<Expression>,
    pub codesystem: Option<CodeSystemRef>,
    pub codesystem_expression: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InValueSetExpression {
    #[serde(flatten)]
    pub element: Element,
    pub code: Box<Expression>,
    pub valueset: Option<ValueSetRef>,
    pub valueset_expression: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyInValueSetExpression {
    #[serde(flatten)]
    pub element: Element,
    pub codes: Box<Expression>,
    pub valueset: Option<ValueSetRef>,
    pub valueset_expression: Option<Box<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalculateAgeExpression {
    #[serde(flatten)]
    pub element: Element,
    pub operand: Box<Expression>,
    pub precision: Option<DateTimePrecision>,
}

// ============================================================================
// Query
// ============================================================================

/// Query expression
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Query {
    #[serde(flatten)]
    pub element: Element,
    pub source: Vec<AliasedQuerySource>,
    #[serde(rename = "let", default)]
    pub let_clause: Vec<LetClause>,
    #[serde(default)]
    pub relationship: Vec<RelationshipClause>,
    #[serde(rename = "where")]
    pub where_clause: Option<Box<Expression>>,
    #[serde(rename = "return")]
    pub return_clause: Option<ReturnClause>,
    pub aggregate: Option<AggregateClause>,
    pub sort: Option<SortClause>,
}

/// Aliased query source
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AliasedQuerySource {
    pub expression: Box<Expression>,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LetClause {
    pub identifier: String,
    pub expression: Box<Expression>,
}

/// Kind of relationship clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RelationshipKind {
    With,
    Without,
}

/// `with` / `without` relationship clause
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipClause {
    #[serde(rename = "type")]
    pub kind: RelationshipKind,
    pub expression: Box<Expression>,
    pub alias: String,
    pub such_that: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReturnClause {
    pub expression: Box<Expression>,
    pub distinct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AggregateClause {
    pub identifier: String,
    pub expression: Box<Expression>,
    pub starting: Option<Box<Expression>>,
    pub distinct: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortClause {
    #[serde(default)]
    pub by: Vec<SortByItem>,
}

/// Sort item: by direction, by path, or by an expression over `$this`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortByItem {
    pub direction: SortDirection,
    pub path: Option<String>,
    pub expression: Option<Box<Expression>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SortDirection {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "ascending")]
    Ascending,
    #[serde(rename = "desc")]
    Desc,
    #[serde(rename = "descending")]
    Descending,
}

/// Retrieve: fetch clinical data of `data_type`, optionally filtered
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retrieve {
    #[serde(flatten)]
    pub element: Element,
    /// Qualified type name, e.g. `{http://hl7.org/fhir}Condition`
    pub data_type: String,
    pub template_id: Option<String>,
    pub id_expression: Option<Box<Expression>>,
    pub code_property: Option<String>,
    pub codes: Option<Box<Expression>>,
    pub date_property: Option<String>,
    pub date_range: Option<Box<Expression>>,
    pub context: Option<Box<Expression>>,
}

impl Retrieve {
    /// Data type without its namespace qualifier
    pub fn local_data_type(&self) -> &str {
        crate::library::local_name(&self.data_type)
    }
}

// ============================================================================
// Structured values
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TupleExpression {
    #[serde(flatten)]
    pub element: Element,
    #[serde(rename = "element", default)]
    pub elements: Vec<NamedElementExpression>,
}

/// Named value inside a Tuple or Instance
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedElementExpression {
    pub name: String,
    pub value: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceExpression {
    #[serde(flatten)]
    pub element: Element,
    pub class_type: String,
    #[serde(rename = "element", default)]
    pub elements: Vec<NamedElementExpression>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageExpression {
    #[serde(flatten)]
    pub element: Element,
    pub source: Box<Expression>,
    pub condition: Option<Box<Expression>>,
    pub code: Option<Box<Expression>>,
    pub severity: Option<Box<Expression>>,
    pub message: Option<Box<Expression>>,
}

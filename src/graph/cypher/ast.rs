// src/graph/cypher/ast.rs
// Cypher AST definitions for the read-only query subset

use crate::datatypes::values::Value;
use crate::graph::pattern_matching::Pattern;

// ============================================================================
// Top-Level Query
// ============================================================================

/// A complete Cypher query: a pipeline of clauses
#[derive(Debug, Clone, PartialEq)]
pub struct CypherQuery {
    pub clauses: Vec<Clause>,
}

/// Each clause in the query pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match(MatchClause),
    OptionalMatch(MatchClause),
    Where(WhereClause),
    Return(ReturnClause),
    With(WithClause),
    OrderBy(OrderByClause),
    Skip(SkipClause),
    Limit(LimitClause),
    Unwind(UnwindClause),
    Call(CallClause),
}

// ============================================================================
// MATCH / WHERE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    pub patterns: Vec<Pattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub predicate: Predicate,
}

/// Predicate expression tree supporting AND/OR/NOT and comparisons
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        left: Expression,
        operator: ComparisonOp,
        right: Expression,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    IsNull(Expression),
    IsNotNull(Expression),
    /// `expr IN list`, where list is a list literal or any list-valued expression
    In {
        expr: Expression,
        list: Expression,
    },
    StartsWith {
        expr: Expression,
        pattern: Expression,
    },
    EndsWith {
        expr: Expression,
        pattern: Expression,
    },
    Contains {
        expr: Expression,
        pattern: Expression,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComparisonOp {
    Equals,
    NotEquals,
    LessThan,
    LessThanEq,
    GreaterThan,
    GreaterThanEq,
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    PropertyAccess {
        variable: String,
        property: String,
    },
    Variable(String),
    Literal(Value),
    Parameter(String),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    Add(Box<Expression>, Box<Expression>),
    Subtract(Box<Expression>, Box<Expression>),
    Multiply(Box<Expression>, Box<Expression>),
    Divide(Box<Expression>, Box<Expression>),
    Negate(Box<Expression>),
    /// `*` inside count(*)
    Star,
    ListLiteral(Vec<Expression>),
    Case {
        operand: Option<Box<Expression>>,
        when_clauses: Vec<(CaseCondition, Expression)>,
        else_expr: Option<Box<Expression>>,
    },
    /// `COUNT { MATCH pattern [WHERE predicate] }`, evaluated per row
    CountSubquery(Box<Subquery>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaseCondition {
    Expression(Expression),
    Predicate(Predicate),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub patterns: Vec<Pattern>,
    pub where_clause: Option<Predicate>,
}

// ============================================================================
// RETURN / WITH
// ============================================================================

/// `RETURN *` is represented by `star` with an empty item list.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    pub items: Vec<ReturnItem>,
    pub distinct: bool,
    pub star: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItem {
    pub expression: Expression,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    pub items: Vec<ReturnItem>,
    pub distinct: bool,
    pub where_clause: Option<WhereClause>,
}

// ============================================================================
// ORDER BY / SKIP / LIMIT / UNWIND / CALL
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expression: Expression,
    pub ascending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkipClause {
    pub count: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitClause {
    pub count: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnwindClause {
    pub expression: Expression,
    pub alias: String,
}

/// Catalog procedure call: `CALL table_info('Metric')`
#[derive(Debug, Clone, PartialEq)]
pub struct CallClause {
    pub procedure: String,
    pub args: Vec<Expression>,
}

// src/graph/cypher/parser.rs
// Cypher clause parser - patterns are parsed straight from the token stream

use super::ast::*;
use super::tokenizer::CypherToken;
use crate::datatypes::values::Value;
use crate::graph::pattern_matching::{
    EdgeDirection, EdgePattern, NodePattern, Pattern, PatternElement, PropertyMatcher,
};

// ============================================================================
// Parser
// ============================================================================

pub struct CypherParser {
    tokens: Vec<CypherToken>,
    pos: usize,
}

impl CypherParser {
    pub fn new(tokens: Vec<CypherToken>) -> Self {
        CypherParser { tokens, pos: 0 }
    }

    // ========================================================================
    // Token Navigation
    // ========================================================================

    fn peek(&self) -> Option<&CypherToken> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&CypherToken> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&CypherToken> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &CypherToken) -> Result<(), String> {
        match self.peek() {
            Some(t) if t == expected => {
                self.advance();
                Ok(())
            }
            Some(t) => Err(format!("Expected {:?}, found {:?}", expected, t)),
            None => Err(format!("Expected {:?}, but reached end of query", expected)),
        }
    }

    fn check(&self, token: &CypherToken) -> bool {
        self.peek() == Some(token)
    }

    /// Consume `token` if it is next.
    fn eat(&mut self, token: &CypherToken) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, String> {
        match self.advance().cloned() {
            Some(CypherToken::Identifier(name)) => Ok(name),
            Some(t) => Err(format!("Expected {}, found {:?}", what, t)),
            None => Err(format!("Expected {}, but reached end of query", what)),
        }
    }

    // ========================================================================
    // Top-Level Query Parser
    // ========================================================================

    pub fn parse_query(&mut self) -> Result<CypherQuery, String> {
        let mut clauses = Vec::new();

        while let Some(token) = self.peek() {
            let clause = match token {
                CypherToken::Semicolon => {
                    self.advance();
                    continue;
                }
                CypherToken::Match => self.parse_match_clause(false)?,
                CypherToken::Optional => {
                    self.advance();
                    if !self.check(&CypherToken::Match) {
                        return Err("Expected MATCH after OPTIONAL".to_string());
                    }
                    self.parse_match_clause(true)?
                }
                CypherToken::Where => self.parse_where_clause()?,
                CypherToken::Return => self.parse_return_clause()?,
                CypherToken::With => self.parse_with_clause()?,
                CypherToken::Order => self.parse_order_by_clause()?,
                CypherToken::Limit => {
                    self.advance();
                    Clause::Limit(LimitClause {
                        count: self.parse_expression()?,
                    })
                }
                CypherToken::Skip => {
                    self.advance();
                    Clause::Skip(SkipClause {
                        count: self.parse_expression()?,
                    })
                }
                CypherToken::Unwind => self.parse_unwind_clause()?,
                CypherToken::Call => self.parse_call_clause()?,
                CypherToken::Create
                | CypherToken::Set
                | CypherToken::Delete
                | CypherToken::Detach
                | CypherToken::Merge
                | CypherToken::Remove => {
                    return Err(format!(
                        "{:?} is not supported: the graph store is read-only",
                        token
                    ));
                }
                t => return Err(format!("Unexpected token at start of clause: {:?}", t)),
            };
            clauses.push(clause);
        }

        if clauses.is_empty() {
            return Err("Empty query".to_string());
        }

        Ok(CypherQuery { clauses })
    }

    // ========================================================================
    // MATCH Clause and Patterns
    // ========================================================================

    fn parse_match_clause(&mut self, optional: bool) -> Result<Clause, String> {
        self.expect(&CypherToken::Match)?;
        let clause = MatchClause {
            patterns: self.parse_pattern_list()?,
        };
        if optional {
            Ok(Clause::OptionalMatch(clause))
        } else {
            Ok(Clause::Match(clause))
        }
    }

    /// One or more comma-separated patterns
    fn parse_pattern_list(&mut self) -> Result<Vec<Pattern>, String> {
        let mut patterns = vec![self.parse_pattern()?];
        while self.eat(&CypherToken::Comma) {
            patterns.push(self.parse_pattern()?);
        }
        Ok(patterns)
    }

    fn parse_pattern(&mut self) -> Result<Pattern, String> {
        let mut elements = vec![PatternElement::Node(self.parse_node_pattern()?)];
        loop {
            let starts_edge = match self.peek() {
                Some(CypherToken::Dash) => true,
                Some(CypherToken::LessThan) => self.peek_at(1) == Some(&CypherToken::Dash),
                _ => false,
            };
            if !starts_edge {
                break;
            }
            elements.push(PatternElement::Edge(self.parse_edge_pattern()?));
            elements.push(PatternElement::Node(self.parse_node_pattern()?));
        }
        Ok(Pattern { elements })
    }

    /// (var:Label:Other {key: value})
    fn parse_node_pattern(&mut self) -> Result<NodePattern, String> {
        self.expect(&CypherToken::LParen)?;
        let mut node = NodePattern::default();

        if let Some(CypherToken::Identifier(name)) = self.peek().cloned() {
            self.advance();
            node.variable = Some(name);
        }
        while self.eat(&CypherToken::Colon) {
            node.labels.push(self.expect_identifier("node label")?);
        }
        if self.check(&CypherToken::LBrace) {
            node.properties = self.parse_property_map()?;
        }

        self.expect(&CypherToken::RParen)?;
        Ok(node)
    }

    /// -[var:TYPE|OTHER {k: v}]->, <-[...]-, -[...]-, -->, <--, --
    fn parse_edge_pattern(&mut self) -> Result<EdgePattern, String> {
        let incoming = self.eat(&CypherToken::LessThan);
        self.expect(&CypherToken::Dash)?;

        let mut variable = None;
        let mut rel_types = Vec::new();
        let mut properties = Vec::new();

        if self.eat(&CypherToken::LBracket) {
            if let Some(CypherToken::Identifier(name)) = self.peek().cloned() {
                self.advance();
                variable = Some(name);
            }
            if self.eat(&CypherToken::Colon) {
                rel_types.push(self.expect_identifier("relationship type")?);
                while self.eat(&CypherToken::Pipe) {
                    self.eat(&CypherToken::Colon);
                    rel_types.push(self.expect_identifier("relationship type")?);
                }
            }
            if self.check(&CypherToken::LBrace) {
                properties = self.parse_property_map()?;
            }
            self.expect(&CypherToken::RBracket)?;
        }

        self.expect(&CypherToken::Dash)?;
        let outgoing = self.eat(&CypherToken::GreaterThan);

        let direction = match (incoming, outgoing) {
            (false, true) => EdgeDirection::Outgoing,
            (true, false) => EdgeDirection::Incoming,
            (false, false) => EdgeDirection::Both,
            (true, true) => return Err("Edge cannot point both ways: <-[]->".to_string()),
        };

        Ok(EdgePattern {
            variable,
            rel_types,
            direction,
            properties,
        })
    }

    /// {key: literal | $param, ...}
    fn parse_property_map(&mut self) -> Result<Vec<(String, PropertyMatcher)>, String> {
        self.expect(&CypherToken::LBrace)?;
        let mut props = Vec::new();
        if !self.check(&CypherToken::RBrace) {
            loop {
                let key = self.expect_identifier("property name")?;
                self.expect(&CypherToken::Colon)?;
                let matcher = match self.parse_expression()? {
                    Expression::Literal(v) => PropertyMatcher::Equals(v),
                    Expression::Negate(inner) => match *inner {
                        Expression::Literal(Value::Int64(i)) => {
                            PropertyMatcher::Equals(Value::Int64(-i))
                        }
                        Expression::Literal(Value::Float64(f)) => {
                            PropertyMatcher::Equals(Value::Float64(-f))
                        }
                        _ => return Err(format!("Unsupported value for property '{}'", key)),
                    },
                    Expression::Parameter(name) => PropertyMatcher::Parameter(name),
                    _ => return Err(format!("Unsupported value for property '{}'", key)),
                };
                props.push((key, matcher));
                if !self.eat(&CypherToken::Comma) {
                    break;
                }
            }
        }
        self.expect(&CypherToken::RBrace)?;
        Ok(props)
    }

    // ========================================================================
    // WHERE Clause
    // ========================================================================

    fn parse_where_clause(&mut self) -> Result<Clause, String> {
        self.expect(&CypherToken::Where)?;
        let predicate = self.parse_predicate()?;
        Ok(Clause::Where(WhereClause { predicate }))
    }

    /// Parse predicate with OR as lowest precedence
    fn parse_predicate(&mut self) -> Result<Predicate, String> {
        let mut left = self.parse_and_predicate()?;
        while self.eat(&CypherToken::Or) {
            let right = self.parse_and_predicate()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_predicate(&mut self) -> Result<Predicate, String> {
        let mut left = self.parse_not_predicate()?;
        while self.eat(&CypherToken::And) {
            let right = self.parse_not_predicate()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not_predicate(&mut self) -> Result<Predicate, String> {
        if self.eat(&CypherToken::Not) {
            let inner = self.parse_not_predicate()?;
            Ok(Predicate::Not(Box::new(inner)))
        } else {
            self.parse_comparison_predicate()
        }
    }

    /// Comparisons plus IS [NOT] NULL, IN, STARTS WITH, ENDS WITH, CONTAINS
    fn parse_comparison_predicate(&mut self) -> Result<Predicate, String> {
        if self.eat(&CypherToken::LParen) {
            let pred = self.parse_predicate()?;
            self.expect(&CypherToken::RParen)?;
            return Ok(pred);
        }

        let left = self.parse_expression()?;

        match self.peek() {
            Some(CypherToken::Is) => {
                self.advance();
                let negated = self.eat(&CypherToken::Not);
                self.expect(&CypherToken::Null)?;
                return Ok(if negated {
                    Predicate::IsNotNull(left)
                } else {
                    Predicate::IsNull(left)
                });
            }
            Some(CypherToken::In) => {
                self.advance();
                let list = self.parse_expression()?;
                return Ok(Predicate::In { expr: left, list });
            }
            Some(CypherToken::StartsWith) => {
                self.advance();
                self.expect(&CypherToken::With)?;
                let pattern = self.parse_expression()?;
                return Ok(Predicate::StartsWith {
                    expr: left,
                    pattern,
                });
            }
            Some(CypherToken::EndsWith) => {
                self.advance();
                self.expect(&CypherToken::With)?;
                let pattern = self.parse_expression()?;
                return Ok(Predicate::EndsWith {
                    expr: left,
                    pattern,
                });
            }
            Some(CypherToken::Contains) => {
                self.advance();
                let pattern = self.parse_expression()?;
                return Ok(Predicate::Contains {
                    expr: left,
                    pattern,
                });
            }
            _ => {}
        }

        let operator = match self.peek() {
            Some(CypherToken::Equals) => ComparisonOp::Equals,
            Some(CypherToken::NotEquals) => ComparisonOp::NotEquals,
            Some(CypherToken::LessThan) => ComparisonOp::LessThan,
            Some(CypherToken::LessThanEquals) => ComparisonOp::LessThanEq,
            Some(CypherToken::GreaterThan) => ComparisonOp::GreaterThan,
            Some(CypherToken::GreaterThanEquals) => ComparisonOp::GreaterThanEq,
            _ => {
                // Bare expression used as a boolean
                return Ok(Predicate::Comparison {
                    left,
                    operator: ComparisonOp::Equals,
                    right: Expression::Literal(Value::Boolean(true)),
                });
            }
        };

        self.advance();
        let right = self.parse_expression()?;

        Ok(Predicate::Comparison {
            left,
            operator,
            right,
        })
    }

    // ========================================================================
    // Expression Parser
    // ========================================================================

    /// additive (+, -) < multiplicative (*, /) < unary (-) < primary
    fn parse_expression(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            match self.peek() {
                Some(CypherToken::Plus) => {
                    self.advance();
                    let right = self.parse_multiplicative_expression()?;
                    left = Expression::Add(Box::new(left), Box::new(right));
                }
                // A dash followed by '[' or '-' or '>' belongs to an edge pattern
                Some(CypherToken::Dash)
                    if matches!(
                        self.peek_at(1),
                        Some(CypherToken::IntLit(_))
                            | Some(CypherToken::FloatLit(_))
                            | Some(CypherToken::Identifier(_))
                            | Some(CypherToken::Parameter(_))
                            | Some(CypherToken::LParen)
                    ) =>
                {
                    self.advance();
                    let right = self.parse_multiplicative_expression()?;
                    left = Expression::Subtract(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> Result<Expression, String> {
        let mut left = self.parse_unary_expression()?;

        loop {
            match self.peek() {
                Some(CypherToken::Star) => {
                    self.advance();
                    let right = self.parse_unary_expression()?;
                    left = Expression::Multiply(Box::new(left), Box::new(right));
                }
                Some(CypherToken::Slash) => {
                    self.advance();
                    let right = self.parse_unary_expression()?;
                    left = Expression::Divide(Box::new(left), Box::new(right));
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<Expression, String> {
        if self.eat(&CypherToken::Dash) {
            let inner = self.parse_primary_expression()?;
            Ok(Expression::Negate(Box::new(inner)))
        } else {
            self.parse_primary_expression()
        }
    }

    fn parse_primary_expression(&mut self) -> Result<Expression, String> {
        let token = match self.advance().cloned() {
            Some(t) => t,
            None => return Err("Unexpected end of query in expression".to_string()),
        };
        match token {
            CypherToken::IntLit(n) => Ok(Expression::Literal(Value::Int64(n))),
            CypherToken::FloatLit(f) => Ok(Expression::Literal(Value::Float64(f))),
            CypherToken::StringLit(s) => Ok(Expression::Literal(Value::String(s))),
            CypherToken::True => Ok(Expression::Literal(Value::Boolean(true))),
            CypherToken::False => Ok(Expression::Literal(Value::Boolean(false))),
            CypherToken::Null => Ok(Expression::Literal(Value::Null)),
            CypherToken::Star => Ok(Expression::Star),
            CypherToken::Parameter(name) => Ok(Expression::Parameter(name)),
            CypherToken::LParen => {
                let expr = self.parse_expression()?;
                self.expect(&CypherToken::RParen)?;
                Ok(expr)
            }
            CypherToken::LBracket => {
                let mut items = Vec::new();
                if !self.check(&CypherToken::RBracket) {
                    items.push(self.parse_expression()?);
                    while self.eat(&CypherToken::Comma) {
                        items.push(self.parse_expression()?);
                    }
                }
                self.expect(&CypherToken::RBracket)?;
                Ok(Expression::ListLiteral(items))
            }
            CypherToken::Case => self.parse_case_expression(),
            CypherToken::Identifier(name) => {
                if name.eq_ignore_ascii_case("count") && self.check(&CypherToken::LBrace) {
                    return self.parse_count_subquery();
                }
                if self.check(&CypherToken::LParen) {
                    return self.parse_function_call(name);
                }
                if self.eat(&CypherToken::Dot) {
                    let property = self.expect_identifier("property name after '.'")?;
                    return Ok(Expression::PropertyAccess {
                        variable: name,
                        property,
                    });
                }
                Ok(Expression::Variable(name))
            }
            t => Err(format!("Unexpected token in expression: {:?}", t)),
        }
    }

    /// name(args...) with optional DISTINCT
    fn parse_function_call(&mut self, name: String) -> Result<Expression, String> {
        self.expect(&CypherToken::LParen)?;
        let distinct = self.eat(&CypherToken::Distinct);

        let mut args = Vec::new();
        if !self.check(&CypherToken::RParen) {
            args.push(self.parse_expression()?);
            while self.eat(&CypherToken::Comma) {
                args.push(self.parse_expression()?);
            }
        }
        self.expect(&CypherToken::RParen)?;

        Ok(Expression::FunctionCall {
            name,
            args,
            distinct,
        })
    }

    /// COUNT { MATCH pattern [, pattern] [WHERE predicate] } (COUNT already consumed)
    fn parse_count_subquery(&mut self) -> Result<Expression, String> {
        self.expect(&CypherToken::LBrace)?;
        self.expect(&CypherToken::Match)?;
        let patterns = self.parse_pattern_list()?;
        let where_clause = if self.eat(&CypherToken::Where) {
            Some(self.parse_predicate()?)
        } else {
            None
        };
        self.expect(&CypherToken::RBrace)?;
        Ok(Expression::CountSubquery(Box::new(Subquery {
            patterns,
            where_clause,
        })))
    }

    /// CASE token already consumed.
    /// Generic form: CASE WHEN predicate THEN result [...] [ELSE default] END
    /// Simple form:  CASE operand WHEN value THEN result [...] [ELSE default] END
    fn parse_case_expression(&mut self) -> Result<Expression, String> {
        let operand = if self.check(&CypherToken::When) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };

        let mut when_clauses = Vec::new();
        while self.eat(&CypherToken::When) {
            let condition = if operand.is_some() {
                CaseCondition::Expression(self.parse_expression()?)
            } else {
                CaseCondition::Predicate(self.parse_predicate()?)
            };
            self.expect(&CypherToken::Then)?;
            let result = self.parse_expression()?;
            when_clauses.push((condition, result));
        }

        if when_clauses.is_empty() {
            return Err("CASE expression requires at least one WHEN clause".to_string());
        }

        let else_expr = if self.eat(&CypherToken::Else) {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.expect(&CypherToken::End)?;

        Ok(Expression::Case {
            operand,
            when_clauses,
            else_expr,
        })
    }

    // ========================================================================
    // RETURN / WITH
    // ========================================================================

    fn parse_return_clause(&mut self) -> Result<Clause, String> {
        self.expect(&CypherToken::Return)?;
        let distinct = self.eat(&CypherToken::Distinct);

        if self.eat(&CypherToken::Star) {
            return Ok(Clause::Return(ReturnClause {
                items: Vec::new(),
                distinct,
                star: true,
            }));
        }

        let items = self.parse_return_items()?;
        Ok(Clause::Return(ReturnClause {
            items,
            distinct,
            star: false,
        }))
    }

    fn parse_return_items(&mut self) -> Result<Vec<ReturnItem>, String> {
        let mut items = vec![self.parse_return_item()?];
        while self.eat(&CypherToken::Comma) {
            items.push(self.parse_return_item()?);
        }
        Ok(items)
    }

    fn parse_return_item(&mut self) -> Result<ReturnItem, String> {
        let expression = self.parse_expression()?;
        let alias = if self.eat(&CypherToken::As) {
            Some(self.expect_identifier("alias name after AS")?)
        } else {
            None
        };
        Ok(ReturnItem { expression, alias })
    }

    fn parse_with_clause(&mut self) -> Result<Clause, String> {
        self.expect(&CypherToken::With)?;
        let distinct = self.eat(&CypherToken::Distinct);
        let items = self.parse_return_items()?;

        let where_clause = if self.eat(&CypherToken::Where) {
            Some(WhereClause {
                predicate: self.parse_predicate()?,
            })
        } else {
            None
        };

        Ok(Clause::With(WithClause {
            items,
            distinct,
            where_clause,
        }))
    }

    // ========================================================================
    // ORDER BY / UNWIND / CALL
    // ========================================================================

    fn parse_order_by_clause(&mut self) -> Result<Clause, String> {
        self.expect(&CypherToken::Order)?;
        self.expect(&CypherToken::By)?;

        let mut items = Vec::new();
        loop {
            let expression = self.parse_expression()?;
            let ascending = if self.eat(&CypherToken::Desc) {
                false
            } else {
                self.eat(&CypherToken::Asc);
                true
            };
            items.push(OrderItem {
                expression,
                ascending,
            });
            if !self.eat(&CypherToken::Comma) {
                break;
            }
        }

        Ok(Clause::OrderBy(OrderByClause { items }))
    }

    fn parse_unwind_clause(&mut self) -> Result<Clause, String> {
        self.expect(&CypherToken::Unwind)?;
        let expression = self.parse_expression()?;
        self.expect(&CypherToken::As)?;
        let alias = self.expect_identifier("alias after UNWIND ... AS")?;
        Ok(Clause::Unwind(UnwindClause { expression, alias }))
    }

    fn parse_call_clause(&mut self) -> Result<Clause, String> {
        self.expect(&CypherToken::Call)?;
        let procedure = self.expect_identifier("procedure name after CALL")?;
        self.expect(&CypherToken::LParen)?;
        let mut args = Vec::new();
        if !self.check(&CypherToken::RParen) {
            args.push(self.parse_expression()?);
            while self.eat(&CypherToken::Comma) {
                args.push(self.parse_expression()?);
            }
        }
        self.expect(&CypherToken::RParen)?;
        Ok(Clause::Call(CallClause { procedure, args }))
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a Cypher query string into a CypherQuery AST
pub fn parse_cypher(input: &str) -> Result<CypherQuery, String> {
    let tokens = super::tokenizer::tokenize_cypher(input)?;
    let mut parser = CypherParser::new(tokens);
    parser.parse_query()
}

// ============================================================================
// Tests
// ============================================================================

// src/graph/cypher/executor.rs
// Pipeline executor for Cypher queries

use super::ast::*;
use super::result::*;
use crate::datatypes::values::Value;
use crate::graph::pattern_matching::{MatchBinding, Pattern, PatternExecutor, PatternMatch};
use crate::graph::schema::DirGraph;
use crate::graph::value_operations::{
    arithmetic_add, arithmetic_div, arithmetic_mul, arithmetic_negate, arithmetic_sub,
    compare_values, format_value_compact, format_value_compact_into, value_to_f64, values_equal,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

// ============================================================================
// Executor
// ============================================================================

pub struct CypherExecutor<'a> {
    graph: &'a DirGraph,
    params: &'a HashMap<String, Value>,
}

impl<'a> CypherExecutor<'a> {
    pub fn with_params(graph: &'a DirGraph, params: &'a HashMap<String, Value>) -> Self {
        CypherExecutor { graph, params }
    }

    /// Execute a parsed Cypher query (read-only)
    pub fn execute(&self, query: &CypherQuery) -> Result<CypherResult, String> {
        // The pipeline starts from a single empty row so that MATCH, CALL and
        // UNWIND all expand rows the same way.
        let mut result_set = ResultSet {
            rows: vec![ResultRow::new()],
            columns: Vec::new(),
        };

        for clause in &query.clauses {
            result_set = self.execute_single_clause(clause, result_set)?;
        }

        self.finalize_result(result_set)
    }

    fn execute_single_clause(
        &self,
        clause: &Clause,
        result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        match clause {
            Clause::Match(m) => self.execute_match(m, result_set),
            Clause::OptionalMatch(m) => self.execute_optional_match(m, result_set),
            Clause::Where(w) => self.execute_where(w, result_set),
            Clause::Return(r) => self.execute_return(r, result_set),
            Clause::With(w) => self.execute_with(w, result_set),
            Clause::OrderBy(o) => self.execute_order_by(o, result_set),
            Clause::Limit(l) => self.execute_limit(l, result_set),
            Clause::Skip(s) => self.execute_skip(s, result_set),
            Clause::Unwind(u) => self.execute_unwind(u, result_set),
            Clause::Call(c) => self.execute_call(c, result_set),
        }
    }

    // ========================================================================
    // MATCH
    // ========================================================================

    /// Expand every row by the clause's patterns. Comma-separated patterns
    /// are joined on their shared variables.
    fn expand_row(&self, row: &ResultRow, patterns: &[Pattern]) -> Result<Vec<ResultRow>, String> {
        let mut rows = vec![row.clone()];
        for pattern in patterns {
            let mut next = Vec::new();
            for current in &rows {
                let executor = PatternExecutor::with_bindings(
                    self.graph,
                    self.params,
                    current.node_bindings.to_hashmap(),
                );
                for m in executor.execute(pattern)? {
                    if !bindings_compatible(current, &m) {
                        continue;
                    }
                    let mut new_row = current.clone();
                    merge_match_into_row(&mut new_row, &m);
                    next.push(new_row);
                }
            }
            rows = next;
        }
        Ok(rows)
    }

    fn execute_match(
        &self,
        clause: &MatchClause,
        existing: ResultSet,
    ) -> Result<ResultSet, String> {
        let mut rows = Vec::new();
        for row in &existing.rows {
            rows.extend(self.expand_row(row, &clause.patterns)?);
        }
        Ok(ResultSet {
            rows,
            columns: existing.columns,
        })
    }

    // ========================================================================
    // OPTIONAL MATCH
    // ========================================================================

    fn execute_optional_match(
        &self,
        clause: &MatchClause,
        existing: ResultSet,
    ) -> Result<ResultSet, String> {
        let mut rows = Vec::new();
        for row in &existing.rows {
            let expanded = self.expand_row(row, &clause.patterns)?;
            if expanded.is_empty() {
                // Unmatched variables stay unbound and read as null
                rows.push(row.clone());
            } else {
                rows.extend(expanded);
            }
        }
        Ok(ResultSet {
            rows,
            columns: existing.columns,
        })
    }

    // ========================================================================
    // WHERE
    // ========================================================================

    fn execute_where(
        &self,
        clause: &WhereClause,
        mut result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        let mut filtered_rows = Vec::with_capacity(result_set.rows.len());
        for row in result_set.rows {
            if self.evaluate_predicate(&clause.predicate, &row)? {
                filtered_rows.push(row);
            }
        }
        result_set.rows = filtered_rows;
        Ok(result_set)
    }

    fn evaluate_predicate(&self, pred: &Predicate, row: &ResultRow) -> Result<bool, String> {
        match pred {
            Predicate::Comparison {
                left,
                operator,
                right,
            } => {
                let left_val = self.evaluate_expression(left, row)?;
                let right_val = self.evaluate_expression(right, row)?;
                Ok(evaluate_comparison(&left_val, *operator, &right_val))
            }
            Predicate::And(left, right) => {
                if !self.evaluate_predicate(left, row)? {
                    return Ok(false);
                }
                self.evaluate_predicate(right, row)
            }
            Predicate::Or(left, right) => {
                if self.evaluate_predicate(left, row)? {
                    return Ok(true);
                }
                self.evaluate_predicate(right, row)
            }
            Predicate::Not(inner) => Ok(!self.evaluate_predicate(inner, row)?),
            Predicate::IsNull(expr) => Ok(self.evaluate_expression(expr, row)?.is_null()),
            Predicate::IsNotNull(expr) => Ok(!self.evaluate_expression(expr, row)?.is_null()),
            Predicate::In { expr, list } => {
                let val = self.evaluate_expression(expr, row)?;
                if val.is_null() {
                    return Ok(false);
                }
                match self.evaluate_expression(list, row)? {
                    Value::List(items) => Ok(items.iter().any(|item| values_equal(&val, item))),
                    Value::Null => Ok(false),
                    other => Err(format!("IN expects a list, got {}", other.type_name())),
                }
            }
            Predicate::StartsWith { expr, pattern } => {
                self.string_predicate(expr, pattern, row, |s, p| s.starts_with(p))
            }
            Predicate::EndsWith { expr, pattern } => {
                self.string_predicate(expr, pattern, row, |s, p| s.ends_with(p))
            }
            Predicate::Contains { expr, pattern } => {
                self.string_predicate(expr, pattern, row, |s, p| s.contains(p))
            }
        }
    }

    fn string_predicate(
        &self,
        expr: &Expression,
        pattern: &Expression,
        row: &ResultRow,
        test: impl Fn(&str, &str) -> bool,
    ) -> Result<bool, String> {
        let val = self.evaluate_expression(expr, row)?;
        let pat = self.evaluate_expression(pattern, row)?;
        match (&val, &pat) {
            (Value::String(s), Value::String(p)) => Ok(test(s, p)),
            _ => Ok(false),
        }
    }

    // ========================================================================
    // Expression Evaluation
    // ========================================================================

    /// Evaluate an expression against a row, resolving property access via NodeIndex
    fn evaluate_expression(&self, expr: &Expression, row: &ResultRow) -> Result<Value, String> {
        match expr {
            Expression::PropertyAccess { variable, property } => {
                Ok(self.resolve_property(variable, property, row))
            }
            Expression::Variable(name) => Ok(self.resolve_variable(name, row)),
            Expression::Literal(val) => Ok(val.clone()),
            Expression::Parameter(name) => self
                .params
                .get(name)
                .cloned()
                .ok_or_else(|| format!("Missing parameter: ${}", name)),
            Expression::Star => Ok(Value::Int64(1)),
            Expression::Add(left, right) => {
                let l = self.evaluate_expression(left, row)?;
                let r = self.evaluate_expression(right, row)?;
                Ok(arithmetic_add(&l, &r))
            }
            Expression::Subtract(left, right) => {
                let l = self.evaluate_expression(left, row)?;
                let r = self.evaluate_expression(right, row)?;
                Ok(arithmetic_sub(&l, &r))
            }
            Expression::Multiply(left, right) => {
                let l = self.evaluate_expression(left, row)?;
                let r = self.evaluate_expression(right, row)?;
                Ok(arithmetic_mul(&l, &r))
            }
            Expression::Divide(left, right) => {
                let l = self.evaluate_expression(left, row)?;
                let r = self.evaluate_expression(right, row)?;
                Ok(arithmetic_div(&l, &r))
            }
            Expression::Negate(inner) => {
                let val = self.evaluate_expression(inner, row)?;
                Ok(arithmetic_negate(&val))
            }
            Expression::FunctionCall { name, args, .. } => {
                self.evaluate_scalar_function(name, args, row)
            }
            Expression::ListLiteral(items) => {
                let values = items
                    .iter()
                    .map(|item| self.evaluate_expression(item, row))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expression::Case {
                operand,
                when_clauses,
                else_expr,
            } => self.evaluate_case(operand.as_deref(), when_clauses, else_expr.as_deref(), row),
            Expression::CountSubquery(subquery) => self.evaluate_count_subquery(subquery, row),
        }
    }

    /// COUNT { MATCH ... [WHERE ...] } correlated with the current row
    fn evaluate_count_subquery(&self, subquery: &Subquery, row: &ResultRow) -> Result<Value, String> {
        let matches = self.expand_row(row, &subquery.patterns)?;
        let count = match &subquery.where_clause {
            Some(predicate) => {
                let mut n = 0i64;
                for m in &matches {
                    if self.evaluate_predicate(predicate, m)? {
                        n += 1;
                    }
                }
                n
            }
            None => matches.len() as i64,
        };
        Ok(Value::Int64(count))
    }

    fn evaluate_case(
        &self,
        operand: Option<&Expression>,
        when_clauses: &[(CaseCondition, Expression)],
        else_expr: Option<&Expression>,
        row: &ResultRow,
    ) -> Result<Value, String> {
        if let Some(operand_expr) = operand {
            // Simple form: CASE expr WHEN val THEN result ...
            let operand_val = self.evaluate_expression(operand_expr, row)?;
            for (condition, result) in when_clauses {
                if let CaseCondition::Expression(cond_expr) = condition {
                    let cond_val = self.evaluate_expression(cond_expr, row)?;
                    if values_equal(&operand_val, &cond_val) {
                        return self.evaluate_expression(result, row);
                    }
                }
            }
        } else {
            // Generic form: CASE WHEN predicate THEN result ...
            for (condition, result) in when_clauses {
                if let CaseCondition::Predicate(pred) = condition {
                    if self.evaluate_predicate(pred, row)? {
                        return self.evaluate_expression(result, row);
                    }
                }
            }
        }

        match else_expr {
            Some(else_e) => self.evaluate_expression(else_e, row),
            None => Ok(Value::Null),
        }
    }

    /// Bound variable as a value: projected values first, then nodes and edges
    /// as maps. Unbound variables (OPTIONAL MATCH misses) are null.
    fn resolve_variable(&self, name: &str, row: &ResultRow) -> Value {
        if let Some(val) = row.projected.get(name) {
            return val.clone();
        }
        if let Some(&idx) = row.node_bindings.get(name) {
            return self.graph.node(idx).map_or(Value::Null, |n| n.to_value());
        }
        if let Some(edge) = row.edge_bindings.get(name) {
            return self
                .graph
                .graph
                .edge_weight(edge.edge_index)
                .map_or(Value::Null, |e| e.to_value());
        }
        Value::Null
    }

    /// Resolve property access: variable.property
    fn resolve_property(&self, variable: &str, property: &str, row: &ResultRow) -> Value {
        if let Some(val) = row.projected.get(variable) {
            return match val {
                Value::Map(map) => map.get(property).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            };
        }
        if let Some(&idx) = row.node_bindings.get(variable) {
            return self.graph.node(idx).map_or(Value::Null, |n| n.get(property));
        }
        if let Some(edge) = row.edge_bindings.get(variable) {
            return self
                .graph
                .graph
                .edge_weight(edge.edge_index)
                .map_or(Value::Null, |e| e.get(property));
        }
        Value::Null
    }

    fn evaluate_scalar_function(
        &self,
        name: &str,
        args: &[Expression],
        row: &ResultRow,
    ) -> Result<Value, String> {
        let lower = name.to_lowercase();
        let arg = |i: usize| -> Result<Value, String> {
            match args.get(i) {
                Some(expr) => self.evaluate_expression(expr, row),
                None => Err(format!("{}() expects at least {} argument(s)", name, i + 1)),
            }
        };

        match lower.as_str() {
            "toupper" => match arg(0)? {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                _ => Ok(Value::Null),
            },
            "tolower" => match arg(0)? {
                Value::String(s) => Ok(Value::String(s.to_lowercase())),
                _ => Ok(Value::Null),
            },
            "tostring" => match arg(0)? {
                Value::Null => Ok(Value::Null),
                other => Ok(Value::String(other.to_string())),
            },
            "size" => match arg(0)? {
                Value::String(s) => Ok(Value::Int64(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Int64(items.len() as i64)),
                Value::Map(map) => Ok(Value::Int64(map.len() as i64)),
                _ => Ok(Value::Null),
            },
            "coalesce" => {
                for expr in args {
                    let val = self.evaluate_expression(expr, row)?;
                    if !val.is_null() {
                        return Ok(val);
                    }
                }
                Ok(Value::Null)
            }
            "label" => {
                // label(n) / label(r): the node or relationship table name
                if let Some(Expression::Variable(var)) = args.first() {
                    if let Some(&idx) = row.node_bindings.get(var) {
                        if let Some(node) = self.graph.node(idx) {
                            return Ok(Value::String(node.label.clone()));
                        }
                    }
                    if let Some(edge) = row.edge_bindings.get(var) {
                        if let Some(data) = self.graph.graph.edge_weight(edge.edge_index) {
                            return Ok(Value::String(data.label.clone()));
                        }
                    }
                }
                Ok(Value::Null)
            }
            "id" => {
                // id(n): the node's primary key value
                if let Some(Expression::Variable(var)) = args.first() {
                    if let Some(&idx) = row.node_bindings.get(var) {
                        if let Some(node) = self.graph.node(idx) {
                            return Ok(self
                                .graph
                                .catalog()
                                .node_table(&node.label)
                                .map_or(Value::Null, |t| node.get(&t.primary_key)));
                        }
                    }
                }
                Ok(Value::Null)
            }
            "count" | "sum" | "avg" | "min" | "max" | "collect" => Err(format!(
                "Aggregate function '{}' cannot be used outside of RETURN/WITH",
                name
            )),
            _ => Err(format!("Unknown function: {}", name)),
        }
    }

    // ========================================================================
    // RETURN
    // ========================================================================

    fn execute_return(
        &self,
        clause: &ReturnClause,
        result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        if clause.star {
            let columns = match result_set.rows.first() {
                Some(row) => star_columns(row),
                None => result_set.columns.clone(),
            };
            let items: Vec<ReturnItem> = columns
                .into_iter()
                .map(|name| ReturnItem {
                    expression: Expression::Variable(name),
                    alias: None,
                })
                .collect();
            return self.project(&items, clause.distinct, result_set);
        }
        self.project(&clause.items, clause.distinct, result_set)
    }

    fn project(
        &self,
        items: &[ReturnItem],
        distinct: bool,
        result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        let has_aggregation = items
            .iter()
            .any(|item| is_aggregate_expression(&item.expression));

        let mut projected = if has_aggregation {
            self.project_with_aggregation(items, result_set)?
        } else {
            self.project_rows(items, result_set)?
        };

        if distinct {
            let mut seen = HashSet::new();
            let columns = projected.columns.clone();
            projected.rows.retain(|row| {
                let mut key = String::new();
                for col in &columns {
                    format_value_compact_into(
                        &mut key,
                        row.projected.get(col).unwrap_or(&Value::Null),
                    );
                    key.push('\x1F');
                }
                seen.insert(key)
            });
        }

        Ok(projected)
    }

    /// Simple projection without aggregation
    fn project_rows(&self, items: &[ReturnItem], result_set: ResultSet) -> Result<ResultSet, String> {
        let columns: Vec<String> = items.iter().map(return_item_column_name).collect();
        let mut rows = Vec::with_capacity(result_set.rows.len());

        for row in &result_set.rows {
            let mut new_row = carry_bindings(row, items);
            for (item, column) in items.iter().zip(&columns) {
                let val = self.evaluate_expression(&item.expression, row)?;
                new_row.projected.insert(column.clone(), val);
            }
            rows.push(new_row);
        }

        Ok(ResultSet { rows, columns })
    }

    /// Projection with grouping keys and aggregate functions
    fn project_with_aggregation(
        &self,
        items: &[ReturnItem],
        result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        let columns: Vec<String> = items.iter().map(return_item_column_name).collect();
        let group_key_indices: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !is_aggregate_expression(&item.expression))
            .map(|(i, _)| i)
            .collect();

        // An unmatched pipeline still yields one row when there are no keys
        if group_key_indices.is_empty() {
            let rows: Vec<&ResultRow> = result_set.rows.iter().collect();
            let mut projected = Bindings::new();
            for (item, column) in items.iter().zip(&columns) {
                let val = self.evaluate_aggregate(&item.expression, &rows)?;
                projected.insert(column.clone(), val);
            }
            return Ok(ResultSet {
                rows: vec![ResultRow::from_projected(projected)],
                columns,
            });
        }

        // Group rows by a composite string key, preserving first-seen order
        let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();
        let mut group_index_map: HashMap<String, usize> = HashMap::new();
        let mut key_buf = String::with_capacity(64);

        for (row_idx, row) in result_set.rows.iter().enumerate() {
            key_buf.clear();
            let mut key_values = Vec::with_capacity(group_key_indices.len());
            for &i in &group_key_indices {
                let expr = &items[i].expression;
                let val = self.evaluate_expression(expr, row)?;
                // Nodes group by identity rather than by property contents
                match expr {
                    Expression::Variable(var) if row.node_bindings.contains_key(var) => {
                        if let Some(idx) = row.node_bindings.get(var) {
                            key_buf.push_str(&format!("n:{}", idx.index()));
                        }
                    }
                    _ => format_value_compact_into(&mut key_buf, &val),
                }
                key_buf.push('\x1F');
                key_values.push(val);
            }

            if let Some(&group_idx) = group_index_map.get(&key_buf) {
                groups[group_idx].1.push(row_idx);
            } else {
                group_index_map.insert(key_buf.clone(), groups.len());
                groups.push((key_values, vec![row_idx]));
            }
        }

        let mut result_rows = Vec::with_capacity(groups.len());
        for (key_values, row_indices) in groups {
            let group_rows: Vec<&ResultRow> =
                row_indices.iter().map(|&i| &result_set.rows[i]).collect();

            // Keep node/edge bindings of grouped variables for later clauses
            let mut row = carry_bindings(group_rows[0], items);
            let mut keys = key_values.into_iter();
            for (idx, (item, column)) in items.iter().zip(&columns).enumerate() {
                let val = if group_key_indices.contains(&idx) {
                    keys.next().unwrap_or(Value::Null)
                } else {
                    self.evaluate_aggregate(&item.expression, &group_rows)?
                };
                row.projected.insert(column.clone(), val);
            }
            result_rows.push(row);
        }

        Ok(ResultSet {
            rows: result_rows,
            columns,
        })
    }

    /// Evaluate an aggregate (possibly nested inside arithmetic) over a group
    fn evaluate_aggregate(&self, expr: &Expression, rows: &[&ResultRow]) -> Result<Value, String> {
        match expr {
            Expression::FunctionCall {
                name,
                args,
                distinct,
            } if is_aggregate_name(name) => {
                self.evaluate_aggregate_function(name, args, *distinct, rows)
            }
            Expression::Add(l, r) => Ok(arithmetic_add(
                &self.evaluate_aggregate(l, rows)?,
                &self.evaluate_aggregate(r, rows)?,
            )),
            Expression::Subtract(l, r) => Ok(arithmetic_sub(
                &self.evaluate_aggregate(l, rows)?,
                &self.evaluate_aggregate(r, rows)?,
            )),
            Expression::Multiply(l, r) => Ok(arithmetic_mul(
                &self.evaluate_aggregate(l, rows)?,
                &self.evaluate_aggregate(r, rows)?,
            )),
            Expression::Divide(l, r) => Ok(arithmetic_div(
                &self.evaluate_aggregate(l, rows)?,
                &self.evaluate_aggregate(r, rows)?,
            )),
            Expression::Negate(inner) => Ok(arithmetic_negate(&self.evaluate_aggregate(inner, rows)?)),
            // Non-aggregate part of an aggregate expression: first row of the group
            _ => match rows.first() {
                Some(row) => self.evaluate_expression(expr, row),
                None => Ok(Value::Null),
            },
        }
    }

    fn evaluate_aggregate_function(
        &self,
        name: &str,
        args: &[Expression],
        distinct: bool,
        rows: &[&ResultRow],
    ) -> Result<Value, String> {
        let arg = args
            .first()
            .ok_or_else(|| format!("{}() expects one argument", name))?;

        if matches!(arg, Expression::Star) {
            return if name.eq_ignore_ascii_case("count") {
                Ok(Value::Int64(rows.len() as i64))
            } else {
                Err(format!("{}(*) is not supported", name))
            };
        }

        // Non-null inputs in row order, deduplicated when DISTINCT
        let mut values = Vec::with_capacity(rows.len());
        let mut seen = HashSet::new();
        for row in rows {
            let val = self.evaluate_expression(arg, row)?;
            if val.is_null() {
                continue;
            }
            if distinct && !seen.insert(format_value_compact(&val)) {
                continue;
            }
            values.push(val);
        }

        match name.to_lowercase().as_str() {
            "count" => Ok(Value::Int64(values.len() as i64)),
            "collect" => Ok(Value::List(values)),
            "sum" => {
                if values.iter().all(|v| matches!(v, Value::Int64(_))) {
                    let mut total = 0i64;
                    for v in &values {
                        if let Value::Int64(i) = v {
                            total = match total.checked_add(*i) {
                                Some(t) => t,
                                None => return Ok(Value::Null),
                            };
                        }
                    }
                    Ok(Value::Int64(total))
                } else {
                    Ok(Value::Float64(values.iter().filter_map(value_to_f64).sum()))
                }
            }
            "avg" => {
                let nums: Vec<f64> = values.iter().filter_map(value_to_f64).collect();
                if nums.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::Float64(nums.iter().sum::<f64>() / nums.len() as f64))
                }
            }
            "min" => Ok(pick_extreme(values, Ordering::Less)),
            "max" => Ok(pick_extreme(values, Ordering::Greater)),
            _ => Err(format!("Unknown aggregate function: {}", name)),
        }
    }

    // ========================================================================
    // WITH
    // ========================================================================

    fn execute_with(&self, clause: &WithClause, result_set: ResultSet) -> Result<ResultSet, String> {
        let mut projected = self.project(&clause.items, clause.distinct, result_set)?;
        if let Some(ref where_clause) = clause.where_clause {
            projected = self.execute_where(where_clause, projected)?;
        }
        // WITH does not fix the output columns; a later RETURN does
        projected.columns.clear();
        Ok(projected)
    }

    // ========================================================================
    // ORDER BY
    // ========================================================================

    fn execute_order_by(
        &self,
        clause: &OrderByClause,
        mut result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        // Pre-compute sort keys for each row to avoid repeated evaluation
        let mut keyed = Vec::with_capacity(result_set.rows.len());
        for row in std::mem::take(&mut result_set.rows) {
            let mut keys = Vec::with_capacity(clause.items.len());
            for item in &clause.items {
                keys.push(self.evaluate_expression(&item.expression, &row)?);
            }
            keyed.push((keys, row));
        }

        // Stable sort keeps match order for ties
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, item) in clause.items.iter().enumerate() {
                if let Some(ordering) = compare_values(&a[i], &b[i]) {
                    let ordering = if item.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
            }
            Ordering::Equal
        });

        result_set.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(result_set)
    }

    // ========================================================================
    // LIMIT / SKIP
    // ========================================================================

    fn count_argument(&self, expr: &Expression, clause: &str) -> Result<usize, String> {
        match self.evaluate_expression(expr, &ResultRow::new())? {
            Value::Int64(n) if n >= 0 => Ok(n as usize),
            _ => Err(format!("{} requires a non-negative integer", clause)),
        }
    }

    fn execute_limit(
        &self,
        clause: &LimitClause,
        mut result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        let n = self.count_argument(&clause.count, "LIMIT")?;
        result_set.rows.truncate(n);
        Ok(result_set)
    }

    fn execute_skip(
        &self,
        clause: &SkipClause,
        mut result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        let n = self.count_argument(&clause.count, "SKIP")?;
        if n < result_set.rows.len() {
            result_set.rows = result_set.rows.split_off(n);
        } else {
            result_set.rows.clear();
        }
        Ok(result_set)
    }

    // ========================================================================
    // UNWIND
    // ========================================================================

    fn execute_unwind(
        &self,
        clause: &UnwindClause,
        result_set: ResultSet,
    ) -> Result<ResultSet, String> {
        let mut new_rows = Vec::new();
        for row in &result_set.rows {
            match self.evaluate_expression(&clause.expression, row)? {
                Value::List(items) => {
                    for item in items {
                        let mut new_row = row.clone();
                        new_row.projected.insert(clause.alias.clone(), item);
                        new_rows.push(new_row);
                    }
                }
                Value::Null => {}
                single => {
                    let mut new_row = row.clone();
                    new_row.projected.insert(clause.alias.clone(), single);
                    new_rows.push(new_row);
                }
            }
        }
        Ok(ResultSet {
            rows: new_rows,
            columns: result_set.columns,
        })
    }

    // ========================================================================
    // CALL (catalog procedures)
    // ========================================================================

    fn execute_call(&self, clause: &CallClause, result_set: ResultSet) -> Result<ResultSet, String> {
        let mut rows = Vec::new();
        let mut columns = Vec::new();
        for row in &result_set.rows {
            let args = clause
                .args
                .iter()
                .map(|a| self.evaluate_expression(a, row))
                .collect::<Result<Vec<_>, _>>()?;
            let (proc_columns, records) = self.call_procedure(&clause.procedure, &args)?;
            for record in records {
                let mut new_row = row.clone();
                for (column, value) in proc_columns.iter().zip(record) {
                    new_row.projected.insert(column.clone(), value);
                }
                rows.push(new_row);
            }
            columns = proc_columns;
        }
        Ok(ResultSet { rows, columns })
    }

    fn call_procedure(
        &self,
        procedure: &str,
        args: &[Value],
    ) -> Result<(Vec<String>, Vec<Vec<Value>>), String> {
        let catalog = self.graph.catalog();
        match procedure.to_lowercase().as_str() {
            "table_info" => {
                let table = match args {
                    [Value::String(name)] => name.trim_matches('`'),
                    _ => return Err("table_info() expects one table name".to_string()),
                };
                let columns = ["property id", "name", "type", "primary key"]
                    .map(String::from)
                    .to_vec();

                let records: Vec<Vec<Value>> = if let Some(def) = catalog.node_table(table) {
                    def.properties
                        .iter()
                        .enumerate()
                        .map(|(i, p)| {
                            vec![
                                Value::Int64(i as i64),
                                Value::String(p.name.clone()),
                                Value::String(p.data_type.type_string()),
                                Value::Boolean(p.name == def.primary_key),
                            ]
                        })
                        .collect()
                } else if let Some(def) = catalog.rel_table(table) {
                    def.properties
                        .iter()
                        .enumerate()
                        .map(|(i, p)| {
                            vec![
                                Value::Int64(i as i64),
                                Value::String(p.name.clone()),
                                Value::String(p.data_type.type_string()),
                                Value::Boolean(false),
                            ]
                        })
                        .collect()
                } else {
                    return Err(format!("Table {} does not exist.", table));
                };
                Ok((columns, records))
            }
            "show_tables" => {
                if !args.is_empty() {
                    return Err("show_tables() takes no arguments".to_string());
                }
                let columns = vec!["name".to_string(), "type".to_string()];
                let records = catalog
                    .node_tables
                    .iter()
                    .map(|t| vec![Value::String(t.name.clone()), Value::from("NODE")])
                    .chain(
                        catalog
                            .rel_tables
                            .iter()
                            .map(|t| vec![Value::String(t.name.clone()), Value::from("REL")]),
                    )
                    .collect();
                Ok((columns, records))
            }
            _ => Err(format!("Unknown procedure: {}", procedure)),
        }
    }

    // ========================================================================
    // Finalize
    // ========================================================================

    fn finalize_result(&self, result_set: ResultSet) -> Result<CypherResult, String> {
        let columns = if result_set.columns.is_empty() {
            // No RETURN: expose every bound variable of the first row
            match result_set.rows.first() {
                Some(row) => star_columns(row),
                None => return Ok(CypherResult::empty()),
            }
        } else {
            result_set.columns
        };

        if columns.is_empty() {
            return Ok(CypherResult::empty());
        }

        let rows = result_set
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| self.resolve_variable(col, row))
                    .collect()
            })
            .collect();

        Ok(CypherResult { columns, rows })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn bindings_compatible(row: &ResultRow, m: &PatternMatch) -> bool {
    m.bindings.iter().all(|(var, binding)| {
        match (row.node_bindings.get(var), binding) {
            (Some(&existing), MatchBinding::Node(idx)) => existing == *idx,
            (Some(_), MatchBinding::Edge { .. }) => false,
            (None, _) => true,
        }
    })
}

fn merge_match_into_row(row: &mut ResultRow, m: &PatternMatch) {
    for (var, binding) in &m.bindings {
        match *binding {
            MatchBinding::Node(idx) => row.node_bindings.insert(var.clone(), idx),
            MatchBinding::Edge {
                source,
                target,
                edge,
            } => row.edge_bindings.insert(
                var.clone(),
                EdgeBinding {
                    source,
                    target,
                    edge_index: edge,
                },
            ),
        }
    }
}

/// New row for a projection, keeping graph bindings of plainly projected
/// variables under their output name.
fn carry_bindings(row: &ResultRow, items: &[ReturnItem]) -> ResultRow {
    let mut new_row = ResultRow::new();
    for item in items {
        if let Expression::Variable(var) = &item.expression {
            let name = item.alias.clone().unwrap_or_else(|| var.clone());
            if let Some(&idx) = row.node_bindings.get(var) {
                new_row.node_bindings.insert(name.clone(), idx);
            }
            if let Some(&edge) = row.edge_bindings.get(var) {
                new_row.edge_bindings.insert(name, edge);
            }
        }
    }
    new_row
}

/// Every variable visible in a row, in binding order
fn star_columns(row: &ResultRow) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    let names = row
        .node_bindings
        .keys()
        .chain(row.edge_bindings.keys())
        .chain(row.projected.keys());
    for name in names {
        if !columns.contains(name) {
            columns.push(name.clone());
        }
    }
    columns
}

fn pick_extreme(values: Vec<Value>, wanted: Ordering) -> Value {
    let mut best: Option<Value> = None;
    for val in values {
        best = Some(match best {
            None => val,
            Some(current) => {
                if compare_values(&val, &current) == Some(wanted) {
                    val
                } else {
                    current
                }
            }
        });
    }
    best.unwrap_or(Value::Null)
}

fn is_aggregate_name(name: &str) -> bool {
    matches!(
        name.to_lowercase().as_str(),
        "count" | "sum" | "avg" | "min" | "max" | "collect"
    )
}

/// Check if an expression contains an aggregate function call.
/// COUNT subqueries are per-row and never aggregate.
pub fn is_aggregate_expression(expr: &Expression) -> bool {
    match expr {
        Expression::FunctionCall { name, args, .. } => {
            is_aggregate_name(name) || args.iter().any(is_aggregate_expression)
        }
        Expression::Add(l, r)
        | Expression::Subtract(l, r)
        | Expression::Multiply(l, r)
        | Expression::Divide(l, r) => is_aggregate_expression(l) || is_aggregate_expression(r),
        Expression::Negate(inner) => is_aggregate_expression(inner),
        Expression::ListLiteral(items) => items.iter().any(is_aggregate_expression),
        Expression::Case {
            when_clauses,
            else_expr,
            ..
        } => {
            when_clauses
                .iter()
                .any(|(_, result)| is_aggregate_expression(result))
                || else_expr
                    .as_ref()
                    .is_some_and(|e| is_aggregate_expression(e))
        }
        _ => false,
    }
}

/// Get the column name for a return item
fn return_item_column_name(item: &ReturnItem) -> String {
    match &item.alias {
        Some(alias) => alias.clone(),
        None => expression_to_string(&item.expression),
    }
}

/// Convert an expression to its string representation (for column naming)
fn expression_to_string(expr: &Expression) -> String {
    match expr {
        Expression::PropertyAccess { variable, property } => format!("{}.{}", variable, property),
        Expression::Variable(name) => name.clone(),
        Expression::Literal(val) => val.to_string(),
        Expression::Parameter(name) => format!("${}", name),
        Expression::FunctionCall {
            name,
            args,
            distinct,
        } => {
            let args_str: Vec<String> = args.iter().map(expression_to_string).collect();
            if *distinct {
                format!("{}(DISTINCT {})", name, args_str.join(", "))
            } else {
                format!("{}({})", name, args_str.join(", "))
            }
        }
        Expression::Star => "*".to_string(),
        Expression::Add(l, r) => format!("{} + {}", expression_to_string(l), expression_to_string(r)),
        Expression::Subtract(l, r) => {
            format!("{} - {}", expression_to_string(l), expression_to_string(r))
        }
        Expression::Multiply(l, r) => {
            format!("{} * {}", expression_to_string(l), expression_to_string(r))
        }
        Expression::Divide(l, r) => {
            format!("{} / {}", expression_to_string(l), expression_to_string(r))
        }
        Expression::Negate(inner) => format!("-{}", expression_to_string(inner)),
        Expression::ListLiteral(items) => {
            let items_str: Vec<String> = items.iter().map(expression_to_string).collect();
            format!("[{}]", items_str.join(", "))
        }
        Expression::Case { .. } => "CASE".to_string(),
        Expression::CountSubquery(_) => "COUNT { ... }".to_string(),
    }
}

/// Comparisons against null are false
fn evaluate_comparison(left: &Value, op: ComparisonOp, right: &Value) -> bool {
    if left.is_null() || right.is_null() {
        return false;
    }
    match op {
        ComparisonOp::Equals => values_equal(left, right),
        ComparisonOp::NotEquals => !values_equal(left, right),
        ComparisonOp::LessThan => compare_values(left, right) == Some(Ordering::Less),
        ComparisonOp::LessThanEq => matches!(
            compare_values(left, right),
            Some(Ordering::Less) | Some(Ordering::Equal)
        ),
        ComparisonOp::GreaterThan => compare_values(left, right) == Some(Ordering::Greater),
        ComparisonOp::GreaterThanEq => matches!(
            compare_values(left, right),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        ),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::values::DataType;
    use crate::graph::cypher::parser::parse_cypher;
    use crate::graph::schema::{PropertyDef, PropertyType};

    fn build_test_graph() -> DirGraph {
        let mut g = DirGraph::new();
        let s = || PropertyType::scalar(DataType::String);
        g.define_node_table(
            "Metric",
            "id",
            vec![
                PropertyDef::new("id", s()),
                PropertyDef::new("alias", s()),
                PropertyDef::new("dependent_metrics", PropertyType::list(DataType::String)),
            ],
        )
        .unwrap();
        g.define_node_table(
            "Dimension",
            "id",
            vec![
                PropertyDef::new("id", s()),
                PropertyDef::new("name", s()),
                PropertyDef::new("required", PropertyType::scalar(DataType::Bool)),
            ],
        )
        .unwrap();
        g.define_rel_table(
            "USES_DIMENSION",
            "Metric",
            "Dimension",
            vec![PropertyDef::new("weight", PropertyType::scalar(DataType::Int64))],
        )
        .unwrap();

        for (id, alias) in [("m1", "Revenue"), ("m2", "Revenue"), ("m3", "Cost")] {
            g.add_node(
                "Metric",
                [
                    ("id", Value::from(id)),
                    ("alias", Value::from(alias)),
                    ("dependent_metrics", Value::List(vec![])),
                ],
            )
            .unwrap();
        }
        for (id, name, required) in [
            ("d1", "Region", true),
            ("d2", "Month", false),
            ("d3", "BranchType", false),
        ] {
            g.add_node(
                "Dimension",
                [
                    ("id", Value::from(id)),
                    ("name", Value::from(name)),
                    ("required", Value::from(required)),
                ],
            )
            .unwrap();
        }
        for (m, d) in [
            ("m1", "d1"),
            ("m1", "d2"),
            ("m1", "d3"),
            ("m2", "d1"),
            ("m2", "d2"),
        ] {
            g.add_edge("USES_DIMENSION", m, d, [("weight", Value::Int64(1))])
                .unwrap();
        }
        g
    }

    fn run(g: &DirGraph, query: &str, params: &HashMap<String, Value>) -> CypherResult {
        let parsed = parse_cypher(query).unwrap();
        CypherExecutor::with_params(g, params).execute(&parsed).unwrap()
    }

    fn run_err(g: &DirGraph, query: &str, params: &HashMap<String, Value>) -> String {
        let parsed = parse_cypher(query).unwrap();
        CypherExecutor::with_params(g, params)
            .execute(&parsed)
            .unwrap_err()
    }

    fn strings(values: &[&str]) -> Value {
        Value::List(values.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn test_comparison_null_is_false() {
        assert!(!evaluate_comparison(
            &Value::Null,
            ComparisonOp::Equals,
            &Value::Null
        ));
        assert!(evaluate_comparison(
            &Value::Int64(2),
            ComparisonOp::GreaterThanEq,
            &Value::Float64(2.0)
        ));
    }

    #[test]
    fn test_is_aggregate_expression() {
        let count = Expression::FunctionCall {
            name: "COUNT".into(),
            args: vec![Expression::Star],
            distinct: false,
        };
        assert!(is_aggregate_expression(&count));
        assert!(is_aggregate_expression(&Expression::Add(
            Box::new(count),
            Box::new(Expression::Literal(Value::Int64(1)))
        )));
        assert!(!is_aggregate_expression(&Expression::CountSubquery(
            Box::new(Subquery {
                patterns: vec![],
                where_clause: None,
            })
        )));
    }

    #[test]
    fn test_match_return_properties() {
        let g = build_test_graph();
        let result = run(
            &g,
            "MATCH (m:Metric) WHERE m.alias = 'Revenue' RETURN m.id AS id ORDER BY id",
            &HashMap::new(),
        );
        assert_eq!(result.columns, vec!["id"]);
        assert_eq!(
            result.rows,
            vec![vec![Value::from("m1")], vec![Value::from("m2")]]
        );
    }

    #[test]
    fn test_in_with_list_parameter() {
        let g = build_test_graph();
        let mut params = HashMap::new();
        params.insert("names".to_string(), strings(&["Region", "BranchType"]));
        let result = run(
            &g,
            "MATCH (d:Dimension) WHERE d.name IN $names RETURN d.id AS id",
            &params,
        );
        assert_eq!(
            result.rows,
            vec![vec![Value::from("d1")], vec![Value::from("d3")]]
        );
    }

    #[test]
    fn test_count_subquery_exact_coverage() {
        let g = build_test_graph();
        let mut params = HashMap::new();
        params.insert("aliases".to_string(), strings(&["Revenue"]));
        params.insert("dimensions".to_string(), strings(&["Region", "Month"]));
        params.insert("dimension_count".to_string(), Value::Int64(2));
        let result = run(
            &g,
            "MATCH (m:Metric) WHERE m.alias IN $aliases \
             AND COUNT { MATCH (m)-[:USES_DIMENSION]->(d:Dimension) WHERE d.name IN $dimensions } = $dimension_count \
             RETURN m.id AS id, COUNT { MATCH (m)-[:USES_DIMENSION]->(:Dimension) } AS dimension_count",
            &params,
        );
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("m1"), Value::Int64(3)],
                vec![Value::from("m2"), Value::Int64(2)],
            ]
        );
    }

    #[test]
    fn test_optional_match_collect_keeps_unmatched_metric() {
        let g = build_test_graph();
        let mut params = HashMap::new();
        params.insert("metric_id".to_string(), Value::from("m3"));
        let result = run(
            &g,
            "MATCH (m:Metric) WHERE m.id = $metric_id \
             OPTIONAL MATCH (m)-[:USES_DIMENSION]->(d:Dimension) \
             RETURN m, collect(d) AS dimensions",
            &params,
        );
        assert_eq!(result.rows.len(), 1);
        let metric = result.rows[0][0].as_map().unwrap();
        assert_eq!(metric.get("_label"), Some(&Value::from("Metric")));
        assert_eq!(metric.get("alias"), Some(&Value::from("Cost")));
        assert_eq!(result.rows[0][1], Value::List(vec![]));
    }

    #[test]
    fn test_collect_nodes_in_edge_order() {
        let g = build_test_graph();
        let mut params = HashMap::new();
        params.insert("metric_id".to_string(), Value::from("m1"));
        let result = run(
            &g,
            "MATCH (m:Metric) WHERE m.id = $metric_id \
             OPTIONAL MATCH (m)-[:USES_DIMENSION]->(d:Dimension) \
             RETURN m, collect(d) AS dimensions",
            &params,
        );
        assert_eq!(result.rows.len(), 1);
        let dims = result.rows[0][1].as_list().unwrap();
        let names: Vec<&str> = dims
            .iter()
            .map(|d| d.as_map().unwrap()["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Region", "Month", "BranchType"]);
    }

    #[test]
    fn test_group_by_node_with_count() {
        let g = build_test_graph();
        let result = run(
            &g,
            "MATCH (m:Metric)-[:USES_DIMENSION]->(d:Dimension) \
             RETURN m.id AS id, count(d) AS n ORDER BY n DESC",
            &HashMap::new(),
        );
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("m1"), Value::Int64(3)],
                vec![Value::from("m2"), Value::Int64(2)],
            ]
        );
    }

    #[test]
    fn test_aggregate_without_rows_yields_one_row() {
        let g = build_test_graph();
        let result = run(
            &g,
            "MATCH (m:Metric) WHERE m.alias = 'Nope' RETURN count(*) AS n, collect(m.id) AS ids",
            &HashMap::new(),
        );
        assert_eq!(result.rows, vec![vec![Value::Int64(0), Value::List(vec![])]]);
    }

    #[test]
    fn test_with_then_match_keeps_node_binding() {
        let g = build_test_graph();
        let result = run(
            &g,
            "MATCH (m:Metric) WITH m WHERE m.id = 'm2' \
             MATCH (m)-[r:USES_DIMENSION]->(d) RETURN d.name AS name, r.weight AS w",
            &HashMap::new(),
        );
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("Region"), Value::Int64(1)],
                vec![Value::from("Month"), Value::Int64(1)],
            ]
        );
    }

    #[test]
    fn test_distinct_and_skip_limit() {
        let g = build_test_graph();
        let result = run(
            &g,
            "MATCH (m:Metric) RETURN DISTINCT m.alias AS alias ORDER BY alias SKIP 1 LIMIT 5",
            &HashMap::new(),
        );
        assert_eq!(result.rows, vec![vec![Value::from("Revenue")]]);
    }

    #[test]
    fn test_unwind_list_literal() {
        let g = build_test_graph();
        let result = run(&g, "UNWIND [1, 2, 3] AS x RETURN sum(x) AS total", &HashMap::new());
        assert_eq!(result.rows, vec![vec![Value::Int64(6)]]);
    }

    #[test]
    fn test_scalar_functions() {
        let g = build_test_graph();
        let result = run(
            &g,
            "MATCH (d:Dimension) WHERE d.id = 'd1' \
             RETURN toUpper(d.name) AS up, size(d.name) AS len, label(d) AS l, id(d) AS i, \
             coalesce(d.missing, 'x') AS c",
            &HashMap::new(),
        );
        assert_eq!(
            result.rows,
            vec![vec![
                Value::from("REGION"),
                Value::Int64(6),
                Value::from("Dimension"),
                Value::from("d1"),
                Value::from("x"),
            ]]
        );
    }

    #[test]
    fn test_call_table_info_return_star() {
        let g = build_test_graph();
        let result = run(&g, "CALL table_info('`Dimension`') RETURN *", &HashMap::new());
        assert_eq!(
            result.columns,
            vec!["property id", "name", "type", "primary key"]
        );
        assert_eq!(
            result.rows[2],
            vec![
                Value::Int64(2),
                Value::from("required"),
                Value::from("BOOL"),
                Value::Boolean(false),
            ]
        );
        assert_eq!(result.rows[0][3], Value::Boolean(true));
    }

    #[test]
    fn test_call_table_info_rel_and_list_types() {
        let g = build_test_graph();
        let rel = run(&g, "CALL table_info('USES_DIMENSION') RETURN *", &HashMap::new());
        assert_eq!(rel.rows.len(), 1);
        assert_eq!(rel.rows[0][1], Value::from("weight"));
        assert_eq!(rel.rows[0][2], Value::from("INT64"));

        let metric = run(&g, "CALL table_info('Metric') RETURN *", &HashMap::new());
        assert_eq!(metric.rows[2][2], Value::from("STRING[]"));
    }

    #[test]
    fn test_call_show_tables() {
        let g = build_test_graph();
        let result = run(&g, "CALL show_tables() RETURN *", &HashMap::new());
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("Metric"), Value::from("NODE")],
                vec![Value::from("Dimension"), Value::from("NODE")],
                vec![Value::from("USES_DIMENSION"), Value::from("REL")],
            ]
        );
    }

    #[test]
    fn test_unknown_table_and_missing_parameter_are_errors() {
        let g = build_test_graph();
        assert_eq!(
            run_err(&g, "CALL table_info('Nope') RETURN *", &HashMap::new()),
            "Table Nope does not exist."
        );
        assert_eq!(
            run_err(&g, "MATCH (m:Metric) WHERE m.id = $id RETURN m", &HashMap::new()),
            "Missing parameter: $id"
        );
    }

    #[test]
    fn test_case_expression() {
        let g = build_test_graph();
        let result = run(
            &g,
            "MATCH (d:Dimension) RETURN d.id AS id, \
             CASE WHEN d.required THEN 'filter' ELSE 'optional' END AS usage ORDER BY id",
            &HashMap::new(),
        );
        assert_eq!(result.rows[0][1], Value::from("filter"));
        assert_eq!(result.rows[1][1], Value::from("optional"));
    }
}

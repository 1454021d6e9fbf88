//! Query tree to SQL `WHERE` text.
//!
//! Emission works on the reduced [`BoolExpr`] of one table. Every negation
//! goes through `COALESCE(.., FALSE)` so a missing JSON property makes
//! `NOT term` true, the same as the in-memory evaluator.

use crate::error::{SdxError, SdxResult};
use crate::query::context::QueryRuntimeContext;
use crate::query::eval::{TermSemantics, is_collection_path, phrase_tokens};
use crate::query::expr::BoolExpr;
use crate::query::types::{DoubleBound, DoubleBounds, LongBounds, MatchType, NumericRange, Query, QueryTerm};
use crate::schema::table::{
    COLLECTION_ITEM_SUFFIX, DATA_COLUMN, PROPERTY_SEPARATOR, json_extract_expr, json_path,
    text_expr_for,
};
use crate::schema::{TableDescription, TypeName};
use crate::sql::escape::{
    LIKE_ESCAPE_CLAUSE, escape_sql_like, float_literal, quote, wildcard_to_like,
};
use crate::sql::reducer::QueryReducer;
use std::collections::BTreeSet;
use tracing::{debug, warn};

pub struct QueryConverter {
    reducer: QueryReducer,
}

impl QueryConverter {
    pub fn new() -> Self {
        Self {
            reducer: QueryReducer::new(),
        }
    }

    /// Lift and emit without touching the tree; used to check reduction
    /// against a plain translation.
    pub fn without_reduction() -> Self {
        Self {
            reducer: QueryReducer::with_rules(Vec::new()),
        }
    }

    pub fn reduce(&self, query: &Query, table: &TableDescription) -> SdxResult<BoolExpr> {
        self.reducer.reduce(query, table)
    }

    /// `WHERE` text for `query` against `table`. `FALSE` means the table can
    /// be skipped.
    pub fn convert(
        &self,
        query: &Query,
        context: &mut QueryRuntimeContext,
        table: &TableDescription,
    ) -> SdxResult<String> {
        if context.kind_scope.is_none() {
            context.kind_scope = Some(kind_scope(query));
        }
        let result = self
            .reduce(query, table)
            .and_then(|expr| self.emit(&expr, table));
        match result {
            Ok(sql) => {
                debug!(table = %table.table_name, %sql, "converted query");
                context.native_query = Some(sql.clone());
                Ok(sql)
            }
            Err(e) => {
                let rendered = serde_json::to_string(query).unwrap_or_default();
                warn!(table = %table.table_name, error = %e, "query conversion failed");
                Err(SdxError::conversion(e.to_string(), rendered))
            }
        }
    }

    pub fn emit(&self, expr: &BoolExpr, table: &TableDescription) -> SdxResult<String> {
        Emitter { table }.expr(expr)
    }
}

impl Default for QueryConverter {
    fn default() -> Self {
        Self::new()
    }
}

/// Document kinds named by positive kind terms.
pub fn kind_scope(query: &Query) -> BTreeSet<String> {
    let mut kinds = BTreeSet::new();
    query.for_each_term(&mut |term, negated| {
        if negated || !term.is_kind() || term.match_type != MatchType::Term {
            return;
        }
        if let Some(value) = term.match_value.as_deref()
            && value != "*"
        {
            kinds.insert(value.to_string());
        }
    });
    kinds
}

/// Where a term's value lives in a row.
struct Operand {
    /// Typed expression
    expr: String,
    /// Text projection of `expr`
    text: String,
    /// JSON path of the array when the term addresses collection elements
    collection: Option<String>,
    semantics: TermSemantics,
}

impl Operand {
    fn wrap(&self, condition: String) -> String {
        match &self.collection {
            Some(path) => format!(
                "EXISTS(SELECT 1 FROM json_each({DATA_COLUMN}, {}) WHERE {condition})",
                quote(path)
            ),
            None => condition,
        }
    }

    fn folded_text(&self) -> String {
        if self.semantics.case_insensitive {
            format!("LOWER({})", self.text)
        } else {
            self.text.clone()
        }
    }

    fn fold(&self, value: &str) -> String {
        if self.semantics.case_insensitive {
            value.to_ascii_lowercase()
        } else {
            value.to_string()
        }
    }
}

struct Emitter<'a> {
    table: &'a TableDescription,
}

impl Emitter<'_> {
    fn expr(&self, expr: &BoolExpr) -> SdxResult<String> {
        match expr {
            BoolExpr::Const(true) => Ok("TRUE".to_string()),
            BoolExpr::Const(false) => Ok("FALSE".to_string()),
            BoolExpr::Term(term) => self.term(term),
            BoolExpr::Not(inner) => match inner.as_ref() {
                // selfLink is a NOT NULL column
                BoolExpr::Term(term) if term.is_self_link() => {
                    Ok(format!("NOT {}", self.term(term)?))
                }
                other => Ok(format!("NOT COALESCE({}, FALSE)", self.expr(other)?)),
            },
            BoolExpr::And(children) => self.group(children, true),
            BoolExpr::Or(children) => self.group(children, false),
        }
    }

    fn group(&self, children: &[BoolExpr], conjunction: bool) -> SdxResult<String> {
        let (separator, neutral) = if conjunction {
            (" AND ", "TRUE")
        } else {
            (" OR ", "FALSE")
        };
        let mut parts: Vec<String> = Vec::with_capacity(children.len());
        let mut i = 0;
        while i < children.len() {
            let (negated, run) = self.coalescable_run(&children[i..], conjunction);
            let part = if run.len() > 1 {
                let sql = self.coalesced(&run, negated, conjunction)?;
                i += run.len();
                sql
            } else {
                let sql = self.expr(&children[i])?;
                i += 1;
                sql
            };
            if part != neutral || parts.is_empty() {
                parts.push(part);
            }
        }
        if parts.len() > 1 && parts[0] == neutral {
            parts.remove(0);
        }
        match parts.len() {
            0 => Ok(neutral.to_string()),
            1 => Ok(parts.remove(0)),
            _ => Ok(format!("({})", parts.join(separator))),
        }
    }

    /// Consecutive exact terms on one text property that fold into a single
    /// `IN`. Positive terms fold under OR and AND, negated terms only under AND.
    fn coalescable_run<'e>(
        &self,
        children: &'e [BoolExpr],
        conjunction: bool,
    ) -> (bool, Vec<&'e QueryTerm>) {
        let key = |e: &'e BoolExpr| -> Option<(bool, &'e QueryTerm)> {
            let (negated, term) = match e {
                BoolExpr::Term(t) => (false, t),
                BoolExpr::Not(inner) => match inner.as_ref() {
                    BoolExpr::Term(t) => (true, t),
                    _ => return None,
                },
                _ => return None,
            };
            if negated && !conjunction {
                return None;
            }
            self.is_coalescable(term).then_some((negated, term))
        };
        let Some((negated, first)) = children.first().and_then(key) else {
            return (false, Vec::new());
        };
        let mut run = vec![first];
        for child in &children[1..] {
            match key(child) {
                Some((n, t)) if n == negated && t.property_name == first.property_name => run.push(t),
                _ => break,
            }
        }
        (negated, run)
    }

    fn is_coalescable(&self, term: &QueryTerm) -> bool {
        if term.match_type != MatchType::Term
            || term.range.is_some()
            || term.is_kind()
            || term.is_self_link()
        {
            return false;
        }
        if term.match_value.as_deref().is_none_or(|v| v == "*") {
            return false;
        }
        match self.table.column(&term.property_name) {
            Some(cd) => !cd.text_indexed && cd.type_name.is_text(),
            None => false,
        }
    }

    fn coalesced(&self, run: &[&QueryTerm], negated: bool, conjunction: bool) -> SdxResult<String> {
        let first = run[0];
        let Some(operand) = self.operand(first) else {
            return Ok("FALSE".to_string());
        };
        let mut values: Vec<String> = Vec::with_capacity(run.len());
        for term in run {
            let value = operand.fold(term.match_value.as_deref().unwrap_or_default());
            if !values.contains(&value) {
                values.push(value);
            }
        }
        let list = values.iter().map(|v| quote(v)).collect::<Vec<_>>().join(", ");
        let element = operand.folded_text();
        let any_of = operand.wrap(format!("{element} IN ({list})"));

        if !conjunction {
            return Ok(any_of);
        }
        if negated {
            return Ok(format!("NOT COALESCE({any_of}, FALSE)"));
        }
        match &operand.collection {
            Some(path) => Ok(format!(
                "(SELECT COUNT(DISTINCT {element}) FROM json_each({DATA_COLUMN}, {}) WHERE {element} IN ({list})) = {}",
                quote(path),
                values.len()
            )),
            None if values.len() > 1 => Ok("FALSE".to_string()),
            None => Ok(format!("{element} = {list}")),
        }
    }

    fn term(&self, term: &QueryTerm) -> SdxResult<String> {
        let Some(operand) = self.operand(term) else {
            return Ok("FALSE".to_string());
        };
        if let Some(range) = &term.range {
            return self.range(&operand, range);
        }
        let value = term
            .match_value
            .as_deref()
            .ok_or_else(|| SdxError::validation(format!("term '{}' has no value", term.property_name)))?;

        Ok(match term.match_type {
            MatchType::Term if value == "*" => match &operand.collection {
                Some(path) => format!("json_array_length({DATA_COLUMN}, {}) > 0", quote(path)),
                None => format!("{} IS NOT NULL", operand.expr),
            },
            MatchType::Term if operand.semantics.text_indexed => {
                operand.wrap(like(&operand, &format!("%{}%", escape_sql_like(value)), true))
            }
            MatchType::Term => operand.wrap(equality(&operand, value)),
            MatchType::Prefix => {
                operand.wrap(like(&operand, &format!("{}%", escape_sql_like(value)), true))
            }
            MatchType::Wildcard => match wildcard_to_like(value) {
                Some(pattern) => operand.wrap(like(&operand, &pattern, true)),
                None => operand.wrap(equality(&operand, value)),
            },
            MatchType::Phrase => {
                let tokens = phrase_tokens(value);
                if tokens.is_empty() {
                    return Ok("TRUE".to_string());
                }
                let conditions = tokens
                    .iter()
                    .map(|tok| like(&operand, &format!("%{}%", escape_sql_like(tok)), false))
                    .collect::<Vec<_>>();
                operand.wrap(format!("({})", conditions.join(" AND ")))
            }
        })
    }

    fn range(&self, operand: &Operand, range: &NumericRange) -> SdxResult<String> {
        let expr = &operand.expr;
        if range.is_floating() {
            return Ok(match range.double_bounds() {
                DoubleBounds::Unbounded => "TRUE".to_string(),
                DoubleBounds::Equal(v) if !v.is_finite() => "FALSE".to_string(),
                DoubleBounds::Equal(v) => operand.wrap(format!("{expr} = {}", float_literal(v))),
                DoubleBounds::Range { min, max } => operand.wrap(double_range(expr, min, max)),
            });
        }
        Ok(match range.long_bounds()? {
            LongBounds::Unbounded => "TRUE".to_string(),
            LongBounds::Equal(v) => operand.wrap(format!("{expr} = {v}")),
            LongBounds::Between(lo, hi) => operand.wrap(format!("{expr} BETWEEN {lo} AND {hi}")),
        })
    }

    fn operand(&self, term: &QueryTerm) -> Option<Operand> {
        let cd = self.table.column_or_parent(&term.property_name)?;
        let semantics = TermSemantics::resolve(term, Some(self.table));
        let name = term.property_name.as_str();

        if is_collection_path(name) {
            let segments: Vec<&str> = name.split(PROPERTY_SEPARATOR).collect();
            let split = segments.iter().position(|s| *s == COLLECTION_ITEM_SUFFIX)?;
            let array = segments[..split].join(".");
            let rest = segments[split + 1..].join(".");
            let expr = if rest.is_empty() {
                "value".to_string()
            } else {
                json_extract_expr("value", &rest)
            };
            return Some(Operand {
                text: text_expr_for(&expr, semantics.type_name),
                expr,
                collection: Some(json_path(&array)),
                semantics,
            });
        }
        if cd.property_name == name {
            return Some(Operand {
                expr: cd.column_name.clone(),
                text: cd.column_name_as_text.clone(),
                collection: None,
                semantics,
            });
        }
        let expr = json_extract_expr(DATA_COLUMN, name);
        Some(Operand {
            text: text_expr_for(&expr, TypeName::String),
            expr,
            collection: None,
            semantics,
        })
    }
}

fn like(operand: &Operand, pattern: &str, fold: bool) -> String {
    if fold && operand.semantics.case_insensitive {
        format!(
            "LOWER({}) LIKE {}{LIKE_ESCAPE_CLAUSE}",
            operand.text,
            quote(&pattern.to_ascii_lowercase())
        )
    } else {
        format!("{} LIKE {}{LIKE_ESCAPE_CLAUSE}", operand.text, quote(pattern))
    }
}

fn equality(operand: &Operand, value: &str) -> String {
    if operand.semantics.case_insensitive {
        return format!(
            "LOWER({}) = {}",
            operand.text,
            quote(&value.to_ascii_lowercase())
        );
    }
    let expr = &operand.expr;
    let text = || format!("{} = {}", operand.text, quote(value));
    match operand.semantics.type_name {
        TypeName::Long | TypeName::Date => match value.parse::<i64>() {
            Ok(n) => format!("{expr} = {n}"),
            Err(_) => text(),
        },
        TypeName::Double => match value.parse::<f64>() {
            Ok(f) if f.is_finite() => format!("{expr} = {}", float_literal(f)),
            _ => text(),
        },
        TypeName::Boolean => match value {
            "true" => format!("{expr} = 1"),
            "false" => format!("{expr} = 0"),
            _ => text(),
        },
        _ => text(),
    }
}

fn double_range(expr: &str, min: Option<DoubleBound>, max: Option<DoubleBound>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) if lo.inclusive && hi.inclusive => format!(
            "{expr} BETWEEN {} AND {}",
            float_literal(lo.value),
            float_literal(hi.value)
        ),
        (lo, hi) => {
            let mut parts = Vec::with_capacity(2);
            if let Some(lo) = lo {
                let op = if lo.inclusive { ">=" } else { ">" };
                parts.push(format!("{expr} {op} {}", float_literal(lo.value)));
            }
            if let Some(hi) = hi {
                let op = if hi.inclusive { "<=" } else { "<" };
                parts.push(format!("{expr} {op} {}", float_literal(hi.value)));
            }
            match parts.len() {
                0 => format!("typeof({expr}) IN ('integer', 'real')"),
                1 => parts.remove(0),
                _ => format!("({})", parts.join(" AND ")),
            }
        }
    }
}

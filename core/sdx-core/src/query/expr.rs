//! Normalized boolean form of a query tree.
//!
//! Clauses of a group combine left to right with SQL precedence: MUST and
//! MUST_NOT extend the current AND chain, a SHOULD clause after the first one
//! opens a new OR branch. `[MUST a, SHOULD b, MUST_NOT c]` is therefore
//! `a OR (b AND NOT c)`.

use crate::error::SdxResult;
use crate::query::eval;
use crate::query::types::{MatchType, Occurrence, Query, QueryTerm};
use crate::schema::TableDescription;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum BoolExpr {
    Const(bool),
    Term(QueryTerm),
    Not(Box<BoolExpr>),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
}

impl BoolExpr {
    /// Structural translation of a validated query, without any folding.
    pub fn lift(query: &Query) -> SdxResult<BoolExpr> {
        query.validate()?;
        let node = lift_node(query);
        Ok(match query.occurrence {
            Occurrence::MustNot => BoolExpr::Not(Box::new(node)),
            _ => node,
        })
    }

    pub fn is_const(&self, value: bool) -> bool {
        matches!(self, BoolExpr::Const(v) if *v == value)
    }

    /// Evaluate against a JSON document with the semantics of the emitted SQL.
    pub fn evaluate(&self, document: &Value, table: Option<&TableDescription>) -> bool {
        match self {
            BoolExpr::Const(v) => *v,
            BoolExpr::Term(term) => eval::term_matches(term, document, table),
            BoolExpr::Not(inner) => !inner.evaluate(document, table),
            BoolExpr::And(children) => children.iter().all(|c| c.evaluate(document, table)),
            BoolExpr::Or(children) => children.iter().any(|c| c.evaluate(document, table)),
        }
    }

    /// Rebuild bottom-up, replacing terms through `f`.
    pub fn map_terms<F>(self, f: &mut F) -> SdxResult<BoolExpr>
    where
        F: FnMut(QueryTerm) -> SdxResult<BoolExpr>,
    {
        Ok(match self {
            BoolExpr::Term(term) => f(term)?,
            BoolExpr::Not(inner) => BoolExpr::Not(Box::new(inner.map_terms(f)?)),
            BoolExpr::And(children) => BoolExpr::And(
                children
                    .into_iter()
                    .map(|c| c.map_terms(f))
                    .collect::<SdxResult<_>>()?,
            ),
            BoolExpr::Or(children) => BoolExpr::Or(
                children
                    .into_iter()
                    .map(|c| c.map_terms(f))
                    .collect::<SdxResult<_>>()?,
            ),
            other => other,
        })
    }
}

fn lift_node(query: &Query) -> BoolExpr {
    if let Some(term) = &query.term {
        return BoolExpr::Term(normalize_term(term));
    }
    let clauses = query.boolean_clauses.as_deref().unwrap_or_default();
    let mut branches = Vec::new();
    let mut chain = Vec::new();
    for (i, clause) in clauses.iter().enumerate() {
        let node = lift_node(clause);
        match clause.occurrence {
            Occurrence::Should if i > 0 => {
                branches.push(BoolExpr::And(std::mem::take(&mut chain)));
                chain.push(node);
            }
            Occurrence::Should | Occurrence::Must => chain.push(node),
            Occurrence::MustNot => chain.push(BoolExpr::Not(Box::new(node))),
        }
    }
    branches.push(BoolExpr::And(chain));
    BoolExpr::Or(branches)
}

/// Wildcards without metacharacters are exact terms; a single trailing `*`
/// is a prefix.
fn normalize_term(term: &QueryTerm) -> QueryTerm {
    let mut term = term.clone();
    if term.match_type != MatchType::Wildcard {
        return term;
    }
    if let Some(value) = term.match_value.take() {
        let stars = value.matches('*').count();
        let has_single = value.contains('?');
        if stars == 0 && !has_single {
            term.match_type = MatchType::Term;
            term.match_value = Some(value);
        } else if stars == 1 && !has_single && value.ends_with('*') {
            term.match_type = MatchType::Prefix;
            term.match_value = Some(value[..value.len() - 1].to_string());
        } else {
            term.match_value = Some(value);
        }
    }
    term
}

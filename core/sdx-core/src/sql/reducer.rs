//! 쿼리 축소: 상수 폴딩 기반 규칙
//!
//! Reduction runs before emission and never mutates the input query: the
//! tree is lifted into a [`BoolExpr`] and each rule returns a new tree.

use crate::error::SdxResult;
use crate::query::eval::phrase_tokens;
use crate::query::expr::BoolExpr;
use crate::query::types::{MatchType, Query, QueryTerm};
use crate::schema::TableDescription;

/// 축소 규칙 트레이트
pub trait ReductionRule: Send + Sync {
    /// 규칙 이름
    fn name(&self) -> &str;

    /// 테이블 지식으로 식에 규칙 적용
    fn apply(&self, expr: BoolExpr, table: &TableDescription) -> SdxResult<BoolExpr>;
}

/// Replaces terms decidable from the table alone with constants.
pub struct TermReductionRule;

impl ReductionRule for TermReductionRule {
    fn name(&self) -> &str {
        "TermReduction"
    }

    fn apply(&self, expr: BoolExpr, table: &TableDescription) -> SdxResult<BoolExpr> {
        expr.map_terms(&mut |term| Ok(self.reduce_term(term, table)))
    }
}

impl TermReductionRule {
    pub fn reduce_term(&self, term: QueryTerm, table: &TableDescription) -> BoolExpr {
        if term.range.as_ref().is_some_and(|r| r.is_unbounded()) {
            return BoolExpr::Const(true);
        }
        if term.match_type == MatchType::Phrase
            && term
                .match_value
                .as_deref()
                .is_some_and(|v| phrase_tokens(v).is_empty())
        {
            return BoolExpr::Const(true);
        }

        if let Some(value) = term.match_value.as_deref() {
            if term.is_self_link() {
                let factory = table.factory_link_with_slash();
                match term.match_type {
                    MatchType::Term if value == "*" => return BoolExpr::Const(true),
                    MatchType::Term if !value.starts_with(&factory) => {
                        return BoolExpr::Const(false);
                    }
                    MatchType::Prefix if value.len() <= factory.len() => {
                        return BoolExpr::Const(factory.starts_with(value));
                    }
                    MatchType::Prefix if !value.starts_with(&factory) => {
                        return BoolExpr::Const(false);
                    }
                    _ => {}
                }
            }
            if term.is_kind() && term.match_type == MatchType::Term {
                return BoolExpr::Const(value == "*" || value == table.document_kind);
            }
        }

        if table.column_or_parent(&term.property_name).is_none() {
            return BoolExpr::Const(false);
        }
        BoolExpr::Term(term)
    }
}

/// AND absorbs TRUE, OR absorbs FALSE, nested groups of the same kind are
/// flattened and identical siblings deduplicated.
pub struct BooleanFoldingRule;

impl ReductionRule for BooleanFoldingRule {
    fn name(&self) -> &str {
        "BooleanFolding"
    }

    fn apply(&self, expr: BoolExpr, _table: &TableDescription) -> SdxResult<BoolExpr> {
        Ok(self.fold(expr))
    }
}

impl BooleanFoldingRule {
    pub fn fold(&self, expr: BoolExpr) -> BoolExpr {
        match expr {
            BoolExpr::Not(inner) => match self.fold(*inner) {
                BoolExpr::Const(v) => BoolExpr::Const(!v),
                BoolExpr::Not(double) => *double,
                other => BoolExpr::Not(Box::new(other)),
            },
            BoolExpr::And(children) => self.fold_group(children, true),
            BoolExpr::Or(children) => self.fold_group(children, false),
            other => other,
        }
    }

    /// `conjunction`: identity is TRUE and FALSE dominates; OR is the dual.
    fn fold_group(&self, children: Vec<BoolExpr>, conjunction: bool) -> BoolExpr {
        let identity = conjunction;
        let mut folded: Vec<BoolExpr> = Vec::with_capacity(children.len());
        for child in children {
            let child = self.fold(child);
            let flattened = match child {
                BoolExpr::Const(v) if v == identity => continue,
                BoolExpr::Const(_) => return BoolExpr::Const(!identity),
                BoolExpr::And(inner) if conjunction => inner,
                BoolExpr::Or(inner) if !conjunction => inner,
                other => vec![other],
            };
            for item in flattened {
                if !folded.contains(&item) {
                    folded.push(item);
                }
            }
        }
        match folded.len() {
            0 => BoolExpr::Const(identity),
            1 => folded.pop().unwrap_or(BoolExpr::Const(identity)),
            _ if conjunction => BoolExpr::And(folded),
            _ => BoolExpr::Or(folded),
        }
    }
}

/// 쿼리 축소기
pub struct QueryReducer {
    rules: Vec<Box<dyn ReductionRule>>,
}

impl QueryReducer {
    /// 기본 축소 규칙으로 생성
    pub fn new() -> Self {
        Self {
            rules: vec![Box::new(TermReductionRule), Box::new(BooleanFoldingRule)],
        }
    }

    /// Custom rule list; an empty list only lifts the query.
    pub fn with_rules(rules: Vec<Box<dyn ReductionRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// 모든 규칙 적용
    pub fn reduce(&self, query: &Query, table: &TableDescription) -> SdxResult<BoolExpr> {
        let mut expr = BoolExpr::lift(query)?;
        for rule in &self.rules {
            expr = rule.apply(expr, table)?;
        }
        Ok(expr)
    }
}

impl Default for QueryReducer {
    fn default() -> Self {
        Self::new()
    }
}

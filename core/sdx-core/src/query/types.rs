//! Query specification data model.

use crate::document::{FIELD_NAME_KIND, FIELD_NAME_SELF_LINK};
use crate::error::{SdxError, SdxResult};
use crate::query::context::QueryRuntimeContext;
use crate::schema::TypeName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Boolean role of a clause within its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Occurrence {
    #[default]
    #[serde(rename = "MUST_OCCUR")]
    Must,
    #[serde(rename = "SHOULD_OCCUR")]
    Should,
    #[serde(rename = "MUST_NOT_OCCUR")]
    MustNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    #[default]
    Term,
    Prefix,
    Wildcard,
    Phrase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// A numeric bound, either integral or floating.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Long(i64),
    Double(f64),
}

impl Numeric {
    pub fn as_f64(&self) -> f64 {
        match self {
            Numeric::Long(v) => *v as f64,
            Numeric::Double(v) => *v,
        }
    }

    /// Integral view; fractional doubles are truncated toward zero.
    pub fn as_i64(&self) -> i64 {
        match self {
            Numeric::Long(v) => *v,
            Numeric::Double(v) => *v as i64,
        }
    }
}

/// Numeric range over a LONG, DATE or DOUBLE property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericRange {
    #[serde(rename = "type")]
    pub type_name: TypeName,
    #[serde(default)]
    pub min: Option<Numeric>,
    #[serde(default)]
    pub max: Option<Numeric>,
    #[serde(default = "default_true")]
    pub is_min_inclusive: bool,
    #[serde(default = "default_true")]
    pub is_max_inclusive: bool,
}

fn default_true() -> bool {
    true
}

/// Integer range after inclusive/exclusive normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LongBounds {
    Unbounded,
    Equal(i64),
    Between(i64, i64),
}

/// Float range bound; `inclusive` tells `>=` from `>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoubleBound {
    pub value: f64,
    pub inclusive: bool,
}

/// Float range after normalization; infinite sides are elided.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DoubleBounds {
    Unbounded,
    Equal(f64),
    Range {
        min: Option<DoubleBound>,
        max: Option<DoubleBound>,
    },
}

impl NumericRange {
    pub fn long(min: Option<i64>, max: Option<i64>, min_inclusive: bool, max_inclusive: bool) -> Self {
        Self {
            type_name: TypeName::Long,
            min: min.map(Numeric::Long),
            max: max.map(Numeric::Long),
            is_min_inclusive: min_inclusive,
            is_max_inclusive: max_inclusive,
        }
    }

    pub fn double(min: Option<f64>, max: Option<f64>, min_inclusive: bool, max_inclusive: bool) -> Self {
        Self {
            type_name: TypeName::Double,
            min: min.map(Numeric::Double),
            max: max.map(Numeric::Double),
            is_min_inclusive: min_inclusive,
            is_max_inclusive: max_inclusive,
        }
    }

    pub fn equal_long(value: i64) -> Self {
        Self::long(Some(value), Some(value), true, true)
    }

    pub fn equal_double(value: f64) -> Self {
        Self::double(Some(value), Some(value), true, true)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn validate(&self) -> SdxResult<()> {
        match self.type_name {
            TypeName::Long | TypeName::Date | TypeName::Double => {}
            other => {
                return Err(SdxError::validation(format!(
                    "numeric range type {other:?} is not supported"
                )));
            }
        }
        for bound in [self.min, self.max].into_iter().flatten() {
            if let Numeric::Double(v) = bound
                && v.is_nan()
            {
                return Err(SdxError::validation("numeric range bound is NaN"));
            }
        }
        Ok(())
    }

    pub fn is_floating(&self) -> bool {
        self.type_name == TypeName::Double
    }

    /// Integer bounds: exclusive sides move inward by one, reversed bounds
    /// are swapped.
    pub fn long_bounds(&self) -> SdxResult<LongBounds> {
        if self.is_unbounded() {
            return Ok(LongBounds::Unbounded);
        }
        let overflow = || SdxError::validation("numeric range bound overflows");
        let mut min = self.min.map(|n| n.as_i64()).unwrap_or(i64::MIN);
        let mut max = self.max.map(|n| n.as_i64()).unwrap_or(i64::MAX);
        if self.min.is_some() && !self.is_min_inclusive {
            min = min.checked_add(1).ok_or_else(overflow)?;
        }
        if self.max.is_some() && !self.is_max_inclusive {
            max = max.checked_sub(1).ok_or_else(overflow)?;
        }
        if min == max {
            return Ok(LongBounds::Equal(min));
        }
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        Ok(LongBounds::Between(min, max))
    }

    /// Float bounds: exclusive sides are checked against the next
    /// representable value to detect single-point and reversed ranges.
    pub fn double_bounds(&self) -> DoubleBounds {
        let min = self.min.map(|n| n.as_f64()).unwrap_or(f64::NEG_INFINITY);
        let max = self.max.map(|n| n.as_f64()).unwrap_or(f64::INFINITY);
        if min.is_infinite() && max.is_infinite() && min < max {
            return DoubleBounds::Unbounded;
        }

        let adjusted_min = if !self.is_min_inclusive && min.is_finite() {
            next_up(min)
        } else {
            min
        };
        let adjusted_max = if !self.is_max_inclusive && max.is_finite() {
            next_down(max)
        } else {
            max
        };
        if adjusted_min == adjusted_max {
            return DoubleBounds::Equal(adjusted_min);
        }
        if adjusted_min > adjusted_max {
            return DoubleBounds::Range {
                min: finite_bound(adjusted_max, true),
                max: finite_bound(adjusted_min, true),
            };
        }
        DoubleBounds::Range {
            min: finite_bound(min, self.is_min_inclusive),
            max: finite_bound(max, self.is_max_inclusive),
        }
    }
}

fn finite_bound(value: f64, inclusive: bool) -> Option<DoubleBound> {
    value.is_finite().then_some(DoubleBound { value, inclusive })
}

/// Smallest representable value greater than `x`.
pub fn next_up(x: f64) -> f64 {
    if x.is_nan() || x == f64::INFINITY {
        return x;
    }
    if x == 0.0 {
        return f64::from_bits(1);
    }
    let bits = x.to_bits();
    if x > 0.0 {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}

/// Largest representable value less than `x`.
pub fn next_down(x: f64) -> f64 {
    -next_up(-x)
}

/// Leaf of a query tree.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTerm {
    pub property_name: String,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub match_value: Option<String>,
    #[serde(default)]
    pub range: Option<NumericRange>,
    /// Declared type, required on sort and group-by terms
    #[serde(default)]
    pub property_type: Option<TypeName>,
    #[serde(default)]
    pub sort_order: Option<SortOrder>,
}

impl QueryTerm {
    pub fn new(property_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property_name: property_name.into(),
            match_value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    pub fn range(property_name: impl Into<String>, range: NumericRange) -> Self {
        Self {
            property_name: property_name.into(),
            range: Some(range),
            ..Self::default()
        }
    }

    /// Term naming a property for sorting or grouping.
    pub fn sort(property_name: impl Into<String>, property_type: TypeName) -> Self {
        Self {
            property_name: property_name.into(),
            property_type: Some(property_type),
            ..Self::default()
        }
    }

    pub fn with_sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = Some(order);
        self
    }

    pub fn is_kind(&self) -> bool {
        self.property_name == FIELD_NAME_KIND
    }

    pub fn is_self_link(&self) -> bool {
        self.property_name == FIELD_NAME_SELF_LINK
    }

    /// A match term needs exactly one of value or range.
    pub fn validate(&self) -> SdxResult<()> {
        if self.property_name.is_empty() {
            return Err(SdxError::validation("query term has no property name"));
        }
        match (&self.match_value, &self.range) {
            (None, None) => Err(SdxError::validation(format!(
                "term on '{}' has neither match value nor range",
                self.property_name
            ))),
            (Some(_), Some(_)) => Err(SdxError::validation(format!(
                "term on '{}' has both match value and range",
                self.property_name
            ))),
            (None, Some(range)) => range.validate(),
            (Some(_), None) => Ok(()),
        }
    }
}

/// A query node: a term or a boolean group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    #[serde(rename = "occurance", default)]
    pub occurrence: Occurrence,
    #[serde(default)]
    pub term: Option<QueryTerm>,
    #[serde(default)]
    pub boolean_clauses: Option<Vec<Query>>,
}

impl Query {
    pub fn from_term(term: QueryTerm) -> Self {
        Self {
            term: Some(term),
            ..Self::default()
        }
    }

    /// Exact match term.
    pub fn term(property_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::from_term(QueryTerm::new(property_name, value))
    }

    pub fn group(clauses: Vec<Query>) -> Self {
        Self {
            boolean_clauses: Some(clauses),
            ..Self::default()
        }
    }

    pub fn kind(kind: impl Into<String>) -> Self {
        Self::term(FIELD_NAME_KIND, kind)
    }

    pub fn with_occurrence(mut self, occurrence: Occurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Structural validation of the whole tree.
    pub fn validate(&self) -> SdxResult<()> {
        match (&self.term, &self.boolean_clauses) {
            (Some(term), None) => term.validate(),
            (None, Some(clauses)) => clauses.iter().try_for_each(Query::validate),
            (Some(_), Some(_)) => Err(SdxError::validation(
                "query node has both a term and boolean clauses",
            )),
            (None, None) => Err(SdxError::validation(
                "query node has neither a term nor boolean clauses",
            )),
        }
    }

    /// Visit every term with the occurrence path from the root.
    pub fn for_each_term<F>(&self, f: &mut F)
    where
        F: FnMut(&QueryTerm, bool),
    {
        self.walk(false, f);
    }

    fn walk<F>(&self, negated: bool, f: &mut F)
    where
        F: FnMut(&QueryTerm, bool),
    {
        let negated = negated || self.occurrence == Occurrence::MustNot;
        if let Some(term) = &self.term {
            f(term, negated);
        }
        for clause in self.boolean_clauses.iter().flatten() {
            clause.walk(negated, f);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryOption {
    IncludeDeleted,
    ExpandContent,
    ExpandBuiltinContentOnly,
    ExpandSelectedFields,
    Count,
    GroupBy,
    Sort,
    ForwardOnly,
    OwnerSelection,
    SingleUse,
    TopResults,
    TimeSnapshot,
    SelectLinks,
    Continuous,
}

/// Query tree plus execution options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpecification {
    pub query: Query,
    #[serde(default)]
    pub options: BTreeSet<QueryOption>,
    #[serde(default)]
    pub result_limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub sort_term: Option<QueryTerm>,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default)]
    pub additional_sort_terms: Vec<QueryTerm>,
    #[serde(default)]
    pub group_by_term: Option<QueryTerm>,
    #[serde(default)]
    pub group_sort_term: Option<QueryTerm>,
    #[serde(default)]
    pub group_sort_order: SortOrder,
    #[serde(default)]
    pub group_result_limit: Option<usize>,
    #[serde(default)]
    pub select_terms: Vec<QueryTerm>,
    #[serde(default)]
    pub link_terms: Vec<QueryTerm>,
    #[serde(default)]
    pub time_snapshot_boundary_micros: Option<i64>,
    #[serde(skip)]
    pub context: QueryRuntimeContext,
}

impl QuerySpecification {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn with_option(mut self, option: QueryOption) -> Self {
        self.options.insert(option);
        self
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, term: QueryTerm, order: SortOrder) -> Self {
        self.options.insert(QueryOption::Sort);
        self.sort_term = Some(term);
        self.sort_order = order;
        self
    }

    pub fn has_option(&self, option: QueryOption) -> bool {
        self.options.contains(&option)
    }

    /// A positive, finite result limit set by the caller.
    pub fn explicit_limit(&self) -> Option<usize> {
        self.result_limit.filter(|l| *l > 0 && *l < usize::MAX)
    }

    pub fn expands_content(&self) -> bool {
        self.has_option(QueryOption::ExpandContent)
            || self.has_option(QueryOption::ExpandBuiltinContentOnly)
            || self.has_option(QueryOption::ExpandSelectedFields)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStage {
    #[default]
    Created,
    Started,
    Finished,
    Failed,
    Cancelled,
}

impl TaskStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStage::Finished | TaskStage::Failed | TaskStage::Cancelled
        )
    }
}

/// Results of one query execution or page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub document_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub document_count: u64,
    #[serde(default)]
    pub query_time_micros: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_page_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_links_per_group: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_links_per_document: Option<BTreeMap<String, BTreeMap<String, String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_links: Option<BTreeSet<String>>,
}

/// Query task body exchanged with the framework.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTask {
    #[serde(rename = "documentSelfLink", default)]
    pub self_link: String,
    pub query_spec: QuerySpecification,
    #[serde(default)]
    pub stage: TaskStage,
    #[serde(rename = "documentExpirationTimeMicros", default)]
    pub expiration_micros: i64,
    #[serde(default)]
    pub results: Option<QueryResult>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

impl QueryTask {
    pub fn new(query_spec: QuerySpecification) -> Self {
        Self {
            query_spec,
            ..Self::default()
        }
    }

    pub fn with_self_link(mut self, self_link: impl Into<String>) -> Self {
        self.self_link = self_link.into();
        self
    }

    pub fn with_stage(mut self, stage: TaskStage) -> Self {
        self.stage = stage;
        self
    }
}

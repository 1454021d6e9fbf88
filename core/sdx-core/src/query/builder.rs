//! Fluent construction of boolean query groups.

use crate::document::{FIELD_NAME_KIND, FIELD_NAME_SELF_LINK};
use crate::query::types::{MatchType, NumericRange, Occurrence, Query, QueryTerm};
use crate::schema::table::{COLLECTION_ITEM_SUFFIX, PROPERTY_SEPARATOR};

/// Builds a boolean group clause by clause.
///
/// # Example
/// ```rust
/// use sdx_core::query::{MatchType, Occurrence, QueryBuilder};
///
/// let query = QueryBuilder::create()
///     .add_kind_field_clause("Example")
///     .add_field_clause_with("name", "ab", MatchType::Prefix, Occurrence::Must)
///     .build();
/// assert_eq!(query.boolean_clauses.unwrap().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct QueryBuilder {
    clauses: Vec<Query>,
}

impl QueryBuilder {
    pub fn create() -> Self {
        Self::default()
    }

    pub fn add_kind_field_clause(self, kind: impl Into<String>) -> Self {
        self.add_field_clause(FIELD_NAME_KIND, kind)
    }

    pub fn add_self_link_clause(self, self_link: impl Into<String>) -> Self {
        self.add_field_clause(FIELD_NAME_SELF_LINK, self_link)
    }

    pub fn add_field_clause(self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_field_clause_with(property, value, MatchType::Term, Occurrence::Must)
    }

    pub fn add_field_clause_with(
        self,
        property: impl Into<String>,
        value: impl Into<String>,
        match_type: MatchType,
        occurrence: Occurrence,
    ) -> Self {
        let term = QueryTerm::new(property, value).with_match_type(match_type);
        self.add_clause(Query::from_term(term).with_occurrence(occurrence))
    }

    /// Exact match with the value lowercased, for properties indexed
    /// case-insensitively.
    pub fn add_case_insensitive_field_clause(
        self,
        property: impl Into<String>,
        value: impl AsRef<str>,
    ) -> Self {
        self.add_field_clause(property, value.as_ref().to_ascii_lowercase())
    }

    /// Match one element of a collection property.
    pub fn add_collection_item_clause(
        self,
        collection: impl AsRef<str>,
        item: impl Into<String>,
    ) -> Self {
        let property = format!(
            "{}{PROPERTY_SEPARATOR}{COLLECTION_ITEM_SUFFIX}",
            collection.as_ref()
        );
        self.add_field_clause(property, item)
    }

    pub fn add_range_clause(
        self,
        property: impl Into<String>,
        range: NumericRange,
        occurrence: Occurrence,
    ) -> Self {
        self.add_clause(Query::from_term(QueryTerm::range(property, range)).with_occurrence(occurrence))
    }

    /// Nested group matching any of `values`, added with `occurrence`.
    pub fn add_in_clause<I, S>(self, property: &str, values: I, occurrence: Occurrence) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clauses = values
            .into_iter()
            .map(|v| Query::term(property, v).with_occurrence(Occurrence::Should))
            .collect();
        self.add_clause(Query::group(clauses).with_occurrence(occurrence))
    }

    pub fn add_clause(mut self, clause: Query) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn build(self) -> Query {
        Query::group(self.clauses)
    }
}

use crate::document::ServiceDocument;
use crate::error::SdxResult;
use crate::query::expr::BoolExpr;
use crate::query::types::Query;
use crate::schema::SchemaRegistry;
use crate::sql::reducer::BooleanFoldingRule;
use serde_json::Value;

/// Compiled filter of a continuous query.
///
/// Folding here is schema independent: the filter spans every table and is
/// matched against each written document in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    expr: BoolExpr,
}

impl QueryFilter {
    pub fn create(query: &Query) -> SdxResult<Self> {
        let expr = BooleanFoldingRule.fold(BoolExpr::lift(query)?);
        Ok(Self { expr })
    }

    pub fn matches(&self, document: &ServiceDocument, registry: &SchemaRegistry) -> SdxResult<bool> {
        let json = document.to_json()?;
        Ok(self.matches_json(&json, &document.kind, registry))
    }

    /// Match an already serialized document; column semantics come from the
    /// table registered for `kind`.
    pub fn matches_json(&self, document: &Value, kind: &str, registry: &SchemaRegistry) -> bool {
        let table = registry.table_for_kind(kind);
        self.expr.evaluate(document, table.as_deref())
    }

    pub fn expr(&self) -> &BoolExpr {
        &self.expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Occurrence, QueryBuilder};
    use crate::schema::{DocumentDescription, DocumentType, PropertyDescription};

    #[test]
    fn test_kind_filter() {
        let registry = SchemaRegistry::new();
        registry
            .register(
                "/widgets",
                &DocumentType::new(
                    "Widget",
                    "X",
                    DocumentDescription::builder()
                        .property("name", PropertyDescription::string().case_insensitive())
                        .build(),
                ),
            )
            .unwrap();
        let filter = QueryFilter::create(
            &QueryBuilder::create()
                .add_kind_field_clause("X")
                .add_field_clause("name", "ALPHA")
                .build(),
        )
        .unwrap();

        let hit = ServiceDocument::new("/widgets/1", "X").with_field("name", "alpha");
        let miss = ServiceDocument::new("/widgets/2", "Y").with_field("name", "alpha");
        assert!(filter.matches(&hit, &registry).unwrap());
        assert!(!filter.matches(&miss, &registry).unwrap());
    }

    #[test]
    fn test_negated_filter() {
        let registry = SchemaRegistry::new();
        let filter = QueryFilter::create(
            &QueryBuilder::create()
                .add_kind_field_clause("X")
                .add_field_clause_with("name", "a", Default::default(), Occurrence::MustNot)
                .build(),
        )
        .unwrap();
        let doc = ServiceDocument::new("/w/1", "X");
        assert!(filter.matches(&doc, &registry).unwrap());
    }
}

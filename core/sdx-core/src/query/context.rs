use crate::page::QueryPage;
use crate::schema::TableDescription;
use crate::sql::SortField;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Process-local execution state cached on a query specification.
///
/// Never serialized. A page service keeps the context of the query that
/// created it, so later pages reuse the resolved tables and sort fields.
#[derive(Debug, Clone, Default)]
pub struct QueryRuntimeContext {
    pub kind_scope: Option<BTreeSet<String>>,
    pub tables: Option<Vec<Arc<TableDescription>>>,
    pub sort_fields: Option<Vec<SortField>>,
    pub page: Option<QueryPage>,
    /// Result limit of a single page fetch, not inherited by later pages
    pub limit_override: Option<usize>,
    /// Last statement built for this query
    pub native_query: Option<String>,
}

impl QueryRuntimeContext {
    /// Drop everything derived from the schema; the page cursor survives.
    pub fn clear_cached(&mut self) {
        self.kind_scope = None;
        self.tables = None;
        self.sort_fields = None;
        self.native_query = None;
    }
}

//! Concurrent registry of table descriptions.

use crate::document::parent_path;
use crate::error::SdxResult;
use crate::schema::description::DocumentType;
use crate::schema::table::TableDescription;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Maps factory links, kinds and table names to table descriptions.
///
/// Lookups are lock-free reads on [`DashMap`]; registration normally happens
/// once per type at startup.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_factory: DashMap<String, Arc<TableDescription>>,
    by_kind: DashMap<String, Arc<TableDescription>>,
    by_table_name: DashMap<String, String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `document_type` under `factory_link`.
    ///
    /// Collisions are logged, not fatal: the latest registration wins.
    pub fn register(
        &self,
        factory_link: &str,
        document_type: &DocumentType,
    ) -> SdxResult<Arc<TableDescription>> {
        let td = Arc::new(TableDescription::build(factory_link, document_type)?);

        if let Some(existing) = self.by_table_name.get(&td.table_name)
            && existing.value() != &td.factory_link
        {
            error!(
                table = %td.table_name,
                existing = %existing.value(),
                factory = %td.factory_link,
                "duplicate table name"
            );
        }
        if let Some(existing) = self.by_kind.get(&td.document_kind)
            && existing.factory_link != td.factory_link
        {
            warn!(
                kind = %td.document_kind,
                existing = %existing.factory_link,
                factory = %td.factory_link,
                "duplicate document kind"
            );
        }

        self.by_table_name
            .insert(td.table_name.clone(), td.factory_link.clone());
        self.by_kind.insert(td.document_kind.clone(), td.clone());
        self.by_factory.insert(td.factory_link.clone(), td.clone());
        debug!(table = %td.table_name, factory = %td.factory_link, "registered table");
        Ok(td)
    }

    pub fn table_for_factory(&self, factory_link: &str) -> Option<Arc<TableDescription>> {
        self.by_factory
            .get(factory_link.trim_end_matches('/'))
            .map(|e| e.value().clone())
    }

    pub fn table_for_kind(&self, kind: &str) -> Option<Arc<TableDescription>> {
        self.by_kind.get(kind).map(|e| e.value().clone())
    }

    /// Table owning a document link: the closest ancestor path registered
    /// as a factory.
    pub fn table_for_self_link(&self, self_link: &str) -> Option<Arc<TableDescription>> {
        let mut current = parent_path(self_link);
        while let Some(parent) = current {
            if let Some(td) = self.table_for_factory(parent) {
                return Some(td);
            }
            current = parent_path(parent);
        }
        None
    }

    /// All tables, ordered by table name.
    pub fn tables(&self) -> Vec<Arc<TableDescription>> {
        let mut tables: Vec<_> = self.by_factory.iter().map(|e| e.value().clone()).collect();
        tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        tables
    }

    /// Whether `td` is still the registered description of its factory.
    pub fn is_current(&self, td: &Arc<TableDescription>) -> bool {
        self.by_factory
            .get(&td.factory_link)
            .is_some_and(|e| Arc::ptr_eq(e.value(), td))
    }

    pub fn len(&self) -> usize {
        self.by_factory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_factory.is_empty()
    }
}

//! Document DAO: 문서 저장/조회/삭제
//!
//! Every statement runs on a short-lived connection borrowed from the
//! [`ConnectionPool`]. Query execution lives in `storage::query`.

use crate::config::IndexConfig;
use crate::document::{Action, ServiceDocument, now_micros};
use crate::error::{SdxError, SdxResult};
use crate::schema::ddl::create_table_statements;
use crate::schema::{DocumentType, SchemaRegistry, TableDescription};
use crate::sql::QueryConverter;
use crate::storage::pool::ConnectionPool;
use dashmap::DashSet;
use rusqlite::{OptionalExtension, params};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of [`DocumentDao::save_document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Row inserted or replaced
    Applied,
    /// Stored version is the same or newer; nothing changed
    Ignored,
    /// Row physically removed
    Deleted,
}

pub struct DocumentDao {
    pub(crate) pool: ConnectionPool,
    pub(crate) registry: Arc<SchemaRegistry>,
    pub(crate) converter: QueryConverter,
    pub(crate) config: IndexConfig,
    created_tables: DashSet<String>,
}

impl DocumentDao {
    pub fn new(config: &IndexConfig, registry: Arc<SchemaRegistry>) -> SdxResult<Self> {
        Ok(Self {
            pool: ConnectionPool::open(&config.database)?,
            registry,
            converter: QueryConverter::new(),
            config: config.clone(),
            created_tables: DashSet::new(),
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    // ════════════════════════════════════════════
    // Schema
    // ════════════════════════════════════════════

    /// 문서 타입 등록 후 테이블/인덱스 생성
    pub fn init_for_document(
        &self,
        factory_link: &str,
        document_type: &DocumentType,
    ) -> SdxResult<Arc<TableDescription>> {
        let td = self.registry.register(factory_link, document_type)?;
        // new columns may need new indexes
        self.created_tables.remove(&td.table_name);
        self.ensure_table(&td)?;
        Ok(td)
    }

    /// Create the table and its indexes once per process.
    pub fn ensure_table(&self, td: &TableDescription) -> SdxResult<()> {
        if self.created_tables.contains(&td.table_name) {
            return Ok(());
        }
        let (statements, skipped) = create_table_statements(td);
        let conn = self.pool.get()?;
        for sql in &statements {
            conn.execute_batch(sql)?;
        }
        for property in skipped {
            debug!(table = %td.table_name, %property, "gin index has no SQLite equivalent, skipped");
        }
        self.created_tables.insert(td.table_name.clone());
        debug!(table = %td.table_name, "table ready");
        Ok(())
    }

    fn table_for(&self, document: &ServiceDocument) -> SdxResult<Arc<TableDescription>> {
        self.registry
            .table_for_self_link(&document.self_link)
            .or_else(|| self.registry.table_for_kind(&document.kind))
            .ok_or_else(|| {
                SdxError::validation(format!(
                    "no table registered for {} (kind {})",
                    document.self_link, document.kind
                ))
            })
    }

    // ════════════════════════════════════════════
    // Read
    // ════════════════════════════════════════════

    /// Latest unexpired version of a document; `None` when absent.
    pub fn load_document(&self, self_link: &str) -> SdxResult<Option<ServiceDocument>> {
        let Some(td) = self.registry.table_for_self_link(self_link) else {
            return Ok(None);
        };
        self.ensure_table(&td)?;
        let sql = format!(
            "SELECT data FROM {} WHERE documentselflink = ?1 \
             AND (documentexpirationtimemicros = 0 OR documentexpirationtimemicros > ?2)",
            td.table_name
        );
        let started = Instant::now();
        let conn = self.pool.get()?;
        let raw: Option<String> = conn
            .query_row(&sql, params![self_link, now_micros()], |row| row.get(0))
            .optional()?;
        self.log_statement(&sql, started);
        raw.map(|r| ServiceDocument::from_json_str(&r)).transpose()
    }

    /// Expired rows of `td`, oldest expiration first.
    pub fn find_expired(
        &self,
        td: &TableDescription,
        now: i64,
        limit: usize,
    ) -> SdxResult<Vec<ServiceDocument>> {
        self.ensure_table(td)?;
        let sql = format!(
            "SELECT data FROM {} WHERE documentexpirationtimemicros BETWEEN 1 AND ?1 \
             ORDER BY documentexpirationtimemicros LIMIT ?2",
            td.table_name
        );
        let started = Instant::now();
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![now, limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        self.log_statement(&sql, started);
        raws.iter()
            .map(|r| ServiceDocument::from_json_str(r))
            .collect()
    }

    // ════════════════════════════════════════════
    // Write
    // ════════════════════════════════════════════

    /// Upsert a document, or physically delete it when it carries a DELETE
    /// and soft delete is off.
    ///
    /// Without `force`, a row is only replaced by a strictly newer version.
    pub fn save_document(&self, document: &ServiceDocument, force: bool) -> SdxResult<SaveOutcome> {
        document.validate_for_index()?;
        let td = self.table_for(document)?;
        self.ensure_table(&td)?;

        if document.is_deleted() && !self.config.soft_delete_enabled {
            self.delete_document(&td, &document.self_link)?;
            return Ok(SaveOutcome::Deleted);
        }

        let mut sql = format!(
            "INSERT INTO {t} (documentselflink, documentversion, documentkind, documentupdateaction, \
             documentupdatetimemicros, documentexpirationtimemicros, documentauthprincipallink, \
             documenttransactionid, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT (documentselflink) DO UPDATE SET \
             documentversion = excluded.documentversion, \
             documentupdateaction = excluded.documentupdateaction, \
             documentupdatetimemicros = excluded.documentupdatetimemicros, \
             documentexpirationtimemicros = excluded.documentexpirationtimemicros, \
             documentauthprincipallink = excluded.documentauthprincipallink, \
             documenttransactionid = excluded.documenttransactionid, \
             data = excluded.data",
            t = td.table_name
        );
        if !force {
            sql.push_str(&format!(
                " WHERE {}.documentversion < excluded.documentversion",
                td.table_name
            ));
        }

        let data = document.to_json_string()?;
        let action = document.update_action.unwrap_or(Action::Post);
        let started = Instant::now();
        let conn = self.pool.get()?;
        let changed = conn.execute(
            &sql,
            params![
                document.self_link,
                document.version,
                document.kind,
                action.as_str(),
                document.update_time_micros,
                document.expiration_time_micros,
                document.auth_principal_link,
                document.transaction_id,
                data,
            ],
        )?;
        self.log_statement(&sql, started);

        if changed == 0 {
            warn!(
                self_link = %document.self_link,
                version = document.version,
                "upsert ignored, most probably a newer version is already stored"
            );
            return Ok(SaveOutcome::Ignored);
        }
        Ok(SaveOutcome::Applied)
    }

    /// Unconditional physical delete; `true` when a row was removed.
    pub fn delete_document(&self, td: &TableDescription, self_link: &str) -> SdxResult<bool> {
        self.ensure_table(td)?;
        let sql = format!("DELETE FROM {} WHERE documentselflink = ?1", td.table_name);
        let started = Instant::now();
        let conn = self.pool.get()?;
        let removed = conn.execute(&sql, params![self_link])?;
        self.log_statement(&sql, started);
        Ok(removed > 0)
    }

    pub(crate) fn log_statement(&self, sql: &str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed >= self.config.slow_query_threshold() {
            warn!(elapsed_ms = elapsed.as_millis() as u64, %sql, "slow statement");
        } else if self.config.detailed_logging {
            info!(elapsed_us = elapsed.as_micros() as u64, %sql, "statement");
        }
    }
}

//! Query execution: table resolution, count, group-by and paged fetches.

use crate::auth::AuthorizationContext;
use crate::cluster::{ClusterMembership, DEFAULT_NODE_SELECTOR};
use crate::document::{Action, FIELD_NAME_SELF_LINK, now_micros};
use crate::error::{SdxError, SdxResult};
use crate::page::{PageFactory, QueryPage};
use crate::query::context::QueryRuntimeContext;
use crate::query::types::{
    MatchType, NumericRange, Occurrence, Query, QueryOption, QueryResult, QuerySpecification,
    QueryTerm,
};
use crate::schema::table::all_columns_list;
use crate::schema::{TableDescription, TypeName};
use crate::sql::escape::{LIKE_ESCAPE_CLAUSE, escape_sql_like, float_literal};
use crate::sql::{SortField, group_field, kind_scope, order_by_clause, pagination_clause, sort_fields};
use crate::storage::dao::DocumentDao;
use crate::storage::results::{process_documents, self_link_of};
use rusqlite::params;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Group key of rows with no value for the group-by property.
pub const GROUP_WITHOUT_RESULTS: &str = "DocumentsWithoutResults";

const LIVE_ACTIONS_CLAUSE: &str = "documentupdateaction IN ('POST', 'PATCH', 'PUT')";

/// Collaborators a query needs beyond the store.
pub struct QueryEnv<'a> {
    pub auth: Option<&'a dyn AuthorizationContext>,
    pub pages: &'a dyn PageFactory,
    pub cluster: &'a dyn ClusterMembership,
    /// Expiration of the task issuing the query; pages outlive it at least
    /// by the configured floor.
    pub expiration_micros: i64,
}

/// Converted WHERE text of one table.
struct TableQuery {
    td: Arc<TableDescription>,
    where_clause: String,
}

impl DocumentDao {
    /// Run a query specification. Resolved tables, sort fields and the
    /// kind scope are cached on `spec.context` for later pages.
    pub fn query_documents(
        &self,
        spec: &mut QuerySpecification,
        env: &QueryEnv<'_>,
    ) -> SdxResult<QueryResult> {
        let started = Instant::now();
        spec.query.validate()?;
        let now = now_micros();

        let tables = self.resolve_tables(spec)?;
        for td in &tables {
            self.ensure_table(td)?;
        }
        let mut parts = Vec::with_capacity(tables.len());
        for td in tables {
            if let Some(where_clause) = self.table_where(spec, &td, now, env)? {
                parts.push(TableQuery { td, where_clause });
            }
        }

        let mut result = if spec.has_option(QueryOption::Count) {
            self.count(&parts)?
        } else if parts.is_empty() {
            QueryResult::default()
        } else if spec.has_option(QueryOption::GroupBy) {
            self.group_query(spec, &parts, env)?
        } else {
            self.row_query(spec, &parts, env)?
        };
        result.query_time_micros = started.elapsed().as_micros() as u64;
        Ok(result)
    }

    /// Children of a factory ordered by self-link, scoped to what `auth`
    /// may read.
    pub fn query_by_self_link_prefix(
        &self,
        factory_link: &str,
        expand: bool,
        limit: usize,
        auth: Option<&dyn AuthorizationContext>,
    ) -> SdxResult<QueryResult> {
        let td = self
            .registry
            .table_for_factory(factory_link)
            .ok_or_else(|| SdxError::NotFound(format!("no factory at {factory_link}")))?;
        self.ensure_table(&td)?;
        let mut scope = Vec::new();
        if !self.push_resource_scope(&td, auth, &mut scope)? {
            return Ok(QueryResult::default());
        }
        let scope: String = scope.iter().map(|c| format!(" AND {c}")).collect();
        let sql = format!(
            "SELECT data FROM {} WHERE documentselflink LIKE ?1{LIKE_ESCAPE_CLAUSE} AND {LIVE_ACTIONS_CLAUSE} \
             AND (documentexpirationtimemicros = 0 OR documentexpirationtimemicros > ?2){scope} \
             ORDER BY documentselflink LIMIT ?3",
            td.table_name
        );
        let pattern = format!("{}%", escape_sql_like(&td.factory_link_with_slash()));
        let started = Instant::now();
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&sql)?;
        let raws = stmt
            .query_map(params![pattern, now_micros(), limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        self.log_statement(&sql, started);
        drop(stmt);
        drop(conn);

        let mut spec = QuerySpecification::default();
        if expand {
            spec.options.insert(QueryOption::ExpandContent);
        }
        let documents = raws
            .iter()
            .map(|r| serde_json::from_str::<Value>(r))
            .collect::<Result<Vec<_>, _>>()?;
        let mut result = QueryResult::default();
        process_documents(&spec, documents, &mut result);
        Ok(result)
    }

    // ════════════════════════════════════════════
    // Table resolution
    // ════════════════════════════════════════════

    fn resolve_tables(&self, spec: &mut QuerySpecification) -> SdxResult<Vec<Arc<TableDescription>>> {
        if let Some(tables) = &spec.context.tables {
            if let Some(stale) = tables.iter().find(|td| !self.registry.is_current(td)) {
                return Err(SdxError::StaleQueryContext(format!(
                    "table {} was re-registered",
                    stale.table_name
                )));
            }
            return Ok(tables.clone());
        }

        let query = &spec.query;
        let kinds = spec
            .context
            .kind_scope
            .get_or_insert_with(|| kind_scope(query))
            .clone();
        let mut tables: Vec<Arc<TableDescription>> = if !kinds.is_empty() {
            kinds
                .iter()
                .filter_map(|k| self.registry.table_for_kind(k))
                .collect()
        } else {
            let links = self_link_scope(&spec.query);
            if links.is_empty() {
                debug!("no kind or self-link constraint, querying every table");
                self.registry.tables()
            } else {
                self.registry
                    .tables()
                    .into_iter()
                    .filter(|td| links.iter().any(|l| l.covers(td)))
                    .collect()
            }
        };
        tables.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        tables.dedup_by(|a, b| a.table_name == b.table_name);
        spec.context.tables = Some(tables.clone());
        Ok(tables)
    }

    /// WHERE text for one table, `None` when the table cannot match.
    fn table_where(
        &self,
        spec: &mut QuerySpecification,
        td: &TableDescription,
        now: i64,
        env: &QueryEnv<'_>,
    ) -> SdxResult<Option<String>> {
        let converted = self.converter.convert(&spec.query, &mut spec.context, td)?;
        if converted == "FALSE" {
            return Ok(None);
        }
        let mut clauses = Vec::new();
        if converted != "TRUE" {
            clauses.push(format!("({converted})"));
        }
        if !spec.has_option(QueryOption::IncludeDeleted) {
            clauses.push(LIVE_ACTIONS_CLAUSE.to_string());
            clauses.push(format!(
                "(documentexpirationtimemicros = 0 OR documentexpirationtimemicros > {now})"
            ));
        }
        if spec.has_option(QueryOption::TimeSnapshot) {
            let boundary = spec.time_snapshot_boundary_micros.ok_or_else(|| {
                SdxError::validation("TIME_SNAPSHOT requires a time snapshot boundary")
            })?;
            clauses.push(format!("documentupdatetimemicros <= {boundary}"));
        }

        if !self.push_resource_scope(td, env.auth, &mut clauses)? {
            return Ok(None);
        }

        if clauses.is_empty() {
            return Ok(Some("TRUE".to_string()));
        }
        Ok(Some(clauses.join(" AND ")))
    }

    /// Append the read scope of `auth` on `td`. `false` when nothing in the
    /// table is readable.
    fn push_resource_scope(
        &self,
        td: &TableDescription,
        auth: Option<&dyn AuthorizationContext>,
        clauses: &mut Vec<String>,
    ) -> SdxResult<bool> {
        if !self.config.authorization_enabled || auth.is_some_and(|a| a.is_system_user()) {
            return Ok(true);
        }
        // fail closed: no context or no resource query sees nothing
        let Some(resource) = auth.and_then(|a| a.resource_query(Action::Get)) else {
            return Ok(false);
        };
        let scoped = self
            .converter
            .convert(&resource, &mut QueryRuntimeContext::default(), td)?;
        if scoped == "FALSE" {
            return Ok(false);
        }
        if scoped != "TRUE" {
            clauses.push(format!("({scoped})"));
        }
        Ok(true)
    }

    fn sort_fields_for(
        &self,
        spec: &mut QuerySpecification,
        td: &TableDescription,
    ) -> SdxResult<Vec<SortField>> {
        if let Some(fields) = &spec.context.sort_fields {
            return Ok(fields.clone());
        }
        let fields = sort_fields(spec, td)?;
        spec.context.sort_fields = Some(fields.clone());
        Ok(fields)
    }

    // ════════════════════════════════════════════
    // Strategies
    // ════════════════════════════════════════════

    fn count(&self, parts: &[TableQuery]) -> SdxResult<QueryResult> {
        let mut result = QueryResult::default();
        if parts.is_empty() {
            return Ok(result);
        }
        let sql = format!(
            "SELECT {}",
            parts
                .iter()
                .map(|p| format!(
                    "(SELECT COUNT(*) FROM {} WHERE {})",
                    p.td.table_name, p.where_clause
                ))
                .collect::<Vec<_>>()
                .join(" + ")
        );
        let started = Instant::now();
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        self.log_statement(&sql, started);
        result.document_count = count.max(0) as u64;
        Ok(result)
    }

    fn row_query(
        &self,
        spec: &mut QuerySpecification,
        parts: &[TableQuery],
        env: &QueryEnv<'_>,
    ) -> SdxResult<QueryResult> {
        let fields = self.sort_fields_for(spec, &parts[0].td)?;
        let order_by = order_by_clause(&fields);
        let page = spec.context.page.clone();
        let explicit = spec.context.limit_override.or(spec.explicit_limit());
        let top = spec.has_option(QueryOption::TopResults);
        let mut result = QueryResult::default();

        // first request of a paginated query only creates the first page
        if explicit.is_some() && page.is_none() && !top {
            let sql = format!("SELECT EXISTS({})", select_rows(parts, None));
            let started = Instant::now();
            let exists: bool = {
                let conn = self.pool.get()?;
                conn.query_row(&sql, [], |row| row.get(0))?
            };
            self.log_statement(&sql, started);
            if exists {
                let first = QueryPage {
                    offset: spec.offset,
                    ..QueryPage::default()
                };
                result.next_page_link =
                    Some(env.pages.create_page(spec.clone(), first, env.expiration_micros));
            }
            return Ok(result);
        }

        let paged = page.is_some() && !top;
        let limit = explicit.unwrap_or(self.config.query_result_limit);
        let fetch = if paged { limit.saturating_add(1) } else { limit };
        let offset = match &page {
            Some(p) => p.offset.unwrap_or(0),
            None => spec.offset.unwrap_or(0),
        };
        let after = page.as_ref().and_then(|p| p.after.clone());
        let sql = format!(
            "{}{order_by} LIMIT {fetch} OFFSET {offset}",
            select_rows(parts, after.as_deref())
        );
        let mut rows = self.fetch_documents(&sql)?;

        if let Some(current) = &page {
            if paged && rows.len() > limit {
                rows.truncate(limit);
                let mut next = QueryPage {
                    previous_page_link: Some(current.link.clone()),
                    ..QueryPage::default()
                };
                let keyset = match spec.offset {
                    Some(_) => None,
                    None => rows.last().and_then(|last| pagination_clause(&fields, last)),
                };
                match keyset {
                    Some(clause) => next.after = Some(clause),
                    None => {
                        next.after = after.clone();
                        next.offset = Some(offset + limit);
                    }
                }
                result.next_page_link =
                    Some(env.pages.create_page(spec.clone(), next, env.expiration_micros));
            }
            if !spec.has_option(QueryOption::ForwardOnly) {
                result.prev_page_link = current.previous_page_link.clone();
            }
        }

        if spec.has_option(QueryOption::OwnerSelection) {
            let mut owned = Vec::with_capacity(rows.len());
            for row in rows {
                let Some(link) = self_link_of(&row) else {
                    continue;
                };
                if env.cluster.select_owner(DEFAULT_NODE_SELECTOR, link)?.is_local_owner {
                    owned.push(row);
                }
            }
            rows = owned;
        }
        process_documents(spec, rows, &mut result);
        Ok(result)
    }

    fn group_query(
        &self,
        spec: &mut QuerySpecification,
        parts: &[TableQuery],
        env: &QueryEnv<'_>,
    ) -> SdxResult<QueryResult> {
        let group = group_field(spec, &parts[0].td)?;
        let group_type = spec
            .group_by_term
            .as_ref()
            .and_then(|t| t.property_type)
            .unwrap_or(TypeName::String);
        let page = spec.context.page.clone();
        let group_limit = spec
            .group_result_limit
            .filter(|l| *l > 0)
            .unwrap_or(self.config.query_result_limit);
        let group_offset = page.as_ref().and_then(|p| p.group_offset).unwrap_or(0);
        let direction = if group.descending { "DESC" } else { "ASC" };

        let sql = format!(
            "SELECT {} AS grp FROM ({}) AS docs GROUP BY grp ORDER BY grp {direction} LIMIT {} OFFSET {group_offset}",
            group.expr,
            union_source(parts),
            group_limit.saturating_add(1)
        );
        let started = Instant::now();
        let mut keys: Vec<SqlValue> = {
            let conn = self.pool.get()?;
            let mut stmt = conn.prepare(&sql)?;
            let keys = stmt
                .query_map([], |row| row.get::<_, SqlValue>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            keys
        };
        self.log_statement(&sql, started);

        let more = keys.len() > group_limit;
        keys.truncate(group_limit);

        let mut result = QueryResult::default();
        let mut per_group = BTreeMap::new();
        for key in keys {
            let Some((name, clause)) = group_clause(&group, group_type, key) else {
                continue;
            };
            let mut group_spec = spec.clone();
            group_spec.options.remove(&QueryOption::GroupBy);
            group_spec.query = Query::group(vec![spec.query.clone(), clause]);
            group_spec.context = QueryRuntimeContext::default();
            let link = env
                .pages
                .create_page(group_spec, QueryPage::default(), env.expiration_micros);
            per_group.insert(name, link);
        }
        result.next_page_links_per_group = Some(per_group);

        if more {
            let next = QueryPage {
                group_offset: Some(group_offset + group_limit),
                previous_page_link: page.as_ref().map(|p| p.link.clone()),
                ..QueryPage::default()
            };
            result.next_page_link =
                Some(env.pages.create_page(spec.clone(), next, env.expiration_micros));
        }
        if let Some(current) = &page
            && !spec.has_option(QueryOption::ForwardOnly)
        {
            result.prev_page_link = current.previous_page_link.clone();
        }
        Ok(result)
    }

    fn fetch_documents(&self, sql: &str) -> SdxResult<Vec<Value>> {
        let started = Instant::now();
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut documents = Vec::with_capacity(self.config.fetch_size);
        while let Some(row) = rows.next()? {
            let raw: String = row.get(0)?;
            documents.push(serde_json::from_str(&raw)?);
        }
        self.log_statement(sql, started);
        Ok(documents)
    }
}

/// `SELECT data, documentselflink` over every part, optionally after a
/// keyset predicate.
fn select_rows(parts: &[TableQuery], after: Option<&str>) -> String {
    match parts {
        [one] => {
            let mut sql = format!(
                "SELECT data, documentselflink FROM {} WHERE {}",
                one.td.table_name, one.where_clause
            );
            if let Some(after) = after {
                sql.push_str(" AND ");
                sql.push_str(after);
            }
            sql
        }
        _ => {
            let mut sql = format!(
                "SELECT data, documentselflink FROM ({}) AS docs",
                union_source(parts)
            );
            if let Some(after) = after {
                sql.push_str(" WHERE ");
                sql.push_str(after);
            }
            sql
        }
    }
}

fn union_source(parts: &[TableQuery]) -> String {
    let columns = all_columns_list();
    parts
        .iter()
        .map(|p| format!("SELECT {columns} FROM {} WHERE {}", p.td.table_name, p.where_clause))
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

/// Group name and the clause selecting its members.
fn group_clause(group: &SortField, type_name: TypeName, key: SqlValue) -> Option<(String, Query)> {
    let property = group.property_name.as_str();
    let equal_long = |v: i64| Query::from_term(QueryTerm::range(property, NumericRange::equal_long(v)));
    let equal_double = |v: f64| Query::from_term(QueryTerm::range(property, NumericRange::equal_double(v)));
    match key {
        SqlValue::Null => Some((
            GROUP_WITHOUT_RESULTS.to_string(),
            Query::term(property, "*").with_occurrence(Occurrence::MustNot),
        )),
        SqlValue::Integer(i) => Some(match type_name {
            TypeName::Long | TypeName::Date => (i.to_string(), equal_long(i)),
            TypeName::Double => (float_literal(i as f64), equal_double(i as f64)),
            TypeName::Boolean => {
                let value = if i != 0 { "true" } else { "false" };
                (value.to_string(), Query::term(property, value))
            }
            _ => (i.to_string(), Query::term(property, i.to_string())),
        }),
        SqlValue::Real(f) => Some((float_literal(f), equal_double(f))),
        SqlValue::Text(s) => Some((s.clone(), Query::term(property, s))),
        SqlValue::Blob(_) => None,
    }
}

/// Self-link constraints of a query, used when it names no kind.
enum LinkScope {
    Exact(String),
    Prefix(String),
}

impl LinkScope {
    fn covers(&self, td: &TableDescription) -> bool {
        let factory = td.factory_link_with_slash();
        match self {
            LinkScope::Exact(link) => link.starts_with(&factory),
            LinkScope::Prefix(prefix) => factory.starts_with(prefix.as_str()) || prefix.starts_with(&factory),
        }
    }
}

fn self_link_scope(query: &Query) -> Vec<LinkScope> {
    let mut scope = Vec::new();
    query.for_each_term(&mut |term, negated| {
        if negated || term.property_name != FIELD_NAME_SELF_LINK {
            return;
        }
        let Some(value) = term.match_value.as_deref() else {
            return;
        };
        match term.match_type {
            MatchType::Term if value != "*" => scope.push(LinkScope::Exact(value.to_string())),
            MatchType::Term => {}
            MatchType::Prefix => scope.push(LinkScope::Prefix(value.to_string())),
            MatchType::Wildcard => {
                let head = value.split(['*', '?']).next().unwrap_or_default();
                scope.push(LinkScope::Prefix(head.to_string()));
            }
            MatchType::Phrase => {}
        }
    });
    scope
}

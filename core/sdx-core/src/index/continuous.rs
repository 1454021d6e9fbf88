//! Continuous queries: 문서 변경 시 등록된 필터 평가 후 알림
//!
//! A STARTED continuous query task registers its compiled filter here.
//! Every applied write is matched against all registered filters and each
//! match produces one [`QueryNotification`] carrying just that document.

use crate::auth::AuthorizationContext;
use crate::document::{Action, ServiceDocument};
use crate::error::{SdxError, SdxResult};
use crate::query::{QueryFilter, QueryOption, QueryResult, QueryTask, TaskStage};
use crate::schema::SchemaRegistry;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// PATCH delivered to a continuous query task.
#[derive(Debug, Clone)]
pub struct QueryNotification {
    pub task_link: String,
    /// Subject the notification runs as: the creator of the query
    pub subject: String,
    pub task: QueryTask,
}

/// Receives continuous query notifications.
pub trait TaskNotifier: Send + Sync {
    fn notify(&self, notification: QueryNotification);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl TaskNotifier for NoopNotifier {
    fn notify(&self, _notification: QueryNotification) {}
}

/// Documents the creator of a query may observe.
#[derive(Debug)]
enum Visibility {
    All,
    Scoped(QueryFilter),
    Nothing,
}

#[derive(Debug)]
pub struct ActiveQuery {
    task_link: String,
    subject: String,
    filter: QueryFilter,
    visibility: Visibility,
    options: BTreeSet<QueryOption>,
}

impl ActiveQuery {
    pub fn task_link(&self) -> &str {
        &self.task_link
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    fn matches(&self, json: &serde_json::Value, kind: &str, registry: &SchemaRegistry) -> bool {
        let visible = match &self.visibility {
            Visibility::All => true,
            Visibility::Scoped(scope) => scope.matches_json(json, kind, registry),
            Visibility::Nothing => false,
        };
        visible && self.filter.matches_json(json, kind, registry)
    }

    fn notification(&self, document: &ServiceDocument, json: serde_json::Value) -> QueryNotification {
        let mut results = QueryResult {
            document_links: vec![document.self_link.clone()],
            document_count: 1,
            ..QueryResult::default()
        };
        if self.options.contains(&QueryOption::ExpandContent)
            || self.options.contains(&QueryOption::Count)
        {
            results.documents = Some(BTreeMap::from([(document.self_link.clone(), json)]));
        }
        let mut task = QueryTask::default()
            .with_self_link(self.task_link.clone())
            .with_stage(TaskStage::Started);
        task.query_spec.options = self.options.clone();
        task.results = Some(results);
        QueryNotification {
            task_link: self.task_link.clone(),
            subject: self.subject.clone(),
            task,
        }
    }
}

/// Registered continuous queries keyed by task link.
#[derive(Debug, Default)]
pub struct ActiveQueries {
    queries: DashMap<String, Arc<ActiveQuery>>,
}

impl ActiveQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and register a continuous query task.
    pub fn register(
        &self,
        task: &QueryTask,
        auth: Option<&dyn AuthorizationContext>,
        subject: String,
        authorization_enabled: bool,
    ) -> SdxResult<()> {
        if task.self_link.is_empty() {
            return Err(SdxError::validation("continuous query task has no self link"));
        }
        let filter = QueryFilter::create(&task.query_spec.query)?;
        let visibility = match auth {
            _ if !authorization_enabled => Visibility::All,
            Some(auth) if auth.is_system_user() => Visibility::All,
            Some(auth) => match auth.resource_query(Action::Get) {
                Some(resource) => Visibility::Scoped(QueryFilter::create(&resource)?),
                None => Visibility::Nothing,
            },
            None => Visibility::Nothing,
        };
        let query = ActiveQuery {
            task_link: task.self_link.clone(),
            subject,
            filter,
            visibility,
            options: task.query_spec.options.clone(),
        };
        debug!(task = %task.self_link, subject = %query.subject, "continuous query registered");
        self.queries.insert(task.self_link.clone(), Arc::new(query));
        Ok(())
    }

    pub fn remove(&self, task_link: &str) -> bool {
        self.queries.remove(task_link).is_some()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// One notification per registered query matching `document`.
    pub fn notifications(
        &self,
        document: &ServiceDocument,
        registry: &SchemaRegistry,
    ) -> SdxResult<Vec<QueryNotification>> {
        if self.queries.is_empty() {
            return Ok(Vec::new());
        }
        let json = document.to_json()?;
        // snapshot so notifiers never run under a map shard lock
        let active: Vec<Arc<ActiveQuery>> = self.queries.iter().map(|e| e.value().clone()).collect();
        Ok(active
            .iter()
            .filter(|q| q.matches(&json, &document.kind, registry))
            .map(|q| q.notification(document, json.clone()))
            .collect())
    }
}

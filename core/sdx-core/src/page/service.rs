//! One continuation page of a paginated query.

use crate::document::{Action, now_micros};
use crate::error::SdxError;
use crate::index::{DocumentIndexService, Operation, OperationBody, OperationResponse};
use crate::query::{QueryOption, QuerySpecification, QueryTask, TaskStage};
use std::sync::Arc;
use tracing::{debug, warn};

/// Holds the cloned specification of the query that created it, with the
/// cursor of this page in `spec.context.page`.
#[derive(Debug)]
pub struct QueryPageService {
    link: String,
    spec: QuerySpecification,
    expiration_micros: i64,
}

impl QueryPageService {
    pub fn new(link: String, spec: QuerySpecification, expiration_micros: i64) -> Self {
        Self {
            link,
            spec,
            expiration_micros,
        }
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn spec(&self) -> &QuerySpecification {
        &self.spec
    }

    pub fn expiration_micros(&self) -> i64 {
        self.expiration_micros
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expiration_micros <= now
    }

    /// Transient task fetching this page. `result_limit` applies to this
    /// fetch only.
    pub fn build_task(&self, result_limit: Option<usize>) -> QueryTask {
        let mut spec = self.spec.clone();
        spec.options.remove(&QueryOption::Continuous);
        spec.context.limit_override = result_limit.filter(|l| *l > 0);
        let mut task = QueryTask::new(spec)
            .with_self_link(self.link.clone())
            .with_stage(TaskStage::Started);
        task.expiration_micros = self.expiration_micros;
        task
    }

    /// Only a stale context on the first page of a query that may be
    /// re-read is retried.
    pub fn can_retry(&self, err: &SdxError) -> bool {
        matches!(err, SdxError::StaleQueryContext(_))
            && self.spec.context.page.as_ref().is_none_or(|p| p.is_first())
            && !self.spec.has_option(QueryOption::ForwardOnly)
    }

    /// Serve a GET by forwarding a PATCH of the rebuilt task to the index.
    /// `get` is completed with the query task response.
    pub fn handle_get(
        self: &Arc<Self>,
        index: &DocumentIndexService,
        get: Operation,
        result_limit: Option<usize>,
    ) {
        if self.is_expired(now_micros()) {
            index.pages().remove(&self.link);
            get.complete(Err(SdxError::NotFound(format!("page {} expired", self.link))));
            return;
        }
        let task = self.build_task(result_limit);
        self.forward(index.clone(), get, task, true);
    }

    fn forward(
        self: &Arc<Self>,
        index: DocumentIndexService,
        get: Operation,
        task: QueryTask,
        may_retry: bool,
    ) {
        let page = Arc::clone(self);
        let retry_task = may_retry.then(|| task.clone());
        let patch = Operation::new(Action::Patch, OperationBody::QueryTask(Box::new(task)))
            .with_auth_arc(get.auth.clone())
            .with_expiration(get.expiration_micros);
        let target = index.clone();
        let patch = patch.with_completion(move |result| match (result, retry_task) {
            (Err(e), Some(mut task)) if page.can_retry(&e) => {
                warn!(page = %page.link, error = %e, "retrying page with a fresh query context");
                task.query_spec.context.clear_cached();
                page.forward(index, get, task, false);
            }
            (Err(e), _) => get.complete(Err(e)),
            (Ok(response), _) => {
                page.after_fetch(&index, &response);
                get.complete(Ok(response));
            }
        });
        target.handle_request(patch);
    }

    fn after_fetch(&self, index: &DocumentIndexService, response: &OperationResponse) {
        if !self.spec.has_option(QueryOption::SingleUse) {
            return;
        }
        let has_next = match response {
            OperationResponse::QueryTask(task) => task
                .results
                .as_ref()
                .is_some_and(|r| r.next_page_link.is_some()),
            _ => false,
        };
        if !has_next {
            debug!(page = %self.link, "single use query drained");
            index.pages().remove(&self.link);
        }
    }
}

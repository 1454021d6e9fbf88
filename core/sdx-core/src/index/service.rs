//! Document index service: 요청 분류, 큐잉, 실행
//!
//! Operations are classified on arrival: page fetches go straight to their
//! page service, GET and PATCH to the query queue, everything else to the
//! update queue. Each queue is drained by its own rayon pool; a worker takes
//! one operation, acquires a permit of the shared semaphore and executes it.

use crate::auth::SystemAuthContext;
use crate::cluster::ClusterMembership;
use crate::config::IndexConfig;
use crate::document::{Action, ServiceDocument, now_micros};
use crate::error::{SdxError, SdxResult};
use crate::index::continuous::{ActiveQueries, TaskNotifier};
use crate::index::operation::{Operation, OperationBody, OperationResponse};
use crate::index::queue::RoundRobinQueue;
use crate::index::semaphore::Semaphore;
use crate::index::stats::{IndexStats, IndexStatsSnapshot};
use crate::page::PageRegistry;
use crate::query::{
    QueryFilter, QueryOption, QuerySpecification, QueryTask, TaskStage,
};
use crate::schema::{DocumentType, SchemaRegistry, TableDescription};
use crate::storage::{DocumentDao, QueryEnv, SaveOutcome};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Link of the index service; also the key of the expiration duty.
pub const SELF_LINK: &str = "/core/document-index";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueKind {
    Query,
    Update,
}

pub(crate) struct IndexInner {
    pub(crate) config: IndexConfig,
    pub(crate) dao: DocumentDao,
    pub(crate) pages: PageRegistry,
    pub(crate) cluster: Arc<dyn ClusterMembership>,
    notifier: Arc<dyn TaskNotifier>,
    pub(crate) active_queries: ActiveQueries,
    pub(crate) stats: IndexStats,
    query_queue: RoundRobinQueue<Operation>,
    update_queue: RoundRobinQueue<Operation>,
    query_pool: ThreadPool,
    update_pool: ThreadPool,
    semaphore: Semaphore,
    stopping: AtomicBool,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; clones share one index.
#[derive(Clone)]
pub struct DocumentIndexService {
    inner: Arc<IndexInner>,
}

impl DocumentIndexService {
    pub fn new(
        config: IndexConfig,
        registry: Arc<SchemaRegistry>,
        cluster: Arc<dyn ClusterMembership>,
        notifier: Arc<dyn TaskNotifier>,
    ) -> SdxResult<Self> {
        config.validate()?;
        let query_pool = build_pool("sdx-query", config.query_thread_count)?;
        let update_pool = build_pool("sdx-update", config.update_thread_count)?;
        let inner = IndexInner {
            dao: DocumentDao::new(&config, registry)?,
            pages: PageRegistry::new(config.page_ttl_floor()),
            cluster,
            notifier,
            active_queries: ActiveQueries::new(),
            stats: IndexStats::default(),
            query_queue: RoundRobinQueue::new("query", config.query_queue_depth),
            update_queue: RoundRobinQueue::new("update", config.update_queue_depth),
            query_pool,
            update_pool,
            semaphore: Semaphore::new(config.semaphore_permits()),
            stopping: AtomicBool::new(false),
            maintenance: Mutex::new(None),
            config,
        };
        info!(
            query_threads = inner.config.query_thread_count,
            update_threads = inner.config.update_thread_count,
            "document index started"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        self.inner.dao.registry()
    }

    pub fn dao(&self) -> &DocumentDao {
        &self.inner.dao
    }

    pub fn pages(&self) -> &PageRegistry {
        &self.inner.pages
    }

    /// Register a document type and create its table. Waits for every
    /// in-flight operation to release its permit first.
    pub fn register_document_type(
        &self,
        factory_link: &str,
        document_type: &DocumentType,
    ) -> SdxResult<Arc<TableDescription>> {
        let _all = self.inner.semaphore.acquire_all();
        self.inner.dao.init_for_document(factory_link, document_type)
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    // ════════════════════════════════════════════
    // Dispatch
    // ════════════════════════════════════════════

    /// Accept an operation; its completion runs exactly once, possibly on
    /// another thread.
    pub fn handle_request(&self, op: Operation) {
        if self.is_stopping() {
            op.complete(Err(SdxError::Unavailable("index service is stopping".into())));
            return;
        }
        if let (Action::Get, OperationBody::QueryPage { page_link, result_limit }) =
            (op.action, &op.body)
        {
            let result_limit = *result_limit;
            match self.inner.pages.get(page_link) {
                Some(page) => page.handle_get(self, op, result_limit),
                None => {
                    let message = format!("no page at {page_link}");
                    op.complete(Err(SdxError::NotFound(message)));
                }
            }
            return;
        }
        match op.action {
            Action::Put => op.complete(Err(SdxError::validation("PUT is not supported"))),
            Action::Patch if op.remote => {
                op.complete(Err(SdxError::validation("remote PATCH is not supported")))
            }
            Action::Get | Action::Patch => self.enqueue(QueueKind::Query, op),
            Action::Post | Action::Delete => self.enqueue(QueueKind::Update, op),
        }
    }

    fn enqueue(&self, kind: QueueKind, op: Operation) {
        let inner = &self.inner;
        let subject = op.subject(inner.config.authorization_enabled);
        let (queue, pool) = match kind {
            QueueKind::Query => (&inner.query_queue, &inner.query_pool),
            QueueKind::Update => (&inner.update_queue, &inner.update_pool),
        };
        match queue.offer(&subject, op) {
            Ok(()) => {
                let inner = Arc::clone(&self.inner);
                pool.spawn(move || inner.drain(kind));
            }
            Err(op) => {
                IndexStats::increment(&inner.stats.rejected_operations);
                warn!(queue = queue.name(), %subject, "queue full, operation rejected");
                op.complete(Err(SdxError::Rejected(format!(
                    "{} queue limit {} exceeded",
                    queue.name(),
                    queue.max_depth()
                ))));
            }
        }
    }

    /// Submit and block until the operation completes.
    pub fn execute(&self, op: Operation) -> SdxResult<OperationResponse> {
        let (op, rx) = op.channel();
        self.handle_request(op);
        rx.recv()
            .map_err(|_| SdxError::Unavailable("operation dropped without completion".into()))?
    }

    // ════════════════════════════════════════════
    // Convenience
    // ════════════════════════════════════════════

    /// Index a document version as the system user.
    pub fn index_document(&self, document: ServiceDocument) -> SdxResult<()> {
        self.execute(
            Operation::new(
                Action::Post,
                OperationBody::UpdateIndex {
                    document,
                    force_index_update: false,
                },
            )
            .with_auth(SystemAuthContext),
        )
        .map(|_| ())
    }

    pub fn get_document(&self, self_link: &str) -> SdxResult<Option<ServiceDocument>> {
        let op = Operation::new(
            Action::Get,
            OperationBody::Get {
                link: self_link.to_string(),
                expand: true,
            },
        )
        .with_auth(SystemAuthContext);
        match self.execute(op)? {
            OperationResponse::Document(document) => Ok(document),
            other => Err(SdxError::validation(format!("unexpected response {other:?}"))),
        }
    }

    /// Run a query as the system user and return the finished task.
    pub fn query(&self, spec: QuerySpecification) -> SdxResult<QueryTask> {
        self.query_task(
            Operation::new(
                Action::Patch,
                OperationBody::QueryTask(Box::new(QueryTask::new(spec))),
            )
            .with_auth(SystemAuthContext),
        )
    }

    /// Fetch a page, optionally overriding its result limit for this fetch.
    pub fn fetch_page(&self, page_link: &str, result_limit: Option<usize>) -> SdxResult<QueryTask> {
        self.query_task(
            Operation::new(
                Action::Get,
                OperationBody::QueryPage {
                    page_link: page_link.to_string(),
                    result_limit,
                },
            )
            .with_auth(SystemAuthContext),
        )
    }

    fn query_task(&self, op: Operation) -> SdxResult<QueryTask> {
        self.execute(op)?
            .into_query_task()
            .ok_or_else(|| SdxError::validation("query did not return a task"))
    }

    // ════════════════════════════════════════════
    // Lifecycle
    // ════════════════════════════════════════════

    /// Spawn the thread posting a maintenance operation every interval.
    pub fn start_maintenance(&self) -> SdxResult<()> {
        let mut slot = self.inner.maintenance.lock();
        if slot.is_some() {
            return Ok(());
        }
        let weak: Weak<IndexInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.maintenance_interval();
        let handle = thread::Builder::new()
            .name("sdx-maintenance".into())
            .spawn(move || {
                loop {
                    thread::park_timeout(interval);
                    let Some(inner) = weak.upgrade() else {
                        break;
                    };
                    if inner.stopping.load(Ordering::Acquire) {
                        break;
                    }
                    let service = DocumentIndexService { inner };
                    service.handle_request(
                        Operation::new(Action::Post, OperationBody::Maintenance)
                            .with_auth(SystemAuthContext),
                    );
                }
            })?;
        *slot = Some(handle);
        Ok(())
    }

    /// One maintenance tick through the update queue.
    pub fn run_maintenance(&self) -> SdxResult<()> {
        self.execute(
            Operation::new(Action::Post, OperationBody::Maintenance).with_auth(SystemAuthContext),
        )
        .map(|_| ())
    }

    /// Fail every later operation with `Unavailable` and stop maintenance.
    pub fn stop(&self) {
        if self.inner.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.inner.maintenance.lock().take() {
            if handle.thread().id() != thread::current().id() {
                handle.thread().unpark();
                // a panicked maintenance thread has nothing left to clean up
                let _ = handle.join();
            }
        }
        info!("document index stopping");
    }

    pub fn stats(&self) -> IndexStatsSnapshot {
        let inner = &self.inner;
        inner.stats.snapshot(
            inner.active_queries.len(),
            inner.query_queue.len(),
            inner.update_queue.len(),
            inner.pages.len(),
        )
    }
}

fn build_pool(prefix: &'static str, threads: usize) -> SdxResult<ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(move |i| format!("{prefix}-{i}"))
        .build()
        .map_err(|e| SdxError::Config(format!("failed to create {prefix} pool: {e}")))
}

impl IndexInner {
    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    fn drain(&self, kind: QueueKind) {
        let queue = match kind {
            QueueKind::Query => &self.query_queue,
            QueueKind::Update => &self.update_queue,
        };
        if let Some(op) = queue.poll() {
            self.execute_one(op);
        }
    }

    fn execute_one(&self, op: Operation) {
        if self.is_stopping() {
            op.complete(Err(SdxError::Unavailable("index service is stopping".into())));
            return;
        }
        if op.is_expired(now_micros()) {
            IndexStats::increment(&self.stats.rejected_operations);
            op.complete(Err(SdxError::Rejected("Operation has expired".into())));
            return;
        }
        let result = {
            let _permit = match op.body {
                OperationBody::Maintenance => self.semaphore.acquire_all(),
                _ => self.semaphore.acquire(),
            };
            self.dispatch(&op)
        };
        match result {
            Ok(response) => op.complete(Ok(response)),
            Err(e) => self.fail(op, e),
        }
    }

    fn fail(&self, op: Operation, e: SdxError) {
        if self.is_stopping() {
            info!(action = %op.action, error = %e, "operation failed while stopping");
            op.complete(Err(SdxError::Unavailable(e.to_string())));
            return;
        }
        IndexStats::increment(&self.stats.failures);
        if e.status_code() >= 500 {
            error!(action = %op.action, error = %e, "index operation failed");
        } else {
            warn!(action = %op.action, error = %e, "index operation rejected");
        }
        op.complete(Err(e));
    }

    fn dispatch(&self, op: &Operation) -> SdxResult<OperationResponse> {
        match &op.body {
            OperationBody::UpdateIndex {
                document,
                force_index_update,
            } => self.update_index(op.action, document, *force_index_update),
            OperationBody::QueryTask(task) => self.handle_query_task(op, task),
            OperationBody::Maintenance => {
                self.maintain()?;
                Ok(OperationResponse::Empty)
            }
            OperationBody::Get { link, expand } => self.get(op, link, *expand),
            OperationBody::QueryPage { page_link, .. } => Err(SdxError::validation(format!(
                "{} of page {page_link} is not supported",
                op.action
            ))),
            OperationBody::Empty => Err(SdxError::validation(format!(
                "{} without a body is not supported",
                op.action
            ))),
        }
    }

    // ════════════════════════════════════════════
    // Writes
    // ════════════════════════════════════════════

    fn update_index(
        &self,
        action: Action,
        document: &ServiceDocument,
        force: bool,
    ) -> SdxResult<OperationResponse> {
        let deleted;
        let document = if action == Action::Delete && !document.is_deleted() {
            deleted = document.clone_as_deleted();
            &deleted
        } else {
            document
        };
        match self.dao.save_document(document, force)? {
            SaveOutcome::Applied | SaveOutcome::Deleted => {
                IndexStats::increment(&self.stats.commits);
                self.apply_active_queries(document);
            }
            SaveOutcome::Ignored => IndexStats::increment(&self.stats.ignored_upserts),
        }
        Ok(OperationResponse::Empty)
    }

    /// Notify every continuous query matching a committed document.
    pub(crate) fn apply_active_queries(&self, document: &ServiceDocument) {
        match self
            .active_queries
            .notifications(document, self.dao.registry())
        {
            Ok(notifications) => {
                for notification in notifications {
                    debug!(task = %notification.task_link, self_link = %document.self_link, "continuous query match");
                    self.notifier.notify(notification);
                }
            }
            Err(e) => warn!(self_link = %document.self_link, error = %e, "continuous query evaluation failed"),
        }
    }

    // ════════════════════════════════════════════
    // Reads
    // ════════════════════════════════════════════

    fn handle_query_task(&self, op: &Operation, task: &QueryTask) -> SdxResult<OperationResponse> {
        if task.query_spec.has_option(QueryOption::Continuous) {
            return self.handle_continuous(op, task);
        }
        IndexStats::increment(&self.stats.queries);
        let mut task = task.clone();
        let expiration_micros = if task.expiration_micros > 0 {
            task.expiration_micros
        } else {
            op.expiration_micros
        };
        let env = QueryEnv {
            auth: op.auth.as_deref(),
            pages: &self.pages,
            cluster: self.cluster.as_ref(),
            expiration_micros,
        };
        let results = self.dao.query_documents(&mut task.query_spec, &env)?;
        task.results = Some(results);
        task.stage = TaskStage::Finished;
        Ok(OperationResponse::QueryTask(Box::new(task)))
    }

    fn handle_continuous(&self, op: &Operation, task: &QueryTask) -> SdxResult<OperationResponse> {
        match task.stage {
            TaskStage::Created => {
                return Err(SdxError::validation("Stage not supported"));
            }
            TaskStage::Started => self.active_queries.register(
                task,
                op.auth.as_deref(),
                op.subject(self.config.authorization_enabled),
                self.config.authorization_enabled,
            )?,
            TaskStage::Finished | TaskStage::Failed | TaskStage::Cancelled => {
                if self.active_queries.remove(&task.self_link) {
                    debug!(task = %task.self_link, "continuous query removed");
                }
            }
        }
        Ok(OperationResponse::QueryTask(Box::new(task.clone())))
    }

    fn get(&self, op: &Operation, link: &str, expand: bool) -> SdxResult<OperationResponse> {
        if let Some(factory_link) = link.strip_suffix("/*") {
            let results = self.dao.query_by_self_link_prefix(
                factory_link,
                expand,
                self.config.query_result_limit,
                op.auth.as_deref(),
            )?;
            return Ok(OperationResponse::Documents(results));
        }
        let document = self.dao.load_document(link)?;
        if let Some(document) = &document {
            self.authorize_read(op, document)?;
        }
        Ok(OperationResponse::Document(document))
    }

    fn authorize_read(&self, op: &Operation, document: &ServiceDocument) -> SdxResult<()> {
        if !self.config.authorization_enabled {
            return Ok(());
        }
        let auth = match op.auth.as_deref() {
            Some(auth) if auth.is_system_user() => return Ok(()),
            Some(auth) => auth,
            None => return Err(SdxError::Forbidden(document.self_link.clone())),
        };
        let allowed = match auth.resource_query(Action::Get) {
            Some(resource) => {
                QueryFilter::create(&resource)?.matches(document, self.dao.registry())?
            }
            None => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(SdxError::Forbidden(document.self_link.clone()))
        }
    }

    fn maintain(&self) -> SdxResult<()> {
        IndexStats::increment(&self.stats.maintenance_runs);
        let now = now_micros();
        self.pages.expire(now);
        if !self.is_expiration_owner()? {
            debug!("not the expiration owner, skipping sweep");
            return Ok(());
        }
        self.expire_documents(now)?;
        Ok(())
    }
}

//! Index service: operation dispatch, fair queues, continuous queries and
//! expiration maintenance.

pub mod continuous;
mod expiration;
pub mod operation;
pub mod queue;
pub mod semaphore;
pub mod service;
pub mod stats;

pub use continuous::{ActiveQueries, NoopNotifier, QueryNotification, TaskNotifier};
pub use operation::{Completion, Operation, OperationBody, OperationResponse};
pub use queue::RoundRobinQueue;
pub use semaphore::{Semaphore, SemaphorePermit};
pub use service::{DocumentIndexService, SELF_LINK};
pub use stats::{IndexStats, IndexStatsSnapshot};

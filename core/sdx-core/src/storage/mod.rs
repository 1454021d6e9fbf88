//! Storage module: SQLite 기반 문서 저장소
//!
//! [`DocumentDao`] owns the connection pool and turns index operations
//! into SQL: versioned upserts, deletes, expiration scans and query
//! execution with pagination.

pub mod dao;
pub mod pool;
pub mod query;
pub(crate) mod results;

pub use dao::{DocumentDao, SaveOutcome};
pub use pool::{ConnectionPool, PooledConnection};
pub use query::{GROUP_WITHOUT_RESULTS, QueryEnv};

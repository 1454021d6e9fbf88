//! Bounded pool of SQLite connections.

use crate::config::DatabaseConfig;
use crate::error::{SdxError, SdxResult};
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::debug;

struct PoolState {
    idle: Vec<Connection>,
    opened: usize,
}

/// Connections are opened lazily up to `pool_size` and handed out through
/// [`PooledConnection`] guards that return them on drop.
///
/// An in-memory database exists only as long as its connection, so it is
/// served by exactly one connection opened up front.
pub struct ConnectionPool {
    config: DatabaseConfig,
    max_size: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ConnectionPool {
    pub fn open(config: &DatabaseConfig) -> SdxResult<Self> {
        let in_memory = config.path.is_none();
        let max_size = if in_memory { 1 } else { config.pool_size.max(1) };
        let pool = Self {
            config: config.clone(),
            max_size,
            acquire_timeout: Duration::from_millis(config.busy_timeout_ms.max(1)),
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(max_size),
                opened: 0,
            }),
            available: Condvar::new(),
        };
        // validate the configuration eagerly; in-memory pools keep it
        let first = pool.connect()?;
        let mut state = pool.state.lock();
        state.idle.push(first);
        state.opened = 1;
        drop(state);
        debug!(path = ?config.path, max_size, "opened connection pool");
        Ok(pool)
    }

    /// Borrow a connection, waiting up to the busy timeout when all are in use.
    pub fn get(&self) -> SdxResult<PooledConnection<'_>> {
        let mut state = self.state.lock();
        loop {
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection {
                    conn: Some(conn),
                    pool: self,
                });
            }
            if state.opened < self.max_size {
                state.opened += 1;
                drop(state);
                return match self.connect() {
                    Ok(conn) => Ok(PooledConnection {
                        conn: Some(conn),
                        pool: self,
                    }),
                    Err(e) => {
                        self.state.lock().opened -= 1;
                        self.available.notify_one();
                        Err(e)
                    }
                };
            }
            if self
                .available
                .wait_for(&mut state, self.acquire_timeout)
                .timed_out()
                && state.idle.is_empty()
            {
                return Err(SdxError::Pool(format!(
                    "no connection available after {:?}",
                    self.acquire_timeout
                )));
            }
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    fn connect(&self) -> SdxResult<Connection> {
        let conn = match &self.config.path {
            Some(path) => {
                let conn = Connection::open(path)?;
                conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(Duration::from_millis(self.config.busy_timeout_ms))?;
        conn.execute_batch("PRAGMA case_sensitive_like = ON;")?;
        Ok(conn)
    }

    fn release(&self, conn: Connection) {
        self.state.lock().idle.push(conn);
        self.available.notify_one();
    }
}

/// Connection borrowed from a [`ConnectionPool`].
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // only taken in drop
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

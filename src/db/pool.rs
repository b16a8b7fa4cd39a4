//! Connection pool management.
//!
//! The pool owns raw SQLite sessions and lends each one to a single caller
//! at a time. Acquisition never waits for a release: when the idle set is
//! empty a fresh session is opened, so the pool grows under load and keeps
//! the larger size afterwards. The open/closed flag on a session is the
//! sole health signal; closed sessions are dropped at acquire or release,
//! never probed or eagerly replaced.

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// One pooled SQLite session.
pub struct PooledConnection {
    conn: SqliteConnection,
    id: u64,
    open: bool,
}

impl PooledConnection {
    /// The underlying session, for running queries.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    /// Pool-unique identity of this session.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Mark the session unusable; `release` will discard it instead of
    /// returning it to the idle set.
    pub fn mark_closed(&mut self) {
        self.open = false;
    }

    async fn close(self) {
        if let Err(e) = self.conn.close().await {
            warn!(connection_id = self.id, error = %e, "Error closing connection");
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

/// Bounded-at-rest pool of SQLite sessions.
///
/// Constructed explicitly and shared by reference; there is no global
/// instance. A session is in exactly one of three states: idle in the pool,
/// lent out behind a [`ConnectionGuard`], or closed.
pub struct ConnectionPool {
    idle: Mutex<Vec<PooledConnection>>,
    connect_options: SqliteConnectOptions,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl ConnectionPool {
    /// Open a pool with `config.pool_size` connections.
    ///
    /// Failure here is startup-fatal: an unreachable or misconfigured
    /// database is not a per-call condition, so no partial pool is returned.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<Self>> {
        config.validate()?;
        let pool = Arc::new(Self {
            idle: Mutex::new(Vec::with_capacity(config.pool_size as usize)),
            connect_options: config.connect_options()?,
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        });
        for _ in 0..config.pool_size {
            let conn = pool.open_connection().await?;
            pool.idle.lock().await.push(conn);
        }
        info!(pool_size = config.pool_size, "Connection pool ready");
        Ok(pool)
    }

    /// Take one connection out of the pool.
    ///
    /// Served from the idle set when possible; otherwise a fresh session is
    /// opened rather than waiting for a release. Closed sessions found in
    /// the idle set are dropped and the next candidate is tried.
    pub async fn acquire(self: &Arc<Self>) -> StoreResult<ConnectionGuard> {
        loop {
            if self.shut_down.load(Ordering::SeqCst) {
                return Err(StoreError::PoolClosed);
            }
            let candidate = self.idle.lock().await.pop();
            match candidate {
                Some(conn) if conn.is_open() => {
                    debug!(connection_id = conn.id(), "Acquired idle connection");
                    return Ok(ConnectionGuard::new(conn, Arc::clone(self)));
                }
                Some(conn) => {
                    warn!(
                        connection_id = conn.id(),
                        "Dropping closed connection found in idle set"
                    );
                    conn.close().await;
                }
                None => {
                    let conn = self.open_connection().await?;
                    debug!(
                        connection_id = conn.id(),
                        "Idle set empty, opened fresh connection"
                    );
                    return Ok(ConnectionGuard::new(conn, Arc::clone(self)));
                }
            }
        }
    }

    /// Return a connection to the idle set.
    ///
    /// A connection that reports itself closed is discarded, not replaced.
    /// After `shutdown` the idle set no longer accepts returns and the
    /// connection is closed instead.
    pub async fn release(&self, conn: PooledConnection) {
        if !conn.is_open() {
            warn!(
                connection_id = conn.id(),
                "Discarding closed connection at release"
            );
            conn.close().await;
            return;
        }
        if self.shut_down.load(Ordering::SeqCst) {
            debug!(
                connection_id = conn.id(),
                "Pool shut down, closing returned connection"
            );
            conn.close().await;
            return;
        }
        debug!(connection_id = conn.id(), "Connection returned to pool");
        self.idle.lock().await.push(conn);
    }

    /// Close every idle connection and refuse further acquisition.
    ///
    /// Connections currently lent out are unaffected; they are closed when
    /// their guards release them.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let drained: Vec<PooledConnection> = {
            let mut idle = self.idle.lock().await;
            idle.drain(..).collect()
        };
        let closed = drained.len();
        for conn in drained {
            conn.close().await;
        }
        info!(closed, "Connection pool shut down");
    }

    /// Number of idle connections currently in the pool.
    pub async fn idle_count(&self) -> usize {
        self.idle.lock().await.len()
    }

    async fn open_connection(&self) -> StoreResult<PooledConnection> {
        let conn = SqliteConnection::connect_with(&self.connect_options)
            .await
            .map_err(StoreError::from)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(connection_id = id, "Opened database connection");
        Ok(PooledConnection {
            conn,
            id,
            open: true,
        })
    }
}

/// RAII guard for a lent connection.
///
/// Prefer the explicit `release().await`; the `Drop` fallback spawns a task
/// to return the connection, which only runs while the runtime is alive.
pub struct ConnectionGuard {
    conn: Option<PooledConnection>,
    pool: Arc<ConnectionPool>,
}

impl ConnectionGuard {
    fn new(conn: PooledConnection, pool: Arc<ConnectionPool>) -> Self {
        Self {
            conn: Some(conn),
            pool,
        }
    }

    /// The underlying session, for running queries.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        self.conn
            .as_mut()
            .expect("connection guard already released")
            .conn()
    }

    /// Identity of the lent session.
    pub fn id(&self) -> u64 {
        self.conn
            .as_ref()
            .expect("connection guard already released")
            .id()
    }

    /// Mark the lent session unusable so the pool discards it at release.
    pub fn mark_closed(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.mark_closed();
        }
    }

    /// Return the connection to the pool.
    pub async fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn).await;
        }
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            warn!(
                connection_id = conn.id(),
                "Connection released via Drop - prefer explicit release()"
            );
            pool.release(conn).await;
        });
    }
}

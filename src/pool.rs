//! A bounded connection pool.
//!
//! Grounded on the teacher's [`crate::buffer_pool`]: a fixed-capacity
//! `crossbeam_queue::ArrayQueue` holding idle resources, wrapped in a
//! `ManuallyDrop`-based RAII guard ([`PooledConn`]) that returns the resource
//! on drop. Unlike a buffer, a connection is expensive to create and has a
//! hard cap on how many may exist at once, so a `tokio::sync::Semaphore` (one
//! permit per connection, idle or checked out, for its entire lifetime) adds
//! the waiting-for-capacity behavior the buffer pool never needed.
//!
//! A waiter above `PoolOptions::max_waiters` is rejected synchronously rather
//! than joining the semaphore's internal queue, since an unbounded wait queue
//! is itself a resource exhaustion risk under sustained overload.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use crossbeam_queue::ArrayQueue;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

use crate::conn::{Connection, PreparedStatementHandle};
use crate::error::{Error, PoolError, Result};
use crate::opts::{ConnectOptions, PoolOptions};
use crate::protocol::r#trait::{BinaryResultSetHandler, Params, TextResultSetHandler};
use crate::row::Row;
use crate::stream::RowStream;

/// Point-in-time counters. Each field is an independent atomic snapshot, not
/// a consistent transaction across fields.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub created: AtomicU64,
    pub closed: AtomicU64,
    pub checkouts: AtomicU64,
    pub timeouts: AtomicU64,
    pub waiters: AtomicUsize,
}

/// A snapshot of [`PoolStats`] plus the live idle/in-use split.
#[derive(Debug, Clone, Copy)]
pub struct PoolSnapshot {
    pub created: u64,
    pub closed: u64,
    pub checkouts: u64,
    pub timeouts: u64,
    pub waiters: usize,
    pub idle: usize,
    pub in_use: usize,
}

struct IdleEntry {
    conn: Connection,
    permit: OwnedSemaphorePermit,
}

struct PoolInner {
    connect_opts: ConnectOptions,
    pool_opts: PoolOptions,
    idle: ArrayQueue<IdleEntry>,
    capacity: Arc<Semaphore>,
    stats: PoolStats,
    closed: std::sync::atomic::AtomicBool,
}

/// A bounded pool of [`Connection`]s sharing one [`ConnectOptions`].
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    pub fn new(connect_opts: ConnectOptions, pool_opts: PoolOptions) -> Result<Self> {
        pool_opts.validate()?;
        let capacity = pool_opts.max_connections as usize;
        let inner = Arc::new(PoolInner {
            connect_opts,
            pool_opts,
            idle: ArrayQueue::new(capacity),
            capacity: Arc::new(Semaphore::new(capacity)),
            stats: PoolStats::default(),
            closed: std::sync::atomic::AtomicBool::new(false),
        });
        spawn_eviction_sweep(Arc::clone(&inner));
        Ok(Self { inner })
    }

    pub fn stats(&self) -> PoolSnapshot {
        let in_use = self.inner.pool_opts.max_connections as usize
            - self.inner.capacity.available_permits()
            - self.inner.idle.len();
        PoolSnapshot {
            created: self.inner.stats.created.load(Ordering::Relaxed),
            closed: self.inner.stats.closed.load(Ordering::Relaxed),
            checkouts: self.inner.stats.checkouts.load(Ordering::Relaxed),
            timeouts: self.inner.stats.timeouts.load(Ordering::Relaxed),
            waiters: self.inner.stats.waiters.load(Ordering::Relaxed),
            idle: self.inner.idle.len(),
            in_use,
        }
    }

    /// Checks out a connection, waiting for capacity if none is idle and the
    /// pool is already at `max_connections`. Rejects immediately, without
    /// waiting, once `max_waiters` callers are already queued.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Result<PooledConn> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(Error::Pool(PoolError::Closed));
        }

        if let Some(IdleEntry { mut conn, permit }) = self.inner.idle.pop() {
            conn.touch();
            self.inner.stats.checkouts.fetch_add(1, Ordering::Relaxed);
            return Ok(PooledConn::new(Arc::clone(&self.inner), conn, permit));
        }

        let waiters = self.inner.stats.waiters.fetch_add(1, Ordering::SeqCst) + 1;
        if waiters > self.inner.pool_opts.max_waiters {
            self.inner.stats.waiters.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Pool(PoolError::Overflow {
                max_waiters: self.inner.pool_opts.max_waiters,
            }));
        }

        let acquired = tokio::time::timeout(
            self.inner.pool_opts.acquire_timeout,
            Arc::clone(&self.inner.capacity).acquire_owned(),
        )
        .await;
        self.inner.stats.waiters.fetch_sub(1, Ordering::SeqCst);

        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::Pool(PoolError::Closed)),
            Err(_) => {
                self.inner.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(Error::Timeout("pool acquire".to_string()));
            }
        };

        // Another release may have filled the idle queue while we waited for
        // a permit; prefer it over opening a new socket.
        if let Some(IdleEntry { mut conn, permit: idle_permit }) = self.inner.idle.pop() {
            conn.touch();
            self.inner.stats.checkouts.fetch_add(1, Ordering::Relaxed);
            // Two permits now cover one connection; drop the freshly acquired
            // one back into the semaphore instead of leaking pool capacity.
            drop(permit);
            return Ok(PooledConn::new(Arc::clone(&self.inner), conn, idle_permit));
        }

        let mut conn = Connection::connect(self.inner.connect_opts.clone()).await?;
        if self.inner.pool_opts.enable_statement_cache {
            conn.enable_statement_cache(self.inner.pool_opts.statement_cache_size);
        }
        if let Some(hook) = &self.inner.pool_opts.on_connect {
            hook(&mut conn).await?;
        }
        self.inner.stats.created.fetch_add(1, Ordering::Relaxed);
        self.inner.stats.checkouts.fetch_add(1, Ordering::Relaxed);
        Ok(PooledConn::new(Arc::clone(&self.inner), conn, permit))
    }

    /// Runs `sql` against a checked-out connection and discards the result
    /// set, returning only the affected-rows/last-insert-id summary.
    pub async fn exec_drop(&self, sql: &str) -> Result<()> {
        let mut conn = self.acquire().await?;
        let mut handler = crate::handler::DropHandler::default();
        conn.query(sql, &mut handler).await
    }

    /// Runs `sql` via the text protocol with `handler` receiving every row.
    pub async fn query<H: TextResultSetHandler>(&self, sql: &str, handler: &mut H) -> Result<()> {
        let mut conn = self.acquire().await?;
        conn.query(sql, handler).await
    }

    /// Streams `sql`'s rows. The checked-out connection is closed once the
    /// stream finishes or is dropped rather than returned to this pool - see
    /// the module docs for why.
    pub async fn stream(&self, sql: impl Into<String>) -> Result<RowStream> {
        let conn = self.acquire().await?;
        Ok(conn.into_stream(sql.into()))
    }

    /// Streams a prepared statement's rows, same closed-on-finish semantics
    /// as [`Pool::stream`].
    pub async fn stream_exec<P: Params + Send + 'static>(
        &self,
        handle: PreparedStatementHandle,
        params: P,
    ) -> Result<RowStream> {
        let conn = self.acquire().await?;
        Ok(conn.into_stream_exec(handle, params))
    }

    /// Starts a transaction. See [`crate::transaction::Transaction`].
    pub async fn begin(&self) -> Result<crate::transaction::Transaction> {
        let conn = self.acquire().await?;
        crate::transaction::Transaction::begin(conn, None).await
    }

    /// Runs `body` inside a transaction, retrying on tier-1/tier-2 retryable
    /// failures (deadlock, lock wait timeout, lost connection) with capped
    /// exponential backoff. See `Transaction`'s module docs for the full
    /// retry classification.
    pub async fn transaction<F, Fut, T>(&self, options: crate::transaction::TransactionOptions, body: F) -> Result<T>
    where
        F: Fn(crate::transaction::Transaction) -> Fut,
        Fut: std::future::Future<Output = Result<(T, crate::transaction::Transaction)>>,
    {
        crate::transaction::run_with_retry(self, options, body).await
    }

    /// Stops accepting new checkouts and drains the idle queue, closing every
    /// idle connection. In-flight checkouts still return normally (their
    /// `PooledConn::drop` sees `closed` and discards rather than re-idles).
    pub async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        while let Some(IdleEntry { conn, .. }) = self.inner.idle.pop() {
            conn.close().await;
            self.inner.stats.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn connect_opts(&self) -> &ConnectOptions {
        &self.inner.connect_opts
    }
}

/// A checked-out [`Connection`]. Returns itself to the pool on drop (after an
/// optional `COM_RESET_CONNECTION`), unless it was consumed by
/// [`PooledConn::into_stream`]/[`PooledConn::into_stream_exec`] (which close
/// the connection once the stream finishes instead) or handed to a
/// [`crate::transaction::Transaction`] (which still returns it normally on
/// `commit`/`rollback`, since `Transaction` holds a `PooledConn`, not a bare
/// `Connection`).
pub struct PooledConn {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    permit: Option<OwnedSemaphorePermit>,
}

impl PooledConn {
    fn new(pool: Arc<PoolInner>, conn: Connection, permit: OwnedSemaphorePermit) -> Self {
        Self { pool, conn: Some(conn), permit: Some(permit) }
    }

    fn take(mut self) -> (Connection, OwnedSemaphorePermit) {
        let conn = self.conn.take().expect("PooledConn used after being consumed");
        let permit = self.permit.take().expect("PooledConn used after being consumed");
        (conn, permit)
    }

    pub async fn query<H: TextResultSetHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        self.conn.as_mut().expect("PooledConn used after being consumed").query(sql, handler).await
    }

    pub async fn exec<H: BinaryResultSetHandler, P: Params>(
        &mut self,
        handle: &PreparedStatementHandle,
        params: P,
        handler: &mut H,
    ) -> Result<()> {
        self.conn.as_mut().expect("PooledConn used after being consumed").exec(handle, params, handler).await
    }

    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatementHandle> {
        self.conn.as_mut().expect("PooledConn used after being consumed").prepare(sql).await
    }

    /// Convenience wrapper over `exec` returning the first row via `F`, or
    /// `None` if the result set was empty.
    pub async fn fetch_optional<P: Params, T>(
        &mut self,
        handle: &PreparedStatementHandle,
        params: P,
        mut decode: impl FnMut(&Row) -> Result<T>,
    ) -> Result<Option<T>> {
        use crate::row_collector::RowCollector;
        let mut collector = RowCollector::new();
        self.exec(handle, params, &mut collector).await?;
        collector.rows.first().map(|r| decode(r)).transpose()
    }

    /// Consumes the checkout to stream `sql`'s rows. The permit travels into
    /// the stream's driving task and is dropped once the connection closes,
    /// so pool capacity is correctly held for the stream's entire lifetime
    /// and freed exactly once, on completion.
    pub fn into_stream(self, sql: String) -> RowStream {
        let (conn, permit) = self.take();
        RowStream::spawn_text(conn, sql, Some(permit))
    }

    pub fn into_stream_exec<P: Params + Send + 'static>(self, handle: PreparedStatementHandle, params: P) -> RowStream {
        let (conn, permit) = self.take();
        RowStream::spawn_exec(conn, handle, params, Some(permit))
    }
}

impl std::ops::Deref for PooledConn {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("PooledConn used after being consumed")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        let (Some(mut conn), Some(permit)) = (self.conn.take(), self.permit.take()) else {
            return;
        };
        let pool = Arc::clone(&self.pool);
        tokio::spawn(async move {
            if pool.closed.load(Ordering::SeqCst) {
                conn.close().await;
                pool.stats.closed.fetch_add(1, Ordering::Relaxed);
                drop(permit);
                return;
            }
            if pool.connect_opts.reset_connection && conn.reset().await.is_err() {
                conn.close().await;
                pool.stats.closed.fetch_add(1, Ordering::Relaxed);
                drop(permit);
                return;
            }
            if conn.is_closed() {
                pool.stats.closed.fetch_add(1, Ordering::Relaxed);
                drop(permit);
                return;
            }
            if pool.idle.push(IdleEntry { conn, permit }).is_err() {
                warn!("pool idle queue unexpectedly full on release");
            }
        });
    }
}

/// Periodically closes idle connections past `idle_timeout`/`max_lifetime`,
/// never evicting below `min_connections`. Grounded on the same
/// `tokio::time::interval` background-sweep idiom the teacher does not itself
/// need (its buffer pool has no concept of connection age) but that the spec
/// requires; the sweep itself pops every idle entry and re-pushes the
/// survivors, which briefly contends with concurrent `acquire()`s.
fn spawn_eviction_sweep(pool: Arc<PoolInner>) {
    if pool.pool_opts.idle_timeout.is_none() && pool.pool_opts.max_lifetime.is_none() {
        return;
    }
    let interval = pool.pool_opts.eviction_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if pool.closed.load(Ordering::SeqCst) {
                return;
            }
            sweep_once(&pool).await;
        }
    });
}

async fn sweep_once(pool: &Arc<PoolInner>) {
    let now = Instant::now();
    let mut survivors = Vec::new();
    while let Some(entry) = pool.idle.pop() {
        survivors.push(entry);
    }

    let min_connections = pool.pool_opts.min_connections as usize;
    let mut evicted = 0;
    let total = survivors.len();
    for (i, entry) in survivors.into_iter().enumerate() {
        let age = now.duration_since(entry.conn.created_at());
        let idle_for = now.duration_since(entry.conn.last_used_at());
        let expired = pool.pool_opts.max_lifetime.is_some_and(|max| age >= max)
            || pool.pool_opts.idle_timeout.is_some_and(|max| idle_for >= max);
        let keep_for_floor = total - evicted <= min_connections;

        if expired && !keep_for_floor {
            evicted += 1;
            let IdleEntry { conn, permit } = entry;
            tokio::spawn(async move {
                conn.close().await;
                drop(permit);
            });
            continue;
        }

        if pool.idle.push(entry).is_err() {
            // Capacity shrank underneath us (shouldn't happen, `idle`'s
            // ArrayQueue is sized once at `max_connections`); drop rather
            // than leak this slot.
            let _ = i;
        }
    }
    if evicted > 0 {
        pool.stats.closed.fetch_add(evicted as u64, Ordering::Relaxed);
        debug!(evicted, "pool eviction sweep closed idle connections");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_snapshot_reports_zero_on_fresh_pool() {
        let inner = PoolInner {
            connect_opts: ConnectOptions::default(),
            pool_opts: PoolOptions::default(),
            idle: ArrayQueue::new(4),
            capacity: Arc::new(Semaphore::new(4)),
            stats: PoolStats::default(),
            closed: std::sync::atomic::AtomicBool::new(false),
        };
        let pool = Pool { inner: Arc::new(inner) };
        let snapshot = pool.stats();
        assert_eq!(snapshot.created, 0);
        assert_eq!(snapshot.idle, 0);
        assert_eq!(snapshot.in_use, 0);
    }
}

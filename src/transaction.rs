//! Transactions and the retrying `Pool::transaction` wrapper.
//!
//! A `Transaction` exclusively owns a [`PooledConn`] for its lifetime; the
//! query/exec/fetch methods are thin pass-throughs to it, the same wrapper
//! style [`crate::pool::PooledConn`] itself uses over [`Connection`].
//! Savepoint names are validated and quoted the way a hand-rolled identifier
//! quoter would for any DDL-adjacent statement: MySQL permits backtick
//! quoting with doubled embedded backticks, but restricting the allowed
//! charset up front makes that escaping unreachable and the validation the
//! only thing that matters.
//!
//! # Retry classification
//!
//! `run_with_retry` retries a transaction body, not a single statement,
//! since MySQL has already rolled the whole transaction back by the time a
//! tier-1/tier-2 error is visible:
//!
//! - **Tier 1** - deadlock (`ER_LOCK_DEADLOCK`) and lock wait timeout
//!   (`ER_LOCK_WAIT_TIMEOUT`): transient contention, safe to retry as-is.
//!   Classified by [`Error::is_retryable`].
//! - **Tier 2** - connection-level failures (I/O error, unexpected EOF, bad
//!   connection, timeout): the transaction never reached the server, or the
//!   server is gone. Retrying re-acquires from the pool, which opens a fresh
//!   connection if needed, so this still makes progress.
//! - **Tier 3** - everything else (syntax errors, constraint violations,
//!   access-denied): retrying would fail identically. Propagated immediately.

use std::time::Duration;

use tracing::warn;

use crate::conn::PreparedStatementHandle;
use crate::error::{Error, Result};
use crate::handler::DropHandler;
use crate::pool::{Pool, PooledConn};
use crate::protocol::r#trait::{Params, TextResultSetHandler};
use crate::row::{FromValue, Row};
use crate::row_collector::RowCollector;
use crate::stream::RowStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    fn as_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Configures [`Pool::transaction`]'s retry wrapper.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub isolation_level: Option<IsolationLevel>,
    /// Extra attempts allowed after a retryable failure. `0` disables
    /// retrying entirely.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles each subsequent attempt, capped
    /// at 500ms.
    pub retry_backoff: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self { isolation_level: None, max_retries: 3, retry_backoff: Duration::from_millis(20) }
    }
}

fn quote_identifier(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::InvalidSavepoint(name.to_string(), "identifier must not be empty"));
    }
    if name.len() > 64 {
        return Err(Error::InvalidSavepoint(name.to_string(), "identifier must be at most 64 characters"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err(Error::InvalidSavepoint(
            name.to_string(),
            "identifier may only contain ASCII letters, digits, '_', and '$'",
        ));
    }
    Ok(format!("`{name}`"))
}

/// An in-progress transaction. Dropping one without calling [`Transaction::commit`]
/// or [`Transaction::rollback`] issues a best-effort `ROLLBACK` in the
/// background before the underlying connection is returned to its pool.
pub struct Transaction {
    conn: Option<PooledConn>,
    released: bool,
    on_commit: Vec<Box<dyn FnOnce() + Send>>,
    on_rollback: Vec<Box<dyn FnOnce() + Send>>,
}

impl Transaction {
    pub(crate) async fn begin(mut conn: PooledConn, isolation: Option<IsolationLevel>) -> Result<Self> {
        if let Some(level) = isolation {
            let sql = format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql());
            let mut handler = DropHandler::default();
            conn.query(&sql, &mut handler).await?;
        }
        let mut handler = DropHandler::default();
        conn.query("START TRANSACTION", &mut handler).await?;
        Ok(Self { conn: Some(conn), released: false, on_commit: Vec::new(), on_rollback: Vec::new() })
    }

    fn conn_mut(&mut self) -> Result<&mut PooledConn> {
        self.conn
            .as_mut()
            .ok_or(Error::TransactionInactive("transaction has already been committed or rolled back"))
    }

    pub async fn query<H: TextResultSetHandler>(&mut self, sql: &str, handler: &mut H) -> Result<()> {
        self.conn_mut()?.query(sql, handler).await
    }

    pub async fn prepare(&mut self, sql: &str) -> Result<PreparedStatementHandle> {
        self.conn_mut()?.prepare(sql).await
    }

    /// Runs a prepared statement and returns the number of affected rows.
    pub async fn execute<P: Params>(&mut self, handle: &PreparedStatementHandle, params: P) -> Result<u64> {
        let mut collector = RowCollector::new();
        self.conn_mut()?.exec(handle, params, &mut collector).await?;
        Ok(collector.affected_rows)
    }

    /// Runs a prepared statement and returns the insert id it generated.
    pub async fn execute_get_id<P: Params>(&mut self, handle: &PreparedStatementHandle, params: P) -> Result<u64> {
        let mut collector = RowCollector::new();
        self.conn_mut()?.exec(handle, params, &mut collector).await?;
        Ok(collector.last_insert_id)
    }

    pub async fn fetch_optional<P: Params>(&mut self, handle: &PreparedStatementHandle, params: P) -> Result<Option<Row>> {
        let mut collector = RowCollector::new();
        self.conn_mut()?.exec(handle, params, &mut collector).await?;
        Ok(collector.rows.into_iter().next())
    }

    pub async fn fetch_one<P: Params>(&mut self, handle: &PreparedStatementHandle, params: P) -> Result<Row> {
        self.fetch_optional(handle, params)
            .await?
            .ok_or_else(|| Error::BadInputError("query returned no rows".to_string()))
    }

    pub async fn fetch_value<P: Params, T: FromValue>(&mut self, handle: &PreparedStatementHandle, params: P) -> Result<T> {
        let row = self.fetch_one(handle, params).await?;
        row.get(0)
    }

    /// Streams a prepared statement's rows through this transaction's
    /// connection. Consumes the transaction: the connection is closed once
    /// the stream finishes rather than returned to the pool (see
    /// [`crate::stream`]'s module docs), so the transaction it belonged to
    /// can never be committed afterward - call [`Transaction::commit`] first
    /// if the statement doesn't need streaming.
    pub fn stream_exec<P: Params + Send + 'static>(mut self, handle: PreparedStatementHandle, params: P) -> RowStream {
        self.released = true;
        let conn = self.conn.take().expect("Transaction used after commit/rollback");
        conn.into_stream_exec(handle, params)
    }

    pub async fn savepoint(&mut self, name: &str) -> Result<()> {
        let quoted = quote_identifier(name)?;
        let mut handler = DropHandler::default();
        self.conn_mut()?.query(&format!("SAVEPOINT {quoted}"), &mut handler).await
    }

    pub async fn rollback_to(&mut self, name: &str) -> Result<()> {
        let quoted = quote_identifier(name)?;
        let mut handler = DropHandler::default();
        self.conn_mut()?.query(&format!("ROLLBACK TO SAVEPOINT {quoted}"), &mut handler).await
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let quoted = quote_identifier(name)?;
        let mut handler = DropHandler::default();
        self.conn_mut()?.query(&format!("RELEASE SAVEPOINT {quoted}"), &mut handler).await
    }

    /// Registers a callback run after a successful `commit`, in registration
    /// order.
    pub fn on_commit(&mut self, f: impl FnOnce() + Send + 'static) {
        self.on_commit.push(Box::new(f));
    }

    pub fn on_rollback(&mut self, f: impl FnOnce() + Send + 'static) {
        self.on_rollback.push(Box::new(f));
    }

    /// Commits. Calling this more than once (or after [`Transaction::rollback`])
    /// is a no-op returning `Ok(())`.
    pub async fn commit(mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut handler = DropHandler::default();
        let result = self.conn_mut()?.query("COMMIT", &mut handler).await;
        if result.is_ok() {
            for cb in std::mem::take(&mut self.on_commit) {
                cb();
            }
        }
        result
    }

    /// Rolls back. Idempotent like [`Transaction::commit`].
    pub async fn rollback(mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let mut handler = DropHandler::default();
        let result = self.conn_mut()?.query("ROLLBACK", &mut handler).await;
        for cb in std::mem::take(&mut self.on_rollback) {
            cb();
        }
        result
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(mut conn) = self.conn.take() {
            tokio::spawn(async move {
                let mut handler = DropHandler::default();
                if let Err(e) = conn.query("ROLLBACK", &mut handler).await {
                    warn!(error = %e, "best-effort rollback on transaction drop failed");
                }
            });
        }
    }
}

fn is_tier2_retryable(e: &Error) -> bool {
    matches!(e, Error::IoError(_) | Error::UnexpectedEof | Error::Timeout(_) | Error::BadConnection(_))
}

/// Drives [`Pool::transaction`]: acquires a connection, begins a transaction,
/// runs `body`, and commits on success. On a tier-1/tier-2 failure it retries
/// up to `options.max_retries` times with capped exponential backoff; any
/// other error (or exhausted retries) propagates immediately.
pub(crate) async fn run_with_retry<F, Fut, T>(pool: &Pool, options: TransactionOptions, body: F) -> Result<T>
where
    F: Fn(Transaction) -> Fut,
    Fut: std::future::Future<Output = Result<(T, Transaction)>>,
{
    let mut attempt = 0u32;
    let mut backoff = options.retry_backoff;
    loop {
        let conn = pool.acquire().await?;
        let txn = Transaction::begin(conn, options.isolation_level).await?;
        match body(txn).await {
            Ok((value, txn)) => {
                txn.commit().await?;
                return Ok(value);
            }
            Err(e) => {
                let retryable = e.is_retryable() || is_tier2_retryable(&e);
                if attempt < options.max_retries && retryable {
                    attempt += 1;
                    warn!(attempt, error = %e, "retrying transaction after retryable failure");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_millis(500));
                    continue;
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_identifier_accepts_plain_names() {
        assert_eq!(quote_identifier("sp1").unwrap(), "`sp1`");
        assert_eq!(quote_identifier("my_save_point").unwrap(), "`my_save_point`");
    }

    #[test]
    fn quote_identifier_rejects_empty() {
        assert!(quote_identifier("").is_err());
    }

    #[test]
    fn quote_identifier_rejects_backtick_injection() {
        assert!(quote_identifier("sp`; DROP TABLE users; --").is_err());
    }

    #[test]
    fn quote_identifier_rejects_whitespace() {
        assert!(quote_identifier("my savepoint").is_err());
    }

    #[test]
    fn isolation_level_sql_text() {
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::Serializable.as_sql(), "SERIALIZABLE");
    }

    #[test]
    fn default_transaction_options_allow_retries() {
        let opts = TransactionOptions::default();
        assert_eq!(opts.max_retries, 3);
    }
}

//! Connection pool monitoring utilities
//!
//! Instrumented transaction wrappers that log how long a caller waited for
//! a connection and how long it held it. Two flavors:
//! - [`begin_monitored`]: ordinary deferred transaction
//! - [`begin_immediate`]: `BEGIN IMMEDIATE`, taking SQLite's write
//!   reservation up front so concurrent claimers serialize on it

use ivrm_common::{Error, Result};
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;

fn log_acquired(caller: &'static str, wait_ms: u128) {
    if wait_ms > 1000 {
        tracing::warn!(
            caller,
            wait_ms,
            "SLOW CONNECTION ACQUISITION - Pool may be saturated (all connections in use)"
        );
    } else if wait_ms > 500 {
        tracing::info!(caller, wait_ms, "Connection acquisition slower than expected (>500ms)");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }
}

fn log_released(caller: &'static str, held_ms: u128, how: &'static str) {
    if held_ms > 2000 {
        tracing::warn!(
            caller,
            held_ms,
            how,
            "LONG TRANSACTION - Connection held for extended period"
        );
    } else {
        tracing::debug!(caller, held_ms, how, "Connection released");
    }
}

/// Monitored transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    /// Connection to run statements on
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(Error::Internal(format!(
                "{}: transaction already consumed",
                self.caller
            ))),
        }
    }

    /// Commit the transaction and log release timing
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            Error::Internal(format!("{}: transaction already consumed", self.caller))
        })?;
        tx.commit().await?;
        log_released(self.caller, self.acquired_at.elapsed().as_millis(), "commit");
        Ok(())
    }

    /// Rollback the transaction and log release timing
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(|| {
            Error::Internal(format!("{}: transaction already consumed", self.caller))
        })?;
        tx.rollback().await?;
        log_released(self.caller, self.acquired_at.elapsed().as_millis(), "rollback");
        Ok(())
    }
}

impl<'c> Drop for MonitoredTransaction<'c> {
    fn drop(&mut self) {
        // sqlx rolls the inner transaction back on drop
        if self.tx.is_some() {
            log_released(self.caller, self.acquired_at.elapsed().as_millis(), "drop");
        }
    }
}

/// Begin a monitored transaction with connection pool timing logs
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "queue::fail").await?;
/// sqlx::query("...").execute(tx.conn()?).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    tracing::debug!(caller, "Connection acquisition requested");

    let tx = pool.begin().await?;
    log_acquired(caller, start.elapsed().as_millis());

    Ok(MonitoredTransaction {
        tx: Some(tx),
        caller,
        acquired_at: Instant::now(),
    })
}

/// Write-reserving transaction (`BEGIN IMMEDIATE`)
///
/// sqlx's transaction API always issues a deferred `BEGIN`, so this wraps a
/// pooled connection and drives the transaction statements by hand. If the
/// guard is dropped before commit or rollback, the connection is closed
/// instead of being returned to the pool, which releases the write lock.
pub struct ImmediateTransaction {
    conn: PoolConnection<Sqlite>,
    caller: &'static str,
    acquired_at: Instant,
    finished: bool,
}

impl ImmediateTransaction {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        log_released(self.caller, self.acquired_at.elapsed().as_millis(), "commit");
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        log_released(self.caller, self.acquired_at.elapsed().as_millis(), "rollback");
        Ok(())
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.close_on_drop();
            log_released(self.caller, self.acquired_at.elapsed().as_millis(), "drop");
        }
    }
}

/// Acquire a connection and open a `BEGIN IMMEDIATE` transaction on it
///
/// Lock contention surfaces as `Error::Database` ("database is locked")
/// once SQLite's busy timeout expires; callers wrap this in
/// [`retry_on_lock`](super::db_retry::retry_on_lock).
pub async fn begin_immediate(
    pool: &SqlitePool,
    caller: &'static str,
) -> Result<ImmediateTransaction> {
    let start = Instant::now();
    tracing::debug!(caller, "Connection acquisition requested (immediate)");

    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    log_acquired(caller, start.elapsed().as_millis());

    Ok(ImmediateTransaction {
        conn,
        caller,
        acquired_at: Instant::now(),
        finished: false,
    })
}

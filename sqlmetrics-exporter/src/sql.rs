//! `sqlx`-backed data source.
//!
//! Every data source owns a pool holding at most one connection, so a
//! collection pass works against a single session. The connection descriptor
//! is a database URL (`postgres://`, `mysql://`, `sqlite:`).

use std::time::Duration;

use sqlmetrics_core::{Connection, DataSource, DataSourceError, Row, Value};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, Column as _, Row as _};
use tracing::{debug, warn};

/// A database reachable through `sqlx`'s runtime-selected driver.
#[derive(Debug, Clone)]
pub struct SqlxDataSource {
    name: String,
    pool: AnyPool,
}

impl SqlxDataSource {
    /// Prepare a lazily connecting pool for `url`.
    ///
    /// Nothing is opened until the first collection pass. Acquiring the
    /// session waits at most `acquire_timeout`.
    pub fn open(name: &str, url: &str, acquire_timeout: Duration) -> Result<Self, DataSourceError> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
            .map_err(|e| DataSourceError::connection(e.to_string()))?;

        debug!(data_source = %name, "Data source prepared");
        Ok(Self {
            name: name.to_string(),
            pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Close the pool and its idle session.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl DataSource for SqlxDataSource {
    type Connection = SqlxConnection;

    async fn connect(&self) -> Result<SqlxConnection, DataSourceError> {
        let conn = self.pool.acquire().await.map_err(classify)?;
        Ok(SqlxConnection {
            conn: Some(conn),
            in_flight: false,
        })
    }
}

/// A session checked out of a [`SqlxDataSource`] pool.
///
/// Dropped while a statement is still running, the session is detached from
/// the pool and closed; the next pass opens a fresh one.
#[derive(Debug)]
pub struct SqlxConnection {
    conn: Option<PoolConnection<Any>>,
    in_flight: bool,
}

impl Connection for SqlxConnection {
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>, DataSourceError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DataSourceError::connection("session closed"))?;

        self.in_flight = true;
        let result = sqlx::query(sql).fetch_all(&mut **conn).await;
        self.in_flight = false;

        Ok(result.map_err(classify)?.iter().map(convert_row).collect())
    }
}

impl Drop for SqlxConnection {
    fn drop(&mut self) {
        if self.in_flight {
            if let Some(conn) = self.conn.take() {
                warn!("Discarding session with a cancelled statement");
                drop(conn.detach());
            }
        }
    }
}

/// Split driver errors into "cannot reach the database" and "statement failed".
fn classify(error: sqlx::Error) -> DataSourceError {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Configuration(_) => DataSourceError::connection(error.to_string()),
        sqlx::Error::Database(ref db) if is_connection_failure(db.code().as_deref()) => {
            DataSourceError::connection(error.to_string())
        }
        _ => DataSourceError::query(error.to_string()),
    }
}

/// Database error codes that mean the session itself is unusable.
fn is_connection_failure(code: Option<&str>) -> bool {
    match code {
        // SQLSTATE class 08 (connection exception) and 28 (authorization).
        Some(code) if code.starts_with("08") || code.starts_with("28") => true,
        // SQLITE_CANTOPEN
        Some("14") => true,
        _ => false,
    }
}

fn convert_row(row: &AnyRow) -> Row {
    let mut converted = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        converted.push(column.name(), convert_value(row, index));
    }
    converted
}

fn convert_value(row: &AnyRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return v.into();
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.into();
    }
    Value::Null
}

//! Data source abstraction.
//!
//! The collector only needs two capabilities from a database: open a session
//! and run SQL text returning rows whose columns are addressable by name.
//! Timeouts are enforced by the caller, which drops the returned future when
//! the budget is exhausted.

use std::future::Future;

use crate::error::DataSourceError;

/// A single result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row as ordered `(column name, value)` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style append, mostly for tests and fixtures.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Look up a column by name.
    ///
    /// An exact match wins; otherwise the first case-insensitive match is
    /// used, since most SQL engines treat unquoted identifiers that way.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(column, _)| column.eq_ignore_ascii_case(name))
            })
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// An open session against a data source.
pub trait Connection: Send {
    /// Execute SQL text and return every row of the first result set.
    fn query(
        &mut self,
        sql: &str,
    ) -> impl Future<Output = Result<Vec<Row>, DataSourceError>> + Send;
}

/// Something the collector can open sessions against.
pub trait DataSource: Send + Sync + 'static {
    type Connection: Connection + 'static;

    /// Acquire a session. Failure here short-circuits a collection pass.
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, DataSourceError>> + Send;
}

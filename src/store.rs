//! The relational-store client seam.
//!
//! The executor drives any client through the prepared-statement
//! protocol below; [`crate::mysql::MySqlStore`] is the production one.

use thiserror::Error;

use crate::value::{Param, Value};

/// Raw error text reported by the store client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ClientError(pub String);

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Result column description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Prepare/bind/execute/fetch operations over one exclusively owned connection.
pub trait StoreClient {
    /// Server-side prepared statement handle.
    type Statement;

    fn prepare(&mut self, sql: &str) -> Result<Self::Statement, ClientError>;

    /// Bind parameters positionally by their declared types.
    fn bind(&mut self, stmt: &mut Self::Statement, params: &[Param]) -> Result<(), ClientError>;

    fn execute(&mut self, stmt: &mut Self::Statement) -> Result<(), ClientError>;

    /// Buffer the full result set before metadata and row fetches.
    fn store_result(&mut self, stmt: &mut Self::Statement) -> Result<(), ClientError>;

    fn result_metadata(&mut self, stmt: &mut Self::Statement) -> Result<Vec<ColumnMeta>, ClientError>;

    /// Next buffered row, or `None` when the cursor is exhausted.
    fn fetch_row(&mut self, stmt: &mut Self::Statement) -> Result<Option<Vec<Value>>, ClientError>;

    fn affected_rows(&self, stmt: &Self::Statement) -> u64;

    /// Whether [`StoreClient::last_insert_id`] is available.
    fn supports_last_insert_id(&self) -> bool {
        false
    }

    /// Identifier generated by the last insert on this connection.
    fn last_insert_id(&self) -> Option<u64> {
        None
    }

    fn close(&mut self, stmt: Self::Statement);
}

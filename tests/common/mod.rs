//! Scripted in-memory store client for executor tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};

use bindery::store::{ClientError, ColumnMeta, StoreClient};
use bindery::value::{Param, Value};

/// Protocol step a failure can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Bind,
    Execute,
    StoreResult,
    Metadata,
    Fetch,
}

#[derive(Debug, Clone, Default)]
struct Response {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

pub struct MockStatement {
    id: usize,
    sql: String,
    placeholders: usize,
    rows: VecDeque<Vec<Value>>,
    columns: Vec<String>,
}

#[derive(Default)]
pub struct MockStore {
    responses: HashMap<String, Response>,
    affected: u64,
    generated_id: Option<u64>,
    failure: Option<(Step, String)>,
    next_id: usize,
    open: HashSet<usize>,
    /// Every prepared SQL text, in order.
    pub prepared: Vec<String>,
    /// Every parameter list passed to `bind`.
    pub binds: Vec<Vec<Param>>,
    pub closed: usize,
    pub double_closed: bool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows returned for an exact SQL text.
    pub fn respond(mut self, sql: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.responses.insert(
            sql.to_string(),
            Response {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        );
        self
    }

    pub fn affected(mut self, rows: u64) -> Self {
        self.affected = rows;
        self
    }

    /// Enable the last-insert-id capability.
    pub fn generated_id(mut self, id: u64) -> Self {
        self.generated_id = Some(id);
        self
    }

    pub fn fail_at(mut self, step: Step, message: &str) -> Self {
        self.failure = Some((step, message.to_string()));
        self
    }

    pub fn clear_failure(&mut self) {
        self.failure = None;
    }

    pub fn open_statements(&self) -> usize {
        self.open.len()
    }

    fn check(&self, step: Step) -> Result<(), ClientError> {
        match &self.failure {
            Some((failing, message)) if *failing == step => Err(ClientError::new(message.clone())),
            _ => Ok(()),
        }
    }
}

impl StoreClient for MockStore {
    type Statement = MockStatement;

    fn prepare(&mut self, sql: &str) -> Result<MockStatement, ClientError> {
        self.check(Step::Prepare)?;
        self.prepared.push(sql.to_string());
        self.next_id += 1;
        self.open.insert(self.next_id);
        Ok(MockStatement {
            id: self.next_id,
            sql: sql.to_string(),
            placeholders: sql.matches('?').count(),
            rows: VecDeque::new(),
            columns: Vec::new(),
        })
    }

    fn bind(&mut self, stmt: &mut MockStatement, params: &[Param]) -> Result<(), ClientError> {
        self.binds.push(params.to_vec());
        self.check(Step::Bind)?;
        if params.len() != stmt.placeholders {
            return Err(ClientError::new(
                "Number of variables doesn't match number of parameters in prepared statement",
            ));
        }
        Ok(())
    }

    fn execute(&mut self, stmt: &mut MockStatement) -> Result<(), ClientError> {
        self.check(Step::Execute)?;
        if let Some(response) = self.responses.get(&stmt.sql) {
            stmt.columns = response.columns.clone();
            stmt.rows = response.rows.iter().cloned().collect();
        }
        Ok(())
    }

    fn store_result(&mut self, _stmt: &mut MockStatement) -> Result<(), ClientError> {
        self.check(Step::StoreResult)
    }

    fn result_metadata(&mut self, stmt: &mut MockStatement) -> Result<Vec<ColumnMeta>, ClientError> {
        self.check(Step::Metadata)?;
        Ok(stmt.columns.iter().map(ColumnMeta::new).collect())
    }

    fn fetch_row(&mut self, stmt: &mut MockStatement) -> Result<Option<Vec<Value>>, ClientError> {
        self.check(Step::Fetch)?;
        Ok(stmt.rows.pop_front())
    }

    fn affected_rows(&self, _stmt: &MockStatement) -> u64 {
        self.affected
    }

    fn supports_last_insert_id(&self) -> bool {
        self.generated_id.is_some()
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.generated_id
    }

    fn close(&mut self, stmt: MockStatement) {
        if !self.open.remove(&stmt.id) {
            self.double_closed = true;
        }
        self.closed += 1;
    }
}

pub fn row(values: &[&str]) -> Vec<Value> {
    values.iter().map(|v| Value::from(*v)).collect()
}

//! Statement execution engine for bindery.
//!
//! Drives prepare → bind → execute → fetch against a [`StoreClient`],
//! turns every client failure into a [`StatementError`], and shapes
//! fetched rows according to the statement's [`Projection`].

use serde::Serialize;

use crate::ast::{FieldMap, InputRecord, Limit, Projection, SearchSpec, StatementSpec};
use crate::config::ConnectSettings;
use crate::error::{ErrorKind, StatementError};
use crate::store::{ClientError, StoreClient};
use crate::transpiler::{self, BoundFragment, ToSql, quote_ident};
use crate::value::{Param, Record, Value};

/// Rows after projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Records(Vec<Record>),
    One(Option<Record>),
    Column(Vec<Value>),
}

impl QueryResult {
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Records(records) => records.len(),
            QueryResult::One(record) => usize::from(record.is_some()),
            QueryResult::Column(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    AffectedRows(u64),
    GeneratedId(u64),
}

impl WriteOutcome {
    pub fn value(self) -> u64 {
        match self {
            WriteOutcome::AffectedRows(n) | WriteOutcome::GeneratedId(n) => n,
        }
    }
}

/// Reduce fetched records. `One` keeps the first record, `Column(f)`
/// keeps each record's value at `f` (`Null` when the record lacks it).
pub fn project(records: Vec<Record>, projection: &Projection) -> QueryResult {
    match projection {
        Projection::All => QueryResult::Records(records),
        Projection::One => QueryResult::One(records.into_iter().next()),
        Projection::Column(column) => QueryResult::Column(
            records
                .iter()
                .map(|record| record.get(column).cloned().unwrap_or(Value::Null))
                .collect(),
        ),
    }
}

/// Operations shared by every driver variant.
pub trait Driver {
    fn compile(&self, search: &SearchSpec) -> BoundFragment {
        search.compile()
    }

    fn build(&self, spec: &StatementSpec) -> String {
        spec.to_sql()
    }

    fn project(&self, records: Vec<Record>, spec: &StatementSpec) -> QueryResult {
        project(records, &spec.projection)
    }

    /// Run a statement that returns rows.
    fn execute_read(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Record>, StatementError>;

    /// Run a statement that modifies rows. Returns the affected-row count,
    /// or the generated identifier when `return_generated_id` is set.
    fn execute_write(
        &mut self,
        sql: &str,
        params: &[Param],
        return_generated_id: bool,
    ) -> Result<WriteOutcome, StatementError>;

    /// Whether generated identifiers can be returned from writes.
    fn supports_last_insert_id(&self) -> bool;

    /// Most recent statement failure, cleared at the start of each call.
    fn last_error(&self) -> Option<&StatementError>;

    /// Build, execute and project a SELECT.
    fn select(&mut self, spec: &StatementSpec) -> Result<QueryResult, StatementError> {
        let sql = self.build(spec);
        let records = self.execute_read(&sql, &spec.filter.params)?;
        Ok(self.project(records, spec))
    }
}

type StepResult<T> = Result<T, (ErrorKind, ClientError)>;

fn step<T>(kind: ErrorKind, result: Result<T, ClientError>) -> StepResult<T> {
    result.map_err(|e| (kind, e))
}

/// Driver over a single exclusively owned store connection.
pub struct StoreDriver<C: StoreClient> {
    client: C,
    prefix: String,
    query_on_error: bool,
    last_error: Option<StatementError>,
    count: u64,
}

impl<C: StoreClient> StoreDriver<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            prefix: String::new(),
            query_on_error: false,
            last_error: None,
            count: 0,
        }
    }

    pub fn with_settings(client: C, settings: &ConnectSettings) -> Self {
        Self::new(client)
            .prefix(settings.prefix.clone())
            .query_on_error(settings.query_on_error)
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn query_on_error(mut self, enabled: bool) -> Self {
        self.query_on_error = enabled;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Quoted table name with the configured prefix applied.
    pub fn table(&self, name: &str) -> String {
        quote_ident(&format!("{}{}", self.prefix, name))
    }

    /// Column names of `table`, read from its first row. An empty table
    /// yields an empty list.
    pub fn columns(&mut self, table: &str) -> Result<Vec<String>, StatementError> {
        let spec = StatementSpec::new()
            .from_table(self.table(table))
            .limit(Limit::range(0, 1))
            .one();
        match self.select(&spec)? {
            QueryResult::One(Some(record)) => Ok(record.columns().map(str::to_string).collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Count the rows `spec` matches, ignoring its order, limit and
    /// projection. The total is also kept for [`StoreDriver::count`].
    pub fn count_matching(&mut self, spec: &StatementSpec) -> Result<u64, StatementError> {
        let sql = spec.to_count_sql();
        let records = self.execute_read(&sql, &spec.filter.params)?;
        let total = records
            .first()
            .and_then(|record| record.get("total"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        self.count = total;
        Ok(total)
    }

    /// Total recorded by the last [`StoreDriver::count_matching`].
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Insert the mapped fields of `input` into the prefixed `table`.
    pub fn insert(
        &mut self,
        table: &str,
        fields: &FieldMap,
        input: &InputRecord,
        return_generated_id: bool,
    ) -> Result<WriteOutcome, StatementError> {
        let columns = fields.prep_fields_multi(input);
        let stmt = transpiler::insert_statement(&self.table(table), &columns);
        self.execute_write(&stmt.sql, &stmt.params, return_generated_id)
    }

    /// Update the mapped fields of `input` on rows matching `search`.
    pub fn update(
        &mut self,
        table: &str,
        fields: &FieldMap,
        input: &InputRecord,
        search: &SearchSpec,
    ) -> Result<WriteOutcome, StatementError> {
        let sets = fields.prep_fields(input);
        let stmt = transpiler::update_statement(&self.table(table), &sets, &search.compile());
        self.execute_write(&stmt.sql, &stmt.params, false)
    }

    /// Delete rows matching `search` from the prefixed `table`.
    pub fn delete(&mut self, table: &str, search: &SearchSpec) -> Result<WriteOutcome, StatementError> {
        let stmt = transpiler::delete_statement(&self.table(table), &search.compile());
        self.execute_write(&stmt.sql, &stmt.params, false)
    }

    fn fail(&mut self, kind: ErrorKind, error: ClientError, sql: &str) -> StatementError {
        let mut err = StatementError::new(kind, error.0);
        if self.query_on_error {
            err = err.with_sql(sql);
        }
        tracing::warn!(kind = %err.kind, error = %err.message, "statement failed");
        self.last_error = Some(err.clone());
        err
    }

    fn read_prepared(&mut self, stmt: &mut C::Statement, params: &[Param]) -> StepResult<Vec<Record>> {
        if !params.is_empty() {
            step(ErrorKind::Bind, self.client.bind(stmt, params))?;
        }
        step(ErrorKind::Execute, self.client.execute(stmt))?;
        step(ErrorKind::Execute, self.client.store_result(stmt))?;

        let columns = step(ErrorKind::Metadata, self.client.result_metadata(stmt))?;

        let mut records = Vec::new();
        while let Some(row) = step(ErrorKind::Metadata, self.client.fetch_row(stmt))? {
            if row.len() != columns.len() {
                return Err((
                    ErrorKind::Metadata,
                    ClientError::new(format!(
                        "row has {} values for {} columns",
                        row.len(),
                        columns.len()
                    )),
                ));
            }
            let record: Record = columns
                .iter()
                .map(|column| column.name.clone())
                .zip(row)
                .collect();
            records.push(record);
        }

        Ok(records)
    }

    fn write_prepared(
        &mut self,
        stmt: &mut C::Statement,
        params: &[Param],
        return_generated_id: bool,
    ) -> StepResult<WriteOutcome> {
        step(ErrorKind::Bind, self.client.bind(stmt, params))?;
        step(ErrorKind::Execute, self.client.execute(stmt))?;

        if return_generated_id {
            let id = self
                .client
                .supports_last_insert_id()
                .then(|| self.client.last_insert_id())
                .flatten();
            return match id {
                Some(id) => Ok(WriteOutcome::GeneratedId(id)),
                None => Err((
                    ErrorKind::Execute,
                    ClientError::new("store client does not report generated identifiers"),
                )),
            };
        }

        Ok(WriteOutcome::AffectedRows(self.client.affected_rows(stmt)))
    }
}

impl<C: StoreClient> Driver for StoreDriver<C> {
    fn execute_read(&mut self, sql: &str, params: &[Param]) -> Result<Vec<Record>, StatementError> {
        self.last_error = None;
        tracing::debug!(sql, params = params.len(), "executing read");

        let mut stmt = match self.client.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => return Err(self.fail(ErrorKind::Prepare, e, sql)),
        };
        let outcome = self.read_prepared(&mut stmt, params);
        self.client.close(stmt);

        outcome.map_err(|(kind, e)| self.fail(kind, e, sql))
    }

    fn execute_write(
        &mut self,
        sql: &str,
        params: &[Param],
        return_generated_id: bool,
    ) -> Result<WriteOutcome, StatementError> {
        self.last_error = None;
        tracing::debug!(sql, params = params.len(), "executing write");

        let mut stmt = match self.client.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => return Err(self.fail(ErrorKind::Prepare, e, sql)),
        };
        let outcome = self.write_prepared(&mut stmt, params, return_generated_id);
        self.client.close(stmt);

        outcome.map_err(|(kind, e)| self.fail(kind, e, sql))
    }

    fn supports_last_insert_id(&self) -> bool {
        self.client.supports_last_insert_id()
    }

    fn last_error(&self) -> Option<&StatementError> {
        self.last_error.as_ref()
    }
}

//! MySQL store client backed by sqlx.
//!
//! sqlx is async; this client owns a current-thread tokio runtime and
//! blocks on it, so each call occupies the connection until the server
//! answers. Result sets are buffered in full by `execute`.
//!
//! Server-side statements are not cached: `prepare` describes the
//! statement and releases it, and `execute` prepares, runs and releases
//! it again in one round. Closing a handle only drops its buffered rows.
//! Rows arrive in the binary protocol and are decoded by column type.

use std::collections::VecDeque;

use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlRow, MySqlStatement};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Either, Executor, MySql, Row, Statement, TypeInfo};
use tokio::runtime::Runtime;

use crate::config::{ConfigResolver, ConnectSettings};
use crate::engine::StoreDriver;
use crate::error::{BinderyError, BinderyResult};
use crate::store::{ClientError, ColumnMeta, StoreClient};
use crate::value::{BindType, Param, Value};

impl From<sqlx::Error> for ClientError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) => ClientError::new(db.message()),
            _ => ClientError::new(e.to_string()),
        }
    }
}

/// A prepared statement plus its bound parameters and buffered rows.
pub struct MySqlHandle {
    statement: MySqlStatement<'static>,
    params: Vec<Param>,
    rows: VecDeque<MySqlRow>,
    affected: u64,
}

/// Blocking MySQL client over one exclusively owned connection.
///
/// # Panics
///
/// Every call blocks on the client's own runtime, which panics when made
/// from inside another tokio runtime. Use it from plain threads (or
/// `tokio::task::spawn_blocking`).
pub struct MySqlStore {
    runtime: Runtime,
    conn: MySqlConnection,
    last_insert_id: Option<u64>,
}

impl MySqlStore {
    /// Open the connection described by `settings`.
    pub fn connect(settings: &ConnectSettings) -> BinderyResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let conn = runtime
            .block_on(connect_options(settings).connect())
            .map_err(|e| BinderyError::Connection(e.to_string()))?;

        tracing::info!(
            host = %settings.host,
            database = %settings.database,
            replica_only = settings.replica_only,
            "connected to store"
        );

        Ok(Self {
            runtime,
            conn,
            last_insert_id: None,
        })
    }
}

fn connect_options(settings: &ConnectSettings) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .password(&settings.password)
        .statement_cache_capacity(0);
    if !settings.database.is_empty() {
        options = options.database(&settings.database);
    }
    if let Some(socket) = &settings.socket {
        options = options.socket(socket);
    }
    options
}

/// Resolve settings and open a driver over a MySQL connection.
///
/// # Panics
///
/// Panics when called from inside a tokio runtime; see [`MySqlStore`].
pub fn connect_driver(resolver: &ConfigResolver) -> BinderyResult<StoreDriver<MySqlStore>> {
    let settings = ConnectSettings::resolve(resolver)?;
    let store = MySqlStore::connect(&settings)?;
    Ok(StoreDriver::with_settings(store, &settings))
}

impl StoreClient for MySqlStore {
    type Statement = MySqlHandle;

    fn prepare(&mut self, sql: &str) -> Result<MySqlHandle, ClientError> {
        let statement = self.runtime.block_on((&mut self.conn).prepare(sql))?;
        Ok(MySqlHandle {
            statement: Statement::to_owned(&statement),
            params: Vec::new(),
            rows: VecDeque::new(),
            affected: 0,
        })
    }

    fn bind(&mut self, stmt: &mut MySqlHandle, params: &[Param]) -> Result<(), ClientError> {
        let expected = match stmt.statement.parameters() {
            Some(Either::Left(types)) => types.len(),
            Some(Either::Right(count)) => count,
            None => params.len(),
        };
        if expected != params.len() {
            return Err(ClientError::new(format!(
                "Number of variables doesn't match number of parameters in prepared statement \
                 (expected {expected}, got {})",
                params.len()
            )));
        }
        stmt.params = params.to_vec();
        Ok(())
    }

    fn execute(&mut self, stmt: &mut MySqlHandle) -> Result<(), ClientError> {
        let query = one_shot_query(stmt.statement.query(), &stmt.params);

        if stmt.statement.columns().is_empty() {
            let done = self.runtime.block_on(query.execute(&mut self.conn))?;
            stmt.affected = done.rows_affected();
            self.last_insert_id = Some(done.last_insert_id());
        } else {
            let rows = self.runtime.block_on(query.fetch_all(&mut self.conn))?;
            stmt.affected = rows.len() as u64;
            stmt.rows = rows.into();
        }

        Ok(())
    }

    fn store_result(&mut self, _stmt: &mut MySqlHandle) -> Result<(), ClientError> {
        Ok(())
    }

    fn result_metadata(&mut self, stmt: &mut MySqlHandle) -> Result<Vec<ColumnMeta>, ClientError> {
        let columns = stmt.statement.columns();
        if columns.is_empty() {
            return Err(ClientError::new("statement did not produce a result set"));
        }
        Ok(columns.iter().map(|c| ColumnMeta::new(c.name())).collect())
    }

    fn fetch_row(&mut self, stmt: &mut MySqlHandle) -> Result<Option<Vec<Value>>, ClientError> {
        stmt.rows.pop_front().map(|row| decode_row(&row)).transpose()
    }

    fn affected_rows(&self, stmt: &MySqlHandle) -> u64 {
        stmt.affected
    }

    fn supports_last_insert_id(&self) -> bool {
        true
    }

    fn last_insert_id(&self) -> Option<u64> {
        self.last_insert_id
    }

    fn close(&mut self, stmt: MySqlHandle) {
        tracing::trace!(buffered = stmt.rows.len(), "dropping statement handle");
        drop(stmt);
    }
}

/// Bind every parameter; the statement is released once it has run.
fn one_shot_query<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Param],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match bound_value(param) {
            Bound::Null => query.bind(None::<String>),
            Bound::Int(v) => query.bind(v),
            Bound::UInt(v) => query.bind(v),
            Bound::Double(v) => query.bind(v),
            Bound::Blob(v) => query.bind(v.to_vec()),
            Bound::Text(v) => query.bind(v),
        };
    }
    query.persistent(false)
}

/// Wire representation chosen for a parameter.
#[derive(Debug, PartialEq)]
enum Bound<'a> {
    Null,
    Int(i64),
    UInt(u64),
    Double(f64),
    Blob(&'a [u8]),
    Text(String),
}

/// Typed tags send native values when the value fits; everything else
/// goes as text and the server converts it.
fn bound_value(param: &Param) -> Bound<'_> {
    match (param.ty, &param.value) {
        (_, Value::Null) => Bound::Null,
        (BindType::Integer, Value::Int(v)) => Bound::Int(*v),
        (BindType::Integer, Value::UInt(v)) => Bound::UInt(*v),
        (BindType::Integer, Value::Bool(v)) => Bound::Int(i64::from(*v)),
        (BindType::Double, Value::Float(v)) => Bound::Double(*v),
        (BindType::Blob, Value::Bytes(v)) => Bound::Blob(v),
        (_, value) => Bound::Text(value.to_text().unwrap_or_default()),
    }
}

/// How a column's binary payload is turned into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Null,
    Bool,
    Signed,
    Unsigned,
    /// 4-byte IEEE single.
    Float,
    /// 8-byte IEEE double.
    Double,
    DateTime,
    Date,
    /// Signed duration; may exceed 24 hours.
    Time,
    Year,
    Bytes,
    Text,
}

fn decoder_for(type_name: &str) -> Decoder {
    match type_name {
        "NULL" => Decoder::Null,
        "BOOLEAN" => Decoder::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => Decoder::Signed,
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => Decoder::Unsigned,
        "FLOAT" => Decoder::Float,
        "DOUBLE" => Decoder::Double,
        "DATETIME" | "TIMESTAMP" => Decoder::DateTime,
        "DATE" => Decoder::Date,
        "TIME" => Decoder::Time,
        "YEAR" => Decoder::Year,
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => Decoder::Bytes,
        _ => Decoder::Text,
    }
}

fn decode_row(row: &MySqlRow) -> Result<Vec<Value>, ClientError> {
    (0..row.columns().len()).map(|i| decode_column(row, i)).collect()
}

fn decode_column(row: &MySqlRow, index: usize) -> Result<Value, ClientError> {
    let column = &row.columns()[index];

    match decoder_for(column.type_info().name()) {
        Decoder::Null => Ok(Value::Null),
        Decoder::Bool => decode_as::<bool>(row, index, Value::Bool),
        Decoder::Signed => decode_as::<i64>(row, index, Value::Int),
        Decoder::Unsigned => decode_as::<u64>(row, index, Value::UInt),
        Decoder::Float => decode_as::<f32>(row, index, |v| Value::Float(f64::from(v))),
        Decoder::Double => decode_as::<f64>(row, index, Value::Float),
        Decoder::DateTime => {
            decode_as::<chrono::NaiveDateTime>(row, index, |v| Value::String(v.to_string()))
        }
        Decoder::Date => decode_as::<chrono::NaiveDate>(row, index, |v| Value::String(v.to_string())),
        Decoder::Time => match raw_bytes(row, index)? {
            None => Ok(Value::Null),
            Some(bytes) => format_binary_time(&bytes).map(Value::String).ok_or_else(|| {
                ClientError::new(format!("column '{}': malformed TIME value", column.name()))
            }),
        },
        Decoder::Year => row
            .try_get_unchecked::<Option<u16>, _>(index)
            .map(|v| v.map_or(Value::Null, |year| Value::Int(i64::from(year))))
            .map_err(|e| column_error(row, index, e)),
        Decoder::Bytes => Ok(raw_bytes(row, index)?.map_or(Value::Null, Value::Bytes)),
        Decoder::Text => decode_text(row, index),
    }
}

fn decode_as<'r, T>(
    row: &'r MySqlRow,
    index: usize,
    wrap: impl FnOnce(T) -> Value,
) -> Result<Value, ClientError>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(Some(v)) => Ok(wrap(v)),
        Ok(None) => Ok(Value::Null),
        Err(_) => decode_text(row, index),
    }
}

/// Non-UTF-8 payloads are an error rather than a silent NULL.
fn decode_text(row: &MySqlRow, index: usize) -> Result<Value, ClientError> {
    row.try_get_unchecked::<Option<String>, _>(index)
        .map(|v| v.map_or(Value::Null, Value::String))
        .map_err(|e| column_error(row, index, e))
}

fn raw_bytes(row: &MySqlRow, index: usize) -> Result<Option<Vec<u8>>, ClientError> {
    row.try_get_unchecked::<Option<Vec<u8>>, _>(index)
        .map_err(|e| column_error(row, index, e))
}

fn column_error(row: &MySqlRow, index: usize, e: sqlx::Error) -> ClientError {
    ClientError::new(format!("column '{}': {}", row.columns()[index].name(), e))
}

/// Render a binary-protocol TIME (`len, sign, days u32, h, m, s[, micros u32]`)
/// as `[-]HHH:MM:SS[.ffffff]`.
fn format_binary_time(bytes: &[u8]) -> Option<String> {
    let (&len, body) = bytes.split_first()?;
    if len == 0 {
        return Some("00:00:00".to_string());
    }
    if body.len() < usize::from(len) || !(len == 8 || len == 12) {
        return None;
    }

    let negative = body[0] == 1;
    let days = u32::from_le_bytes([body[1], body[2], body[3], body[4]]);
    let hours = u64::from(days) * 24 + u64::from(body[5]);
    let (minutes, seconds) = (body[6], body[7]);

    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        hours,
        minutes,
        seconds
    );
    if len == 12 {
        let micros = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
        if micros != 0 {
            out.push_str(&format!(".{:06}", micros));
        }
    }
    Some(out)
}

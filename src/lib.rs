//! # bindery — declarative specs to parameterized SQL
//!
//! bindery turns search and statement descriptions into SQL text with an
//! ordered, typed parameter list, runs it over a prepared-statement
//! protocol, and shapes the fetched rows.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use bindery::prelude::*;
//!
//! let filter = SearchSpec::new()
//!     .ge("age", "18")
//!     .regexp("name", ["^A", "^B"])
//!     .compile();
//!
//! let spec = StatementSpec::new()
//!     .from_table("`users`")
//!     .filter(filter)
//!     .limit(Limit::count(10));
//!
//! let sql = spec.to_sql();
//! // => "SELECT * FROM `users` WHERE `age` >= ? AND (`name` REGEXP ? OR `name` REGEXP ?) LIMIT 0, 10"
//!
//! let mut driver = bindery::mysql::connect_driver(&resolver)?;
//! let users = driver.select(&spec)?;
//! ```
//!
//! ## Operators
//!
//! | Key          | SQL                                  |
//! |--------------|--------------------------------------|
//! | `ge` / `gt`  | `` `f` >= ? `` / `` `f` > ? ``       |
//! | `le` / `lt`  | `` `f` <= ? `` / `` `f` < ? ``       |
//! | `re`         | `` (`f` REGEXP ? OR ...) ``          |
//! | anything else| `` `f` IN (?, ...) ``                |

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod mysql;
pub mod parser;
pub mod store;
pub mod transpiler;
pub mod value;

pub mod prelude {
    pub use crate::ast::*;
    pub use crate::config::{ConfigResolver, ConnectSettings, ConnectionConfig};
    pub use crate::engine::{Driver, QueryResult, StoreDriver, WriteOutcome, project};
    pub use crate::error::*;
    pub use crate::parser::{parse_filter, parse_filters};
    pub use crate::store::{ClientError, ColumnMeta, StoreClient};
    pub use crate::transpiler::{BoundFragment, InsertColumns, ToSql};
    pub use crate::value::{BindType, Param, Record, Value};
}

/// Compile a search into a WHERE body and its parameters.
///
/// # Example
///
/// ```
/// use bindery::ast::SearchSpec;
///
/// let fragment = bindery::compile(&SearchSpec::new().ge("age", "18"));
/// assert_eq!(fragment.sql, "`age` >= ?");
/// assert_eq!(fragment.params.len(), 1);
/// ```
pub fn compile(search: &ast::SearchSpec) -> transpiler::BoundFragment {
    search.compile()
}

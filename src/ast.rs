//! Declarative descriptions of searches, field mappings and SELECT statements.

use serde::de::{self, Deserialize, Deserializer, MapAccess, Visitor};
use std::collections::HashMap;
use std::fmt;

use crate::transpiler::BoundFragment;
use crate::value::Value;

/// Comparison operators that bind exactly one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Ge,
    Gt,
    Le,
    Lt,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Ge => ">=",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Lt => "<",
        }
    }
}

/// One operator entry of a field search.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// `field OP ?`
    Compare(CompareOp, String),
    /// `(field REGEXP ? OR field REGEXP ? ...)`
    Regexp(Vec<String>),
    /// `field IN (?, ?, ...)`
    In(Vec<String>),
}

impl Term {
    /// Build a term from an operator key. `ge`, `gt`, `le`, `lt` take a
    /// single value, `re` takes alternatives, anything else is equality.
    pub fn from_key(key: &str, mut values: Vec<String>) -> Result<Self, String> {
        let op = match key {
            "ge" => CompareOp::Ge,
            "gt" => CompareOp::Gt,
            "le" => CompareOp::Le,
            "lt" => CompareOp::Lt,
            "re" => return Ok(Term::Regexp(values)),
            _ => return Ok(Term::In(values)),
        };
        if values.len() != 1 {
            return Err(format!(
                "operator '{key}' takes a single value, got {}",
                values.len()
            ));
        }
        Ok(Term::Compare(op, values.remove(0)))
    }
}

/// All operator entries for one field, in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSearch {
    pub field: String,
    pub terms: Vec<Term>,
}

/// Ordered field → operator → value(s) search description.
///
/// Field order and term order decide parameter order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpec {
    fields: Vec<FieldSearch>,
}

impl SearchSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a term to `field`, creating the field entry on first use.
    pub fn push(&mut self, field: impl Into<String>, term: Term) {
        let field = field.into();
        match self.fields.iter_mut().find(|f| f.field == field) {
            Some(entry) => entry.terms.push(term),
            None => self.fields.push(FieldSearch {
                field,
                terms: vec![term],
            }),
        }
    }

    /// Add a term for `field`, merging with any terms it already has.
    pub fn with(mut self, field: impl Into<String>, term: Term) -> Self {
        self.push(field, term);
        self
    }

    /// Require `field >= value`.
    pub fn ge(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(field, Term::Compare(CompareOp::Ge, value.into()))
    }

    /// Require `field > value`.
    pub fn gt(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(field, Term::Compare(CompareOp::Gt, value.into()))
    }

    /// Require `field <= value`.
    pub fn le(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(field, Term::Compare(CompareOp::Le, value.into()))
    }

    /// Require `field < value`.
    pub fn lt(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.with(field, Term::Compare(CompareOp::Lt, value.into()))
    }

    /// Match `field` against any of the patterns.
    pub fn regexp<I, S>(self, field: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = patterns.into_iter().map(Into::into).collect();
        self.with(field, Term::Regexp(patterns))
    }

    /// Require `field` to equal one of the values.
    pub fn any_of<I, S>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.with(field, Term::In(values))
    }

    /// Searched fields in insertion order.
    pub fn fields(&self) -> &[FieldSearch] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A scalar as it may appear in a JSON search document.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Bool(b) => (if b { "1" } else { "0" }).to_string(),
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl OneOrMany {
    fn into_texts(self) -> Vec<String> {
        match self {
            OneOrMany::One(v) => vec![v.into_text()],
            OneOrMany::Many(vs) => vs.into_iter().map(Scalar::into_text).collect(),
        }
    }
}

/// Operator map of one field, read in document order.
struct FieldTerms(Vec<Term>);

impl<'de> Deserialize<'de> for FieldTerms {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TermsVisitor;

        impl<'de> Visitor<'de> for TermsVisitor {
            type Value = FieldTerms;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of operator to value(s)")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<FieldTerms, A::Error> {
                let mut terms = Vec::new();
                while let Some(key) = map.next_key::<String>()? {
                    let values: OneOrMany = map.next_value()?;
                    let term = Term::from_key(&key, values.into_texts())
                        .map_err(<A::Error as de::Error>::custom)?;
                    terms.push(term);
                }
                Ok(FieldTerms(terms))
            }
        }

        deserializer.deserialize_map(TermsVisitor)
    }
}

impl<'de> Deserialize<'de> for SearchSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = SearchSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of field to operator map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<SearchSpec, A::Error> {
                let mut spec = SearchSpec::new();
                while let Some(field) = map.next_key::<String>()? {
                    let FieldTerms(terms) = map.next_value()?;
                    for term in terms {
                        spec.push(field.clone(), term);
                    }
                }
                Ok(spec)
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}

/// Ordered logical field → physical column expression map.
///
/// Acts as a write allowlist: input fields without an entry are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a logical input name to a column expression.
    pub fn field(mut self, logical: impl Into<String>, column: impl Into<String>) -> Self {
        self.entries.push((logical.into(), column.into()));
        self
    }

    /// `(logical, column)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(l, c)| (l.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<L: Into<String>, C: Into<String>> FromIterator<(L, C)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (L, C)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(l, c)| (l.into(), c.into())).collect(),
        }
    }
}

/// Logical field name to the value supplied by the caller.
pub type InputRecord = HashMap<String, Value>;

/// `LIMIT offset, count`. Without a count no clause is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Limit {
    pub offset: Option<u64>,
    pub count: Option<u64>,
}

impl Limit {
    /// Only a count; the offset renders as 0.
    pub fn count(count: u64) -> Self {
        Self {
            offset: None,
            count: Some(count),
        }
    }

    /// Skip `offset` rows, then return at most `count`.
    pub fn range(offset: u64, count: u64) -> Self {
        Self {
            offset: Some(offset),
            count: Some(count),
        }
    }
}

/// How fetched rows are reduced before they reach the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// First record only.
    One,
    /// Each record's value at this column.
    Column(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

impl std::str::FromStr for SortDir {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDir::Asc),
            "desc" | "descending" => Ok(SortDir::Desc),
            other => Err(format!("invalid sort direction: '{other}'")),
        }
    }
}

/// Request paging and sorting parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paging {
    pub start_index: Option<u64>,
    pub num_results: Option<u64>,
    pub sort_field: Option<String>,
    pub sort_dir: Option<SortDir>,
}

/// A complete SELECT description.
///
/// Each clause is rendered only when set; `filter` is rendered only when
/// its SQL text is non-empty, and its params are the statement's binds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementSpec {
    pub select: Option<String>,
    pub from: Option<String>,
    pub filter: BoundFragment,
    pub group: Option<String>,
    pub having: Option<String>,
    pub order: Option<String>,
    pub limit: Option<Limit>,
    pub procedure: Option<String>,
    pub projection: Projection,
}

impl StatementSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Column list; `*` when unset.
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    /// FROM clause, rendered verbatim.
    pub fn from_table(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// WHERE clause and its parameters, usually from [`SearchSpec::compile`].
    pub fn filter(mut self, filter: BoundFragment) -> Self {
        self.filter = filter;
        self
    }

    /// GROUP BY clause.
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// HAVING clause.
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// ORDER BY clause.
    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// LIMIT clause.
    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// PROCEDURE clause.
    pub fn procedure(mut self, procedure: impl Into<String>) -> Self {
        self.procedure = Some(procedure.into());
        self
    }

    /// Return only the first record.
    pub fn one(mut self) -> Self {
        self.projection = Projection::One;
        self
    }

    /// Return one column's values across all records.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.projection = Projection::Column(column.into());
        self
    }

    /// Apply request paging: sort field (and direction) become the ORDER
    /// BY clause, `num_results`/`start_index` become the LIMIT.
    pub fn paginate(mut self, paging: &Paging) -> Self {
        if let Some(field) = &paging.sort_field {
            let mut order = crate::transpiler::quote_ident(field);
            if let Some(dir) = paging.sort_dir {
                order.push(' ');
                order.push_str(dir.as_sql());
            }
            self.order = Some(order);
        }
        if paging.num_results.is_some() || paging.start_index.is_some() {
            self.limit = Some(Limit {
                offset: paging.start_index,
                count: paging.num_results,
            });
        }
        self
    }
}

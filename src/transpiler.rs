//! SQL transpiler for bindery specs.
//!
//! Turns searches and field maps into SQL fragments with aligned
//! parameter lists, and assembles SELECT/INSERT/UPDATE/DELETE text.
//! Values always travel as `?` parameters; identifiers and clause text
//! are concatenated as given.

use crate::ast::*;
use crate::value::{BindType, Param, Value};

/// SQL text paired with the parameters for its `?` placeholders, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundFragment {
    pub sql: String,
    pub params: Vec<Param>,
}

impl BoundFragment {
    pub fn new(sql: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Clause text with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }

    pub fn bind_types(&self) -> Vec<BindType> {
        self.params.iter().map(|p| p.ty).collect()
    }

    pub fn values(&self) -> Vec<&Value> {
        self.params.iter().map(|p| &p.value).collect()
    }

    /// Type letters as a `bind_param` type string, e.g. `"sss"`.
    pub fn type_string(&self) -> String {
        self.params.iter().map(|p| p.ty.as_char()).collect()
    }
}

/// Placeholder-ready column lists for `INSERT .. VALUES`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertColumns {
    pub columns: Vec<String>,
    pub placeholders: Vec<String>,
    pub params: Vec<Param>,
}

impl InsertColumns {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns_sql(&self) -> String {
        self.columns.join(", ")
    }

    pub fn placeholders_sql(&self) -> String {
        self.placeholders.join(", ")
    }
}

/// Trait for converting statement specs to SQL.
pub trait ToSql {
    /// Convert this spec to a SQL string.
    fn to_sql(&self) -> String;
}

/// Wrap an identifier in backticks, doubling any embedded backtick.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

impl SearchSpec {
    /// Compile into a WHERE body (no leading `WHERE`).
    ///
    /// Fields are joined with `AND`; regexp alternatives of one term are
    /// OR-ed inside parentheses; equality always renders as an `IN` list.
    /// Every value is bound with the string type.
    pub fn compile(&self) -> BoundFragment {
        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<Param> = Vec::new();

        for search in self.fields() {
            let column = quote_ident(&search.field);
            for term in &search.terms {
                match term {
                    Term::Compare(op, value) => {
                        clauses.push(format!("{} {} ?", column, op.symbol()));
                        params.push(Param::text(value.as_str()));
                    }
                    Term::Regexp(patterns) => {
                        if patterns.is_empty() {
                            continue;
                        }
                        let alternatives: Vec<String> = patterns
                            .iter()
                            .map(|_| format!("{} REGEXP ?", column))
                            .collect();
                        clauses.push(format!("({})", alternatives.join(" OR ")));
                        params.extend(patterns.iter().map(|p| Param::text(p.as_str())));
                    }
                    Term::In(values) => {
                        if values.is_empty() {
                            continue;
                        }
                        let marks = vec!["?"; values.len()].join(", ");
                        clauses.push(format!("{} IN ({})", column, marks));
                        params.extend(values.iter().map(|v| Param::text(v.as_str())));
                    }
                }
            }
        }

        BoundFragment::new(clauses.join(" AND "), params)
    }
}

impl FieldMap {
    /// `column = ?` assignments for every mapped field present in `input`.
    pub fn prep_fields(&self, input: &InputRecord) -> BoundFragment {
        let mut sets: Vec<String> = Vec::new();
        let mut params: Vec<Param> = Vec::new();

        for (field, column) in self.iter() {
            if let Some(value) = input.get(field) {
                sets.push(format!("{} = ?", column));
                params.push(Param::text(value.clone()));
            }
        }

        BoundFragment::new(sets.join(", "), params)
    }

    /// Parallel column/placeholder lists for every mapped field present in `input`.
    pub fn prep_fields_multi(&self, input: &InputRecord) -> InsertColumns {
        let mut out = InsertColumns::default();

        for (field, column) in self.iter() {
            if let Some(value) = input.get(field) {
                out.columns.push(column.to_string());
                out.placeholders.push("?".to_string());
                out.params.push(Param::text(value.clone()));
            }
        }

        out
    }
}

impl ToSql for Limit {
    fn to_sql(&self) -> String {
        match self.count {
            Some(count) => format!("LIMIT {}, {}", self.offset.unwrap_or(0), count),
            None => String::new(),
        }
    }
}

impl ToSql for StatementSpec {
    fn to_sql(&self) -> String {
        let mut sql = String::from("SELECT ");
        sql.push_str(self.select.as_deref().unwrap_or("*"));

        if let Some(from) = &self.from {
            sql.push_str(" FROM ");
            sql.push_str(from);
        }

        if !self.filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filter.sql);
        }

        if let Some(group) = &self.group {
            sql.push_str(" GROUP BY ");
            sql.push_str(group);
        }

        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }

        if let Some(order) = &self.order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }

        if let Some(limit) = &self.limit {
            let clause = limit.to_sql();
            if !clause.is_empty() {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }

        if let Some(procedure) = &self.procedure {
            sql.push_str(" PROCEDURE ");
            sql.push_str(procedure);
        }

        sql
    }
}

impl StatementSpec {
    /// `SELECT COUNT(*) AS total` over this spec without ordering, limit
    /// or projection. Params are the spec's filter params.
    pub fn to_count_sql(&self) -> String {
        let inner = StatementSpec {
            order: None,
            limit: None,
            procedure: None,
            projection: Projection::All,
            ..self.clone()
        };
        format!("SELECT COUNT(*) AS total FROM ({}) AS counted", inner.to_sql())
    }
}

/// `INSERT INTO table (cols) VALUES (?, ...)`
pub fn insert_statement(table: &str, columns: &InsertColumns) -> BoundFragment {
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.columns_sql(),
        columns.placeholders_sql()
    );
    BoundFragment::new(sql, columns.params.clone())
}

/// `UPDATE table SET .. [WHERE ..]`; SET params precede WHERE params.
pub fn update_statement(table: &str, sets: &BoundFragment, filter: &BoundFragment) -> BoundFragment {
    let mut sql = format!("UPDATE {} SET {}", table, sets.sql);
    let mut params = sets.params.clone();

    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filter.sql);
        params.extend(filter.params.iter().cloned());
    }

    BoundFragment::new(sql, params)
}

/// `DELETE FROM table [WHERE ..]`
pub fn delete_statement(table: &str, filter: &BoundFragment) -> BoundFragment {
    let mut sql = format!("DELETE FROM {}", table);

    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filter.sql);
    }

    BoundFragment::new(sql, filter.params.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn texts(fragment: &BoundFragment) -> Vec<String> {
        fragment
            .params
            .iter()
            .map(|p| p.value.to_text().unwrap_or_default())
            .collect()
    }

    fn input(pairs: &[(&str, &str)]) -> InputRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_compare_operator() {
        let fragment = SearchSpec::new().ge("age", "18").compile();
        assert_eq!(fragment.sql, "`age` >= ?");
        assert_eq!(texts(&fragment), vec!["18"]);
        assert_eq!(fragment.type_string(), "s");
    }

    #[test]
    fn test_all_compare_operators() {
        let fragment = SearchSpec::new()
            .gt("a", "1")
            .le("b", "2")
            .lt("c", "3")
            .compile();
        assert_eq!(fragment.sql, "`a` > ? AND `b` <= ? AND `c` < ?");
    }

    #[test]
    fn test_regexp_alternatives() {
        let fragment = SearchSpec::new().regexp("name", ["^A", "^B"]).compile();
        assert_eq!(fragment.sql, "(`name` REGEXP ? OR `name` REGEXP ?)");
        assert_eq!(texts(&fragment), vec!["^A", "^B"]);
    }

    #[test]
    fn test_equality_is_in_list() {
        let fragment = SearchSpec::new().any_of("status", ["a", "b"]).compile();
        assert_eq!(fragment.sql, "`status` IN (?, ?)");
        assert_eq!(texts(&fragment), vec!["a", "b"]);

        let single = SearchSpec::new().any_of("status", ["a"]).compile();
        assert_eq!(single.sql, "`status` IN (?)");
    }

    #[test]
    fn test_mixed_fields_keep_order() {
        let fragment = SearchSpec::new()
            .any_of("host", ["web1", "web2"])
            .ge("age", "18")
            .regexp("name", ["^x"])
            .lt("age", "65")
            .compile();
        assert_eq!(
            fragment.sql,
            "`host` IN (?, ?) AND `age` >= ? AND `age` < ? AND (`name` REGEXP ?)"
        );
        assert_eq!(texts(&fragment), vec!["web1", "web2", "18", "65", "^x"]);
    }

    #[test]
    fn test_placeholders_match_params() {
        let fragment = SearchSpec::new()
            .any_of("a", ["1", "2", "3"])
            .regexp("b", ["x", "y"])
            .gt("c", "0")
            .compile();
        assert_eq!(fragment.sql.matches('?').count(), fragment.params.len());
        assert_eq!(fragment.bind_types().len(), fragment.values().len());
    }

    #[test]
    fn test_empty_search_and_empty_lists() {
        assert_eq!(SearchSpec::new().compile(), BoundFragment::default());

        let fragment = SearchSpec::new()
            .any_of("a", Vec::<String>::new())
            .regexp("b", Vec::<String>::new())
            .compile();
        assert!(fragment.is_empty());
        assert!(fragment.params.is_empty());
    }

    #[test]
    fn test_field_name_backticks_are_doubled() {
        let fragment = SearchSpec::new().ge("we`ird", "1").compile();
        assert_eq!(fragment.sql, "`we``ird` >= ?");
    }

    #[test]
    fn test_prep_fields() {
        let map = FieldMap::new().field("nm", "`name`");
        let fragment = map.prep_fields(&input(&[("nm", "x")]));
        assert_eq!(fragment.sql, "`name` = ?");
        assert_eq!(texts(&fragment), vec!["x"]);

        let absent = map.prep_fields(&input(&[]));
        assert!(absent.is_empty());
        assert!(absent.params.is_empty());
    }

    #[test]
    fn test_prep_fields_follows_map_order_and_ignores_unmapped() {
        let map = FieldMap::new()
            .field("b", "`col_b`")
            .field("a", "`col_a`")
            .field("c", "`col_c`");
        let fragment = map.prep_fields(&input(&[("a", "1"), ("b", "2"), ("zzz", "3")]));
        assert_eq!(fragment.sql, "`col_b` = ?, `col_a` = ?");
        assert_eq!(texts(&fragment), vec!["2", "1"]);
    }

    #[test]
    fn test_prep_fields_multi() {
        let map = FieldMap::new()
            .field("name", "`name`")
            .field("email", "`email`")
            .field("role", "`role`");
        let cols = map.prep_fields_multi(&input(&[("role", "admin"), ("name", "ann")]));
        assert_eq!(cols.columns, vec!["`name`", "`role`"]);
        assert_eq!(cols.placeholders, vec!["?", "?"]);
        assert_eq!(cols.params.len(), 2);
        assert_eq!(cols.params[1].value, Value::from("admin"));
    }

    #[test]
    fn test_simple_select() {
        let spec = StatementSpec::new().from_table("users");
        assert_eq!(spec.to_sql(), "SELECT * FROM users");
    }

    #[test]
    fn test_limit_count_only() {
        let spec = StatementSpec::new().from_table("t").limit(Limit::count(5));
        assert!(spec.to_sql().ends_with("LIMIT 0, 5"));
    }

    #[test]
    fn test_limit_offset_and_count() {
        let spec = StatementSpec::new().from_table("t").limit(Limit::range(5, 10));
        assert!(spec.to_sql().ends_with("LIMIT 5, 10"));
    }

    #[test]
    fn test_limit_without_count_is_omitted() {
        let spec = StatementSpec::new().from_table("t").limit(Limit {
            offset: Some(30),
            count: None,
        });
        assert_eq!(spec.to_sql(), "SELECT * FROM t");
    }

    #[test]
    fn test_empty_filter_omits_where() {
        let spec = StatementSpec::new()
            .from_table("t")
            .filter(SearchSpec::new().compile());
        assert_eq!(spec.to_sql(), "SELECT * FROM t");
    }

    #[test]
    fn test_select_all_clauses_in_order() {
        let spec = StatementSpec::new()
            .select("host, COUNT(*) AS n")
            .from_table("`hosts`")
            .filter(SearchSpec::new().any_of("env", ["prod"]).compile())
            .group("host")
            .having("n > 1")
            .order("n DESC")
            .limit(Limit::range(0, 25))
            .procedure("ANALYSE()");
        assert_eq!(
            spec.to_sql(),
            "SELECT host, COUNT(*) AS n FROM `hosts` WHERE `env` IN (?) \
             GROUP BY host HAVING n > 1 ORDER BY n DESC LIMIT 0, 25 PROCEDURE ANALYSE()"
        );
    }

    #[test]
    fn test_count_sql_drops_order_and_limit() {
        let spec = StatementSpec::new()
            .from_table("t")
            .filter(SearchSpec::new().ge("age", "18").compile())
            .order("age")
            .limit(Limit::count(10))
            .one();
        assert_eq!(
            spec.to_count_sql(),
            "SELECT COUNT(*) AS total FROM (SELECT * FROM t WHERE `age` >= ?) AS counted"
        );
    }

    #[test]
    fn test_insert_statement() {
        let map = FieldMap::new().field("name", "`name`").field("role", "`role`");
        let cols = map.prep_fields_multi(&input(&[("name", "ann"), ("role", "ops")]));
        let stmt = insert_statement("`users`", &cols);
        assert_eq!(stmt.sql, "INSERT INTO `users` (`name`, `role`) VALUES (?, ?)");
        assert_eq!(texts(&stmt), vec!["ann", "ops"]);
    }

    #[test]
    fn test_update_statement_param_order() {
        let sets = FieldMap::new()
            .field("role", "`role`")
            .prep_fields(&input(&[("role", "admin")]));
        let filter = SearchSpec::new().any_of("id", ["7"]).compile();
        let stmt = update_statement("`users`", &sets, &filter);
        assert_eq!(stmt.sql, "UPDATE `users` SET `role` = ? WHERE `id` IN (?)");
        assert_eq!(texts(&stmt), vec!["admin", "7"]);
    }

    #[test]
    fn test_delete_statement() {
        let stmt = delete_statement("`sessions`", &BoundFragment::default());
        assert_eq!(stmt.sql, "DELETE FROM `sessions`");

        let filter = SearchSpec::new().lt("expires", "2024-01-01").compile();
        let stmt = delete_statement("`sessions`", &filter);
        assert_eq!(stmt.sql, "DELETE FROM `sessions` WHERE `expires` < ?");
        assert_eq!(stmt.params.len(), 1);
    }
}

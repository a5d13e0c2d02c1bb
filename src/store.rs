use rusqlite::{params_from_iter, types::Value as SqlValue, types::ValueRef, Connection};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::db;

/// A single record as returned by the store, keyed by column name.
pub type Row = Map<String, JsonValue>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("store lock poisoned")]
    Poisoned,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot encode value for column {column}: {message}")]
    Encode { column: String, message: String },

    #[cfg(test)]
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, JsonValue),
    In(&'static str, Vec<JsonValue>),
    NotNull(&'static str),
}

impl Filter {
    fn column(&self) -> &'static str {
        match self {
            Filter::Eq(c, _) | Filter::In(c, _) | Filter::NotNull(c) => c,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

/// Filtered read over one named table.
#[derive(Debug, Clone)]
pub struct Select {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    /// Inclusive row window, `(from, to)`.
    pub range: Option<(usize, usize)>,
}

impl Select {
    pub fn from(table: &'static str, columns: &'static [&'static str]) -> Self {
        Self {
            table,
            columns,
            filters: Vec::new(),
            order: None,
            range: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &'static str, value: impl Into<JsonValue>) -> Self {
        self.filter(Filter::Eq(column, value.into()))
    }

    pub fn in_list<I, V>(self, column: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        self.filter(Filter::In(
            column,
            values.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn not_null(self, column: &'static str) -> Self {
        self.filter(Filter::NotNull(column))
    }

    pub fn order_by(mut self, column: &'static str, descending: bool) -> Self {
        self.order = Some(Order { column, descending });
        self
    }

    pub fn range(mut self, from: usize, to: usize) -> Self {
        self.range = Some((from, to));
        self
    }
}

/// The backing record store. Implementations must be shareable across the
/// pipeline's concurrent fetch stages.
pub trait RecordStore: Sync {
    fn select(&self, query: &Select) -> Result<Vec<Row>, StoreError>;

    /// Exact row count for `table` under `filters`.
    fn count(&self, table: &'static str, filters: &[Filter]) -> Result<u64, StoreError>;

    /// Insert-or-update by primary key. Only the supplied columns are written.
    fn upsert(
        &self,
        table: &'static str,
        key_column: &'static str,
        key: &str,
        fields: &Row,
    ) -> Result<(), StoreError>;

    fn get(
        &self,
        table: &'static str,
        key_column: &'static str,
        key: &str,
        columns: &'static [&'static str],
    ) -> Result<Option<Row>, StoreError> {
        let query = Select::from(table, columns).eq(key_column, key).range(0, 0);
        Ok(self.select(&query)?.into_iter().next())
    }
}

fn check_identifier(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

fn to_sql_value(column: &str, value: &JsonValue) -> Result<SqlValue, StoreError> {
    Ok(match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                return Err(StoreError::Encode {
                    column: column.to_string(),
                    message: format!("unrepresentable number {}", n),
                });
            }
        }
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    })
}

fn from_sql_value(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            JsonValue::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

fn where_clause(filters: &[Filter], values: &mut Vec<SqlValue>) -> Result<String, StoreError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(filters.len());
    for f in filters {
        let col = check_identifier(f.column())?;
        match f {
            Filter::Eq(_, v) => {
                values.push(to_sql_value(col, v)?);
                parts.push(format!("{} = ?", col));
            }
            Filter::In(_, list) => {
                if list.is_empty() {
                    parts.push("1 = 0".to_string());
                    continue;
                }
                for v in list {
                    values.push(to_sql_value(col, v)?);
                }
                let placeholders = std::iter::repeat("?")
                    .take(list.len())
                    .collect::<Vec<_>>()
                    .join(",");
                parts.push(format!("{} IN ({})", col, placeholders));
            }
            Filter::NotNull(_) => parts.push(format!("{} IS NOT NULL", col)),
        }
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

/// Workspace-local SQLite implementation of [`RecordStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self::new(db::open_db(workspace)?))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl RecordStore for SqliteStore {
    fn select(&self, query: &Select) -> Result<Vec<Row>, StoreError> {
        let table = check_identifier(query.table)?;
        let columns = query
            .columns
            .iter()
            .map(|c| check_identifier(c))
            .collect::<Result<Vec<_>, _>>()?;
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };

        let mut values: Vec<SqlValue> = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", projection, table);
        sql.push_str(&where_clause(&query.filters, &mut values)?);
        if let Some(order) = query.order {
            sql.push_str(&format!(
                " ORDER BY {} {}",
                check_identifier(order.column)?,
                if order.descending { "DESC" } else { "ASC" }
            ));
        }
        if let Some((from, to)) = query.range {
            if to < from {
                return Ok(Vec::new());
            }
            sql.push_str(" LIMIT ? OFFSET ?");
            values.push(SqlValue::Integer((to - from + 1) as i64));
            values.push(SqlValue::Integer(from as i64));
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, name) in names.iter().enumerate() {
                record.insert(name.clone(), from_sql_value(row.get_ref(i)?));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn count(&self, table: &'static str, filters: &[Filter]) -> Result<u64, StoreError> {
        let table = check_identifier(table)?;
        let mut values: Vec<SqlValue> = Vec::new();
        let sql = format!(
            "SELECT COUNT(*) FROM {}{}",
            table,
            where_clause(filters, &mut values)?
        );
        let conn = self.lock()?;
        let n: i64 = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }

    fn upsert(
        &self,
        table: &'static str,
        key_column: &'static str,
        key: &str,
        fields: &Row,
    ) -> Result<(), StoreError> {
        let table = check_identifier(table)?;
        let key_column = check_identifier(key_column)?;

        let mut columns = vec![key_column.to_string()];
        let mut values = vec![SqlValue::Text(key.to_string())];
        for (col, v) in fields {
            if col == key_column {
                continue;
            }
            columns.push(check_identifier(col)?.to_string());
            values.push(to_sql_value(col, v)?);
        }

        let placeholders = std::iter::repeat("?")
            .take(columns.len())
            .collect::<Vec<_>>()
            .join(",");
        let conflict = if columns.len() > 1 {
            let assignments = columns[1..]
                .iter()
                .map(|c| format!("{c} = excluded.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("DO UPDATE SET {}", assignments)
        } else {
            "DO NOTHING".to_string()
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
            table,
            columns.join(", "),
            placeholders,
            key_column,
            conflict
        );

        let conn = self.lock()?;
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

#[cfg(test)]
pub mod memory {
    //! In-memory store for unit tests: per-table failure injection and
    //! read/write counters.

    use super::*;
    use std::cmp::Ordering;
    use std::collections::{HashMap, HashSet};

    #[derive(Default)]
    pub struct MemoryStore {
        tables: Mutex<HashMap<String, Vec<Row>>>,
        failing: Mutex<HashSet<String>>,
        reads: Mutex<HashMap<String, usize>>,
        writes: Mutex<HashMap<String, usize>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, table: &str, row: JsonValue) {
            let row = row.as_object().cloned().unwrap_or_default();
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .push(row);
        }

        pub fn fail_table(&self, table: &str) {
            self.failing.lock().unwrap().insert(table.to_string());
        }

        pub fn reads(&self, table: &str) -> usize {
            self.reads.lock().unwrap().get(table).copied().unwrap_or(0)
        }

        pub fn writes(&self, table: &str) -> usize {
            self.writes.lock().unwrap().get(table).copied().unwrap_or(0)
        }

        pub fn rows(&self, table: &str) -> Vec<Row> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }

        fn touch(
            &self,
            table: &str,
            counter: &Mutex<HashMap<String, usize>>,
        ) -> Result<(), StoreError> {
            *counter.lock().unwrap().entry(table.to_string()).or_default() += 1;
            if self.failing.lock().unwrap().contains(table) {
                return Err(StoreError::Unavailable(table.to_string()));
            }
            Ok(())
        }
    }

    fn normalize(v: &JsonValue) -> JsonValue {
        match v {
            JsonValue::Bool(b) => JsonValue::from(i64::from(*b)),
            other => other.clone(),
        }
    }

    fn compare(a: &JsonValue, b: &JsonValue) -> Ordering {
        match (normalize(a), normalize(b)) {
            (JsonValue::Null, JsonValue::Null) => Ordering::Equal,
            (JsonValue::Null, _) => Ordering::Less,
            (_, JsonValue::Null) => Ordering::Greater,
            (JsonValue::Number(x), JsonValue::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (JsonValue::String(x), JsonValue::String(y)) => x.cmp(&y),
            (x, y) => x.to_string().cmp(&y.to_string()),
        }
    }

    fn matches(row: &Row, filter: &Filter) -> bool {
        let cell = row.get(filter.column()).unwrap_or(&JsonValue::Null);
        match filter {
            Filter::Eq(_, v) => !cell.is_null() && compare(cell, v) == Ordering::Equal,
            Filter::In(_, list) => list
                .iter()
                .any(|v| !cell.is_null() && compare(cell, v) == Ordering::Equal),
            Filter::NotNull(_) => !cell.is_null(),
        }
    }

    impl RecordStore for MemoryStore {
        fn select(&self, query: &Select) -> Result<Vec<Row>, StoreError> {
            self.touch(query.table, &self.reads)?;
            let mut rows: Vec<Row> = self
                .rows(query.table)
                .into_iter()
                .filter(|r| query.filters.iter().all(|f| matches(r, f)))
                .collect();
            if let Some(order) = query.order {
                rows.sort_by(|a, b| {
                    let ord = compare(
                        a.get(order.column).unwrap_or(&JsonValue::Null),
                        b.get(order.column).unwrap_or(&JsonValue::Null),
                    );
                    if order.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
            if let Some((from, to)) = query.range {
                rows = rows
                    .into_iter()
                    .skip(from)
                    .take((to + 1).saturating_sub(from))
                    .collect();
            }
            if !query.columns.is_empty() {
                for r in rows.iter_mut() {
                    r.retain(|k, _| query.columns.contains(&k.as_str()));
                }
            }
            Ok(rows)
        }

        fn count(&self, table: &'static str, filters: &[Filter]) -> Result<u64, StoreError> {
            self.touch(table, &self.reads)?;
            Ok(self
                .rows(table)
                .iter()
                .filter(|r| filters.iter().all(|f| matches(r, f)))
                .count() as u64)
        }

        fn upsert(
            &self,
            table: &'static str,
            key_column: &'static str,
            key: &str,
            fields: &Row,
        ) -> Result<(), StoreError> {
            self.touch(table, &self.writes)?;
            let mut tables = self.tables.lock().unwrap();
            let rows = tables.entry(table.to_string()).or_default();
            let existing = rows
                .iter_mut()
                .find(|r| r.get(key_column).and_then(|v| v.as_str()) == Some(key));
            match existing {
                Some(row) => {
                    for (k, v) in fields {
                        row.insert(k.clone(), v.clone());
                    }
                }
                None => {
                    let mut row = fields.clone();
                    row.insert(key_column.to_string(), JsonValue::from(key));
                    rows.push(row);
                }
            }
            Ok(())
        }
    }
}

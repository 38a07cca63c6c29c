//! PostgreSQL dialect: native `hstore` payloads.

use std::collections::HashMap;

use postgres::types::ToSql;
use postgres::Client;
use serde_json::Value;

use super::{check_table_name, to_sql_count, Dialect};
use crate::error::{Error, Result};
use crate::filter::{Filter, Predicate, Select};
use crate::row::RowData;

/// Wire form of an `hstore` value.
type Hstore = HashMap<String, Option<String>>;

/// [`Dialect`] over a borrowed PostgreSQL client.
pub struct PostgresDialect<'c> {
    client: &'c mut Client,
}

impl<'c> PostgresDialect<'c> {
    pub fn new(client: &'c mut Client) -> Self {
        Self { client }
    }
}

/// Positional parameters collected while building a statement.
#[derive(Default)]
struct Params {
    values: Vec<Box<dyn ToSql + Sync>>,
}

impl Params {
    /// Stores `value` and returns its placeholder.
    fn push<T: ToSql + Sync + 'static>(&mut self, value: T) -> String {
        self.values.push(Box::new(value));
        format!("${}", self.values.len())
    }

    fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.values.iter().map(|p| &**p).collect()
    }
}

fn where_clause(select: &Select<'_>, params: &mut Params) -> String {
    let mut clauses = Vec::new();
    for (key, predicate) in select.terms() {
        let key = params.push(key.to_string());
        let clause = match predicate {
            Predicate::Equals(value) => {
                format!("data -> {key}::text = {}::text", params.push(value.clone()))
            }
            Predicate::Matches(pattern) => {
                format!("data -> {key}::text ~ {}::text", params.push(pattern.clone()))
            }
        };
        clauses.push(clause);
    }
    if let Some(after) = select.after_id {
        clauses.push(format!("id > {}", params.push(after)));
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn select_sql(name: &str, select: &Select<'_>, params: &mut Params) -> String {
    let mut sql = format!("SELECT id, data FROM {name}");
    sql.push_str(&where_clause(select, params));

    sql.push_str(" ORDER BY ");
    if let Some(key) = select.order_by {
        let key = params.push(key.to_string());
        sql.push_str(&format!("COALESCE(data -> {key}::text, '') COLLATE \"C\", "));
    }
    sql.push_str("id");

    if let Some(limit) = select.limit {
        sql.push_str(&format!(" LIMIT {}", params.push(to_sql_count(limit))));
    }
    if select.offset > 0 {
        sql.push_str(&format!(" OFFSET {}", params.push(to_sql_count(select.offset))));
    }
    sql
}

/// `hstore` values are text; other scalars are stored in their JSON text form.
fn encode(data: &RowData) -> Hstore {
    data.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            };
            (key.clone(), value)
        })
        .collect()
}

fn decode(hstore: Hstore) -> RowData {
    hstore
        .into_iter()
        .map(|(key, value)| (key, value.map_or(Value::Null, Value::String)))
        .collect()
}

/// True for the server's `relation "x" does not exist` message.
pub(crate) fn is_missing_relation(message: &str) -> bool {
    message.starts_with("relation \"") && message.ends_with("\" does not exist")
}

/// Maps "relation does not exist" failures to [`Error::MissingTable`].
pub(crate) fn translate_error(name: &str, err: postgres::Error) -> Error {
    match err.as_db_error() {
        Some(db) if is_missing_relation(db.message()) => Error::MissingTable(name.to_string()),
        _ => Error::Postgres(err),
    }
}

impl Dialect for PostgresDialect<'_> {
    fn create_table(&mut self, name: &str) -> Result<()> {
        check_table_name(name)?;
        self.client
            .batch_execute(&format!(
                "CREATE EXTENSION IF NOT EXISTS hstore;
                 CREATE TABLE IF NOT EXISTS {name} (
                    id BIGSERIAL PRIMARY KEY,
                    data HSTORE
                 )"
            ))
            .map_err(|e| translate_error(name, e))
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        check_table_name(name)?;
        self.client
            .batch_execute(&format!("DROP TABLE IF EXISTS {name}"))
            .map_err(|e| translate_error(name, e))
    }

    fn insert(&mut self, name: &str, data: &RowData) -> Result<i64> {
        check_table_name(name)?;
        let payload = encode(data);
        self.client
            .execute(&format!("INSERT INTO {name} (data) VALUES ($1)"), &[&payload])
            .map_err(|e| translate_error(name, e))?;

        // currval is per connection.
        let sequence = format!("{name}_id_seq");
        let row = self
            .client
            .query_one("SELECT currval($1::text::regclass)", &[&sequence])
            .map_err(|e| translate_error(name, e))?;
        Ok(row.get(0))
    }

    fn select_by_id(&mut self, name: &str, id: i64) -> Result<Option<RowData>> {
        check_table_name(name)?;
        let row = self
            .client
            .query_opt(&format!("SELECT data FROM {name} WHERE id = $1"), &[&id])
            .map_err(|e| translate_error(name, e))?;
        Ok(row.map(|row| decode(row.get(0))))
    }

    fn select(&mut self, name: &str, select: &Select<'_>) -> Result<Vec<(i64, RowData)>> {
        check_table_name(name)?;
        let mut params = Params::default();
        let sql = select_sql(name, select, &mut params);
        tracing::trace!(table = name, sql = %sql, "postgres select");

        let rows = self
            .client
            .query(&sql, &params.as_refs())
            .map_err(|e| translate_error(name, e))?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get(0), decode(row.get(1))))
            .collect())
    }

    fn count(&mut self, name: &str, filter: &Filter) -> Result<u64> {
        check_table_name(name)?;
        let mut params = Params::default();
        let select = Select {
            filter: Some(filter),
            ..Select::default()
        };
        let sql = format!(
            "SELECT COUNT(*) FROM {name}{}",
            where_clause(&select, &mut params)
        );
        tracing::trace!(table = name, sql = %sql, "postgres count");

        let row = self
            .client
            .query_one(&sql, &params.as_refs())
            .map_err(|e| translate_error(name, e))?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    fn update(&mut self, name: &str, id: i64, data: &RowData) -> Result<()> {
        check_table_name(name)?;
        let payload = encode(data);
        self.client
            .execute(
                &format!("UPDATE {name} SET data = $1 WHERE id = $2"),
                &[&payload, &id],
            )
            .map_err(|e| translate_error(name, e))?;
        Ok(())
    }

    fn delete(&mut self, name: &str, id: i64) -> Result<()> {
        check_table_name(name)?;
        self.client
            .execute(&format!("DELETE FROM {name} WHERE id = $1"), &[&id])
            .map_err(|e| translate_error(name, e))?;
        Ok(())
    }
}

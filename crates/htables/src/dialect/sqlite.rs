//! SQLite dialect: JSON text payloads, `json_each` predicates.

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSql, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};

use super::{check_table_name, to_sql_count, Dialect};
use crate::error::{Error, Result};
use crate::filter::{Filter, Predicate, Select};
use crate::row::RowData;

/// Registers the `regexp` SQL function used by `X REGEXP Y` predicates.
///
/// The compiled pattern is cached per statement through SQLite auxiliary
/// data, so a scan compiles each pattern once.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex = ctx.get_or_create_aux(0, |vr| -> Result<_, BoxError> {
                Ok(Regex::new(vr.as_str()?)?)
            })?;
            // Non-text values (numbers, NULL) never match.
            let matched = match ctx.get_raw(1) {
                ValueRef::Text(text) => {
                    std::str::from_utf8(text).is_ok_and(|text| regex.is_match(text))
                }
                _ => false,
            };
            Ok(matched)
        },
    )
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// [`Dialect`] over a borrowed SQLite connection.
pub struct SqliteDialect<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteDialect<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

/// Positional parameters collected while building a statement.
#[derive(Default)]
struct Params {
    values: Vec<Box<dyn ToSql>>,
}

impl Params {
    /// Stores `value` and returns its placeholder.
    fn push<T: ToSql + 'static>(&mut self, value: T) -> String {
        self.values.push(Box::new(value));
        format!("?{}", self.values.len())
    }

    fn as_refs(&self) -> Vec<&dyn ToSql> {
        self.values.iter().map(|p| &**p).collect()
    }
}

/// Text form of a `json_each` value: strings as-is, other scalars and
/// containers as their JSON text, `null` as SQL NULL. Matches how the
/// PostgreSQL dialect stores values in `hstore`.
const TEXT_VALUE: &str =
    "CASE type WHEN 'true' THEN 'true' WHEN 'false' THEN 'false' ELSE CAST(value AS TEXT) END";

fn where_clause(select: &Select<'_>, params: &mut Params) -> String {
    let mut clauses = Vec::new();
    for (key, predicate) in select.terms() {
        let key = params.push(key.to_string());
        let test = match predicate {
            Predicate::Equals(value) => format!("{TEXT_VALUE} = {}", params.push(value.clone())),
            Predicate::Matches(pattern) => {
                format!("{TEXT_VALUE} REGEXP {}", params.push(pattern.clone()))
            }
        };
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(t.data) WHERE key = {key} AND {test})"
        ));
    }
    if let Some(after) = select.after_id {
        clauses.push(format!("t.id > {}", params.push(after)));
    }
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn select_sql(name: &str, select: &Select<'_>, params: &mut Params) -> String {
    let mut sql = format!("SELECT t.id, t.data FROM {name} AS t");
    sql.push_str(&where_clause(select, params));

    sql.push_str(" ORDER BY ");
    if let Some(key) = select.order_by {
        let key = params.push(key.to_string());
        sql.push_str(&format!(
            "COALESCE((SELECT {TEXT_VALUE} FROM json_each(t.data) WHERE key = {key}), '') COLLATE BINARY, "
        ));
    }
    sql.push_str("t.id");

    if select.limit.is_some() || select.offset > 0 {
        let limit = select.limit.map(to_sql_count).unwrap_or(-1);
        let limit = params.push(limit);
        let offset = params.push(to_sql_count(select.offset));
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    }
    sql
}

fn encode(data: &RowData) -> Result<String> {
    Ok(serde_json::to_string(data)?)
}

fn decode(raw: &str) -> Result<RowData> {
    Ok(serde_json::from_str(raw)?)
}

/// Maps "no such table" failures to [`Error::MissingTable`].
pub(crate) fn translate_error(name: &str, err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(_, Some(message)) if message.starts_with("no such table: ") => {
            Error::MissingTable(name.to_string())
        }
        _ => Error::Sqlite(err),
    }
}

impl Dialect for SqliteDialect<'_> {
    fn create_table(&mut self, name: &str) -> Result<()> {
        check_table_name(name)?;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    data BLOB
                )"
            ))
            .map_err(|e| translate_error(name, e))
    }

    fn drop_table(&mut self, name: &str) -> Result<()> {
        check_table_name(name)?;
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {name}"))
            .map_err(|e| translate_error(name, e))
    }

    fn insert(&mut self, name: &str, data: &RowData) -> Result<i64> {
        check_table_name(name)?;
        let payload = encode(data)?;
        self.conn
            .execute(&format!("INSERT INTO {name} (data) VALUES (?1)"), params![payload])
            .map_err(|e| translate_error(name, e))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn select_by_id(&mut self, name: &str, id: i64) -> Result<Option<RowData>> {
        check_table_name(name)?;
        let raw: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT data FROM {name} WHERE id = ?1"),
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| translate_error(name, e))?;
        raw.as_deref().map(decode).transpose()
    }

    fn select(&mut self, name: &str, select: &Select<'_>) -> Result<Vec<(i64, RowData)>> {
        check_table_name(name)?;
        let mut params = Params::default();
        let sql = select_sql(name, select, &mut params);
        tracing::trace!(table = name, sql = %sql, "sqlite select");

        let refs = params.as_refs();
        let mut stmt = self.conn.prepare(&sql).map_err(|e| translate_error(name, e))?;
        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| translate_error(name, e))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, raw) = row.map_err(|e| translate_error(name, e))?;
            out.push((id, decode(&raw)?));
        }
        Ok(out)
    }

    fn count(&mut self, name: &str, filter: &Filter) -> Result<u64> {
        check_table_name(name)?;
        let mut params = Params::default();
        let select = Select {
            filter: Some(filter),
            ..Select::default()
        };
        let sql = format!(
            "SELECT COUNT(*) FROM {name} AS t{}",
            where_clause(&select, &mut params)
        );
        tracing::trace!(table = name, sql = %sql, "sqlite count");

        let refs = params.as_refs();
        let count: i64 = self
            .conn
            .query_row(&sql, refs.as_slice(), |row| row.get(0))
            .map_err(|e| translate_error(name, e))?;
        Ok(count.max(0) as u64)
    }

    fn update(&mut self, name: &str, id: i64, data: &RowData) -> Result<()> {
        check_table_name(name)?;
        let payload = encode(data)?;
        self.conn
            .execute(
                &format!("UPDATE {name} SET data = ?1 WHERE id = ?2"),
                params![payload, id],
            )
            .map_err(|e| translate_error(name, e))?;
        Ok(())
    }

    fn delete(&mut self, name: &str, id: i64) -> Result<()> {
        check_table_name(name)?;
        self.conn
            .execute(&format!("DELETE FROM {name} WHERE id = ?1"), params![id])
            .map_err(|e| translate_error(name, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::op;

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        register_functions(&conn).expect("should register functions");
        conn
    }

    fn data(pairs: &[(&str, &str)]) -> RowData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    #[test]
    fn payload_is_stored_as_json_text() {
        let conn = test_db();
        let mut dialect = SqliteDialect::new(&conn);
        dialect.create_table("person").expect("create should succeed");
        let id = dialect
            .insert("person", &data(&[("hello", "world")]))
            .expect("insert should succeed");
        assert_eq!(id, 1);

        let stored: String = conn
            .query_row("SELECT data FROM person WHERE id = 1", [], |row| row.get(0))
            .expect("should read raw payload");
        let parsed: serde_json::Value = serde_json::from_str(&stored).expect("payload is JSON");
        assert_eq!(parsed, serde_json::json!({"hello": "world"}));
    }

    #[test]
    fn missing_table_is_normalized() {
        let conn = test_db();
        let mut dialect = SqliteDialect::new(&conn);
        let err = dialect
            .insert("foo", &RowData::new())
            .expect_err("insert into missing table should fail");
        assert!(matches!(err, Error::MissingTable(ref name) if name == "foo"));

        let err = dialect
            .select("foo", &Select::default())
            .expect_err("select from missing table should fail");
        assert!(matches!(err, Error::MissingTable(_)));
    }

    #[test]
    fn other_errors_pass_through() {
        let conn = test_db();
        let err = conn
            .execute_batch("SELEC nonsense")
            .expect_err("syntax error expected");
        assert!(matches!(translate_error("person", err), Error::Sqlite(_)));
    }

    #[test]
    fn create_and_drop_are_idempotent() {
        let conn = test_db();
        let mut dialect = SqliteDialect::new(&conn);
        dialect.create_table("person").expect("first create");
        dialect.create_table("person").expect("second create");
        dialect.drop_table("person").expect("first drop");
        dialect.drop_table("person").expect("second drop");
    }

    #[test]
    fn regex_predicate_uses_registered_function() {
        let conn = test_db();
        let mut dialect = SqliteDialect::new(&conn);
        dialect.create_table("person").expect("create should succeed");
        for parity in ["apple", "apples", "pear"] {
            dialect
                .insert("person", &data(&[("parity", parity)]))
                .expect("insert should succeed");
        }

        let filter = Filter::from([("parity", op::re("le$"))]);
        assert_eq!(dialect.count("person", &filter).expect("count"), 1);

        let filter = Filter::from([("parity", op::re("^ap"))]);
        assert_eq!(dialect.count("person", &filter).expect("count"), 2);
    }

    #[test]
    fn keyset_cursor_skips_earlier_ids() {
        let conn = test_db();
        let mut dialect = SqliteDialect::new(&conn);
        dialect.create_table("person").expect("create should succeed");
        for n in 0..5 {
            dialect
                .insert("person", &data(&[("n", &n.to_string())]))
                .expect("insert should succeed");
        }

        let page = dialect
            .select(
                "person",
                &Select {
                    after_id: Some(2),
                    limit: Some(2),
                    ..Select::default()
                },
            )
            .expect("select should succeed");
        let ids: Vec<i64> = page.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![3, 4]);
    }
}

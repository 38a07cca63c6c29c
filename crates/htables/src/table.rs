//! Tables: CRUD and filtered queries over one relation.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::filter::{Filter, Select};
use crate::row::{check_strings, row_data, Row, RowData};
use crate::schema::TableShape;
use crate::session::Session;

/// A short-lived view of one relation through a [`Session`].
///
/// Tables own nothing persistent; [`Session::table`] builds a fresh one on
/// every lookup.
#[derive(Clone)]
pub struct Table<'s> {
    session: &'s Session,
    shape: Rc<TableShape>,
}

impl fmt::Debug for Table<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("shape", &self.shape).finish()
    }
}

impl<'s> Table<'s> {
    pub(crate) fn bind(session: &'s Session, shape: Rc<TableShape>) -> Self {
        Self { session, shape }
    }

    /// Physical relation name.
    pub fn name(&self) -> &str {
        &self.shape.name
    }

    pub fn shape(&self) -> &TableShape {
        &self.shape
    }

    pub fn session(&self) -> &'s Session {
        self.session
    }

    fn dialect<T>(&self, f: impl FnOnce(&mut dyn Dialect, &str) -> Result<T>) -> Result<T> {
        let name = self.name();
        self.session.with_dialect(|dialect| f(dialect, name))
    }

    /// Creates the relation unless it already exists.
    pub fn create_table(&self) -> Result<()> {
        self.dialect(|d, name| d.create_table(name))?;
        tracing::debug!(table = self.name(), "table created");
        Ok(())
    }

    /// Drops the relation if it exists.
    pub fn drop_table(&self) -> Result<()> {
        self.dialect(|d, name| d.drop_table(name))?;
        tracing::debug!(table = self.name(), "table dropped");
        Ok(())
    }

    /// Inserts a new row built from `data` and returns it with its id.
    ///
    /// The row is visible to later reads in this session immediately and
    /// becomes durable when the session commits.
    pub fn new<I, K, V>(&self, data: I) -> Result<Row<'s>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = Row::new(self.clone(), None, row_data(data));
        self.save(&mut row)?;
        Ok(row)
    }

    /// Fetches the row with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowNotFound`] when no row has that id.
    pub fn get(&self, id: i64) -> Result<Row<'s>> {
        match self.dialect(|d, name| d.select_by_id(name, id))? {
            Some(data) => Ok(Row::new(self.clone(), Some(id), data)),
            None => Err(Error::RowNotFound {
                table: self.name().to_string(),
                id: Some(id),
            }),
        }
    }

    /// Inserts `row` if it has no id yet, otherwise updates it in place.
    ///
    /// # Errors
    ///
    /// In debug mode, returns [`Error::InvalidRowData`] if a value is not a
    /// string.
    pub fn save(&self, row: &mut Row<'s>) -> Result<()> {
        if self.session.debug() {
            check_strings(row.data())?;
        }
        match row.id() {
            None => {
                let id = self.dialect(|d, name| d.insert(name, row.data()))?;
                row.assign_id(id);
                tracing::debug!(table = self.name(), id, "row inserted");
            }
            Some(id) => {
                self.dialect(|d, name| d.update(name, id, row.data()))?;
                tracing::debug!(table = self.name(), id, "row updated");
            }
        }
        Ok(())
    }

    /// Deletes the row with `id`. Deleting a missing id is a no-op.
    pub fn delete(&self, id: i64) -> Result<()> {
        self.dialect(|d, name| d.delete(name, id))?;
        tracing::debug!(table = self.name(), id, "row deleted");
        Ok(())
    }

    /// Lazily yields every row matching `filter`, in id order.
    ///
    /// Rows are fetched a page at a time. Iterating again issues a new scan
    /// against the table's current contents.
    pub fn find(&self, filter: impl Into<Filter>) -> Rows<'s> {
        Rows {
            table: self.clone(),
            filter: filter.into(),
            after_id: None,
            page: Vec::new().into_iter(),
            exhausted: false,
        }
    }

    /// First row matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowNotFound`] when nothing matches.
    pub fn find_first(&self, filter: impl Into<Filter>) -> Result<Row<'s>> {
        self.query()
            .filter(filter)
            .limit(1)
            .fetch()?
            .into_iter()
            .next()
            .ok_or_else(|| self.not_found())
    }

    /// The only row matching `filter`.
    ///
    /// At most two rows are fetched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RowNotFound`] when nothing matches and
    /// [`Error::MultipleRowsFound`] when more than one row does.
    pub fn find_single(&self, filter: impl Into<Filter>) -> Result<Row<'s>> {
        let mut matches = self.query().filter(filter).limit(2).fetch()?.into_iter();
        match (matches.next(), matches.next()) {
            (Some(row), None) => Ok(row),
            (None, _) => Err(self.not_found()),
            (Some(_), Some(_)) => Err(Error::MultipleRowsFound {
                table: self.name().to_string(),
            }),
        }
    }

    /// Starts a query combining filtering, ordering and pagination.
    pub fn query(&self) -> Query<'s> {
        Query {
            table: self.clone(),
            filter: Filter::all(),
            order_by: None,
            limit: None,
            offset: 0,
        }
    }

    fn not_found(&self) -> Error {
        Error::RowNotFound {
            table: self.name().to_string(),
            id: None,
        }
    }
}

/// Iterator returned by [`Table::find`].
///
/// Pages are fetched with a keyset cursor on `id`, so rows inserted behind
/// the cursor are not revisited. After an error the iterator is exhausted.
pub struct Rows<'s> {
    table: Table<'s>,
    filter: Filter,
    after_id: Option<i64>,
    page: std::vec::IntoIter<(i64, RowData)>,
    exhausted: bool,
}

impl<'s> Rows<'s> {
    fn fetch_page(&mut self) -> Result<Vec<(i64, RowData)>> {
        let page_size = self.table.session.scan_page_size();
        let select = Select {
            filter: Some(&self.filter),
            after_id: self.after_id,
            limit: Some(u64::from(page_size)),
            ..Select::default()
        };
        let rows = self.table.dialect(|d, name| d.select(name, &select))?;
        if rows.len() < page_size as usize {
            self.exhausted = true;
        }
        Ok(rows)
    }
}

impl<'s> Iterator for Rows<'s> {
    type Item = Result<Row<'s>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((id, data)) = self.page.next() {
                self.after_id = Some(id);
                return Some(Ok(Row::new(self.table.clone(), Some(id), data)));
            }
            if self.exhausted {
                return None;
            }
            match self.fetch_page() {
                Ok(rows) if rows.is_empty() => {
                    self.exhausted = true;
                    return None;
                }
                Ok(rows) => self.page = rows.into_iter(),
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Builder returned by [`Table::query`].
///
/// Filtering happens first, then ordering, then `offset` and `limit`.
#[derive(Debug, Clone)]
pub struct Query<'s> {
    table: Table<'s>,
    filter: Filter,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: u64,
}

impl<'s> Query<'s> {
    /// Keeps only rows matching `filter`.
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sorts ascending by the string value of `key`; rows without the key
    /// sort as if it held the empty string. Ties keep id order.
    pub fn order_by(mut self, key: impl Into<String>) -> Self {
        self.order_by = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Runs the query and returns the selected rows.
    pub fn fetch(self) -> Result<Vec<Row<'s>>> {
        let select = Select {
            filter: Some(&self.filter),
            order_by: self.order_by.as_deref(),
            after_id: None,
            limit: self.limit,
            offset: self.offset,
        };
        let rows = self.table.dialect(|d, name| d.select(name, &select))?;
        Ok(rows
            .into_iter()
            .map(|(id, data)| Row::new(self.table.clone(), Some(id), data))
            .collect())
    }

    /// Counts rows matching the filter without fetching them.
    ///
    /// Ordering, `offset` and `limit` do not affect the count.
    pub fn count(self) -> Result<u64> {
        self.table.dialect(|d, name| d.count(name, &self.filter))
    }
}

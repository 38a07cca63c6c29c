//! Stored rows.

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::table::Table;

/// Payload of a row: string keys to JSON values, ordered by key.
pub type RowData = serde_json::Map<String, Value>;

/// One stored mapping plus its identity.
///
/// A row remembers the [`Table`] it came from, so it can be saved or deleted
/// without naming the table again. Dereferences to its [`RowData`].
#[derive(Clone)]
pub struct Row<'s> {
    id: Option<i64>,
    data: RowData,
    table: Table<'s>,
}

impl<'s> Row<'s> {
    pub(crate) fn new(table: Table<'s>, id: Option<i64>, data: RowData) -> Self {
        Self { id, data, table }
    }

    /// Identity assigned on first save; `None` before that.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Ids are write-once.
    pub(crate) fn assign_id(&mut self, id: i64) {
        debug_assert!(self.id.is_none(), "row id is already assigned");
        self.id = Some(id);
    }

    pub fn data(&self) -> &RowData {
        &self.data
    }

    pub fn into_data(self) -> RowData {
        self.data
    }

    /// The table this row belongs to.
    pub fn table(&self) -> &Table<'s> {
        &self.table
    }

    /// Inserts or updates this row through its table.
    pub fn save(&mut self) -> Result<()> {
        let table = self.table.clone();
        table.save(self)
    }

    /// Deletes this row through its table. Unsaved rows have nothing to delete.
    pub fn delete(&self) -> Result<()> {
        match self.id {
            Some(id) => self.table.delete(id),
            None => Ok(()),
        }
    }
}

impl Deref for Row<'_> {
    type Target = RowData;

    fn deref(&self) -> &RowData {
        &self.data
    }
}

impl DerefMut for Row<'_> {
    fn deref_mut(&mut self) -> &mut RowData {
        &mut self.data
    }
}

impl PartialEq for Row<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.data == other.data
    }
}

impl PartialEq<RowData> for Row<'_> {
    fn eq(&self, other: &RowData) -> bool {
        &self.data == other
    }
}

impl fmt::Debug for Row<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Row")
            .field("table", &self.table.name())
            .field("id", &self.id)
            .field("data", &self.data)
            .finish()
    }
}

/// Builds [`RowData`] from key/value pairs.
pub fn row_data<I, K, V>(pairs: I) -> RowData
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// Debug-mode invariant: every value is a string.
pub(crate) fn check_strings(data: &RowData) -> Result<()> {
    match data.iter().find(|(_, value)| !value.is_string()) {
        Some((key, _)) => Err(Error::InvalidRowData { key: key.clone() }),
        None => Ok(()),
    }
}

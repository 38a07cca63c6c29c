//! Optional pre-registration of tables.
//!
//! A schema maps logical table names to the physical relations that store
//! them. Names that were never declared still work: they resolve to an
//! ad-hoc shape whose relation carries the same name.

use std::collections::BTreeMap;

/// Where rows of one logical table live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableShape {
    /// Physical relation name.
    pub name: String,
    /// Whether the shape came from [`Schema::define_table`].
    pub declared: bool,
}

impl TableShape {
    /// Shape synthesized for an undeclared name.
    pub fn ad_hoc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            declared: false,
        }
    }
}

/// Declared tables, immutable once handed to a database.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: BTreeMap<String, TableShape>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `logical` as stored in relation `physical`.
    pub fn define_table(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.tables.insert(
            logical.into(),
            TableShape {
                name: physical.into(),
                declared: true,
            },
        );
        self
    }

    /// Resolves a logical name, falling back to an ad-hoc shape.
    pub fn shape(&self, logical: &str) -> TableShape {
        self.tables
            .get(logical)
            .cloned()
            .unwrap_or_else(|| TableShape::ad_hoc(logical))
    }

    /// Declared shapes, in logical-name order.
    pub fn declared(&self) -> impl Iterator<Item = &TableShape> {
        self.tables.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_names_map_to_physical_relations() {
        let schema = Schema::new().define_table("Person", "person");
        assert_eq!(
            schema.shape("Person"),
            TableShape {
                name: "person".to_string(),
                declared: true,
            }
        );
    }

    #[test]
    fn undeclared_names_fall_back_to_themselves() {
        let schema = Schema::new().define_table("Person", "person");
        assert_eq!(schema.shape("order_line"), TableShape::ad_hoc("order_line"));
        assert_eq!(schema.declared().count(), 1);
    }
}

use serde::{Deserialize, Serialize};

use crate::constraints::{ForeignKey, PrimaryKey};
use crate::types::ColumnKind;

/// Table catalog of one store, as seen by the synchronizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    /// Engine identifier (`postgres` or `sqlite`).
    pub engine: String,
    /// Namespace the tables were read from, when the engine has one.
    pub namespace: Option<String>,
    /// Base tables, sorted by name.
    pub tables: Vec<Table>,
}

impl DatabaseSchema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|table| table.name.clone()).collect()
    }

    /// Keep only the tables accepted by `keep`.
    pub fn retain_tables<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Table) -> bool,
    {
        self.tables.retain(|table| keep(table));
    }
}

/// A base table with the metadata needed to copy its rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Columns that accept explicit values on insert.
    pub fn writable_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|column| !column.is_generated)
    }

    /// The primary key column when the key is a single column.
    pub fn single_primary_key(&self) -> Option<&Column> {
        let pk = self.primary_key.as_ref()?;
        match pk.columns.as_slice() {
            [only] => self.column(only),
            _ => None,
        }
    }

    pub fn primary_key_columns(&self) -> Vec<String> {
        self.primary_key
            .as_ref()
            .map(|pk| pk.columns.clone())
            .unwrap_or_default()
    }
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub ordinal_position: i64,
    pub name: String,
    pub kind: ColumnKind,
    /// Engine type name used for casts on insert (e.g. `character varying`).
    pub native_type: String,
    pub is_nullable: bool,
    /// Values come from a store-managed counter (serial, identity, rowid).
    pub is_auto_increment: bool,
    /// `GENERATED ALWAYS AS IDENTITY`; explicit values need an override.
    pub is_identity_always: bool,
    /// Computed column; never exported nor inserted.
    pub is_generated: bool,
}

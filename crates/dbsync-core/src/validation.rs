use std::collections::{BTreeMap, BTreeSet};

use crate::error::InvalidSchema;
use crate::schema::DatabaseSchema;

/// Validate internal consistency of a table catalog.
///
/// This checks:
/// - duplicate tables/columns
/// - primary key columns exist
/// - foreign key columns and referenced targets exist
pub fn validate_schema(schema: &DatabaseSchema) -> Result<(), InvalidSchema> {
    let mut catalog: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for table in &schema.tables {
        if catalog.contains_key(table.name.as_str()) {
            return Err(InvalidSchema(format!("duplicate table name: {}", table.name)));
        }

        let mut columns = BTreeSet::new();
        for column in &table.columns {
            if !columns.insert(column.name.as_str()) {
                return Err(InvalidSchema(format!(
                    "duplicate column name: {}.{}",
                    table.name, column.name
                )));
            }
        }

        catalog.insert(table.name.as_str(), columns);
    }

    for table in &schema.tables {
        let columns = &catalog[table.name.as_str()];

        if let Some(pk) = &table.primary_key {
            for column in &pk.columns {
                if !columns.contains(column.as_str()) {
                    return Err(InvalidSchema(format!(
                        "primary key column not found: {}.{}",
                        table.name, column
                    )));
                }
            }
        }

        for fk in &table.foreign_keys {
            for column in &fk.columns {
                if !columns.contains(column.as_str()) {
                    return Err(InvalidSchema(format!(
                        "foreign key column not found: {}.{}",
                        table.name, column
                    )));
                }
            }

            let ref_columns = catalog.get(fk.referenced_table.as_str()).ok_or_else(|| {
                InvalidSchema(format!(
                    "referenced table not found: {} (from {})",
                    fk.referenced_table, table.name
                ))
            })?;

            for column in &fk.referenced_columns {
                if !ref_columns.contains(column.as_str()) {
                    return Err(InvalidSchema(format!(
                        "referenced column not found: {}.{}",
                        fk.referenced_table, column
                    )));
                }
            }
        }
    }

    Ok(())
}

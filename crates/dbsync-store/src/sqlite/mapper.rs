use std::collections::BTreeMap;

use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, TypeInfo, ValueRef};

use dbsync_core::value::{
    format_date, format_naive_utc, format_time, parse_date, parse_loose_timestamp, parse_time,
};
use dbsync_core::{Column, ColumnKind, ForeignKey, PrimaryKey, Record, Table, Value};

use crate::error::StoreError;

use super::queries::{RawColumn, RawForeignKey, RawTable};

pub fn map_table(raw: &RawTable, columns: Vec<RawColumn>) -> Table {
    let mut pk_columns: Vec<&RawColumn> = columns.iter().filter(|column| column.pk > 0).collect();
    pk_columns.sort_by_key(|column| column.pk);

    let primary_key = (!pk_columns.is_empty()).then(|| PrimaryKey {
        name: None,
        columns: pk_columns.iter().map(|column| column.name.clone()).collect(),
    });

    // A lone INTEGER PRIMARY KEY aliases the rowid and is assigned by SQLite.
    let rowid_alias = match pk_columns.as_slice() {
        [only] if only.declared_type.eq_ignore_ascii_case("integer") => Some(only.name.clone()),
        _ => None,
    };

    let columns = columns
        .into_iter()
        .filter(|column| column.hidden != 1)
        .map(|column| Column {
            ordinal_position: column.cid + 1,
            kind: ColumnKind::from_sqlite(&column.declared_type),
            is_auto_increment: rowid_alias.as_deref() == Some(column.name.as_str()),
            is_nullable: !column.not_null,
            is_identity_always: false,
            is_generated: column.hidden >= 2,
            native_type: column.declared_type,
            name: column.name,
        })
        .collect();

    Table {
        name: raw.name.clone(),
        columns,
        primary_key,
        foreign_keys: Vec::new(),
    }
}

/// Group `PRAGMA foreign_key_list` rows into keys. Implicit targets resolve
/// to the parent's primary key columns.
pub fn map_foreign_keys(raw: Vec<RawForeignKey>, tables: &[Table]) -> Vec<ForeignKey> {
    let mut grouped: BTreeMap<i64, Vec<RawForeignKey>> = BTreeMap::new();
    for row in raw {
        grouped.entry(row.id).or_default().push(row);
    }

    grouped
        .into_values()
        .filter_map(|mut rows| {
            rows.sort_by_key(|row| row.seq);
            let referenced_table = rows.first()?.referenced_table.clone();
            let columns = rows.iter().map(|row| row.from.clone()).collect();
            let referenced_columns = if rows.iter().all(|row| row.to.is_some()) {
                rows.iter().filter_map(|row| row.to.clone()).collect()
            } else {
                tables
                    .iter()
                    .find(|table| table.name == referenced_table)
                    .map(Table::primary_key_columns)
                    .unwrap_or_default()
            };
            Some(ForeignKey {
                name: None,
                columns,
                referenced_table,
                referenced_columns,
            })
        })
        .collect()
}

pub fn is_without_rowid(create_sql: &str) -> bool {
    create_sql
        .to_ascii_uppercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .windows(2)
        .any(|pair| pair[0] == "WITHOUT" && pair[1].starts_with("ROWID"))
}

/// Decode a row by each value's storage class, refined by the column kind.
///
/// SQLite columns may hold any storage class regardless of their declared
/// type, so the declared type only steers how text and integers are read.
pub fn decode_row(row: &SqliteRow, columns: &[Column]) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_string();
            match storage.as_str() {
                "INTEGER" => decode_integer(column.kind, row.try_get_unchecked::<i64, _>(index)?),
                "REAL" => decode_real(column.kind, row.try_get_unchecked::<f64, _>(index)?),
                "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?),
                _ => decode_text(column.kind, row.try_get_unchecked::<String, _>(index)?),
            }
        };
        record.insert(column.name.clone(), value);
    }
    Ok(record)
}

fn decode_integer(kind: ColumnKind, value: i64) -> Value {
    match kind {
        ColumnKind::Boolean => Value::Bool(value != 0),
        ColumnKind::Float => Value::Float(value as f64),
        ColumnKind::Decimal => Value::Decimal(value.to_string()),
        _ => Value::Int(value),
    }
}

fn decode_real(kind: ColumnKind, value: f64) -> Value {
    match kind {
        ColumnKind::Decimal if value.is_finite() => Value::Decimal(value.to_string()),
        _ => Value::Float(value),
    }
}

fn decode_text(kind: ColumnKind, text: String) -> Value {
    match kind {
        ColumnKind::Timestamp => parse_loose_timestamp(&text)
            .map(Value::Timestamp)
            .unwrap_or(Value::Text(text)),
        ColumnKind::Date => parse_date(&text).map(Value::Date).unwrap_or(Value::Text(text)),
        ColumnKind::Time => parse_time(&text).map(Value::Time).unwrap_or(Value::Text(text)),
        ColumnKind::Json => match serde_json::from_str(&text) {
            Ok(json) => Value::Json(json),
            Err(_) => Value::Text(text),
        },
        ColumnKind::Uuid => Value::Uuid(text),
        ColumnKind::Decimal => Value::Decimal(text),
        _ => Value::Text(text),
    }
}

pub fn bind_value<'q>(
    query: Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(value) => query.bind(i64::from(*value)),
        Value::Int(value) => query.bind(*value),
        Value::Float(value) => query.bind(*value),
        Value::Decimal(value) | Value::Text(value) | Value::Uuid(value) => {
            query.bind(value.clone())
        }
        Value::Timestamp(value) => query.bind(format_naive_utc(value)),
        Value::Date(value) => query.bind(format_date(value)),
        Value::Time(value) => query.bind(format_time(value)),
        Value::Bytes(value) => query.bind(value.clone()),
        Value::Json(value) => query.bind(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(cid: i64, name: &str, declared: &str, pk: i64, hidden: i64) -> RawColumn {
        RawColumn {
            cid,
            name: name.to_string(),
            declared_type: declared.to_string(),
            not_null: pk > 0,
            pk,
            hidden,
        }
    }

    fn raw_table(name: &str) -> RawTable {
        RawTable {
            name: name.to_string(),
        }
    }

    #[test]
    fn integer_primary_key_is_a_rowid_alias() {
        let table = map_table(
            &raw_table("users"),
            vec![raw(0, "id", "INTEGER", 1, 0), raw(1, "email", "varchar(254)", 0, 0)],
        );
        assert!(table.columns[0].is_auto_increment);
        assert!(!table.columns[1].is_auto_increment);
        assert_eq!(table.primary_key_columns(), vec!["id".to_string()]);

        let bigint = map_table(&raw_table("t"), vec![raw(0, "id", "bigint", 1, 0)]);
        assert!(!bigint.columns[0].is_auto_increment);
    }

    #[test]
    fn generated_columns_are_flagged() {
        let table = map_table(
            &raw_table("t"),
            vec![raw(0, "a", "int", 0, 0), raw(1, "b", "int", 0, 3)],
        );
        assert!(table.columns[1].is_generated);
        assert_eq!(table.writable_columns().count(), 1);
    }

    #[test]
    fn implicit_foreign_key_targets_resolve_to_parent_primary_key() {
        let users = map_table(&raw_table("users"), vec![raw(0, "id", "integer", 1, 0)]);
        let fks = map_foreign_keys(
            vec![RawForeignKey {
                id: 0,
                seq: 0,
                referenced_table: "users".to_string(),
                from: "user_id".to_string(),
                to: None,
            }],
            &[users],
        );
        assert_eq!(fks[0].referenced_columns, vec!["id".to_string()]);
    }

    #[test]
    fn detects_without_rowid_tables() {
        assert!(is_without_rowid("CREATE TABLE t (k text primary key) WITHOUT ROWID"));
        assert!(!is_without_rowid("CREATE TABLE rowid_notes (id integer primary key)"));
    }

    #[test]
    fn text_refined_by_declared_kind() {
        assert!(matches!(
            decode_text(ColumnKind::Timestamp, "2024-01-02 03:04:05.000006".to_string()),
            Value::Timestamp(_)
        ));
        assert_eq!(
            decode_text(ColumnKind::Timestamp, "not a time".to_string()),
            Value::Text("not a time".to_string())
        );
        assert_eq!(decode_integer(ColumnKind::Boolean, 1), Value::Bool(true));
        assert_eq!(
            decode_real(ColumnKind::Decimal, 0.75),
            Value::Decimal("0.75".to_string())
        );
    }
}

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::Row;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;

use dbsync_core::{Column, ColumnKind, ForeignKey, PrimaryKey, Record, Table, Value};

use crate::adapter::quote_ident;
use crate::error::StoreError;

use super::queries::{RawColumn, RawForeignKey, RawPrimaryKey, RawTable};

pub fn map_table(
    raw: RawTable,
    columns: Vec<RawColumn>,
    primary_key: Option<RawPrimaryKey>,
    foreign_keys: Vec<RawForeignKey>,
    schema: &str,
) -> Table {
    Table {
        name: raw.name,
        columns: columns.into_iter().map(map_column).collect(),
        primary_key: primary_key.map(|pk| PrimaryKey {
            name: Some(pk.name),
            columns: pk.columns,
        }),
        foreign_keys: map_foreign_keys(foreign_keys, schema),
    }
}

fn map_column(raw: RawColumn) -> Column {
    let is_serial = raw
        .default
        .as_deref()
        .is_some_and(|expr| expr.starts_with("nextval("));
    Column {
        ordinal_position: raw.ordinal_position,
        kind: ColumnKind::from_postgres(&raw.udt_name),
        name: raw.name,
        native_type: raw.native_type,
        is_nullable: raw.is_nullable,
        is_auto_increment: is_serial || !raw.identity.is_empty(),
        is_identity_always: raw.identity == "a",
        is_generated: raw.is_generated,
    }
}

/// References into other namespaces are outside the synchronized set.
fn map_foreign_keys(raw: Vec<RawForeignKey>, schema: &str) -> Vec<ForeignKey> {
    raw.into_iter()
        .filter(|fk| fk.referenced_schema == schema)
        .map(|fk| ForeignKey {
            name: Some(fk.name),
            columns: fk.columns,
            referenced_table: fk.referenced_table,
            referenced_columns: fk.referenced_columns,
        })
        .collect()
}

/// Select-list expression that yields a value decodable for the column kind.
///
/// Every column is cast to its base type so domains decode like the type
/// they wrap.
pub fn select_expr(column: &Column) -> String {
    let ident = quote_ident(&column.name);
    match column.kind {
        ColumnKind::Boolean => format!("{ident}::bool"),
        ColumnKind::Date => format!("{ident}::date"),
        ColumnKind::Time => format!("{ident}::time"),
        ColumnKind::Bytes => format!("{ident}::bytea"),
        ColumnKind::Integer => format!("{ident}::int8"),
        ColumnKind::Float => format!("{ident}::float8"),
        ColumnKind::Timestamp => format!("{ident}::timestamptz"),
        ColumnKind::Json => format!("{ident}::jsonb"),
        ColumnKind::Decimal | ColumnKind::Text | ColumnKind::Uuid => format!("{ident}::text"),
    }
}

pub fn decode_row(row: &PgRow, columns: &[Column]) -> Result<Record, StoreError> {
    let mut record = Record::new();
    for (index, column) in columns.iter().enumerate() {
        let value = match column.kind {
            ColumnKind::Boolean => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            ColumnKind::Integer => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
            ColumnKind::Float => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
            ColumnKind::Decimal => row.try_get::<Option<String>, _>(index)?.map(Value::Decimal),
            ColumnKind::Text => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
            ColumnKind::Uuid => row.try_get::<Option<String>, _>(index)?.map(Value::Uuid),
            ColumnKind::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(index)?
                .map(Value::Timestamp),
            ColumnKind::Date => row.try_get::<Option<NaiveDate>, _>(index)?.map(Value::Date),
            ColumnKind::Time => row.try_get::<Option<NaiveTime>, _>(index)?.map(Value::Time),
            ColumnKind::Bytes => row.try_get::<Option<Vec<u8>>, _>(index)?.map(Value::Bytes),
            ColumnKind::Json => row
                .try_get::<Option<JsonValue>, _>(index)?
                .filter(|json| !json.is_null())
                .map(Value::Json),
        };
        record.insert(column.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

/// Placeholder with an explicit cast to the column's declared type, so
/// loosely typed values (text from a file store) land in the right type.
pub fn placeholder(index: usize, column: &Column) -> String {
    format!("${index}::{}", column.native_type)
}

pub fn bind_value<'q>(
    query: Query<'q, sqlx::Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(value) => query.bind(*value),
        Value::Int(value) => query.bind(*value),
        Value::Float(value) => query.bind(*value),
        Value::Decimal(value) | Value::Text(value) | Value::Uuid(value) => {
            query.bind(value.clone())
        }
        Value::Timestamp(value) => query.bind(*value),
        Value::Date(value) => query.bind(*value),
        Value::Time(value) => query.bind(*value),
        Value::Bytes(value) => query.bind(value.clone()),
        Value::Json(value) => query.bind(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_column(name: &str, udt: &str, default: Option<&str>, identity: &str) -> RawColumn {
        RawColumn {
            ordinal_position: 1,
            name: name.to_string(),
            udt_name: udt.to_string(),
            native_type: udt.to_string(),
            is_nullable: false,
            default: default.map(str::to_string),
            identity: identity.to_string(),
            is_generated: false,
        }
    }

    #[test]
    fn serial_and_identity_columns_are_auto_increment() {
        let serial = map_column(raw_column(
            "id",
            "int4",
            Some("nextval('users_id_seq'::regclass)"),
            "",
        ));
        assert!(serial.is_auto_increment);
        assert!(!serial.is_identity_always);

        let always = map_column(raw_column("id", "int8", None, "a"));
        assert!(always.is_auto_increment);
        assert!(always.is_identity_always);

        let plain = map_column(raw_column("word", "text", Some("''::text"), ""));
        assert!(!plain.is_auto_increment);
    }

    #[test]
    fn cross_namespace_references_are_dropped() {
        let fks = map_foreign_keys(
            vec![
                RawForeignKey {
                    name: "cards_user_fk".to_string(),
                    columns: vec!["user_id".to_string()],
                    referenced_schema: "public".to_string(),
                    referenced_table: "users".to_string(),
                    referenced_columns: vec!["id".to_string()],
                },
                RawForeignKey {
                    name: "cards_audit_fk".to_string(),
                    columns: vec!["audit_id".to_string()],
                    referenced_schema: "audit".to_string(),
                    referenced_table: "events".to_string(),
                    referenced_columns: vec!["id".to_string()],
                },
            ],
            "public",
        );
        assert_eq!(fks.len(), 1);
        assert_eq!(fks[0].referenced_table, "users");
    }

    #[test]
    fn select_expressions_normalize_types() {
        let column = map_column(raw_column("price", "numeric", None, ""));
        assert_eq!(select_expr(&column), "\"price\"::text");
        assert_eq!(placeholder(3, &column), "$3::numeric");

        for (native, expected) in [
            ("bool", "\"flag\"::bool"),
            ("date", "\"flag\"::date"),
            ("time", "\"flag\"::time"),
            ("bytea", "\"flag\"::bytea"),
        ] {
            let column = map_column(raw_column("flag", native, None, ""));
            assert_eq!(select_expr(&column), expected);
        }
    }
}

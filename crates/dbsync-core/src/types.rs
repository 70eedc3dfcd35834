use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Portable column type shared by every engine.
///
/// Each engine maps its native types onto one of these kinds; the kind
/// decides how values are read, serialized into the manifest and bound on
/// insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Decimal,
    Text,
    Uuid,
    Timestamp,
    Date,
    Time,
    Bytes,
    Json,
}

impl ColumnKind {
    /// Map a Postgres `pg_type.typname` to a portable kind.
    ///
    /// Unknown types (enums, arrays, ranges, intervals) travel as text and
    /// are cast back on insert.
    pub fn from_postgres(udt_name: &str) -> Self {
        match udt_name {
            "bool" => ColumnKind::Boolean,
            "int2" | "int4" | "int8" | "oid" => ColumnKind::Integer,
            "float4" | "float8" => ColumnKind::Float,
            "numeric" | "money" => ColumnKind::Decimal,
            "uuid" => ColumnKind::Uuid,
            "timestamp" | "timestamptz" => ColumnKind::Timestamp,
            "date" => ColumnKind::Date,
            "time" => ColumnKind::Time,
            "bytea" => ColumnKind::Bytes,
            "json" | "jsonb" => ColumnKind::Json,
            _ => ColumnKind::Text,
        }
    }

    /// Map a SQLite declared column type to a portable kind.
    ///
    /// SQLite only knows storage classes, so the declared type is the only
    /// hint about booleans and time values.
    pub fn from_sqlite(declared: &str) -> Self {
        let decl = declared.trim().to_ascii_uppercase();
        if decl.contains("BOOL") {
            ColumnKind::Boolean
        } else if decl.contains("DATETIME") || decl.contains("TIMESTAMP") {
            ColumnKind::Timestamp
        } else if decl == "DATE" {
            ColumnKind::Date
        } else if decl.starts_with("TIME") {
            ColumnKind::Time
        } else if decl.contains("UUID") {
            ColumnKind::Uuid
        } else if decl.contains("JSON") {
            ColumnKind::Json
        } else if decl.contains("DECIMAL") || decl.contains("NUMERIC") {
            ColumnKind::Decimal
        } else if decl.contains("INT") {
            ColumnKind::Integer
        } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
            ColumnKind::Text
        } else if decl.contains("BLOB") {
            ColumnKind::Bytes
        } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
            ColumnKind::Float
        } else {
            ColumnKind::Text
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "boolean" => ColumnKind::Boolean,
            "integer" => ColumnKind::Integer,
            "float" => ColumnKind::Float,
            "decimal" => ColumnKind::Decimal,
            "text" => ColumnKind::Text,
            "uuid" => ColumnKind::Uuid,
            "timestamp" => ColumnKind::Timestamp,
            "date" => ColumnKind::Date,
            "time" => ColumnKind::Time,
            "bytes" => ColumnKind::Bytes,
            "json" => ColumnKind::Json,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnKind::Boolean => "boolean",
            ColumnKind::Integer => "integer",
            ColumnKind::Float => "float",
            ColumnKind::Decimal => "decimal",
            ColumnKind::Text => "text",
            ColumnKind::Uuid => "uuid",
            ColumnKind::Timestamp => "timestamp",
            ColumnKind::Date => "date",
            ColumnKind::Time => "time",
            ColumnKind::Bytes => "bytes",
            ColumnKind::Json => "json",
        }
    }
}

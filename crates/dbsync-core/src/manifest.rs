use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::atomic::write_json_atomic;
use crate::types::ColumnKind;
use crate::value::{Value, ValueError};

/// Current manifest format version.
pub const MANIFEST_VERSION: &str = "1";

/// One exported row: column name → value, keys in sorted order.
pub type Record = BTreeMap<String, Value>;

/// Errors reading or writing a manifest file.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported manifest version {found} (expected {MANIFEST_VERSION})")]
    Version { found: String },
    #[error("table {table}: {source}")]
    Value {
        table: String,
        #[source]
        source: ValueError,
    },
    #[error("table {table}: row {row} has unknown column {column}")]
    UnknownColumn {
        table: String,
        row: usize,
        column: String,
    },
}

/// Column descriptor carried in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// All rows of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub table: String,
    /// Position in the source's FK dependency order.
    pub rank: usize,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    /// Rows in source-storage order.
    pub rows: Vec<Record>,
}

impl TableSnapshot {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Ordered snapshots exchanged between exporter and importer.
///
/// Tables appear parents-first so rows are never written before the rows
/// they reference.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncManifest {
    pub created_at: DateTime<Utc>,
    pub source_engine: String,
    pub excluded: Vec<String>,
    pub tables: Vec<TableSnapshot>,
}

impl SyncManifest {
    pub fn new(source_engine: impl Into<String>, excluded: &ExclusionSet) -> Self {
        Self {
            created_at: Utc::now(),
            source_engine: source_engine.into(),
            excluded: excluded.iter().map(str::to_string).collect(),
            tables: Vec::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableSnapshot> {
        self.tables.iter().find(|snapshot| snapshot.table == name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|snapshot| snapshot.table.as_str()).collect()
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(TableSnapshot::row_count).sum()
    }

    pub fn to_document(&self) -> ManifestDocument {
        ManifestDocument {
            format_version: MANIFEST_VERSION.to_string(),
            created_at: self.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            source_engine: self.source_engine.clone(),
            excluded: self.excluded.clone(),
            tables: self
                .tables
                .iter()
                .map(|snapshot| TableDocument {
                    table: snapshot.table.clone(),
                    rank: snapshot.rank,
                    columns: snapshot.columns.clone(),
                    primary_key: snapshot.primary_key.clone(),
                    rows: snapshot
                        .rows
                        .iter()
                        .map(|record| encode_record(record, &snapshot.columns))
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn from_document(document: ManifestDocument) -> Result<Self, ManifestError> {
        if document.format_version != MANIFEST_VERSION {
            return Err(ManifestError::Version {
                found: document.format_version,
            });
        }

        let created_at = DateTime::parse_from_rfc3339(&document.created_at)
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let mut tables = Vec::with_capacity(document.tables.len());
        for table in document.tables {
            let kinds: BTreeMap<&str, ColumnKind> = table
                .columns
                .iter()
                .map(|column| (column.name.as_str(), column.kind))
                .collect();

            let mut rows = Vec::with_capacity(table.rows.len());
            for (index, raw) in table.rows.iter().enumerate() {
                let mut record = Record::new();
                for (column, json) in raw {
                    let kind = kinds.get(column.as_str()).ok_or_else(|| {
                        ManifestError::UnknownColumn {
                            table: table.table.clone(),
                            row: index,
                            column: column.clone(),
                        }
                    })?;
                    let value = Value::from_json(*kind, json).map_err(|source| {
                        ManifestError::Value {
                            table: table.table.clone(),
                            source,
                        }
                    })?;
                    record.insert(column.clone(), value);
                }
                rows.push(record);
            }

            tables.push(TableSnapshot {
                table: table.table,
                rank: table.rank,
                columns: table.columns,
                primary_key: table.primary_key,
                rows,
            });
        }

        Ok(Self {
            created_at,
            source_engine: document.source_engine,
            excluded: document.excluded,
            tables,
        })
    }
}

fn encode_record(record: &Record, columns: &[ColumnSpec]) -> BTreeMap<String, serde_json::Value> {
    record
        .iter()
        .map(|(column, value)| {
            let json = match columns.iter().find(|spec| spec.name == *column) {
                Some(spec) => value.to_manifest_json(spec.kind),
                None => value.to_json(),
            };
            (column.clone(), json)
        })
        .collect()
}

/// On-disk manifest layout.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ManifestDocument {
    pub format_version: String,
    pub created_at: String,
    pub source_engine: String,
    #[serde(default)]
    pub excluded: Vec<String>,
    pub tables: Vec<TableDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableDocument {
    pub table: String,
    pub rank: usize,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<String>,
    pub rows: Vec<BTreeMap<String, serde_json::Value>>,
}

/// Write a manifest as one pretty-printed UTF-8 JSON document.
///
/// The file appears only once fully written.
pub fn write_manifest(path: &Path, manifest: &SyncManifest) -> Result<(), ManifestError> {
    write_json_atomic(path, &manifest.to_document()).map_err(ManifestError::from)
}

pub fn read_manifest(path: &Path) -> Result<SyncManifest, ManifestError> {
    let file = std::fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    let document: ManifestDocument = serde_json::from_reader(reader)?;
    SyncManifest::from_document(document)
}

/// Emit the JSON Schema for manifest files.
pub fn manifest_json_schema() -> RootSchema {
    schema_for!(ManifestDocument)
}

/// Table names left out of export and never touched on the target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    tables: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tables = tables
            .into_iter()
            .map(Into::into)
            .map(|name: String| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self { tables }
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn extend<I, S>(&mut self, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.extend(
            tables
                .into_iter()
                .map(Into::into)
                .filter(|name: &String| !name.trim().is_empty()),
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }
}

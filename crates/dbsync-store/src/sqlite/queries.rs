use sqlx::{Row, SqlitePool};

use crate::adapter::quote_ident;
use crate::error::StoreError;

pub struct RawTable {
    pub name: String,
}

pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<RawTable>, StoreError> {
    let rows = sqlx::query(
        r#"
        select name
        from sqlite_master
        where type = 'table'
          and name not like 'sqlite\_%' escape '\'
        order by name
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(RawTable {
                name: row.try_get("name")?,
            })
        })
        .collect()
}

pub struct RawColumn {
    pub cid: i64,
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    /// Position inside the primary key, 0 when not part of it.
    pub pk: i64,
    /// 0 normal, 1 hidden (virtual tables), 2 and 3 generated.
    pub hidden: i64,
}

pub async fn list_columns(pool: &SqlitePool, table: &str) -> Result<Vec<RawColumn>, StoreError> {
    let sql = format!("PRAGMA table_xinfo({})", quote_ident(table));
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.into_iter()
        .map(|row| {
            Ok(RawColumn {
                cid: row.try_get("cid")?,
                name: row.try_get("name")?,
                declared_type: row.try_get::<Option<String>, _>("type")?.unwrap_or_default(),
                not_null: row.try_get::<i64, _>("notnull")? != 0,
                pk: row.try_get("pk")?,
                hidden: row.try_get("hidden")?,
            })
        })
        .collect()
}

pub struct RawForeignKey {
    pub id: i64,
    pub seq: i64,
    pub referenced_table: String,
    pub from: String,
    /// Missing when the key targets the parent's primary key implicitly.
    pub to: Option<String>,
}

pub async fn list_foreign_keys(
    pool: &SqlitePool,
    table: &str,
) -> Result<Vec<RawForeignKey>, StoreError> {
    let sql = format!("PRAGMA foreign_key_list({})", quote_ident(table));
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.into_iter()
        .map(|row| {
            Ok(RawForeignKey {
                id: row.try_get("id")?,
                seq: row.try_get("seq")?,
                referenced_table: row.try_get("table")?,
                from: row.try_get("from")?,
                to: row.try_get("to")?,
            })
        })
        .collect()
}

pub async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool, StoreError> {
    let count = sqlx::query_scalar::<_, i64>(
        "select count(*) from sqlite_master where type = 'table' and name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

pub async fn table_sql(pool: &SqlitePool, table: &str) -> Result<String, StoreError> {
    let sql = sqlx::query_scalar::<_, Option<String>>(
        "select sql from sqlite_master where type = 'table' and name = ?",
    )
    .bind(table)
    .fetch_optional(pool)
    .await?;
    Ok(sql.flatten().unwrap_or_default())
}

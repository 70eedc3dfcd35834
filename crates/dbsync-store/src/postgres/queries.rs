use sqlx::{PgPool, Row};

use crate::error::StoreError;

pub struct RawTable {
    pub name: String,
}

pub async fn list_tables(pool: &PgPool, schema: &str) -> Result<Vec<RawTable>, StoreError> {
    let rows = sqlx::query(
        r#"
        select c.relname::text as name
        from pg_class c
        join pg_namespace n on n.oid = c.relnamespace
        where n.nspname = $1
          and c.relkind in ('r', 'p')
          and not c.relispartition
        order by c.relname
        "#,
    )
    .bind(schema)
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
    pub ordinal_position: i64,
    pub name: String,
    pub udt_name: String,
    pub native_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    pub identity: String,
    pub is_generated: bool,
}

pub async fn list_columns(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<RawColumn>, StoreError> {
    let rows = sqlx::query(
        r#"
        select
          a.attnum::int8 as ordinal_position,
          a.attname::text as name,
          coalesce(bt.typname, t.typname)::text as udt_name,
          pg_catalog.format_type(a.atttypid, null) as native_type,
          (not a.attnotnull) as is_nullable,
          pg_get_expr(ad.adbin, ad.adrelid) as default_expr,
          a.attidentity::text as identity,
          (a.attgenerated <> '') as is_generated
        from pg_attribute a
        join pg_class c on c.oid = a.attrelid
        join pg_namespace n on n.oid = c.relnamespace
        join pg_type t on t.oid = a.atttypid
        left join pg_type bt on t.typtype = 'd' and bt.oid = t.typbasetype
        left join pg_attrdef ad on ad.adrelid = a.attrelid and ad.adnum = a.attnum
        where n.nspname = $1
          and c.relname = $2
          and a.attnum > 0
          and not a.attisdropped
        order by a.attnum
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(RawColumn {
                ordinal_position: row.try_get("ordinal_position")?,
                name: row.try_get("name")?,
                udt_name: row.try_get("udt_name")?,
                native_type: row.try_get("native_type")?,
                is_nullable: row.try_get("is_nullable")?,
                default: row.try_get("default_expr")?,
                identity: row.try_get("identity")?,
                is_generated: row.try_get("is_generated")?,
            })
        })
        .collect()
}

pub struct RawPrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

pub async fn get_primary_key(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Option<RawPrimaryKey>, StoreError> {
    let row = sqlx::query(
        r#"
        select
          con.conname::text as name,
          array(
            select a.attname::text
            from unnest(con.conkey) with ordinality as k(attnum, ord)
            join pg_attribute a on a.attrelid = con.conrelid and a.attnum = k.attnum
            order by k.ord
          ) as columns
        from pg_constraint con
        join pg_class c on c.oid = con.conrelid
        join pg_namespace n on n.oid = c.relnamespace
        where con.contype = 'p'
          and n.nspname = $1
          and c.relname = $2
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        Ok(RawPrimaryKey {
            name: row.try_get("name")?,
            columns: row.try_get("columns")?,
        })
    })
    .transpose()
}

pub struct RawForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

pub async fn list_foreign_keys(
    pool: &PgPool,
    schema: &str,
    table: &str,
) -> Result<Vec<RawForeignKey>, StoreError> {
    let rows = sqlx::query(
        r#"
        select
          con.conname::text as name,
          array(
            select a.attname::text
            from unnest(con.conkey) with ordinality as k(attnum, ord)
            join pg_attribute a on a.attrelid = con.conrelid and a.attnum = k.attnum
            order by k.ord
          ) as columns,
          rn.nspname::text as referenced_schema,
          rc.relname::text as referenced_table,
          array(
            select a.attname::text
            from unnest(con.confkey) with ordinality as k(attnum, ord)
            join pg_attribute a on a.attrelid = con.confrelid and a.attnum = k.attnum
            order by k.ord
          ) as referenced_columns
        from pg_constraint con
        join pg_class c on c.oid = con.conrelid
        join pg_namespace n on n.oid = c.relnamespace
        join pg_class rc on rc.oid = con.confrelid
        join pg_namespace rn on rn.oid = rc.relnamespace
        where con.contype = 'f'
          and n.nspname = $1
          and c.relname = $2
        order by con.conname
        "#,
    )
    .bind(schema)
    .bind(table)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(RawForeignKey {
                name: row.try_get("name")?,
                columns: row.try_get("columns")?,
                referenced_schema: row.try_get("referenced_schema")?,
                referenced_table: row.try_get("referenced_table")?,
                referenced_columns: row.try_get("referenced_columns")?,
            })
        })
        .collect()
}

/// Sequence owned by `column`, if any (serial or identity).
pub async fn serial_sequence(
    pool: &PgPool,
    qualified_table: &str,
    column: &str,
) -> Result<Option<String>, StoreError> {
    let sequence = sqlx::query_scalar::<_, Option<String>>("select pg_get_serial_sequence($1, $2)")
        .bind(qualified_table)
        .bind(column)
        .fetch_one(pool)
        .await?;
    Ok(sequence)
}

pub async fn table_exists(pool: &PgPool, schema: &str, table: &str) -> Result<bool, StoreError> {
    let exists = sqlx::query_scalar::<_, bool>(
        "select exists(select 1 from pg_tables where schemaname = $1 and tablename = $2)",
    )
    .bind(schema)
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

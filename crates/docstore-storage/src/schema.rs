//! DDL for the catalog tables and for the per-logical-table base/index
//! tables generated at `CreateTable`/`UpdateTable` time (§3, §6.2).
//!
//! Every logical table gets its own base item table and one auxiliary table
//! per secondary index, named from the logical name so that dropping a
//! logical table is a handful of `DROP TABLE` statements rather than a
//! `DELETE` sweep across a shared rows table.

/// Current catalog schema version. Bumped whenever catalog DDL changes.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Catalog-level tables, created once per store.
pub const CATALOG_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tables_catalog (
        name        TEXT PRIMARY KEY,
        definition  TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        item_count  INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS idempotency (
        token         TEXT PRIMARY KEY,
        response_json TEXT NOT NULL,
        created_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS export_descriptors (
        export_id   TEXT PRIMARY KEY,
        table_name  TEXT NOT NULL,
        status      TEXT NOT NULL,
        item_count  INTEGER NOT NULL DEFAULT 0,
        byte_count  INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS import_descriptors (
        import_id   TEXT PRIMARY KEY,
        table_name  TEXT NOT NULL,
        status      TEXT NOT NULL,
        item_count  INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS config (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

/// Quotes a SQL identifier, doubling embedded quote characters. Table and
/// index names come from caller input, so every generated identifier goes
/// through this rather than being interpolated raw.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Physical (unquoted) name of a logical table's base item table.
pub fn item_table_name(table: &str) -> String {
    format!("item__{table}")
}

/// Physical (unquoted) name of a secondary index's auxiliary table.
pub fn index_table_name(table: &str, index: &str) -> String {
    format!("idx__{table}__{index}")
}

/// DDL to create a logical table's base item table (§6.2: `pk_coll, sk_coll,
/// pk_raw, sk_raw, sk_num, item_json, ttl_epoch`, primary key
/// `(pk_coll, sk_coll)`). Tables with no sort key store `sk_coll = ''`.
pub fn create_item_table_sql(table: &str) -> String {
    let name = quote_ident(&item_table_name(table));
    format!(
        "CREATE TABLE {name} (
            pk_coll    TEXT NOT NULL,
            sk_coll    TEXT NOT NULL DEFAULT '',
            pk_raw     TEXT NOT NULL,
            sk_raw     TEXT,
            sk_num     REAL,
            item_json  TEXT NOT NULL,
            ttl_epoch  INTEGER,
            PRIMARY KEY (pk_coll, sk_coll)
        )"
    )
}

/// DDL to create a secondary index's auxiliary table (§6.2: `ipk_coll,
/// isk_coll, tpk_coll, tsk_coll, ipk_raw, isk_raw, isk_num, item_json,
/// ttl_epoch`, unique on `(tpk_coll, tsk_coll)`, ordered by
/// `(ipk_coll, isk_coll)`).
pub fn create_index_table_sql(table: &str, index: &str) -> String {
    let name = quote_ident(&index_table_name(table, index));
    format!(
        "CREATE TABLE {name} (
            ipk_coll   TEXT NOT NULL,
            isk_coll   TEXT NOT NULL DEFAULT '',
            tpk_coll   TEXT NOT NULL,
            tsk_coll   TEXT NOT NULL DEFAULT '',
            ipk_raw    TEXT NOT NULL,
            isk_raw    TEXT,
            isk_num    REAL,
            item_json  TEXT NOT NULL,
            ttl_epoch  INTEGER,
            UNIQUE (tpk_coll, tsk_coll)
        )"
    )
}

/// Index on `(ipk_coll, isk_coll)` so an index's own queries get the same
/// B-tree ordering the base table's primary key gives it for free.
pub fn create_index_ordering_index_sql(table: &str, index: &str) -> String {
    let table_name = index_table_name(table, index);
    let idx_name = quote_ident(&format!("ord__{table_name}"));
    let table_name = quote_ident(&table_name);
    format!("CREATE INDEX {idx_name} ON {table_name} (ipk_coll, isk_coll)")
}

pub fn drop_table_sql(physical_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_ident(physical_name))
}

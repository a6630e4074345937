//! Table/index/tag/TTL catalog operations (§4.1).
//!
//! Every mutation here re-reads, modifies, and rewrites one
//! `tables_catalog` row's JSON-encoded [`TableDescription`] under the
//! store's connection mutex, plus whatever DDL the operation requires.
//! `item_count` is tracked as a separate integer column, kept in sync by
//! `item_engine` via [`bump_item_count`].

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use docstore_core::{
    AttributeDefinition, IndexKind, KeySchemaElement, SecondaryIndexDef, TableDescription, TableStatus, TtlConfig,
};

use crate::error::{Result, StorageError};
use crate::index_maintain::plan_index_rows;
use crate::schema::{self, quote_ident};
use crate::store::Store;

const MAX_SECONDARY_INDEXES: usize = 5;
const MAX_TAGS: usize = 50;
const MAX_TAG_KEY_LEN: usize = 128;
const MAX_TAG_VALUE_LEN: usize = 256;

pub(crate) fn load_definition(conn: &Connection, name: &str) -> Result<TableDescription> {
    let row: Option<(String, i64)> = conn
        .query_row("SELECT definition, item_count FROM tables_catalog WHERE name = ?1", params![name], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .optional()?;
    let (json, item_count) = row.ok_or_else(|| StorageError::not_found("table", name))?;
    let mut def: TableDescription = serde_json::from_str(&json)?;
    def.item_count = item_count;
    Ok(def)
}

pub(crate) fn save_definition(conn: &Connection, def: &TableDescription) -> Result<()> {
    let json = serde_json::to_string(def)?;
    conn.execute(
        "UPDATE tables_catalog SET definition = ?1 WHERE name = ?2",
        params![json, def.name],
    )?;
    Ok(())
}

/// Increments or decrements a table's tracked item count. Called by the
/// item engine alongside its own row writes, inside the same transaction.
pub fn bump_item_count(conn: &Connection, table: &str, delta: i64) -> Result<()> {
    conn.execute("UPDATE tables_catalog SET item_count = item_count + ?1 WHERE name = ?2", params![delta, table])?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn create_table(
    store: &Store,
    name: &str,
    key_schema_elements: Vec<KeySchemaElement>,
    attribute_definitions: Vec<AttributeDefinition>,
    global_secondary_indexes: Vec<SecondaryIndexDef>,
    local_secondary_indexes: Vec<SecondaryIndexDef>,
) -> Result<TableDescription> {
    let conn = store.lock_conn()?;

    let exists: bool =
        conn.query_row("SELECT COUNT(*) FROM tables_catalog WHERE name = ?1", params![name], |r| r.get::<_, i64>(0))?
            > 0;
    if exists {
        return Err(StorageError::ResourceInUse { name: name.to_string() });
    }

    let key_schema = docstore_core::KeySchema::from_elements(&key_schema_elements)
        .ok_or_else(|| StorageError::validation("key schema must declare a HASH key"))?;

    if global_secondary_indexes.len() > MAX_SECONDARY_INDEXES || local_secondary_indexes.len() > MAX_SECONDARY_INDEXES
    {
        return Err(StorageError::validation("more than five secondary indexes requested"));
    }

    let mut seen_index_names = std::collections::BTreeSet::new();
    for idx in global_secondary_indexes.iter().chain(local_secondary_indexes.iter()) {
        if !seen_index_names.insert(idx.name.clone()) {
            return Err(StorageError::validation(format!("duplicate index name: {}", idx.name)));
        }
    }
    for idx in &local_secondary_indexes {
        if idx.kind != IndexKind::Local {
            return Err(StorageError::validation("local_secondary_indexes entries must be IndexKind::Local"));
        }
        if idx.key_schema.hash != key_schema.hash {
            return Err(StorageError::validation(format!(
                "LSI {} hash key must match the base table's hash key",
                idx.name
            )));
        }
    }

    let declared: std::collections::BTreeSet<&str> = attribute_definitions.iter().map(|a| a.name.as_str()).collect();
    let mut used = std::collections::BTreeSet::new();
    used.insert(key_schema.hash.as_str());
    if let Some(r) = &key_schema.range {
        used.insert(r.as_str());
    }
    for idx in global_secondary_indexes.iter().chain(local_secondary_indexes.iter()) {
        used.insert(idx.key_schema.hash.as_str());
        if let Some(r) = &idx.key_schema.range {
            used.insert(r.as_str());
        }
    }
    for name in &used {
        if !declared.contains(name) {
            return Err(StorageError::validation(format!("key attribute {name} has no attribute definition")));
        }
    }
    for name in &declared {
        if !used.contains(name) {
            return Err(StorageError::validation(format!("attribute definition {name} is never used as a key")));
        }
    }

    conn.execute_batch(&schema::create_item_table_sql(name))?;
    for idx in global_secondary_indexes.iter().chain(local_secondary_indexes.iter()) {
        conn.execute_batch(&schema::create_index_table_sql(name, &idx.name))?;
        conn.execute_batch(&schema::create_index_ordering_index_sql(name, &idx.name))?;
    }

    let def = TableDescription {
        name: name.to_string(),
        arn: TableDescription::synthetic_arn(name),
        key_schema,
        attribute_definitions,
        global_secondary_indexes,
        local_secondary_indexes,
        provisioned_throughput: Default::default(),
        item_count: 0,
        creation_date_time: Utc::now(),
        status: TableStatus::Active,
        tags: Default::default(),
        ttl: TtlConfig::Disabled,
    };
    let json = serde_json::to_string(&def)?;
    conn.execute(
        "INSERT INTO tables_catalog (name, definition, created_at, item_count) VALUES (?1, ?2, ?3, 0)",
        params![name, json, def.creation_date_time.to_rfc3339()],
    )?;

    info!(table = name, "table created");
    Ok(def)
}

pub fn delete_table(store: &Store, name: &str) -> Result<()> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, name)?;

    conn.execute_batch(&schema::drop_table_sql(&schema::item_table_name(name)))?;
    for idx in def.global_secondary_indexes.iter().chain(def.local_secondary_indexes.iter()) {
        conn.execute_batch(&schema::drop_table_sql(&schema::index_table_name(name, &idx.name)))?;
    }
    conn.execute("DELETE FROM tables_catalog WHERE name = ?1", params![name])?;

    info!(table = name, "table deleted");
    Ok(())
}

pub fn describe_table(store: &Store, name: &str) -> Result<TableDescription> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, name)?;
    Ok(def)
}

pub fn list_tables(store: &Store, exclusive_start: Option<&str>, limit: usize) -> Result<(Vec<String>, Option<String>)> {
    let conn = store.lock_conn()?;
    let mut stmt = conn.prepare(
        "SELECT name FROM tables_catalog WHERE (?1 IS NULL OR name > ?1) ORDER BY name ASC LIMIT ?2",
    )?;
    let limit_i64 = (limit + 1) as i64;
    let names: Vec<String> = stmt
        .query_map(params![exclusive_start, limit_i64], |r| r.get(0))?
        .collect::<std::result::Result<_, _>>()?;

    if names.len() > limit {
        let mut names = names;
        names.truncate(limit);
        let last_key = names.last().cloned();
        Ok((names, last_key))
    } else {
        Ok((names, None))
    }
}

pub fn add_global_secondary_index(
    store: &Store,
    table: &str,
    new_attribute_definitions: Vec<AttributeDefinition>,
    index: SecondaryIndexDef,
) -> Result<TableDescription> {
    let conn = store.lock_conn()?;
    let mut def = load_definition(&conn, table)?;

    if def.find_index(&index.name).is_some() {
        return Err(StorageError::validation(format!("index {} already exists", index.name)));
    }
    if def.global_secondary_indexes.len() >= MAX_SECONDARY_INDEXES {
        return Err(StorageError::validation("table already has five global secondary indexes"));
    }

    for attr in &new_attribute_definitions {
        if !def.attribute_definitions.iter().any(|a| a.name == attr.name) {
            def.attribute_definitions.push(attr.clone());
        }
    }
    let declared: std::collections::BTreeSet<&str> = def.attribute_definitions.iter().map(|a| a.name.as_str()).collect();
    if !declared.contains(index.key_schema.hash.as_str())
        || index.key_schema.range.as_deref().is_some_and(|r| !declared.contains(r))
    {
        return Err(StorageError::validation("new index's key attributes are not in attribute definitions"));
    }

    conn.execute_batch(&schema::create_index_table_sql(table, &index.name))?;
    conn.execute_batch(&schema::create_index_ordering_index_sql(table, &index.name))?;

    backfill_index(&conn, table, &def, &index)?;

    def.global_secondary_indexes.push(index);
    save_definition(&conn, &def)?;
    debug!(table, "global secondary index added");
    Ok(def)
}

fn backfill_index(conn: &Connection, table: &str, def: &TableDescription, index: &SecondaryIndexDef) -> Result<()> {
    let item_table = quote_ident(&schema::item_table_name(table));
    let index_table = quote_ident(&schema::index_table_name(table, &index.name));

    let mut stmt = conn.prepare(&format!("SELECT pk_coll, sk_coll, item_json, ttl_epoch FROM {item_table}"))?;
    let rows: Vec<(String, String, String, Option<i64>)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
        .collect::<std::result::Result<_, _>>()?;

    for (tpk_coll, tsk_coll, item_json, ttl_epoch) in rows {
        let item = docstore_codec::item_from_json_string(&item_json)?;
        let mut throwaway = TableDescription { global_secondary_indexes: vec![index.clone()], ..def.clone() };
        throwaway.local_secondary_indexes.clear();
        let plans = plan_index_rows(&throwaway, Some(&item))?;
        let Some(plan) = plans.into_iter().find(|p| p.index_name == index.name) else {
            continue;
        };
        let Some(row) = plan.row else {
            continue;
        };
        conn.execute(
            &format!(
                "INSERT INTO {index_table} (ipk_coll, isk_coll, tpk_coll, tsk_coll, ipk_raw, isk_raw, isk_num, item_json, ttl_epoch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![row.ipk_coll, row.isk_coll, tpk_coll, tsk_coll, row.ipk_raw, row.isk_raw, row.isk_num, item_json, ttl_epoch],
        )?;
    }
    Ok(())
}

pub fn delete_global_secondary_index(store: &Store, table: &str, index_name: &str) -> Result<TableDescription> {
    let conn = store.lock_conn()?;
    let mut def = load_definition(&conn, table)?;
    if def.find_index(index_name).is_none() {
        return Err(StorageError::not_found("index", index_name));
    }
    conn.execute_batch(&schema::drop_table_sql(&schema::index_table_name(table, index_name)))?;
    def.global_secondary_indexes.retain(|i| i.name != index_name);
    def.local_secondary_indexes.retain(|i| i.name != index_name);
    save_definition(&conn, &def)?;
    debug!(table, index = index_name, "secondary index deleted");
    Ok(def)
}

pub fn tag_resource(store: &Store, table: &str, new_tags: std::collections::BTreeMap<String, String>) -> Result<()> {
    let conn = store.lock_conn()?;
    let mut def = load_definition(&conn, table)?;

    for (k, v) in &new_tags {
        if k.chars().count() > MAX_TAG_KEY_LEN {
            return Err(StorageError::validation(format!("Tag key exceeds {MAX_TAG_KEY_LEN} characters: {k}")));
        }
        if v.chars().count() > MAX_TAG_VALUE_LEN {
            return Err(StorageError::validation(format!("Tag value exceeds {MAX_TAG_VALUE_LEN} characters")));
        }
    }

    let mut merged = def.tags.clone();
    for (k, v) in new_tags {
        merged.insert(k, v);
    }
    if merged.len() > MAX_TAGS {
        return Err(StorageError::validation(format!("Too many tags: limit is {MAX_TAGS}")));
    }
    def.tags = merged;
    save_definition(&conn, &def)?;
    Ok(())
}

pub fn untag_resource(store: &Store, table: &str, keys: &[String]) -> Result<()> {
    let conn = store.lock_conn()?;
    let mut def = load_definition(&conn, table)?;
    for key in keys {
        def.tags.remove(key);
    }
    save_definition(&conn, &def)?;
    Ok(())
}

pub fn list_tags(store: &Store, table: &str) -> Result<std::collections::BTreeMap<String, String>> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    Ok(def.tags)
}

pub fn update_ttl(store: &Store, table: &str, enable: bool, attribute_name: Option<String>) -> Result<TtlConfig> {
    let conn = store.lock_conn()?;
    let mut def = load_definition(&conn, table)?;

    if enable {
        if def.ttl.is_enabled() {
            return Err(StorageError::validation("TTL is already enabled on this table"));
        }
        let attribute_name =
            attribute_name.ok_or_else(|| StorageError::validation("enabling TTL requires an attribute name"))?;
        backfill_ttl(&conn, table, &def, &attribute_name)?;
        def.ttl = TtlConfig::Enabled { attribute_name };
    } else {
        if !def.ttl.is_enabled() {
            return Err(StorageError::validation("TTL is already disabled on this table"));
        }
        clear_ttl(&conn, table, &def)?;
        def.ttl = TtlConfig::Disabled;
    }
    save_definition(&conn, &def)?;
    Ok(def.ttl)
}

fn backfill_ttl(conn: &Connection, table: &str, def: &TableDescription, attribute_name: &str) -> Result<()> {
    let item_table = quote_ident(&schema::item_table_name(table));
    let mut stmt = conn.prepare(&format!("SELECT pk_coll, sk_coll, item_json FROM {item_table}"))?;
    let rows: Vec<(String, String, String)> =
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?.collect::<std::result::Result<_, _>>()?;

    for (pk_coll, sk_coll, item_json) in rows {
        let item = docstore_codec::item_from_json_string(&item_json)?;
        let ttl_epoch = match item.get(attribute_name) {
            Some(docstore_core::AttributeValue::N(n)) => n.trim().parse::<f64>().ok().map(|f| f as i64),
            _ => None,
        };
        conn.execute(
            &format!("UPDATE {item_table} SET ttl_epoch = ?1 WHERE pk_coll = ?2 AND sk_coll = ?3"),
            params![ttl_epoch, pk_coll, sk_coll],
        )?;
        for idx in def.global_secondary_indexes.iter().chain(def.local_secondary_indexes.iter()) {
            let idx_table = quote_ident(&schema::index_table_name(table, &idx.name));
            conn.execute(
                &format!("UPDATE {idx_table} SET ttl_epoch = ?1 WHERE tpk_coll = ?2 AND tsk_coll = ?3"),
                params![ttl_epoch, pk_coll, sk_coll],
            )?;
        }
    }
    Ok(())
}

fn clear_ttl(conn: &Connection, table: &str, def: &TableDescription) -> Result<()> {
    let item_table = quote_ident(&schema::item_table_name(table));
    conn.execute(&format!("UPDATE {item_table} SET ttl_epoch = NULL"), [])?;
    for idx in def.global_secondary_indexes.iter().chain(def.local_secondary_indexes.iter()) {
        let idx_table = quote_ident(&schema::index_table_name(table, &idx.name));
        conn.execute(&format!("UPDATE {idx_table} SET ttl_epoch = NULL"), [])?;
    }
    Ok(())
}

pub fn describe_ttl(store: &Store, table: &str) -> Result<TtlConfig> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    Ok(def.ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{KeyKind, KeyType};

    fn pk_only_schema() -> Vec<KeySchemaElement> {
        vec![KeySchemaElement { attribute_name: "PK".into(), kind: KeyKind::Hash }]
    }

    fn pk_attr() -> Vec<AttributeDefinition> {
        vec![AttributeDefinition { name: "PK".into(), attr_type: KeyType::S }]
    }

    #[test]
    fn create_table_then_describe_round_trips() {
        let store = Store::open_memory().unwrap();
        let def = create_table(&store, "T", pk_only_schema(), pk_attr(), vec![], vec![]).unwrap();
        assert_eq!(def.status, TableStatus::Active);
        let described = describe_table(&store, "T").unwrap();
        assert_eq!(described.name, "T");
    }

    #[test]
    fn create_table_twice_fails_resource_in_use() {
        let store = Store::open_memory().unwrap();
        create_table(&store, "T", pk_only_schema(), pk_attr(), vec![], vec![]).unwrap();
        let err = create_table(&store, "T", pk_only_schema(), pk_attr(), vec![], vec![]).unwrap_err();
        assert!(matches!(err, StorageError::ResourceInUse { .. }));
    }

    #[test]
    fn create_table_rejects_unused_attribute_definition() {
        let store = Store::open_memory().unwrap();
        let mut attrs = pk_attr();
        attrs.push(AttributeDefinition { name: "Unused".into(), attr_type: KeyType::S });
        let err = create_table(&store, "T", pk_only_schema(), attrs, vec![], vec![]).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[test]
    fn delete_table_removes_catalog_row() {
        let store = Store::open_memory().unwrap();
        create_table(&store, "T", pk_only_schema(), pk_attr(), vec![], vec![]).unwrap();
        delete_table(&store, "T").unwrap();
        assert!(describe_table(&store, "T").is_err());
    }

    #[test]
    fn list_tables_is_lexicographic_and_paginated() {
        let store = Store::open_memory().unwrap();
        for name in ["B", "A", "C"] {
            create_table(&store, name, pk_only_schema(), pk_attr(), vec![], vec![]).unwrap();
        }
        let (page, cursor) = list_tables(&store, None, 2).unwrap();
        assert_eq!(page, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(cursor.as_deref(), Some("B"));
        let (page2, cursor2) = list_tables(&store, cursor.as_deref(), 2).unwrap();
        assert_eq!(page2, vec!["C".to_string()]);
        assert!(cursor2.is_none());
    }

    #[test]
    fn tag_resource_enforces_limits() {
        let store = Store::open_memory().unwrap();
        create_table(&store, "T", pk_only_schema(), pk_attr(), vec![], vec![]).unwrap();
        let long_key = "k".repeat(200);
        let mut tags = std::collections::BTreeMap::new();
        tags.insert(long_key, "v".to_string());
        let err = tag_resource(&store, "T", tags).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[test]
    fn ttl_enable_twice_fails_validation() {
        let store = Store::open_memory().unwrap();
        create_table(&store, "T", pk_only_schema(), pk_attr(), vec![], vec![]).unwrap();
        update_ttl(&store, "T", true, Some("ttl".into())).unwrap();
        let err = update_ttl(&store, "T", true, Some("ttl".into())).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}

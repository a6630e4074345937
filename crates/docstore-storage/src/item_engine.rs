//! Item-level CRUD: `PutItem`/`GetItem`/`UpdateItem`/`DeleteItem` (§4.4).
//!
//! Every write here recomputes secondary index membership in the same SQL
//! transaction as the base row write, via [`crate::index_maintain`]: delete
//! whatever row used to exist for the item's key on each index, then insert
//! whatever [`plan_index_rows`] says should exist now.

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use docstore_codec::collation::{collation_string, sort_key_numeric};
use docstore_core::{AttributeValue, Item, Key, TableDescription};
use docstore_query::{apply_update, eval_condition, Cond, ExprContext, NameRef, ProjectionExpr, Tristate, UpdateExpr};

use crate::catalog::{bump_item_count, load_definition};
use crate::error::{CancellationReason, Result, StorageError};
use crate::index_maintain::plan_index_rows;
use crate::schema::{self, quote_ident};
use crate::store::Store;

/// Which attributes of the affected item a write operation should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnValues {
    #[default]
    None,
    AllOld,
    AllNew,
    UpdatedOld,
    UpdatedNew,
}

/// The outcome of a write operation: the requested attributes, or nothing.
#[derive(Debug, Clone, Default)]
pub struct ItemResult(pub Option<Item>);

fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

pub(crate) fn key_collation(def: &TableDescription, key: &Key) -> Result<(String, String)> {
    let pk_coll = collation_string(&key.partition)?;
    let sk_coll = match (&def.key_schema.range, &key.sort) {
        (Some(_), Some(sort)) => collation_string(sort)?,
        (None, None) => String::new(),
        _ => return Err(StorageError::validation("key does not match the table's key schema")),
    };
    Ok((pk_coll, sk_coll))
}

pub(crate) fn key_of(def: &TableDescription, item: &Item) -> Result<Key> {
    let partition = item
        .get(&def.key_schema.hash)
        .cloned()
        .ok_or_else(|| StorageError::validation(format!("item is missing hash key attribute {}", def.key_schema.hash)))?;
    let sort = match &def.key_schema.range {
        Some(range_name) => Some(
            item.get(range_name)
                .cloned()
                .ok_or_else(|| StorageError::validation(format!("item is missing range key attribute {range_name}")))?,
        ),
        None => None,
    };
    Ok(Key { partition, sort })
}

fn validate_key_types(def: &TableDescription, key: &Key) -> Result<()> {
    if !key.partition.is_key_type() {
        return Err(StorageError::validation("hash key value must be S, N, or B"));
    }
    if let Some(expected) = def.attribute_type(&def.key_schema.hash) {
        if !expected.matches(key.partition.value_type()) {
            return Err(StorageError::validation("hash key value type does not match attribute definition"));
        }
    }
    if let (Some(range_name), Some(sort)) = (&def.key_schema.range, &key.sort) {
        if !sort.is_key_type() {
            return Err(StorageError::validation("range key value must be S, N, or B"));
        }
        if let Some(expected) = def.attribute_type(range_name) {
            if !expected.matches(sort.value_type()) {
                return Err(StorageError::validation("range key value type does not match attribute definition"));
            }
        }
    }
    Ok(())
}

/// Reads the live (non-expired) row for `key`, or `None` if absent or
/// expired. Does not itself trigger the TTL sweep -- callers that read do.
pub(crate) fn fetch_row(conn: &Connection, table: &str, pk_coll: &str, sk_coll: &str) -> Result<Option<(Item, Option<i64>)>> {
    let item_table = quote_ident(&schema::item_table_name(table));
    let row: Option<(String, Option<i64>)> = conn
        .query_row(
            &format!("SELECT item_json, ttl_epoch FROM {item_table} WHERE pk_coll = ?1 AND sk_coll = ?2"),
            params![pk_coll, sk_coll],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((json, ttl_epoch)) = row else {
        return Ok(None);
    };
    if let Some(ttl) = ttl_epoch {
        if ttl <= now_epoch() {
            return Ok(None);
        }
    }
    Ok(Some((docstore_codec::item_from_json_string(&json)?, ttl_epoch)))
}

/// Best-effort background sweep trigger: a read that observed at least one
/// expired-but-present row enqueues the actual deletion via
/// [`crate::ttl::spawn_sweep`]. Kept here as the single call site every read
/// path funnels through.
pub(crate) fn maybe_trigger_sweep(store: &Store, table: &str, def: &TableDescription, saw_expired: bool) {
    if saw_expired && def.ttl.is_enabled() {
        crate::ttl::spawn_sweep(store, table.to_string());
    }
}

fn write_base_row(
    conn: &Connection,
    table: &str,
    pk_coll: &str,
    sk_coll: &str,
    item: &Item,
    def: &TableDescription,
) -> Result<()> {
    let item_table = quote_ident(&schema::item_table_name(table));
    let pk_raw = docstore_codec::item_to_json_string(&single(&def.key_schema.hash, item)?);
    let sk_raw = match &def.key_schema.range {
        Some(range_name) => Some(docstore_codec::item_to_json_string(&single(range_name, item)?)),
        None => None,
    };
    let sk_num = match (&def.key_schema.range, item.get(def.key_schema.range.as_deref().unwrap_or_default())) {
        (Some(_), Some(AttributeValue::N(n))) => sort_key_numeric(n),
        _ => None,
    };
    let ttl_epoch = ttl_epoch_for(def, item);
    let item_json = docstore_codec::item_to_json_string(item);

    conn.execute(
        &format!(
            "INSERT INTO {item_table} (pk_coll, sk_coll, pk_raw, sk_raw, sk_num, item_json, ttl_epoch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (pk_coll, sk_coll) DO UPDATE SET
                pk_raw = excluded.pk_raw, sk_raw = excluded.sk_raw, sk_num = excluded.sk_num,
                item_json = excluded.item_json, ttl_epoch = excluded.ttl_epoch"
        ),
        params![pk_coll, sk_coll, pk_raw, sk_raw, sk_num, item_json, ttl_epoch],
    )?;
    Ok(())
}

fn single(name: &str, item: &Item) -> Result<Item> {
    let value = item.get(name).cloned().ok_or_else(|| StorageError::validation(format!("missing key attribute {name}")))?;
    let mut i = Item::new();
    i.insert(name.to_string(), value);
    Ok(i)
}

fn ttl_epoch_for(def: &TableDescription, item: &Item) -> Option<i64> {
    let attr = def.ttl.attribute_name()?;
    match item.get(attr) {
        Some(AttributeValue::N(n)) => n.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

fn delete_base_row(conn: &Connection, table: &str, pk_coll: &str, sk_coll: &str) -> Result<()> {
    let item_table = quote_ident(&schema::item_table_name(table));
    conn.execute(&format!("DELETE FROM {item_table} WHERE pk_coll = ?1 AND sk_coll = ?2"), params![pk_coll, sk_coll])?;
    Ok(())
}

/// Deletes every index row keyed by the base item's key, then inserts the
/// rows `plan_index_rows` computes for the new item (or none, on delete).
fn maintain_indexes(conn: &Connection, table: &str, def: &TableDescription, tpk_coll: &str, tsk_coll: &str, item: Option<&Item>) -> Result<()> {
    let plans = plan_index_rows(def, item)?;
    for plan in plans {
        let index_table = quote_ident(&schema::index_table_name(table, &plan.index_name));
        conn.execute(&format!("DELETE FROM {index_table} WHERE tpk_coll = ?1 AND tsk_coll = ?2"), params![tpk_coll, tsk_coll])?;
        if let Some(row) = plan.row {
            let ttl_epoch = item.and_then(|it| ttl_epoch_for(def, it));
            let item_json = item.map(docstore_codec::item_to_json_string).unwrap_or_default();
            conn.execute(
                &format!(
                    "INSERT INTO {index_table} (ipk_coll, isk_coll, tpk_coll, tsk_coll, ipk_raw, isk_raw, isk_num, item_json, ttl_epoch)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![row.ipk_coll, row.isk_coll, tpk_coll, tsk_coll, row.ipk_raw, row.isk_raw, row.isk_num, item_json, ttl_epoch],
            )?;
        }
    }
    Ok(())
}

fn select_return(old: Option<&Item>, returns: ReturnValues) -> ItemResult {
    match returns {
        ReturnValues::None | ReturnValues::AllNew | ReturnValues::UpdatedNew => ItemResult(None),
        ReturnValues::AllOld | ReturnValues::UpdatedOld => ItemResult(old.cloned()),
    }
}

pub(crate) fn check_condition(
    item: Option<&Item>,
    condition: Option<&Cond>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
) -> Result<bool> {
    let Some(cond) = condition else {
        return Ok(true);
    };
    let empty = Item::new();
    let ctx = ExprContext { names, values };
    let target = item.unwrap_or(&empty);
    Ok(matches!(eval_condition(target, cond, &ctx)?, Tristate::True))
}

/// Builds the `ConditionalCheckFailed` error, attaching the current item
/// when the caller asked for it via `ReturnValuesOnConditionCheckFailure`.
pub(crate) fn condition_failed(item: Option<&Item>, want_old_on_fail: bool) -> StorageError {
    StorageError::ConditionalCheckFailed { item: if want_old_on_fail { item.cloned().map(Box::new) } else { None } }
}

/// Also used by the transaction executor to build a `CancellationReason`.
pub fn cancellation_reason(item: Option<&Item>, want_old_on_fail: bool) -> CancellationReason {
    CancellationReason { condition_failed: true, item: if want_old_on_fail { item.cloned() } else { None } }
}

/// Connection-level `PutItem`, for callers (batch, transaction executor)
/// that already hold the store's lock and drive their own SQL transaction.
/// The store-level [`put_item`] is a thin wrapper that acquires the lock
/// and loads the table definition itself.
#[allow(clippy::too_many_arguments)]
pub fn put_item_conn(
    conn: &Connection,
    table: &str,
    def: &TableDescription,
    item: Item,
    condition: Option<&Cond>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    returns: ReturnValues,
    want_old_on_fail: bool,
) -> Result<ItemResult> {
    let key = key_of(def, &item)?;
    validate_key_types(def, &key)?;
    let (pk_coll, sk_coll) = key_collation(def, &key)?;

    let existing = fetch_row(conn, table, &pk_coll, &sk_coll)?;
    let existing_item = existing.as_ref().map(|(i, _)| i.clone());

    if !check_condition(existing_item.as_ref(), condition, names, values)? {
        return Err(condition_failed(existing_item.as_ref(), want_old_on_fail));
    }

    write_base_row(conn, table, &pk_coll, &sk_coll, &item, def)?;
    maintain_indexes(conn, table, def, &pk_coll, &sk_coll, Some(&item))?;
    if existing_item.is_none() {
        bump_item_count(conn, table, 1)?;
    }

    debug!(table, "item put");
    Ok(select_return(existing_item.as_ref(), returns))
}

#[allow(clippy::too_many_arguments)]
pub fn put_item(
    store: &Store,
    table: &str,
    item: Item,
    condition: Option<&Cond>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    returns: ReturnValues,
    want_old_on_fail: bool,
) -> Result<ItemResult> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    put_item_conn(&conn, table, &def, item, condition, names, values, returns, want_old_on_fail)
}

pub fn get_item(store: &Store, table: &str, key: &Key, projection: Option<&ProjectionExpr>) -> Result<Option<Item>> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    validate_key_types(&def, key)?;
    let (pk_coll, sk_coll) = key_collation(&def, key)?;

    let item_table = quote_ident(&schema::item_table_name(table));
    let saw_expired: bool = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {item_table} WHERE pk_coll = ?1 AND sk_coll = ?2 AND ttl_epoch IS NOT NULL AND ttl_epoch <= ?3"),
            params![pk_coll, sk_coll, now_epoch()],
            |r| r.get::<_, i64>(0),
        )
        .unwrap_or(0)
        > 0;

    let row = fetch_row(&conn, table, &pk_coll, &sk_coll)?;
    drop(conn);
    maybe_trigger_sweep(store, table, &def, saw_expired);

    let Some((item, _)) = row else {
        return Ok(None);
    };
    match projection {
        Some(proj) => Ok(Some(apply_projection_owned(&item, proj)?)),
        None => Ok(Some(item)),
    }
}

fn apply_projection_owned(item: &Item, proj: &ProjectionExpr) -> Result<Item> {
    let ctx = ExprContext::empty();
    Ok(docstore_query::apply_projection(item, proj, &ctx)?)
}

#[allow(clippy::too_many_arguments)]
pub fn delete_item_conn(
    conn: &Connection,
    table: &str,
    def: &TableDescription,
    key: &Key,
    condition: Option<&Cond>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    returns: ReturnValues,
    want_old_on_fail: bool,
) -> Result<ItemResult> {
    validate_key_types(def, key)?;
    let (pk_coll, sk_coll) = key_collation(def, key)?;

    let existing = fetch_row(conn, table, &pk_coll, &sk_coll)?;
    let existing_item = existing.as_ref().map(|(i, _)| i.clone());

    if !check_condition(existing_item.as_ref(), condition, names, values)? {
        return Err(condition_failed(existing_item.as_ref(), want_old_on_fail));
    }

    if existing_item.is_some() {
        delete_base_row(conn, table, &pk_coll, &sk_coll)?;
        maintain_indexes(conn, table, def, &pk_coll, &sk_coll, None)?;
        bump_item_count(conn, table, -1)?;
    }

    debug!(table, "item deleted");
    Ok(select_return(existing_item.as_ref(), returns))
}

pub fn delete_item(
    store: &Store,
    table: &str,
    key: &Key,
    condition: Option<&Cond>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    returns: ReturnValues,
    want_old_on_fail: bool,
) -> Result<ItemResult> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    delete_item_conn(&conn, table, &def, key, condition, names, values, returns, want_old_on_fail)
}

fn resolve_root_name(root: &NameRef, names: &BTreeMap<String, String>) -> Result<String> {
    match root {
        NameRef::Literal(s) => Ok(s.clone()),
        NameRef::Placeholder(p) => {
            names.get(p).cloned().ok_or_else(|| StorageError::validation(format!("unknown name placeholder {p}")))
        }
    }
}

/// Rejects an update expression that targets a key attribute, before any
/// write happens (§4.4: "the update engine inspects the action set").
fn reject_key_mutation(def: &TableDescription, update: &UpdateExpr, names: &BTreeMap<String, String>) -> Result<()> {
    let is_key_attr = |name: &str| name == def.key_schema.hash || def.key_schema.range.as_deref() == Some(name);

    let mut paths = Vec::new();
    for a in &update.set {
        paths.push(&a.target);
    }
    for a in &update.add {
        paths.push(&a.target);
    }
    for a in &update.delete {
        paths.push(&a.target);
    }
    for p in &update.remove {
        paths.push(p);
    }

    for path in paths {
        let Some(root) = path.root() else { continue };
        let name = resolve_root_name(root, names)?;
        if is_key_attr(&name) {
            return Err(StorageError::validation(format!("cannot update key attribute {name}")));
        }
    }
    Ok(())
}

/// The root attribute names touched by an update expression, resolved
/// against `names`. Used to build `UPDATED_OLD`/`UPDATED_NEW`.
fn touched_attributes(update: &UpdateExpr, names: &BTreeMap<String, String>) -> Result<std::collections::BTreeSet<String>> {
    let mut out = std::collections::BTreeSet::new();
    let mut paths = Vec::new();
    for a in &update.set {
        paths.push(&a.target);
    }
    for a in &update.add {
        paths.push(&a.target);
    }
    for a in &update.delete {
        paths.push(&a.target);
    }
    for p in &update.remove {
        paths.push(p);
    }
    for path in paths {
        if let Some(root) = path.root() {
            out.insert(resolve_root_name(root, names)?);
        }
    }
    Ok(out)
}

fn project_attrs(item: &Item, names: &std::collections::BTreeSet<String>) -> Item {
    let mut out = Item::new();
    for name in names {
        if let Some(v) = item.get(name) {
            out.insert(name.clone(), v.clone());
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
pub fn update_item_conn(
    conn: &Connection,
    table: &str,
    def: &TableDescription,
    key: &Key,
    update: &UpdateExpr,
    condition: Option<&Cond>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    returns: ReturnValues,
    want_old_on_fail: bool,
) -> Result<ItemResult> {
    validate_key_types(def, key)?;
    let (pk_coll, sk_coll) = key_collation(def, key)?;

    reject_key_mutation(def, update, names)?;

    let existing = fetch_row(conn, table, &pk_coll, &sk_coll)?;
    let existing_item = existing.as_ref().map(|(i, _)| i.clone());

    if !check_condition(existing_item.as_ref(), condition, names, values)? {
        return Err(condition_failed(existing_item.as_ref(), want_old_on_fail));
    }

    let mut new_item = existing_item.clone().unwrap_or_else(|| {
        let mut i = Item::new();
        i.insert(def.key_schema.hash.clone(), key.partition.clone());
        if let (Some(range_name), Some(sort)) = (&def.key_schema.range, &key.sort) {
            i.insert(range_name.clone(), sort.clone());
        }
        i
    });

    let ctx = ExprContext { names, values };
    apply_update(&mut new_item, update, &ctx)?;

    write_base_row(conn, table, &pk_coll, &sk_coll, &new_item, def)?;
    maintain_indexes(conn, table, def, &pk_coll, &sk_coll, Some(&new_item))?;
    if existing_item.is_none() {
        bump_item_count(conn, table, 1)?;
    }

    debug!(table, "item updated");

    let result = match returns {
        ReturnValues::None => None,
        ReturnValues::AllOld => existing_item.clone(),
        ReturnValues::AllNew => Some(new_item.clone()),
        ReturnValues::UpdatedOld => {
            let touched = touched_attributes(update, names)?;
            existing_item.as_ref().map(|old| project_attrs(old, &touched))
        }
        ReturnValues::UpdatedNew => {
            let touched = touched_attributes(update, names)?;
            Some(project_attrs(&new_item, &touched))
        }
    };
    Ok(ItemResult(result))
}

#[allow(clippy::too_many_arguments)]
pub fn update_item(
    store: &Store,
    table: &str,
    key: &Key,
    update: &UpdateExpr,
    condition: Option<&Cond>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    returns: ReturnValues,
    want_old_on_fail: bool,
) -> Result<ItemResult> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    update_item_conn(&conn, table, &def, key, update, condition, names, values, returns, want_old_on_fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{AttributeDefinition, KeyKind, KeySchemaElement, KeyType};
    use docstore_query::{parse_condition, parse_update};

    fn new_table(store: &Store, name: &str) {
        crate::catalog::create_table(
            store,
            name,
            vec![KeySchemaElement { attribute_name: "PK".into(), kind: KeyKind::Hash }],
            vec![AttributeDefinition { name: "PK".into(), attr_type: KeyType::S }],
            vec![],
            vec![],
        )
        .unwrap();
    }

    fn item_with_pk(pk: &str) -> Item {
        let mut i = Item::new();
        i.insert("PK", AttributeValue::S(pk.into()));
        i
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let mut item = item_with_pk("a");
        item.insert("name", AttributeValue::S("alice".into()));
        put_item(&store, "T", item.clone(), None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let key = Key { partition: AttributeValue::S("a".into()), sort: None };
        let fetched = get_item(&store, "T", &key, None).unwrap();
        assert_eq!(fetched, Some(item));
    }

    #[test]
    fn put_returns_all_old_on_replace() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let mut first = item_with_pk("a");
        first.insert("v", AttributeValue::N("1".into()));
        put_item(&store, "T", first.clone(), None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let mut second = item_with_pk("a");
        second.insert("v", AttributeValue::N("2".into()));
        let result = put_item(&store, "T", second, None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::AllOld, false).unwrap();
        assert_eq!(result.0, Some(first));
    }

    #[test]
    fn put_with_failing_condition_is_rejected() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let cond = parse_condition("attribute_exists(PK)").unwrap();
        let err =
            put_item(&store, "T", item_with_pk("a"), Some(&cond), &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap_err();
        assert!(matches!(err, StorageError::ConditionalCheckFailed { .. }));
    }

    #[test]
    fn put_with_placeholder_condition_honors_expression_attribute_values() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let mut existing = item_with_pk("a");
        existing.insert("v", AttributeValue::N("1".into()));
        put_item(&store, "T", existing, None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let cond = parse_condition("v = :expected").unwrap();
        let values = BTreeMap::from([("expected".to_string(), AttributeValue::N("2".into()))]);
        let err = put_item(&store, "T", item_with_pk("a"), Some(&cond), &BTreeMap::new(), &values, ReturnValues::None, false).unwrap_err();
        assert!(matches!(err, StorageError::ConditionalCheckFailed { .. }));

        let values = BTreeMap::from([("expected".to_string(), AttributeValue::N("1".into()))]);
        put_item(&store, "T", item_with_pk("a"), Some(&cond), &BTreeMap::new(), &values, ReturnValues::None, false).unwrap();
    }

    #[test]
    fn delete_item_is_idempotent_when_absent() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let key = Key { partition: AttributeValue::S("ghost".into()), sort: None };
        let result = delete_item(&store, "T", &key, None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();
        assert_eq!(result.0, None);
    }

    #[test]
    fn delete_with_placeholder_condition_honors_expression_attribute_names() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let mut existing = item_with_pk("a");
        existing.insert("status", AttributeValue::S("archived".into()));
        put_item(&store, "T", existing, None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let cond = parse_condition("#s = :want").unwrap();
        let names = BTreeMap::from([("s".to_string(), "status".to_string())]);
        let values = BTreeMap::from([("want".to_string(), AttributeValue::S("active".into()))]);
        let key = Key { partition: AttributeValue::S("a".into()), sort: None };
        let err = delete_item(&store, "T", &key, Some(&cond), &names, &values, ReturnValues::None, false).unwrap_err();
        assert!(matches!(err, StorageError::ConditionalCheckFailed { .. }));

        let values = BTreeMap::from([("want".to_string(), AttributeValue::S("archived".into()))]);
        delete_item(&store, "T", &key, Some(&cond), &names, &values, ReturnValues::None, false).unwrap();
    }

    #[test]
    fn update_item_creates_item_when_absent() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let update = parse_update("SET #n = :v").unwrap();
        let mut names = BTreeMap::new();
        names.insert("n".to_string(), "name".to_string());
        let mut values = BTreeMap::new();
        values.insert("v".to_string(), AttributeValue::S("bob".into()));
        let key = Key { partition: AttributeValue::S("a".into()), sort: None };

        update_item(&store, "T", &key, &update, None, &names, &values, ReturnValues::AllNew, false).unwrap();
        let fetched = get_item(&store, "T", &key, None).unwrap().unwrap();
        assert_eq!(fetched.get("name"), Some(&AttributeValue::S("bob".into())));
    }

    #[test]
    fn update_item_rejects_key_attribute_mutation() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let update = parse_update("SET PK = :v").unwrap();
        let values = BTreeMap::from([("v".to_string(), AttributeValue::S("other".into()))]);
        let key = Key { partition: AttributeValue::S("a".into()), sort: None };
        let err = update_item(&store, "T", &key, &update, None, &BTreeMap::new(), &values, ReturnValues::None, false).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}

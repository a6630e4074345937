//! Transaction executor: `TransactWriteItems` / `TransactGetItems` (§4.7).
//!
//! Every write action in a `TransactWriteItems` call runs inside one
//! rusqlite transaction, so a failing condition anywhere in the batch rolls
//! every action in it back -- the store is left byte-identical to before the
//! call. A set `ClientRequestToken` short-circuits replay: a cached response
//! is returned without touching the item tables again, and the idempotency
//! cache is never populated for a cancelled call.

use std::collections::{BTreeMap, HashSet};

use docstore_codec::json::{decode_item, encode_item};
use docstore_core::{AttributeValue, Item, Key, TableDescription};
use docstore_query::{Cond, UpdateExpr};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::load_definition;
use crate::error::{CancellationReason, Result, StorageError};
use crate::item_engine::{self, check_condition, condition_failed, fetch_row, key_collation, key_of, ReturnValues};
use crate::store::Store;

pub const MAX_TRANSACT_WRITE_ACTIONS: usize = 100;
pub const MAX_TRANSACT_GET_ACTIONS: usize = 100;

/// One action of a `TransactWriteItems` request.
#[derive(Debug, Clone)]
pub enum TransactWriteAction {
    Put {
        table: String,
        item: Item,
        condition: Option<Cond>,
        names: BTreeMap<String, String>,
        values: BTreeMap<String, AttributeValue>,
        want_old_on_fail: bool,
    },
    Update {
        table: String,
        key: Key,
        update: UpdateExpr,
        condition: Option<Cond>,
        names: BTreeMap<String, String>,
        values: BTreeMap<String, AttributeValue>,
        want_old_on_fail: bool,
    },
    Delete {
        table: String,
        key: Key,
        condition: Option<Cond>,
        names: BTreeMap<String, String>,
        values: BTreeMap<String, AttributeValue>,
        want_old_on_fail: bool,
    },
    ConditionCheck {
        table: String,
        key: Key,
        condition: Cond,
        names: BTreeMap<String, String>,
        values: BTreeMap<String, AttributeValue>,
        want_old_on_fail: bool,
    },
}

impl TransactWriteAction {
    fn table(&self) -> &str {
        match self {
            Self::Put { table, .. } => table,
            Self::Update { table, .. } => table,
            Self::Delete { table, .. } => table,
            Self::ConditionCheck { table, .. } => table,
        }
    }

    fn key(&self, def: &TableDescription) -> Result<Key> {
        match self {
            Self::Put { item, .. } => key_of(def, item),
            Self::Update { key, .. } | Self::Delete { key, .. } | Self::ConditionCheck { key, .. } => Ok(key.clone()),
        }
    }
}

/// The outcome of a committed `TransactWriteItems` call: one slot per
/// action, holding its `ALL_OLD` capture when the caller asked for one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactWriteResult {
    pub item_results: Vec<Option<Item>>,
}

/// Runs every action of a `TransactWriteItems` call inside one SQL
/// transaction. On any condition failure, none of the actions are applied
/// and `TransactionCanceled` carries one [`CancellationReason`] per action,
/// positionally aligned with the request.
pub fn transact_write_items(
    store: &Store,
    actions: Vec<TransactWriteAction>,
    client_request_token: Option<&str>,
) -> Result<TransactWriteResult> {
    if actions.is_empty() {
        return Err(StorageError::validation("TransactWriteItems requires at least one action"));
    }
    if actions.len() > MAX_TRANSACT_WRITE_ACTIONS {
        return Err(StorageError::validation(format!(
            "Too many items: TransactWriteItems accepts at most {MAX_TRANSACT_WRITE_ACTIONS} actions"
        )));
    }

    let mut conn = store.lock_conn()?;

    if let Some(token) = client_request_token {
        if let Some(cached) = load_idempotent_response(&conn, token)? {
            debug!(token, "transact write replayed from idempotency cache");
            return Ok(cached);
        }
    }

    let mut defs: BTreeMap<String, TableDescription> = BTreeMap::new();
    let mut fingerprints = HashSet::new();
    for action in &actions {
        if !defs.contains_key(action.table()) {
            defs.insert(action.table().to_string(), load_definition(&conn, action.table())?);
        }
        let def = &defs[action.table()];
        let key = action.key(def)?;
        let (pk_coll, sk_coll) = key_collation(def, &key)?;
        if !fingerprints.insert((action.table().to_string(), pk_coll, sk_coll)) {
            return Err(StorageError::validation("TransactWriteItems cannot target the same item twice"));
        }
    }

    let tx = conn.transaction()?;
    let mut reasons = Vec::with_capacity(actions.len());
    let mut results = Vec::with_capacity(actions.len());
    let mut any_failed = false;

    for action in &actions {
        let def = &defs[action.table()];
        match apply_write_action(&tx, action, def) {
            Ok(item) => {
                reasons.push(CancellationReason::default());
                results.push(item);
            }
            Err(StorageError::ConditionalCheckFailed { item }) => {
                any_failed = true;
                reasons.push(CancellationReason { condition_failed: true, item: item.map(|b| *b) });
                results.push(None);
            }
            Err(other) => return Err(other),
        }
    }

    if any_failed {
        drop(tx);
        return Err(StorageError::TransactionCanceled { reasons });
    }

    let response = TransactWriteResult { item_results: results };
    if let Some(token) = client_request_token {
        store_idempotent_response(&tx, token, &response)?;
    }
    tx.commit()?;
    info!(actions = actions.len(), "transact write committed");
    Ok(response)
}

fn apply_write_action(conn: &Connection, action: &TransactWriteAction, def: &TableDescription) -> Result<Option<Item>> {
    match action {
        TransactWriteAction::Put { table, item, condition, names, values, want_old_on_fail } => {
            let result = item_engine::put_item_conn(
                conn,
                table,
                def,
                item.clone(),
                condition.as_ref(),
                names,
                values,
                ReturnValues::AllOld,
                *want_old_on_fail,
            )?;
            Ok(result.0)
        }
        TransactWriteAction::Update { table, key, update, condition, names, values, want_old_on_fail } => {
            let result = item_engine::update_item_conn(
                conn,
                table,
                def,
                key,
                update,
                condition.as_ref(),
                names,
                values,
                ReturnValues::AllOld,
                *want_old_on_fail,
            )?;
            Ok(result.0)
        }
        TransactWriteAction::Delete { table, key, condition, names, values, want_old_on_fail } => {
            let result =
                item_engine::delete_item_conn(conn, table, def, key, condition.as_ref(), names, values, ReturnValues::AllOld, *want_old_on_fail)?;
            Ok(result.0)
        }
        TransactWriteAction::ConditionCheck { table: _, key, condition, names, values, want_old_on_fail } => {
            let (pk_coll, sk_coll) = key_collation(def, key)?;
            let table_name = def.name.as_str();
            let existing = fetch_row(conn, table_name, &pk_coll, &sk_coll)?;
            let existing_item = existing.map(|(item, _)| item);
            if !check_condition(existing_item.as_ref(), Some(condition), names, values)? {
                return Err(condition_failed(existing_item.as_ref(), *want_old_on_fail));
            }
            Ok(None)
        }
    }
}

/// One get of a `TransactGetItems` request.
#[derive(Debug, Clone)]
pub struct TransactGetAction {
    pub table: String,
    pub key: Key,
}

/// Reads every requested key in one pass under the store's lock, the
/// emulator's stand-in for a consistent snapshot read transaction.
/// TTL-expired entries read back as `None`, exactly like `GetItem`.
pub fn transact_get_items(store: &Store, gets: Vec<TransactGetAction>) -> Result<Vec<Option<Item>>> {
    if gets.is_empty() {
        return Err(StorageError::validation("TransactGetItems requires at least one item"));
    }
    if gets.len() > MAX_TRANSACT_GET_ACTIONS {
        return Err(StorageError::validation(format!(
            "Too many items: TransactGetItems accepts at most {MAX_TRANSACT_GET_ACTIONS} items"
        )));
    }

    let mut out = Vec::with_capacity(gets.len());
    for get in gets {
        out.push(item_engine::get_item(store, &get.table, &get.key, None)?);
    }
    Ok(out)
}

fn idempotent_response_json(response: &TransactWriteResult) -> String {
    let items: Vec<Value> = response
        .item_results
        .iter()
        .map(|item| item.as_ref().map(encode_item).unwrap_or(Value::Null))
        .collect();
    serde_json::json!({ "item_results": items }).to_string()
}

fn idempotent_response_from_json(s: &str) -> Result<TransactWriteResult> {
    let value: Value = serde_json::from_str(s)?;
    let items = value
        .get("item_results")
        .and_then(Value::as_array)
        .ok_or_else(|| StorageError::Internal("malformed idempotency cache entry".to_string()))?;
    let mut item_results = Vec::with_capacity(items.len());
    for item in items {
        item_results.push(if item.is_null() { None } else { Some(decode_item(item)?) });
    }
    Ok(TransactWriteResult { item_results })
}

fn load_idempotent_response(conn: &Connection, token: &str) -> Result<Option<TransactWriteResult>> {
    let row: Option<String> =
        conn.query_row("SELECT response_json FROM idempotency WHERE token = ?1", params![token], |r| r.get(0)).optional()?;
    row.map(|json| idempotent_response_from_json(&json)).transpose()
}

fn store_idempotent_response(conn: &Connection, token: &str, response: &TransactWriteResult) -> Result<()> {
    let json = idempotent_response_json(response);
    conn.execute(
        "INSERT INTO idempotency (token, response_json, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (token) DO NOTHING",
        params![token, json, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{AttributeDefinition, AttributeValue, KeyKind, KeySchemaElement, KeyType};
    use docstore_query::parse_condition;

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

    fn item_with(pk: &str, name: &str) -> Item {
        let mut i = Item::new();
        i.insert("PK", AttributeValue::S(pk.into()));
        i.insert("name", AttributeValue::S(name.into()));
        i
    }

    #[test]
    fn mixed_conditions_cancel_the_whole_transaction() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        item_engine::put_item(&store, "T", item_with("1", "Alice"), None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let cond = parse_condition("attribute_not_exists(PK)").unwrap();
        let actions = vec![
            TransactWriteAction::Put {
                table: "T".into(),
                item: item_with("1", "New Alice"),
                condition: Some(cond),
                names: BTreeMap::new(),
                values: BTreeMap::new(),
                want_old_on_fail: false,
            },
            TransactWriteAction::Put {
                table: "T".into(),
                item: item_with("2", "Bob"),
                condition: None,
                names: BTreeMap::new(),
                values: BTreeMap::new(),
                want_old_on_fail: false,
            },
        ];
        let err = transact_write_items(&store, actions, None).unwrap_err();
        match err {
            StorageError::TransactionCanceled { reasons } => {
                assert!(reasons[0].condition_failed);
                assert!(!reasons[1].condition_failed);
            }
            other => panic!("expected TransactionCanceled, got {other:?}"),
        }

        let key1 = Key { partition: AttributeValue::S("1".into()), sort: None };
        let key2 = Key { partition: AttributeValue::S("2".into()), sort: None };
        assert_eq!(item_engine::get_item(&store, "T", &key1, None).unwrap().unwrap().get("name"), Some(&AttributeValue::S("Alice".into())));
        assert!(item_engine::get_item(&store, "T", &key2, None).unwrap().is_none());
    }

    #[test]
    fn rejects_same_key_targeted_twice() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let key = Key { partition: AttributeValue::S("1".into()), sort: None };
        let actions = vec![
            TransactWriteAction::Put {
                table: "T".into(),
                item: item_with("1", "Alice"),
                condition: None,
                names: BTreeMap::new(),
                values: BTreeMap::new(),
                want_old_on_fail: false,
            },
            TransactWriteAction::Delete {
                table: "T".into(),
                key,
                condition: None,
                names: BTreeMap::new(),
                values: BTreeMap::new(),
                want_old_on_fail: false,
            },
        ];
        let err = transact_write_items(&store, actions, None).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[test]
    fn idempotency_token_replays_cached_response_without_re_executing() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");

        let actions = vec![TransactWriteAction::Put {
            table: "T".into(),
            item: item_with("1", "first"),
            condition: None,
            names: BTreeMap::new(),
            values: BTreeMap::new(),
            want_old_on_fail: false,
        }];
        let first = transact_write_items(&store, actions, Some("token-1")).unwrap();

        item_engine::put_item(&store, "T", item_with("1", "modified"), None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false)
            .unwrap();

        let replay_actions = vec![TransactWriteAction::Put {
            table: "T".into(),
            item: item_with("1", "first"),
            condition: None,
            names: BTreeMap::new(),
            values: BTreeMap::new(),
            want_old_on_fail: false,
        }];
        let replayed = transact_write_items(&store, replay_actions, Some("token-1")).unwrap();
        assert_eq!(first, replayed);

        let key = Key { partition: AttributeValue::S("1".into()), sort: None };
        assert_eq!(item_engine::get_item(&store, "T", &key, None).unwrap().unwrap().get("name"), Some(&AttributeValue::S("modified".into())));
    }

    #[test]
    fn condition_check_action_honors_expression_placeholders() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        item_engine::put_item(&store, "T", item_with("1", "Alice"), None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let cond = parse_condition("#n = :expected").unwrap();
        let names = BTreeMap::from([("n".to_string(), "name".to_string())]);
        let values = BTreeMap::from([("expected".to_string(), AttributeValue::S("Bob".into()))]);
        let key = Key { partition: AttributeValue::S("1".into()), sort: None };
        let actions = vec![TransactWriteAction::ConditionCheck {
            table: "T".into(),
            key,
            condition: cond,
            names,
            values,
            want_old_on_fail: false,
        }];
        let err = transact_write_items(&store, actions, None).unwrap_err();
        assert!(matches!(err, StorageError::TransactionCanceled { .. }));
    }

    #[test]
    fn put_action_honors_expression_placeholders_in_condition() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        item_engine::put_item(&store, "T", item_with("1", "Alice"), None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let cond = parse_condition("#n = :expected").unwrap();
        let names = BTreeMap::from([("n".to_string(), "name".to_string())]);
        let values = BTreeMap::from([("expected".to_string(), AttributeValue::S("Alice".into()))]);
        let actions = vec![TransactWriteAction::Put {
            table: "T".into(),
            item: item_with("1", "Alice Updated"),
            condition: Some(cond),
            names,
            values,
            want_old_on_fail: false,
        }];
        transact_write_items(&store, actions, None).unwrap();

        let key = Key { partition: AttributeValue::S("1".into()), sort: None };
        assert_eq!(
            item_engine::get_item(&store, "T", &key, None).unwrap().unwrap().get("name"),
            Some(&AttributeValue::S("Alice Updated".into()))
        );
    }

    #[test]
    fn transact_get_reads_a_consistent_batch() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        item_engine::put_item(&store, "T", item_with("1", "Alice"), None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false).unwrap();

        let gets = vec![
            TransactGetAction { table: "T".into(), key: Key { partition: AttributeValue::S("1".into()), sort: None } },
            TransactGetAction { table: "T".into(), key: Key { partition: AttributeValue::S("2".into()), sort: None } },
        ];
        let results = transact_get_items(&store, gets).unwrap();
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    #[test]
    fn rejects_over_limit_write_batch() {
        let store = Store::open_memory().unwrap();
        new_table(&store, "T");
        let actions = (0..101)
            .map(|i| TransactWriteAction::Put {
                table: "T".into(),
                item: item_with(&format!("{i}"), "x"),
                condition: None,
                names: BTreeMap::new(),
                values: BTreeMap::new(),
                want_old_on_fail: false,
            })
            .collect();
        let err = transact_write_items(&store, actions, None).unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }
}

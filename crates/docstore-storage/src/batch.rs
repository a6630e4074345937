//! `BatchGetItem` / `BatchWriteItem` (§4.6): size and duplicate validation,
//! then per-action dispatch to the item engine. `BatchWriteItem` runs every
//! action inside one SQL transaction so a mid-batch SQL failure leaves the
//! store untouched, but (matching the reference emulator's observed
//! behavior) a single item's validation error fails the whole call rather
//! than producing `UnprocessedItems` -- see the Open Question in §9.

use std::collections::{BTreeMap, HashSet};

use docstore_core::{Item, Key};
use docstore_query::ProjectionExpr;

use crate::catalog::load_definition;
use crate::error::{Result, StorageError};
use crate::item_engine::{self, key_collation, key_of, ReturnValues};
use crate::store::Store;

pub const MAX_BATCH_GET_KEYS: usize = 100;
pub const MAX_BATCH_WRITE_ACTIONS: usize = 25;

/// One table's share of a `BatchGetItem` request.
#[derive(Debug, Clone)]
pub struct BatchGetTableRequest {
    pub table: String,
    pub keys: Vec<Key>,
    pub projection: Option<ProjectionExpr>,
}

/// Reads every requested key across every table. Missing items are simply
/// absent from their table's result vector, in request order.
pub fn batch_get_item(store: &Store, requests: Vec<BatchGetTableRequest>) -> Result<BTreeMap<String, Vec<Item>>> {
    if requests.is_empty() || requests.iter().all(|r| r.keys.is_empty()) {
        return Err(StorageError::validation("BatchGetItem requires at least one key"));
    }
    let total: usize = requests.iter().map(|r| r.keys.len()).sum();
    if total > MAX_BATCH_GET_KEYS {
        return Err(StorageError::validation(format!(
            "Too many items: BatchGetItem accepts at most {MAX_BATCH_GET_KEYS} keys across all tables"
        )));
    }

    {
        let conn = store.lock_conn()?;
        for req in &requests {
            let def = load_definition(&conn, &req.table)?;
            let mut seen = HashSet::new();
            for key in &req.keys {
                let (pk, sk) = key_collation(&def, key)?;
                if !seen.insert((pk, sk)) {
                    return Err(StorageError::validation(format!("duplicate key requested for table {}", req.table)));
                }
            }
        }
    }

    let mut responses = BTreeMap::new();
    for req in requests {
        let mut items = Vec::with_capacity(req.keys.len());
        for key in &req.keys {
            if let Some(item) = item_engine::get_item(store, &req.table, key, req.projection.as_ref())? {
                items.push(item);
            }
        }
        responses.insert(req.table, items);
    }
    Ok(responses)
}

/// One action of a `BatchWriteItem` request. Conditional expressions are
/// not allowed here (§4.6).
#[derive(Debug, Clone)]
pub enum BatchWriteAction {
    Put { table: String, item: Item },
    Delete { table: String, key: Key },
}

impl BatchWriteAction {
    fn table(&self) -> &str {
        match self {
            Self::Put { table, .. } | Self::Delete { table, .. } => table,
        }
    }
}

/// Validates and executes a `BatchWriteItem` call. All actions run inside
/// one SQL transaction; any SQL-level failure rolls the whole batch back,
/// but per-item validation failures (not this engine's concept, since
/// conditions are disallowed here) are not expected in normal operation.
pub fn batch_write_item(store: &Store, actions: Vec<BatchWriteAction>) -> Result<()> {
    if actions.is_empty() {
        return Err(StorageError::validation("BatchWriteItem requires at least one action"));
    }
    if actions.len() > MAX_BATCH_WRITE_ACTIONS {
        return Err(StorageError::validation(format!(
            "Too many items: BatchWriteItem accepts at most {MAX_BATCH_WRITE_ACTIONS} actions"
        )));
    }

    let mut conn = store.lock_conn()?;
    let mut defs = BTreeMap::new();
    let mut seen = HashSet::new();
    for action in &actions {
        if !defs.contains_key(action.table()) {
            defs.insert(action.table().to_string(), load_definition(&conn, action.table())?);
        }
        let def = &defs[action.table()];
        let key = match action {
            BatchWriteAction::Put { item, .. } => key_of(def, item)?,
            BatchWriteAction::Delete { key, .. } => key.clone(),
        };
        let (pk, sk) = key_collation(def, &key)?;
        if !seen.insert((action.table().to_string(), pk, sk)) {
            return Err(StorageError::validation(
                "BatchWriteItem cannot put and/or delete the same item twice in one call",
            ));
        }
    }

    let tx = conn.transaction()?;
    for action in actions {
        let def = &defs[action.table()];
        match action {
            BatchWriteAction::Put { table, item } => {
                item_engine::put_item_conn(&tx, &table, def, item, None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false)?;
            }
            BatchWriteAction::Delete { table, key } => {
                item_engine::delete_item_conn(&tx, &table, def, &key, None, &BTreeMap::new(), &BTreeMap::new(), ReturnValues::None, false)?;
            }
        }
    }
    tx.commit()?;
    Ok(())
}

//! TTL sweeper (§4.8): every read path filters out expired rows at query
//! time. When a read observes at least one row past its TTL, it calls
//! [`spawn_sweep`] to clean the table up so later scans and the item count
//! don't keep tripping over dead rows.
//!
//! The reference engine models this as a detached background task; this
//! store has no async runtime in its dependency stack, so the sweep runs
//! inline under the store's own connection mutex instead of on a spawned
//! thread. The caller-visible contract is identical either way: best-effort,
//! never reported, and never able to fail the read that triggered it.

use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::catalog::{bump_item_count, load_definition};
use crate::schema::{self, quote_ident};
use crate::store::Store;

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Deletes every expired base and index row on `table`, decrementing the
/// tracked item count accordingly. Swallows its own errors -- a failed
/// sweep is retried on the next read that notices expired rows.
pub fn spawn_sweep(store: &Store, table: String) {
    if let Err(e) = sweep_now(store, &table) {
        warn!(table, error = %e, "ttl sweep failed, will retry on next read");
    }
}

fn sweep_now(store: &Store, table: &str) -> crate::error::Result<()> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    let now = now_epoch();

    let deleted = delete_expired(&conn, &schema::item_table_name(table), now)?;
    for idx in def.global_secondary_indexes.iter().chain(def.local_secondary_indexes.iter()) {
        delete_expired(&conn, &schema::index_table_name(table, &idx.name), now)?;
    }
    if deleted > 0 {
        bump_item_count(&conn, table, -(deleted as i64))?;
        debug!(table, deleted, "ttl sweep removed expired rows");
    }
    Ok(())
}

fn delete_expired(conn: &Connection, physical_table: &str, now: i64) -> crate::error::Result<usize> {
    let name = quote_ident(physical_table);
    let n = conn.execute(&format!("DELETE FROM {name} WHERE ttl_epoch IS NOT NULL AND ttl_epoch <= ?1"), params![now])?;
    Ok(n)
}

//! The storage engine: a single SQLite database standing in for a managed
//! key-value store's table catalog and per-table data (§2-§5).
//!
//! [`Store`] owns the connection. Every operation module below takes a
//! `&Store` (or, for multi-action operations that need one SQL transaction,
//! a `&Connection`/`&Transaction` already held by a caller further up the
//! stack) and the table name, and returns [`error::StorageError`] on
//! failure. Nothing in this crate constructs a wire error code; that
//! translation happens in the facade crate above it.

pub mod batch;
pub mod catalog;
pub mod error;
pub mod index_maintain;
pub mod item_engine;
pub mod pagination;
pub mod query_engine;
pub mod schema;
pub mod store;
pub mod transact;
pub mod ttl;

pub use batch::{batch_get_item, batch_write_item, BatchGetTableRequest, BatchWriteAction};
pub use error::{CancellationReason, Result, StorageError};
pub use item_engine::{delete_item, get_item, put_item, update_item, ItemResult, ReturnValues};
pub use query_engine::{query, scan, PageResult};
pub use store::{Store, StoreMode};
pub use transact::{
    transact_get_items, transact_write_items, TransactGetAction, TransactWriteAction, TransactWriteResult,
};

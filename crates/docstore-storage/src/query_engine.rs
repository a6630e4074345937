//! `Query` and `Scan` execution (§4.5).
//!
//! Both walk an ordered SQL cursor over a base or index table's
//! `(pk_coll, sk_coll)` B-tree order -- the physical ordering the schema's
//! own primary key/unique constraint already gives for free -- applying the
//! key condition (Query only), the TTL filter, the expression filter, and
//! the projection in that order, exactly as laid out in the execution
//! steps.

use std::collections::BTreeMap;

use rusqlite::{params, params_from_iter, Row};

use docstore_codec::collation::collation_string;
use docstore_core::{AttributeValue, Item, SecondaryIndexDef, TableDescription};
use docstore_query::{eval_condition, Cond, CmpOp, ExprContext, KeyCondition, ProjectionExpr, SortKeyCondition, Tristate};

use crate::catalog::load_definition;
use crate::error::{Result, StorageError};
use crate::item_engine::maybe_trigger_sweep;
use crate::pagination::{last_evaluated_key, resume_point};
use crate::schema::{self, quote_ident};
use crate::store::Store;

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Which physical table and column names a request resolves to: the base
/// table, or one secondary index's auxiliary table.
struct Target<'a> {
    physical_table: String,
    pk_col: &'a str,
    sk_col: &'a str,
    index: Option<&'a SecondaryIndexDef>,
}

fn resolve_target<'a>(table: &str, def: &'a TableDescription, index_name: Option<&str>) -> Result<Target<'a>> {
    match index_name {
        None => Ok(Target { physical_table: schema::item_table_name(table), pk_col: "pk_coll", sk_col: "sk_coll", index: None }),
        Some(name) => {
            let index = def.find_index(name).ok_or_else(|| StorageError::not_found("index", name))?;
            Ok(Target { physical_table: schema::index_table_name(table, name), pk_col: "ipk_coll", sk_col: "isk_coll", index: Some(index) })
        }
    }
}

fn resolve_value<'a>(values: &'a BTreeMap<String, AttributeValue>, placeholder: &str) -> Result<&'a AttributeValue> {
    values.get(placeholder).ok_or_else(|| StorageError::validation(format!("unknown value placeholder {placeholder}")))
}

/// Builds the SQL predicate fragment and bound values for a sort-key
/// condition, expressed over collation strings so the B-tree's own string
/// order does the comparison work.
fn sort_predicate(sk_col: &str, cond: &SortKeyCondition, values: &BTreeMap<String, AttributeValue>) -> Result<(String, Vec<String>)> {
    Ok(match cond {
        SortKeyCondition::Compare(_, op, v) => {
            let coll = collation_string(resolve_value(values, v)?)?;
            let sql_op = match op {
                CmpOp::Eq => "=",
                CmpOp::Ne => "!=",
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
                CmpOp::Gt => ">",
                CmpOp::Ge => ">=",
            };
            (format!("{sk_col} {sql_op} ?"), vec![coll])
        }
        SortKeyCondition::Between(_, lo, hi) => {
            let lo = collation_string(resolve_value(values, lo)?)?;
            let hi = collation_string(resolve_value(values, hi)?)?;
            (format!("{sk_col} BETWEEN ? AND ?"), vec![lo, hi])
        }
        SortKeyCondition::BeginsWith(_, v) => {
            let prefix = collation_string(resolve_value(values, v)?)?;
            let pattern = format!("{prefix}%");
            (format!("{sk_col} LIKE ?"), vec![pattern])
        }
    })
}

/// Which attributes an index row exposes, per its declared projection
/// (§3). Index rows are stored with the full item; this is applied at read
/// time rather than at write time, keeping the write path a single shape.
fn apply_index_projection(item: &Item, def: &TableDescription, index: &SecondaryIndexDef) -> Item {
    use docstore_core::Projection;
    match &index.projection {
        Projection::All => item.clone(),
        Projection::KeysOnly | Projection::Include(_) => {
            let mut out = Item::new();
            let mut keep = |name: &str| {
                if let Some(v) = item.get(name) {
                    out.insert(name.to_string(), v.clone());
                }
            };
            keep(&def.key_schema.hash);
            if let Some(r) = &def.key_schema.range {
                keep(r);
            }
            keep(&index.key_schema.hash);
            if let Some(r) = &index.key_schema.range {
                keep(r);
            }
            if let Projection::Include(extra) = &index.projection {
                for name in extra {
                    keep(name);
                }
            }
            out
        }
    }
}

fn row_item(row: &Row) -> rusqlite::Result<(Item, Option<i64>)> {
    let json: String = row.get("item_json")?;
    let ttl: Option<i64> = row.get("ttl_epoch")?;
    let item = docstore_codec::item_from_json_string(&json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok((item, ttl))
}

/// Outcome of a `Query` or `Scan` call.
#[derive(Debug, Default)]
pub struct PageResult {
    pub items: Vec<Item>,
    pub count: usize,
    pub scanned_count: usize,
    pub last_evaluated_key: Option<Item>,
}

#[allow(clippy::too_many_arguments)]
pub fn query(
    store: &Store,
    table: &str,
    index_name: Option<&str>,
    key_condition: &KeyCondition,
    filter: Option<&Cond>,
    projection: Option<&ProjectionExpr>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    scan_forward: bool,
    limit: Option<usize>,
    exclusive_start_key: Option<&Item>,
    consistent_read: bool,
    select_count: bool,
) -> Result<PageResult> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    let target = resolve_target(table, &def, index_name)?;

    if consistent_read {
        if let Some(index) = target.index {
            if index.kind == docstore_core::IndexKind::Global {
                return Err(StorageError::validation("strongly consistent reads are not supported on global secondary indexes"));
            }
        }
    }

    let pk_value = resolve_value(values, &key_condition.partition_value)?;
    let pk_coll = collation_string(pk_value)?;

    let mut predicate = format!("{} = ?", target.pk_col);
    let mut binds: Vec<String> = vec![pk_coll];

    if let Some(sort_cond) = &key_condition.sort {
        let (frag, mut args) = sort_predicate(target.sk_col, sort_cond, values)?;
        predicate.push_str(" AND ");
        predicate.push_str(&frag);
        binds.append(&mut args);
    }

    predicate.push_str(" AND (ttl_epoch IS NULL OR ttl_epoch > ?)");
    binds.push(now_epoch().to_string());

    if let Some(start) = exclusive_start_key {
        let resume = resume_point(&def, target.index, start)?;
        let (frag, arg) = resume_predicate(&target, &resume, scan_forward);
        predicate.push_str(" AND ");
        predicate.push_str(&frag);
        binds.extend(arg);
    }

    let order = order_by(&target, scan_forward);
    let physical = quote_ident(&target.physical_table);
    let sql = format!("SELECT item_json, ttl_epoch FROM {physical} WHERE {predicate} ORDER BY {order}");

    let saw_expired: bool = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {physical} WHERE {} = ?1 AND ttl_epoch IS NOT NULL AND ttl_epoch <= ?2", target.pk_col),
            params![binds[0], now_epoch()],
            |r| r.get::<_, i64>(0),
        )
        .unwrap_or(0)
        > 0;

    let result = run_cursor(&conn, &sql, &binds, &def, &target, filter, projection, names, values, limit, select_count)?;
    drop(conn);
    maybe_trigger_sweep(store, table, &def, saw_expired);
    Ok(result)
}

#[allow(clippy::too_many_arguments)]
pub fn scan(
    store: &Store,
    table: &str,
    index_name: Option<&str>,
    filter: Option<&Cond>,
    projection: Option<&ProjectionExpr>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    limit: Option<usize>,
    exclusive_start_key: Option<&Item>,
    select_count: bool,
) -> Result<PageResult> {
    let conn = store.lock_conn()?;
    let def = load_definition(&conn, table)?;
    let target = resolve_target(table, &def, index_name)?;

    let mut predicate = "(ttl_epoch IS NULL OR ttl_epoch > ?)".to_string();
    let mut binds: Vec<String> = vec![now_epoch().to_string()];

    if let Some(start) = exclusive_start_key {
        let resume = resume_point(&def, target.index, start)?;
        let (frag, arg) = resume_predicate(&target, &resume, true);
        predicate.push_str(" AND ");
        predicate.push_str(&frag);
        binds.extend(arg);
    }

    let order = order_by(&target, true);
    let physical = quote_ident(&target.physical_table);
    let sql = format!("SELECT item_json, ttl_epoch FROM {physical} WHERE {predicate} ORDER BY {order}");

    let saw_expired: bool = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM {physical} WHERE ttl_epoch IS NOT NULL AND ttl_epoch <= ?1"),
            params![now_epoch()],
            |r| r.get::<_, i64>(0),
        )
        .unwrap_or(0)
        > 0;

    let result = run_cursor(&conn, &sql, &binds, &def, &target, filter, projection, names, values, limit, select_count)?;
    drop(conn);
    maybe_trigger_sweep(store, table, &def, saw_expired);
    Ok(result)
}

/// Orders by `(pk_col, sk_col[, tpk_coll, tsk_coll])` rather than `sk_col`
/// alone: `Query` already pins `pk_col` to a single value via its equality
/// predicate, so including it here is a no-op for `Query`, but `Scan` walks
/// every partition and needs the full tuple to produce the managed store's
/// documented `(pk_coll, sk_coll)` order (§4.5) instead of sorting by
/// sort-key collation irrespective of partition.
fn order_by(target: &Target, forward: bool) -> String {
    let dir = if forward { "ASC" } else { "DESC" };
    match target.index {
        None => format!("{} {dir}, {} {dir}", target.pk_col, target.sk_col),
        Some(_) => format!("{} {dir}, {} {dir}, tpk_coll {dir}, tsk_coll {dir}", target.pk_col, target.sk_col),
    }
}

fn resume_predicate(target: &Target, resume: &crate::pagination::ResumePoint, forward: bool) -> (String, Vec<String>) {
    let op = if forward { ">" } else { "<" };
    match target.index {
        None => (
            format!("({}, {}) {op} (?, ?)", target.pk_col, target.sk_col),
            vec![resume.table_pk_coll.clone(), resume.table_sk_coll.clone()],
        ),
        Some(_) => (
            format!("({}, {}, tpk_coll, tsk_coll) {op} (?, ?, ?, ?)", target.pk_col, target.sk_col),
            vec![
                resume.index_pk_coll.clone().unwrap_or_default(),
                resume.index_sk_coll.clone().unwrap_or_default(),
                resume.table_pk_coll.clone(),
                resume.table_sk_coll.clone(),
            ],
        ),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_cursor(
    conn: &rusqlite::Connection,
    sql: &str,
    binds: &[String],
    def: &TableDescription,
    target: &Target,
    filter: Option<&Cond>,
    projection: Option<&ProjectionExpr>,
    names: &BTreeMap<String, String>,
    values: &BTreeMap<String, AttributeValue>,
    limit: Option<usize>,
    select_count: bool,
) -> Result<PageResult> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(binds.iter()))?;

    let ctx = ExprContext { names, values };
    let mut result = PageResult::default();
    let mut last_key_item: Option<Item> = None;

    while let Some(row) = rows.next()? {
        let (item, _ttl) = row_item(row)?;
        result.scanned_count += 1;

        let item = match target.index {
            Some(index) => apply_index_projection(&item, def, index),
            None => item,
        };

        let passes = match filter {
            Some(cond) => matches!(eval_condition(&item, cond, &ctx)?, Tristate::True),
            None => true,
        };
        if !passes {
            continue;
        }

        let full_item_for_key = item.clone();
        let out_item = if select_count {
            Item::new()
        } else {
            match projection {
                Some(proj) => docstore_query::apply_projection(&item, proj, &ctx)?,
                None => item,
            }
        };

        result.count += 1;
        if !select_count {
            result.items.push(out_item);
        }
        last_key_item = Some(full_item_for_key);

        if let Some(limit) = limit {
            if result.count >= limit {
                if rows.next()?.is_some() {
                    if let Some(last) = &last_key_item {
                        result.last_evaluated_key = Some(last_evaluated_key(def, target.index, last)?);
                    }
                }
                break;
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{AttributeDefinition, AttributeValue as V, KeyKind, KeySchemaElement, KeyType};
    use docstore_query::parse_key_condition;

    fn new_table(store: &Store) {
        crate::catalog::create_table(
            store,
            "T",
            vec![
                KeySchemaElement { attribute_name: "PK".into(), kind: KeyKind::Hash },
                KeySchemaElement { attribute_name: "SK".into(), kind: KeyKind::Range },
            ],
            vec![
                AttributeDefinition { name: "PK".into(), attr_type: KeyType::S },
                AttributeDefinition { name: "SK".into(), attr_type: KeyType::N },
            ],
            vec![],
            vec![],
        )
        .unwrap();
    }

    fn put(store: &Store, pk: &str, sk: &str) {
        let mut item = Item::new();
        item.insert("PK", V::S(pk.into()));
        item.insert("SK", V::N(sk.into()));
        crate::item_engine::put_item(
            store,
            "T",
            item,
            None,
            &BTreeMap::new(),
            &BTreeMap::new(),
            crate::item_engine::ReturnValues::None,
            false,
        )
        .unwrap();
    }

    #[test]
    fn query_orders_numeric_sort_keys_numerically() {
        let store = Store::open_memory().unwrap();
        new_table(&store);
        for sk in ["20", "1", "10", "2"] {
            put(&store, "p", sk);
        }
        let kc = parse_key_condition("PK = :pk").unwrap();
        let values = BTreeMap::from([("pk".to_string(), V::S("p".into()))]);
        let result = query(&store, "T", None, &kc, None, None, &BTreeMap::new(), &values, true, None, None, false, false).unwrap();
        let sks: Vec<String> = result
            .items
            .iter()
            .map(|i| match i.get("SK") {
                Some(V::N(n)) => n.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(sks, vec!["1", "2", "10", "20"]);
    }

    #[test]
    fn query_paginates_with_limit() {
        let store = Store::open_memory().unwrap();
        new_table(&store);
        for sk in ["1", "2", "3", "4"] {
            put(&store, "p", sk);
        }
        let kc = parse_key_condition("PK = :pk").unwrap();
        let values = BTreeMap::from([("pk".to_string(), V::S("p".into()))]);
        let page1 = query(&store, "T", None, &kc, None, None, &BTreeMap::new(), &values, true, Some(2), None, false, false).unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.last_evaluated_key.is_some());

        let page2 = query(
            &store,
            "T",
            None,
            &kc,
            None,
            None,
            &BTreeMap::new(),
            &values,
            true,
            Some(2),
            page1.last_evaluated_key.as_ref(),
            false,
            false,
        )
        .unwrap();
        assert_eq!(page2.items.len(), 2);
        assert!(page2.last_evaluated_key.is_none());
    }

    #[test]
    fn scan_orders_and_paginates_across_partitions() {
        let store = Store::open_memory().unwrap();
        new_table(&store);
        for pk in ["b", "a", "c"] {
            for sk in ["2", "1"] {
                put(&store, pk, sk);
            }
        }

        let page1 = scan(&store, "T", None, None, None, &BTreeMap::new(), &BTreeMap::new(), Some(2), None, false).unwrap();
        assert_eq!(page1.items.len(), 2);
        let page1_pks: Vec<String> =
            page1.items.iter().map(|i| match i.get("PK") { Some(V::S(s)) => s.clone(), _ => String::new() }).collect();
        assert_eq!(page1_pks, vec!["a", "a"]);
        let lek = page1.last_evaluated_key.clone().unwrap();

        let page2 = scan(&store, "T", None, None, None, &BTreeMap::new(), &BTreeMap::new(), Some(2), Some(&lek), false).unwrap();
        let page2_pks: Vec<String> =
            page2.items.iter().map(|i| match i.get("PK") { Some(V::S(s)) => s.clone(), _ => String::new() }).collect();
        assert_eq!(page2_pks, vec!["b", "b"]);

        let page3 = scan(
            &store,
            "T",
            None,
            None,
            None,
            &BTreeMap::new(),
            &BTreeMap::new(),
            Some(2),
            page2.last_evaluated_key.as_ref(),
            false,
        )
        .unwrap();
        let page3_pks: Vec<String> =
            page3.items.iter().map(|i| match i.get("PK") { Some(V::S(s)) => s.clone(), _ => String::new() }).collect();
        assert_eq!(page3_pks, vec!["c", "c"]);
        assert!(page3.last_evaluated_key.is_none());
    }

    #[test]
    fn scan_sweeps_expired_rows_opportunistically() {
        let store = Store::open_memory().unwrap();
        new_table(&store);
        crate::catalog::update_ttl(&store, "T", true, Some("expires".into())).unwrap();

        let mut live = Item::new();
        live.insert("PK", V::S("p".into()));
        live.insert("SK", V::N("1".into()));
        crate::item_engine::put_item(&store, "T", live, None, &BTreeMap::new(), &BTreeMap::new(), crate::item_engine::ReturnValues::None, false)
            .unwrap();

        let mut expired = Item::new();
        expired.insert("PK", V::S("p".into()));
        expired.insert("SK", V::N("2".into()));
        expired.insert("expires", V::N("1".into()));
        crate::item_engine::put_item(
            &store,
            "T",
            expired,
            None,
            &BTreeMap::new(),
            &BTreeMap::new(),
            crate::item_engine::ReturnValues::None,
            false,
        )
        .unwrap();

        let result = scan(&store, "T", None, None, None, &BTreeMap::new(), &BTreeMap::new(), None, None, false).unwrap();
        assert_eq!(result.items.len(), 1);

        let conn = store.lock_conn().unwrap();
        let count: i64 =
            conn.query_row("SELECT item_count FROM tables_catalog WHERE name = 'T'", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1, "opportunistic sweep triggered by scan should drop the expired row's count");
    }

    #[test]
    fn scan_counts_scanned_and_returned_separately() {
        let store = Store::open_memory().unwrap();
        new_table(&store);
        put(&store, "p", "1");
        put(&store, "p", "2");
        let filter = docstore_query::parse_condition("SK = :one").unwrap();
        let values = BTreeMap::from([("one".to_string(), V::N("1".into()))]);
        let result = scan(&store, "T", None, Some(&filter), None, &BTreeMap::new(), &values, None, None, false).unwrap();
        assert_eq!(result.scanned_count, 2);
        assert_eq!(result.count, 1);
    }
}

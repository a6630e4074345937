//! Secondary index maintenance as a pure function (§9): given a table's
//! index definitions, the item being written (or `None` on delete), and its
//! TTL stamp, compute the index rows that should exist for that item. The
//! caller (`item_engine`) executes the delta -- delete the old row keyed by
//! the base item's key, then insert the planned row if any -- inside the
//! same SQL transaction that writes the base row.

use docstore_codec::collation::{collation_string, sort_key_numeric};
use docstore_core::{Item, SecondaryIndexDef, TableDescription};

use crate::error::Result;

/// The row values for one index, if the item is a member of that index
/// (§3: indexes are sparse -- an item lacking any declared index key
/// attribute, or typed wrong, is simply absent).
#[derive(Debug, Clone)]
pub struct IndexRowValues {
    pub ipk_coll: String,
    pub isk_coll: String,
    pub ipk_raw: String,
    pub isk_raw: Option<String>,
    pub isk_num: Option<f64>,
}

/// What to do for one index when an item is written: the row to insert, or
/// `None` if the item is not (or is no longer) a member.
#[derive(Debug, Clone)]
pub struct IndexPlan {
    pub index_name: String,
    pub row: Option<IndexRowValues>,
}

/// Computes, for every secondary index on `table`, whether `item` is a
/// member and what its index row should look like. Returns `None` rows for
/// every index when `item` is `None` (a delete).
pub fn plan_index_rows(table: &TableDescription, item: Option<&Item>) -> Result<Vec<IndexPlan>> {
    let mut plans = Vec::new();
    for index in table.global_secondary_indexes.iter().chain(table.local_secondary_indexes.iter()) {
        let row = match item {
            Some(item) => index_row_for_item(index, item)?,
            None => None,
        };
        plans.push(IndexPlan { index_name: index.name.clone(), row });
    }
    Ok(plans)
}

fn index_row_for_item(index: &SecondaryIndexDef, item: &Item) -> Result<Option<IndexRowValues>> {
    let Some(hash_value) = item.get(&index.key_schema.hash) else {
        return Ok(None);
    };
    if !hash_value.is_key_type() {
        return Ok(None);
    }
    let ipk_coll = collation_string(hash_value)?;
    let ipk_raw = docstore_codec::item_to_json_string(&{
        let mut i = Item::new();
        i.insert(index.key_schema.hash.clone(), hash_value.clone());
        i
    });

    let (isk_coll, isk_raw, isk_num) = match &index.key_schema.range {
        None => (String::new(), None, None),
        Some(range_name) => {
            let Some(sort_value) = item.get(range_name) else {
                return Ok(None);
            };
            if !sort_value.is_key_type() {
                return Ok(None);
            }
            let coll = collation_string(sort_value)?;
            let num = if let docstore_core::AttributeValue::N(n) = sort_value { sort_key_numeric(n) } else { None };
            let raw = docstore_codec::item_to_json_string(&{
                let mut i = Item::new();
                i.insert(range_name.clone(), sort_value.clone());
                i
            });
            (coll, Some(raw), num)
        }
    };

    Ok(Some(IndexRowValues { ipk_coll, isk_coll, ipk_raw, isk_raw, isk_num }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{AttributeValue, IndexKind, KeySchema, Projection};

    fn gsi(hash: &str, range: Option<&str>) -> SecondaryIndexDef {
        SecondaryIndexDef {
            name: "GSI1".into(),
            kind: IndexKind::Global,
            key_schema: KeySchema { hash: hash.to_string(), range: range.map(str::to_string) },
            projection: Projection::All,
        }
    }

    fn table_with(index: SecondaryIndexDef) -> TableDescription {
        TableDescription {
            name: "T".into(),
            arn: TableDescription::synthetic_arn("T"),
            key_schema: KeySchema { hash: "PK".into(), range: None },
            attribute_definitions: vec![],
            global_secondary_indexes: vec![index],
            local_secondary_indexes: vec![],
            provisioned_throughput: Default::default(),
            item_count: 0,
            creation_date_time: chrono::Utc::now(),
            status: docstore_core::TableStatus::Active,
            tags: Default::default(),
            ttl: Default::default(),
        }
    }

    #[test]
    fn sparse_index_skips_items_missing_the_key() {
        let table = table_with(gsi("GSI_PK", None));
        let mut item = Item::new();
        item.insert("data", AttributeValue::S("not_indexed".into()));
        let plans = plan_index_rows(&table, Some(&item)).unwrap();
        assert!(plans[0].row.is_none());
    }

    #[test]
    fn item_with_index_key_gets_a_row() {
        let table = table_with(gsi("GSI_PK", None));
        let mut item = Item::new();
        item.insert("GSI_PK", AttributeValue::S("g".into()));
        let plans = plan_index_rows(&table, Some(&item)).unwrap();
        assert!(plans[0].row.is_some());
    }

    #[test]
    fn deleting_an_item_plans_no_rows() {
        let table = table_with(gsi("GSI_PK", None));
        let plans = plan_index_rows(&table, None).unwrap();
        assert!(plans[0].row.is_none());
    }
}

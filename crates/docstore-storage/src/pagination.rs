//! `LastEvaluatedKey`/`ExclusiveStartKey` handling for Query and Scan (§4.5,
//! §9): both are plain items containing only key attributes, exactly the
//! shape the managed store itself uses, so nothing needs a private cursor
//! format. Resuming a query means re-deriving the collation values for those
//! key attributes and seeding the cursor's SQL predicate with them.

use docstore_codec::collation::collation_string;
use docstore_core::{Item, SecondaryIndexDef, TableDescription};

use crate::error::{Result, StorageError};

/// The collation-column values needed to resume a cursor past a given row,
/// for the base table and, if the query ran against an index, for that
/// index too.
#[derive(Debug, Clone, Default)]
pub struct ResumePoint {
    pub table_pk_coll: String,
    pub table_sk_coll: String,
    pub index_pk_coll: Option<String>,
    pub index_sk_coll: Option<String>,
}

/// Builds the `LastEvaluatedKey` item for one returned row: its table key
/// attributes, plus its index key attributes when `index` is `Some`.
pub fn last_evaluated_key(def: &TableDescription, index: Option<&SecondaryIndexDef>, item: &Item) -> Result<Item> {
    let mut out = Item::new();
    let hash_name = &def.key_schema.hash;
    let hash_value = item
        .get(hash_name)
        .cloned()
        .ok_or_else(|| StorageError::Internal(format!("returned row missing hash key {hash_name}")))?;
    out.insert(hash_name.clone(), hash_value);
    if let Some(range_name) = &def.key_schema.range {
        if let Some(v) = item.get(range_name) {
            out.insert(range_name.clone(), v.clone());
        }
    }
    if let Some(index) = index {
        if let Some(v) = item.get(&index.key_schema.hash) {
            out.insert(index.key_schema.hash.clone(), v.clone());
        }
        if let Some(range_name) = &index.key_schema.range {
            if let Some(v) = item.get(range_name) {
                out.insert(range_name.clone(), v.clone());
            }
        }
    }
    Ok(out)
}

/// Parses an `ExclusiveStartKey` item back into the collation values needed
/// to seed a resumed cursor. `Validation` if a required key attribute is
/// absent from the supplied key item.
pub fn resume_point(def: &TableDescription, index: Option<&SecondaryIndexDef>, key_item: &Item) -> Result<ResumePoint> {
    let hash_value = key_item
        .get(&def.key_schema.hash)
        .ok_or_else(|| StorageError::validation("ExclusiveStartKey is missing the table's hash key"))?;
    let table_pk_coll = collation_string(hash_value)?;
    let table_sk_coll = match &def.key_schema.range {
        Some(range_name) => {
            let v = key_item
                .get(range_name)
                .ok_or_else(|| StorageError::validation("ExclusiveStartKey is missing the table's range key"))?;
            collation_string(v)?
        }
        None => String::new(),
    };

    let (index_pk_coll, index_sk_coll) = match index {
        Some(index) => {
            let v = key_item
                .get(&index.key_schema.hash)
                .ok_or_else(|| StorageError::validation("ExclusiveStartKey is missing the index's hash key"))?;
            let pk = collation_string(v)?;
            let sk = match &index.key_schema.range {
                Some(range_name) => Some(match key_item.get(range_name) {
                    Some(v) => collation_string(v)?,
                    None => String::new(),
                }),
                None => None,
            };
            (Some(pk), sk)
        }
        None => (None, None),
    };

    Ok(ResumePoint { table_pk_coll, table_sk_coll, index_pk_coll, index_sk_coll })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::{AttributeValue, KeySchema, TableStatus};

    fn table() -> TableDescription {
        TableDescription {
            name: "T".into(),
            arn: TableDescription::synthetic_arn("T"),
            key_schema: KeySchema { hash: "PK".into(), range: Some("SK".into()) },
            attribute_definitions: vec![],
            global_secondary_indexes: vec![],
            local_secondary_indexes: vec![],
            provisioned_throughput: Default::default(),
            item_count: 0,
            creation_date_time: chrono::Utc::now(),
            status: TableStatus::Active,
            tags: Default::default(),
            ttl: Default::default(),
        }
    }

    #[test]
    fn last_evaluated_key_carries_only_key_attributes() {
        let def = table();
        let mut item = Item::new();
        item.insert("PK", AttributeValue::S("a".into()));
        item.insert("SK", AttributeValue::N("1".into()));
        item.insert("payload", AttributeValue::S("ignored".into()));
        let lek = last_evaluated_key(&def, None, &item).unwrap();
        assert_eq!(lek.len(), 2);
        assert!(lek.get("payload").is_none());
    }

    #[test]
    fn resume_point_rejects_missing_hash_key() {
        let def = table();
        let item = Item::new();
        assert!(resume_point(&def, None, &item).is_err());
    }
}

//! Table, key schema, and secondary index metadata.
//!
//! These types are the catalog's in-memory representation; `docstore-storage`
//! persists them as JSON inside dedicated metadata tables (see §6.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::ValueType;

/// The scalar type a key attribute is declared as (S, N, or B only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    S,
    N,
    B,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::S => "S",
            KeyType::N => "N",
            KeyType::B => "B",
        }
    }

    /// Whether a value's runtime type matches this declared key type.
    pub fn matches(&self, vt: ValueType) -> bool {
        matches!(
            (self, vt),
            (KeyType::S, ValueType::S) | (KeyType::N, ValueType::N) | (KeyType::B, ValueType::B)
        )
    }
}

impl From<&str> for KeyType {
    fn from(s: &str) -> Self {
        match s {
            "N" => KeyType::N,
            "B" => KeyType::B,
            _ => KeyType::S,
        }
    }
}

/// One entry of `AttributeDefinitions`: an attribute name and its declared
/// scalar type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    pub attr_type: KeyType,
}

/// The role a key attribute plays: partition (`HASH`) or sort (`RANGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    Hash,
    Range,
}

/// One entry of a `KeySchema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub kind: KeyKind,
}

/// A table's or index's key schema: a required partition key and an
/// optional sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KeySchema {
    pub hash: String,
    pub range: Option<String>,
}

impl KeySchema {
    pub fn from_elements(elements: &[KeySchemaElement]) -> Option<Self> {
        let hash = elements
            .iter()
            .find(|e| e.kind == KeyKind::Hash)
            .map(|e| e.attribute_name.clone())?;
        let range = elements
            .iter()
            .find(|e| e.kind == KeyKind::Range)
            .map(|e| e.attribute_name.clone());
        Some(Self { hash, range })
    }
}

/// Index projection rule: which attributes an index row carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    All,
    KeysOnly,
    Include(Vec<String>),
}

/// Whether a secondary index is global (independent keys) or local (shares
/// the base table's partition key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    Global,
    Local,
}

/// A secondary index declaration (GSI or LSI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexDef {
    pub name: String,
    pub kind: IndexKind,
    pub key_schema: KeySchema,
    pub projection: Projection,
}

/// Informational, never-enforced capacity metadata (§9 Open Question 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedThroughput {
    pub read_capacity_units: i64,
    pub write_capacity_units: i64,
}

impl Default for ProvisionedThroughput {
    fn default() -> Self {
        Self { read_capacity_units: 5, write_capacity_units: 5 }
    }
}

/// TTL configuration state machine: `DISABLED` or `ENABLED(attribute)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TtlConfig {
    #[default]
    Disabled,
    Enabled {
        attribute_name: String,
    },
}

impl TtlConfig {
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            TtlConfig::Disabled => None,
            TtlConfig::Enabled { attribute_name } => Some(attribute_name),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, TtlConfig::Enabled { .. })
    }
}

/// `TableStatus`; only `ACTIVE` and `DELETING` are ever observed by callers
/// of this emulator (§4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableStatus {
    Active,
    Deleting,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Active => "ACTIVE",
            TableStatus::Deleting => "DELETING",
        }
    }
}

/// A table's full catalog description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub arn: String,
    pub key_schema: KeySchema,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub global_secondary_indexes: Vec<SecondaryIndexDef>,
    pub local_secondary_indexes: Vec<SecondaryIndexDef>,
    pub provisioned_throughput: ProvisionedThroughput,
    pub item_count: i64,
    pub creation_date_time: DateTime<Utc>,
    pub status: TableStatus,
    pub tags: std::collections::BTreeMap<String, String>,
    pub ttl: TtlConfig,
}

impl TableDescription {
    /// Returns the attribute's declared key type, if it's a key attribute of
    /// the base table or any index.
    pub fn attribute_type(&self, name: &str) -> Option<KeyType> {
        self.attribute_definitions
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.attr_type)
    }

    pub fn find_index(&self, name: &str) -> Option<&SecondaryIndexDef> {
        self.global_secondary_indexes
            .iter()
            .chain(self.local_secondary_indexes.iter())
            .find(|i| i.name == name)
    }

    pub fn synthetic_arn(table_name: &str) -> String {
        format!("arn:aws:dynamodb:local:000000000000:table/{table_name}")
    }
}

//! Canonical JSON encoding of [`AttributeValue`], bit-exact with the managed
//! store's wire format (§6.1): one key per object, named after the type
//! tag, numbers kept as the caller's canonical decimal string, binary
//! values base64-encoded.

use base64::Engine;
use docstore_core::{AttributeValue, Item};
use serde_json::{Map, Value};

use crate::error::{CodecError, Result};

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn un_b64(s: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(s)?)
}

/// Encodes a single attribute value as its one-key wire JSON object.
pub fn encode_value(value: &AttributeValue) -> Value {
    let mut obj = Map::new();
    match value {
        AttributeValue::S(s) => {
            obj.insert("S".into(), Value::String(s.clone()));
        }
        AttributeValue::N(n) => {
            obj.insert("N".into(), Value::String(n.clone()));
        }
        AttributeValue::B(b) => {
            obj.insert("B".into(), Value::String(b64(b)));
        }
        AttributeValue::Bool(b) => {
            obj.insert("BOOL".into(), Value::Bool(*b));
        }
        AttributeValue::Null => {
            obj.insert("NULL".into(), Value::Bool(true));
        }
        AttributeValue::SS(set) => {
            obj.insert("SS".into(), Value::Array(set.iter().cloned().map(Value::String).collect()));
        }
        AttributeValue::NS(set) => {
            obj.insert("NS".into(), Value::Array(set.iter().cloned().map(Value::String).collect()));
        }
        AttributeValue::BS(set) => {
            obj.insert(
                "BS".into(),
                Value::Array(set.iter().map(|b| Value::String(b64(b))).collect()),
            );
        }
        AttributeValue::L(list) => {
            obj.insert("L".into(), Value::Array(list.iter().map(encode_value).collect()));
        }
        AttributeValue::M(map) => {
            let mut inner = Map::new();
            for (k, v) in map {
                inner.insert(k.clone(), encode_value(v));
            }
            obj.insert("M".into(), Value::Object(inner));
        }
    }
    Value::Object(obj)
}

/// Decodes a single wire-format attribute value object.
pub fn decode_value(value: &Value) -> Result<AttributeValue> {
    let obj = value
        .as_object()
        .ok_or_else(|| CodecError::MalformedJson("attribute value must be a JSON object".into()))?;
    let (tag, v) = obj
        .iter()
        .next()
        .ok_or_else(|| CodecError::MalformedJson("attribute value object has no type key".into()))?;

    let err = || CodecError::MalformedJson(format!("malformed {tag} value"));

    Ok(match tag.as_str() {
        "S" => AttributeValue::S(v.as_str().ok_or_else(err)?.to_string()),
        "N" => AttributeValue::N(v.as_str().ok_or_else(err)?.to_string()),
        "B" => AttributeValue::B(un_b64(v.as_str().ok_or_else(err)?)?),
        "BOOL" => AttributeValue::Bool(v.as_bool().ok_or_else(err)?),
        "NULL" => AttributeValue::Null,
        "SS" => AttributeValue::SS(
            v.as_array()
                .ok_or_else(err)?
                .iter()
                .map(|x| x.as_str().map(String::from).ok_or_else(err))
                .collect::<Result<_>>()?,
        ),
        "NS" => AttributeValue::NS(
            v.as_array()
                .ok_or_else(err)?
                .iter()
                .map(|x| x.as_str().map(String::from).ok_or_else(err))
                .collect::<Result<_>>()?,
        ),
        "BS" => {
            let mut set = std::collections::BTreeSet::new();
            for x in v.as_array().ok_or_else(err)? {
                set.insert(un_b64(x.as_str().ok_or_else(err)?)?);
            }
            AttributeValue::BS(set)
        }
        "L" => AttributeValue::L(
            v.as_array()
                .ok_or_else(err)?
                .iter()
                .map(decode_value)
                .collect::<Result<_>>()?,
        ),
        "M" => {
            let mut map = std::collections::BTreeMap::new();
            for (k, inner) in v.as_object().ok_or_else(err)? {
                map.insert(k.clone(), decode_value(inner)?);
            }
            AttributeValue::M(map)
        }
        other => return Err(CodecError::MalformedJson(format!("unknown attribute type tag '{other}'"))),
    })
}

/// Encodes an item as a JSON object mapping attribute name to wire value.
pub fn encode_item(item: &Item) -> Value {
    let mut obj = Map::new();
    for (name, value) in item.iter() {
        obj.insert(name.clone(), encode_value(value));
    }
    Value::Object(obj)
}

/// Decodes an item from its JSON object form.
pub fn decode_item(value: &Value) -> Result<Item> {
    let obj = value
        .as_object()
        .ok_or_else(|| CodecError::MalformedJson("item must be a JSON object".into()))?;
    let mut item = Item::new();
    for (name, v) in obj {
        item.insert(name.clone(), decode_value(v)?);
    }
    Ok(item)
}

/// Serializes an item to its canonical JSON text form (stored in the
/// `item_json` column).
pub fn item_to_json_string(item: &Item) -> String {
    encode_item(item).to_string()
}

/// Parses an item back from its stored JSON text form.
pub fn item_from_json_string(s: &str) -> Result<Item> {
    let value: Value =
        serde_json::from_str(s).map_err(|e| CodecError::MalformedJson(e.to_string()))?;
    decode_item(&value)
}

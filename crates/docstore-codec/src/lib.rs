//! Canonical JSON encoding and sort-key collation for attribute values.

pub mod collation;
pub mod error;
pub mod json;

pub use collation::{collation_string, sort_key_numeric};
pub use error::CodecError;
pub use json::{decode_item, decode_value, encode_item, encode_value, item_from_json_string, item_to_json_string};

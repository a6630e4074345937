//! Model-level validation errors -- attribute typing and key-shape
//! violations that can be detected without touching storage.

/// Errors raised while validating an item or key against a table's schema,
/// before any SQL statement is issued.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The item is missing a required key attribute.
    #[error("item is missing required key attribute '{attribute}'")]
    MissingKeyAttribute { attribute: String },

    /// A key attribute's runtime type does not match its declared type.
    #[error("key attribute '{attribute}' must be of type {expected}, got {actual}")]
    KeyTypeMismatch {
        attribute: String,
        expected: String,
        actual: String,
    },

    /// An attribute name was empty.
    #[error("attribute names must be nonempty")]
    EmptyAttributeName,
}

pub type Result<T> = std::result::Result<T, CoreError>;

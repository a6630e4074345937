//! Codec-level errors: malformed attribute-value JSON or an attempt to
//! collate a non-key-eligible value.

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed attribute value JSON: {0}")]
    MalformedJson(String),

    #[error("attribute value of type {0} cannot be used as a key")]
    NotKeyEligible(&'static str),

    #[error("invalid decimal number literal: {0}")]
    InvalidNumber(String),

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, CodecError>;

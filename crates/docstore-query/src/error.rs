//! Expression parse/evaluation errors. The storage layer maps all of these
//! onto the `Validation` wire error code (§7).

#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unexpected token, expected {expected}")]
    UnexpectedToken { expected: String },

    #[error("unexpected end of expression, expected {expected}")]
    UnexpectedEnd { expected: String },

    #[error("no value found for placeholder '{0}' in ExpressionAttributeNames")]
    UnknownNamePlaceholder(String),

    #[error("no value found for placeholder '{0}' in ExpressionAttributeValues")]
    UnknownValuePlaceholder(String),

    #[error("{0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ExprError>;

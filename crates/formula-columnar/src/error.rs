#![forbid(unsafe_code)]

use crate::types::DataType;

pub type ColumnarResult<T> = Result<T, ColumnarError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ColumnarError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("column {column} has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("row has {actual} values, schema has {expected} columns")]
    RowArity { expected: usize, actual: usize },

    #[error("cannot cast column {column} from {from} to {to}")]
    InvalidCast {
        column: String,
        from: DataType,
        to: DataType,
    },

    #[error("column {column} of type {expected} cannot hold {value}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        value: String,
    },
}

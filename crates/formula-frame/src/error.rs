use crate::rows::RowMappingError;
use formula_columnar::{ColumnarError, DataType};

pub type FrameResult<T> = Result<T, FrameError>;

/// Coarse classification of a [`FrameError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced column is missing, or two outputs share a name.
    Schema,
    /// An operator or reducer was applied to an incompatible dtype, or an argument is invalid.
    Type,
    /// Columns have mismatched lengths.
    Shape,
    /// A user row function failed and the caller asked for strict results.
    RowMapping,
    Cancelled,
    /// Reading or parsing external input failed.
    Input,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("duplicate output column name: {0}")]
    DuplicateAlias(String),

    #[error("cannot apply `{op}` to {left} and {right}")]
    InvalidOperation {
        op: &'static str,
        left: DataType,
        right: DataType,
    },

    #[error("type error: {0}")]
    Type(String),

    #[error("cannot parse {value:?} with format {format:?}")]
    Parse { value: String, format: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("row {row}: {source}")]
    RowMapping { row: usize, source: RowMappingError },

    #[error("query cancelled before step {step} of {total}")]
    Cancelled { step: usize, total: usize },

    #[error("csv row {row}, column {column}: {reason}")]
    Csv {
        row: u64,
        column: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::UnknownColumn(_) | FrameError::DuplicateAlias(_) => ErrorKind::Schema,
            FrameError::InvalidOperation { .. }
            | FrameError::Type(_)
            | FrameError::Parse { .. }
            | FrameError::InvalidArgument(_) => ErrorKind::Type,
            FrameError::Shape(_) => ErrorKind::Shape,
            FrameError::RowMapping { .. } => ErrorKind::RowMapping,
            FrameError::Cancelled { .. } => ErrorKind::Cancelled,
            FrameError::Csv { .. } | FrameError::Io(_) => ErrorKind::Input,
        }
    }
}

impl From<ColumnarError> for FrameError {
    fn from(err: ColumnarError) -> Self {
        match err {
            ColumnarError::UnknownColumn(name) => FrameError::UnknownColumn(name),
            ColumnarError::DuplicateColumn(name) => FrameError::DuplicateAlias(name),
            err @ (ColumnarError::LengthMismatch { .. } | ColumnarError::RowArity { .. }) => {
                FrameError::Shape(err.to_string())
            }
            err @ (ColumnarError::InvalidCast { .. } | ColumnarError::TypeMismatch { .. }) => {
                FrameError::Type(err.to_string())
            }
        }
    }
}

impl From<csv::Error> for FrameError {
    fn from(err: csv::Error) -> Self {
        let row = err.position().map(|p| p.record() + 1).unwrap_or(0);
        match err.into_kind() {
            csv::ErrorKind::Io(io) => FrameError::Io(io),
            kind => FrameError::Csv {
                row,
                column: String::new(),
                reason: csv_reason(&kind),
            },
        }
    }
}

fn csv_reason(kind: &csv::ErrorKind) -> String {
    match kind {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {expected_len} fields, found {len}"),
        csv::ErrorKind::Utf8 { err, .. } => format!("invalid UTF-8: {err}"),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn columnar_errors_map_onto_kinds() {
        let err: FrameError = ColumnarError::UnknownColumn("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let err: FrameError = ColumnarError::LengthMismatch {
            column: "x".into(),
            expected: 2,
            actual: 3,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Shape);
        assert_eq!(err.to_string(), "shape mismatch: column x has 3 rows, expected 2");
    }

    #[test]
    fn row_mapping_errors_keep_their_source() {
        let err = FrameError::RowMapping {
            row: 4,
            source: RowMappingError::new("bad input"),
        };
        assert_eq!(err.kind(), ErrorKind::RowMapping);
        assert_eq!(err.to_string(), "row 4: row mapping failed: bad input");
        assert!(std::error::Error::source(&err).is_some());
    }
}

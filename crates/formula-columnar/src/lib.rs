//! Columnar storage for Formula's dataframe engine.
//!
//! This crate focuses on:
//! - Typed, nullable columns backed by a validity bitmap.
//! - Immutable tables whose columns are shared (not copied) between derived tables.
//! - Row-at-a-time construction with schema checks, and summary statistics.
//!
//! Query semantics (expressions, grouping, windows, lazy plans) live in `formula-frame`.

#![forbid(unsafe_code)]

mod bitmap;
mod column;
mod error;
mod stats;
mod table;
mod types;

pub use crate::bitmap::BitVec;
pub use crate::column::{Column, ColumnBuilder, ColumnValues};
pub use crate::error::{ColumnarError, ColumnarResult};
pub use crate::stats::{mean, median, sample_std, ColumnStats};
pub use crate::table::{ColumnSchema, Schema, Table, TableBuilder};
pub use crate::types::{DataType, Value};

//! Dataframe queries over [`formula_columnar`] tables.
//!
//! Tables are immutable. Every operation (filter, select, with_columns, group_by, sort, rolling)
//! returns a new [`Table`] that shares the untouched column buffers of its input. Expressions are
//! built with [`col`], [`lit`] and [`when`] and evaluated with SQL-style null semantics. A
//! [`QueryPlan`] records the same operations and replays them on [`QueryPlan::collect`].
//!
//! ```
//! use formula_frame::prelude::*;
//!
//! let accounts = Table::new(vec![
//!     Column::from_bools("active", [Some(true), Some(true), Some(false)]),
//!     Column::from_i64s("balance", [Some(100), Some(200), Some(50)]),
//! ])
//! .unwrap();
//! let totals = accounts
//!     .lazy()
//!     .filter(col("balance").gt(lit(10)))
//!     .group_by(["active"], [sum("balance")])
//!     .collect()
//!     .unwrap();
//! assert_eq!(totals.shape(), (2, 2));
//! ```

#![forbid(unsafe_code)]

mod agg;
mod config;
mod error;
mod eval;
mod expr;
mod group;
mod import;
mod ops;
mod parallel;
mod plan;
mod rows;
mod window;

pub use crate::agg::AggKind;
pub use crate::config::EngineConfig;
pub use crate::error::{ErrorKind, FrameError, FrameResult};
pub use crate::eval::evaluate;
pub use crate::expr::{
    col, collect_list, count, first, last, len, lit, max, mean, min, sum, when, BinaryOp, Expr,
    Then, UnaryOp, When,
};
pub use crate::group::group_by;
pub use crate::import::{read_csv, read_csv_path, CsvReadOptions, DEFAULT_DATETIME_FORMAT};
pub use crate::ops::{filter, rolling, select, sort, with_columns, FrameOps, SortKey};
pub use crate::plan::{CancellationToken, PlanOp, QueryPlan};
pub use crate::rows::{MapRowsReport, Row, RowMappingError};
pub use crate::window::{rolling as rolling_column, RollingKind};

pub use formula_columnar::{
    BitVec, Column, ColumnSchema, ColumnStats, ColumnarError, DataType, Schema, Table,
    TableBuilder, Value,
};

/// Everything needed to build and run queries.
pub mod prelude {
    pub use crate::{
        col, collect_list, count, first, last, len, lit, max, mean, min, sum, when, AggKind,
        CancellationToken, Column, ColumnSchema, CsvReadOptions, DataType, EngineConfig, Expr,
        FrameError, FrameOps, FrameResult, QueryPlan, RollingKind, Row, RowMappingError, SortKey,
        Table, Value,
    };
}

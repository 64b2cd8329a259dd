use crate::config::EngineConfig;
use crate::error::{FrameError, FrameResult};
use crate::eval::{eval_expr, evaluate};
use crate::expr::{col, Expr};
use crate::group;
use crate::parallel::try_map_ordered;
use crate::plan::QueryPlan;
use crate::rows::{self, MapRowsReport, Row, RowMappingError};
use crate::window::RollingKind;
use formula_columnar::{BitVec, DataType, Table, Value};
use std::collections::HashSet;

/// One key of a multi-column sort. Nulls sort first unless `nulls_last` is set, independent of
/// direction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
    pub nulls_last: bool,
}

impl SortKey {
    pub fn new(column: impl Into<String>, descending: bool) -> Self {
        Self {
            column: column.into(),
            descending,
            nulls_last: false,
        }
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls_last = true;
        self
    }
}

pub(crate) fn ensure_unique_names(names: impl IntoIterator<Item = String>) -> FrameResult<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.clone()) {
            return Err(FrameError::DuplicateAlias(name));
        }
    }
    Ok(())
}

/// Keep the rows where `predicate` is non-null true, preserving order and schema.
pub fn filter(table: &Table, predicate: &Expr) -> FrameResult<Table> {
    let mask = eval_expr(predicate, table)?;
    if !matches!(mask.dtype(), DataType::Bool | DataType::Null) {
        return Err(FrameError::Type(format!(
            "filter predicate {predicate} is {}, expected bool",
            mask.dtype()
        )));
    }
    let rows = table.row_count();
    let mask = mask.broadcast(rows);
    if mask.len() != rows {
        return Err(FrameError::Shape(format!(
            "filter predicate has {} rows, table has {rows}",
            mask.len()
        )));
    }
    let keep = BitVec::from_bools((0..rows).map(|row| mask.bool_at(row) == Some(true)));
    log::debug!("filter {predicate}: kept {} of {rows} rows", keep.count_ones());
    Ok(table.filter_mask(&keep))
}

/// Evaluate each expression against `table` and assemble the results, in order, as a new table.
///
/// Single-row results are broadcast to the height of the others; if every result is a single
/// row the output has one row.
pub fn select(table: &Table, exprs: &[Expr], config: &EngineConfig) -> FrameResult<Table> {
    ensure_unique_names(exprs.iter().map(Expr::output_name))?;
    let columns = try_map_ordered(config, table.row_count(), exprs, |expr| evaluate(expr, table))?;

    let mut height: Option<usize> = None;
    for column in columns.iter().filter(|c| c.len() != 1) {
        match height {
            None => height = Some(column.len()),
            Some(h) if h == column.len() => {}
            Some(h) => {
                return Err(FrameError::Shape(format!(
                    "select output {} has {} rows, expected {h}",
                    column.name(),
                    column.len()
                )))
            }
        }
    }
    let height = height.unwrap_or(usize::from(!columns.is_empty()));
    Ok(Table::new(
        columns.into_iter().map(|c| c.broadcast(height)).collect(),
    )?)
}

/// Add or replace columns. Every expression sees the input table, not the columns added
/// alongside it.
pub fn with_columns(table: &Table, exprs: &[Expr], config: &EngineConfig) -> FrameResult<Table> {
    ensure_unique_names(exprs.iter().map(Expr::output_name))?;
    let columns = try_map_ordered(config, table.row_count(), exprs, |expr| evaluate(expr, table))?;
    let mut out = table.clone();
    for column in columns {
        out = out.with_column(column.broadcast(table.row_count()))?;
    }
    Ok(out)
}

/// Stable multi-key sort.
pub fn sort(table: &Table, keys: &[SortKey]) -> FrameResult<Table> {
    let columns = keys
        .iter()
        .map(|key| table.column(&key.column))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(column) = columns
        .iter()
        .find(|c| !c.dtype().is_ordered() && c.dtype() != &DataType::Null)
    {
        return Err(FrameError::Type(format!(
            "cannot sort by {} column {}",
            column.dtype(),
            column.name()
        )));
    }

    let mut indices: Vec<usize> = (0..table.row_count()).collect();
    indices.sort_by(|&a, &b| {
        keys.iter()
            .zip(&columns)
            .map(|(key, column)| column.cmp_rows(a, b, key.descending, key.nulls_last))
            .find(|ord| ord.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(table.take_rows(&indices))
}

/// Append (or replace) `alias` with a trailing rolling window over `column`.
pub fn rolling(
    table: &Table,
    column: &str,
    window_size: usize,
    kind: RollingKind,
    alias: &str,
) -> FrameResult<Table> {
    let expr = col(column).rolling(kind, window_size).alias(alias);
    with_columns(table, &[expr], &EngineConfig::sequential())
}

/// Eager query operations on a [`Table`].
///
/// Every method returns a new table and leaves `self` untouched. Methods run with
/// [`EngineConfig::default`]; use [`FrameOps::lazy`] and [`QueryPlan::with_config`] to choose
/// another configuration.
pub trait FrameOps {
    fn filter(&self, predicate: Expr) -> FrameResult<Table>;

    fn select<I>(&self, exprs: I) -> FrameResult<Table>
    where
        I: IntoIterator<Item = Expr>;

    fn with_columns<I>(&self, exprs: I) -> FrameResult<Table>
    where
        I: IntoIterator<Item = Expr>;

    fn group_by<K, S, A>(&self, keys: K, aggs: A) -> FrameResult<Table>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
        A: IntoIterator<Item = Expr>;

    fn sort(&self, column: &str, descending: bool) -> FrameResult<Table>;

    fn sort_by(&self, keys: &[SortKey]) -> FrameResult<Table>;

    fn rolling(
        &self,
        column: &str,
        window_size: usize,
        kind: RollingKind,
        alias: &str,
    ) -> FrameResult<Table>;

    fn lazy(&self) -> QueryPlan;

    /// Apply `f` to every row; rows where `f` fails receive `sentinel`.
    fn map_rows<R, F>(&self, sentinel: R, f: F) -> Vec<R>
    where
        R: Clone + Send + Sync,
        F: Fn(&Row) -> Result<R, RowMappingError> + Sync + Send;

    /// Like [`FrameOps::map_rows`], also returning the failures that were replaced.
    fn map_rows_report<R, F>(&self, sentinel: R, f: F) -> MapRowsReport<R>
    where
        R: Clone + Send + Sync,
        F: Fn(&Row) -> Result<R, RowMappingError> + Sync + Send;

    /// Map every row to a value of `dtype` and attach the result as column `name`.
    fn with_mapped_column<F>(
        &self,
        name: &str,
        dtype: DataType,
        sentinel: Value,
        f: F,
    ) -> FrameResult<Table>
    where
        F: Fn(&Row) -> Result<Value, RowMappingError> + Sync + Send;
}

impl FrameOps for Table {
    fn filter(&self, predicate: Expr) -> FrameResult<Table> {
        filter(self, &predicate)
    }

    fn select<I>(&self, exprs: I) -> FrameResult<Table>
    where
        I: IntoIterator<Item = Expr>,
    {
        let exprs: Vec<Expr> = exprs.into_iter().collect();
        select(self, &exprs, &EngineConfig::default())
    }

    fn with_columns<I>(&self, exprs: I) -> FrameResult<Table>
    where
        I: IntoIterator<Item = Expr>,
    {
        let exprs: Vec<Expr> = exprs.into_iter().collect();
        with_columns(self, &exprs, &EngineConfig::default())
    }

    fn group_by<K, S, A>(&self, keys: K, aggs: A) -> FrameResult<Table>
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
        A: IntoIterator<Item = Expr>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        let aggs: Vec<Expr> = aggs.into_iter().collect();
        group::group_by(self, &keys, &aggs, &EngineConfig::default())
    }

    fn sort(&self, column: &str, descending: bool) -> FrameResult<Table> {
        sort(self, &[SortKey::new(column, descending)])
    }

    fn sort_by(&self, keys: &[SortKey]) -> FrameResult<Table> {
        sort(self, keys)
    }

    fn rolling(
        &self,
        column: &str,
        window_size: usize,
        kind: RollingKind,
        alias: &str,
    ) -> FrameResult<Table> {
        rolling(self, column, window_size, kind, alias)
    }

    fn lazy(&self) -> QueryPlan {
        QueryPlan::new(self.clone())
    }

    fn map_rows<R, F>(&self, sentinel: R, f: F) -> Vec<R>
    where
        R: Clone + Send + Sync,
        F: Fn(&Row) -> Result<R, RowMappingError> + Sync + Send,
    {
        rows::map_rows(self, sentinel, f, &EngineConfig::default()).values
    }

    fn map_rows_report<R, F>(&self, sentinel: R, f: F) -> MapRowsReport<R>
    where
        R: Clone + Send + Sync,
        F: Fn(&Row) -> Result<R, RowMappingError> + Sync + Send,
    {
        rows::map_rows(self, sentinel, f, &EngineConfig::default())
    }

    fn with_mapped_column<F>(
        &self,
        name: &str,
        dtype: DataType,
        sentinel: Value,
        f: F,
    ) -> FrameResult<Table>
    where
        F: Fn(&Row) -> Result<Value, RowMappingError> + Sync + Send,
    {
        rows::with_mapped_column(self, name, dtype, sentinel, f, &EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{len, lit};
    use formula_columnar::Column;
    use pretty_assertions::assert_eq;

    fn scores() -> Table {
        Table::new(vec![
            Column::from_strs("name", [Some("a"), Some("b"), Some("c"), Some("d")]),
            Column::from_i64s("score", [Some(3), None, Some(1), Some(3)]),
        ])
        .unwrap()
    }

    #[test]
    fn filter_drops_null_and_false_rows() {
        let out = scores().filter(col("score").gt(lit(1))).unwrap();
        assert_eq!(
            out.column("name").unwrap().to_values(),
            vec![Value::from("a"), Value::from("d")]
        );
        assert_eq!(out.schema(), scores().schema());

        let all = scores().filter(lit(true)).unwrap();
        assert_eq!(all.row_count(), 4);
        assert!(scores().filter(col("score")).is_err());
    }

    #[test]
    fn select_aliases_and_broadcasts() {
        let table = scores();
        let out = table
            .select([col("score").alias("s"), lit(1).alias("one"), col("name")])
            .unwrap();
        assert_eq!(out.column_names(), vec!["s", "one", "name"]);
        assert_eq!(out.row_count(), 4);
        assert!(out
            .column("s")
            .unwrap()
            .shares_values_with(table.column("score").unwrap()));

        let scalar = scores().select([len(), col("score").max()]).unwrap();
        assert_eq!(scalar.shape(), (1, 2));
    }

    #[test]
    fn select_rejects_duplicate_names() {
        let err = scores().select([col("score"), col("name").alias("score")]).unwrap_err();
        assert!(matches!(err, FrameError::DuplicateAlias(name) if name == "score"));
    }

    #[test]
    fn with_columns_replaces_in_place_and_appends() {
        let out = scores()
            .with_columns([(col("score") * lit(10)).alias("score"), lit("x").alias("tag")])
            .unwrap();
        assert_eq!(out.column_names(), vec!["name", "score", "tag"]);
        assert_eq!(
            out.column("score").unwrap().to_values(),
            vec![Value::from(30), Value::Null, Value::from(10), Value::from(30)]
        );
        assert_eq!(out.column("tag").unwrap().null_count(), 0);
    }

    #[test]
    fn sort_is_stable_with_nulls_first() {
        let out = scores().sort("score", true).unwrap();
        assert_eq!(
            out.column("name").unwrap().to_values(),
            vec![Value::from("b"), Value::from("a"), Value::from("d"), Value::from("c")]
        );
        let out = scores()
            .sort_by(&[SortKey::new("score", false).nulls_last(), SortKey::new("name", true)])
            .unwrap();
        assert_eq!(
            out.column("name").unwrap().to_values(),
            vec![Value::from("c"), Value::from("d"), Value::from("a"), Value::from("b")]
        );
    }

    #[test]
    fn rolling_appends_alias() {
        let out = scores().rolling("score", 2, RollingKind::Max, "best").unwrap();
        assert_eq!(
            out.column("best").unwrap().to_values(),
            vec![Value::Null, Value::from(3), Value::from(1), Value::from(3)]
        );
    }
}

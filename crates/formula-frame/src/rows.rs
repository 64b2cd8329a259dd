use crate::config::EngineConfig;
use crate::error::{FrameError, FrameResult};
use crate::parallel::map_chunks_ordered;
use formula_columnar::{Column, DataType, Table, Value};
use std::ops::Deref;

/// Failure reported by a user row function.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("row mapping failed: {message}")]
pub struct RowMappingError {
    message: String,
}

impl RowMappingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One table row handed to a row function. Derefs to the row's values in column order.
#[derive(Clone, Debug, PartialEq)]
pub struct Row<'a> {
    index: usize,
    names: &'a [&'a str],
    values: Vec<Value>,
}

impl Row<'_> {
    /// Position of the row in the table.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Value of the named column; `None` if the table has no such column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|name| *name == column)
            .map(|idx| &self.values[idx])
    }

    /// Numeric value of the named column, or an error naming the column when it is missing,
    /// null or not numeric.
    pub fn f64(&self, column: &str) -> Result<f64, RowMappingError> {
        self.get(column)
            .and_then(Value::as_f64)
            .ok_or_else(|| RowMappingError::new(format!("{column} is not a number")))
    }

    pub fn str(&self, column: &str) -> Result<&str, RowMappingError> {
        self.get(column)
            .and_then(Value::as_str)
            .ok_or_else(|| RowMappingError::new(format!("{column} is not a string")))
    }
}

impl Deref for Row<'_> {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.values
    }
}

/// Output of a row mapping: one value per input row plus the failures that were replaced by the
/// sentinel.
#[derive(Clone, Debug, PartialEq)]
pub struct MapRowsReport<R> {
    pub values: Vec<R>,
    pub failures: Vec<(usize, RowMappingError)>,
}

impl<R> MapRowsReport<R> {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// The values, or the first failure as an error.
    pub fn into_result(self) -> FrameResult<Vec<R>> {
        match self.failures.into_iter().next() {
            Some((row, source)) => Err(FrameError::RowMapping { row, source }),
            None => Ok(self.values),
        }
    }
}

/// Apply `f` to every row in order. A failing row yields `sentinel` and is logged; the mapping
/// itself never fails.
pub(crate) fn map_rows<R, F>(
    table: &Table,
    sentinel: R,
    f: F,
    config: &EngineConfig,
) -> MapRowsReport<R>
where
    R: Clone + Send + Sync,
    F: Fn(&Row) -> Result<R, RowMappingError> + Sync + Send,
{
    let names: Vec<&str> = table.column_names();
    let results = map_chunks_ordered(
        config,
        table.row_count(),
        config.map_rows_chunk_size,
        |range| {
            range
                .map(|index| {
                    let row = Row {
                        index,
                        names: &names,
                        values: table.row(index),
                    };
                    f(&row)
                })
                .collect()
        },
    );

    let mut values = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(value) => values.push(value),
            Err(err) => {
                log::warn!("map_rows: row {index} replaced with sentinel: {}", err.message());
                values.push(sentinel.clone());
                failures.push((index, err));
            }
        }
    }
    MapRowsReport { values, failures }
}

pub(crate) fn with_mapped_column<F>(
    table: &Table,
    name: &str,
    dtype: DataType,
    sentinel: Value,
    f: F,
    config: &EngineConfig,
) -> FrameResult<Table>
where
    F: Fn(&Row) -> Result<Value, RowMappingError> + Sync + Send,
{
    let report = map_rows(table, sentinel, f, config);
    let column = Column::from_values(name, dtype, report.values)?;
    Ok(table.with_column(column)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn people() -> Table {
        Table::new(vec![
            Column::from_strs("name", [Some("ada"), Some("bob"), None]),
            Column::from_f64s("age", [Some(36.0), None, Some(20.0)]),
        ])
        .unwrap()
    }

    fn chunked() -> EngineConfig {
        EngineConfig {
            parallel: true,
            parallel_min_rows: 0,
            map_rows_chunk_size: 1,
        }
    }

    #[test]
    fn failures_become_sentinels_in_order() {
        let report = map_rows(&people(), -1.0, |row| Ok(row.f64("age")? * 2.0), &chunked());
        assert_eq!(report.values, vec![72.0, -1.0, 40.0]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, 1);
        assert_eq!(report.failures[0].1.message(), "age is not a number");
        assert!(matches!(
            report.into_result(),
            Err(FrameError::RowMapping { row: 1, .. })
        ));
    }

    #[test]
    fn rows_expose_index_and_values() {
        let report = map_rows(
            &people(),
            String::new(),
            |row| Ok(format!("{}:{}", row.index(), row.len())),
            &EngineConfig::sequential(),
        );
        assert!(report.is_clean());
        assert_eq!(report.values, vec!["0:2", "1:2", "2:2"]);
    }

    #[test]
    fn mapped_column_is_appended() {
        let out = with_mapped_column(
            &people(),
            "greeting",
            DataType::Utf8,
            Value::Null,
            |row| Ok(Value::from(format!("hi {}", row.str("name")?))),
            &EngineConfig::sequential(),
        )
        .unwrap();
        assert_eq!(
            out.column("greeting").unwrap().to_values(),
            vec![Value::from("hi ada"), Value::from("hi bob"), Value::Null]
        );
    }
}

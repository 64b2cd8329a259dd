#![forbid(unsafe_code)]

use crate::column::Column;
use crate::error::ColumnarResult;
use crate::table::Table;
use crate::types::{DataType, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Summary statistics for one column. Numeric moments are only populated for Int64/Float64.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnStats {
    pub dtype: Option<DataType>,
    pub count: u64,
    pub null_count: u64,
    pub distinct_count: u64,
    pub min: Option<Value>,
    pub max: Option<Value>,
    pub sum: Option<f64>,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub median: Option<f64>,
}

impl ColumnStats {
    pub fn compute(column: &Column) -> Self {
        let mut distinct: HashSet<Value> = HashSet::new();
        let mut min: Option<usize> = None;
        let mut max: Option<usize> = None;
        let ordered = column.dtype().is_ordered();

        for idx in column.validity().iter_ones() {
            distinct.insert(column.get(idx));
            if !ordered {
                continue;
            }
            if min.map_or(true, |m| column.cmp_at(idx, m).is_lt()) {
                min = Some(idx);
            }
            if max.map_or(true, |m| column.cmp_at(idx, m).is_gt()) {
                max = Some(idx);
            }
        }

        let mut stats = ColumnStats {
            dtype: Some(column.dtype().clone()),
            count: (column.len() - column.null_count()) as u64,
            null_count: column.null_count() as u64,
            distinct_count: distinct.len() as u64,
            min: min.map(|idx| column.get(idx)),
            max: max.map(|idx| column.get(idx)),
            ..ColumnStats::default()
        };

        if column.dtype().is_numeric() {
            let values: Vec<f64> = column
                .validity()
                .iter_ones()
                .filter_map(|idx| column.f64_at(idx))
                .collect();
            stats.sum = (!values.is_empty()).then(|| values.iter().sum());
            stats.mean = mean(&values);
            stats.std = sample_std(&values);
            stats.median = median(&values);
        }
        stats
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (`ddof = 1`); `None` for fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Median; an even count averages the middle pair.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

const DESCRIBE_ROWS: [&str; 7] = ["count", "null_count", "mean", "std", "min", "median", "max"];

impl Table {
    pub fn stats(&self, name: &str) -> Option<ColumnStats> {
        self.column(name).ok().map(ColumnStats::compute)
    }

    /// Summary table: a `statistic` column followed by one column per input column.
    ///
    /// Numeric columns summarize as Float64; every other column summarizes as text, with the
    /// moments left null. Fails with [`DuplicateColumn`](crate::ColumnarError::DuplicateColumn)
    /// when the table already has a column named `statistic`.
    pub fn describe(&self) -> ColumnarResult<Table> {
        let mut columns = Vec::with_capacity(self.column_count() + 1);
        columns.push(Column::from_strs(
            "statistic",
            DESCRIBE_ROWS.iter().map(|s| Some(*s)),
        ));

        for column in self.columns() {
            let stats = ColumnStats::compute(column);
            if column.dtype().is_numeric() {
                let as_f64 = |v: &Option<Value>| v.as_ref().and_then(Value::as_f64);
                columns.push(Column::from_f64s(
                    column.name(),
                    [
                        Some(stats.count as f64),
                        Some(stats.null_count as f64),
                        stats.mean,
                        stats.std,
                        as_f64(&stats.min),
                        stats.median,
                        as_f64(&stats.max),
                    ],
                ));
            } else {
                let render = |v: &Option<Value>| -> Option<Arc<str>> {
                    v.as_ref().map(|v| match v {
                        Value::Utf8(s) => s.clone(),
                        other => Arc::from(other.to_string()),
                    })
                };
                columns.push(Column::from_strs(
                    column.name(),
                    [
                        Some(Arc::from(stats.count.to_string())),
                        Some(Arc::from(stats.null_count.to_string())),
                        None,
                        None,
                        render(&stats.min),
                        None,
                        render(&stats.max),
                    ],
                ));
            }
        }

        Table::new(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ColumnarError;
    use pretty_assertions::assert_eq;

    #[test]
    fn numeric_stats_skip_nulls() {
        let col = Column::from_i64s("n", [Some(4), None, Some(1), Some(3), Some(4)]);
        let stats = ColumnStats::compute(&col);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.null_count, 1);
        assert_eq!(stats.distinct_count, 3);
        assert_eq!(stats.min, Some(Value::from(1)));
        assert_eq!(stats.max, Some(Value::from(4)));
        assert_eq!(stats.sum, Some(12.0));
        assert_eq!(stats.mean, Some(3.0));
        assert_eq!(stats.median, Some(3.5));
        assert_eq!(stats.std, Some(2.0f64.sqrt()));
    }

    #[test]
    fn std_and_median_edge_cases() {
        assert_eq!(sample_std(&[1.0]), None);
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[5.0, 1.0, 3.0]), Some(3.0));
    }

    #[test]
    fn describe_mixes_numeric_and_text_columns() {
        let table = Table::new(vec![
            Column::from_f64s("x", [Some(1.0), Some(3.0), None]),
            Column::from_strs("s", [Some("b"), None, Some("a")]),
        ])
        .unwrap();
        let summary = table.describe().unwrap();
        assert_eq!(summary.column_names(), vec!["statistic", "x", "s"]);
        assert_eq!(summary.row_count(), DESCRIBE_ROWS.len());

        let x = summary.column("x").unwrap();
        assert_eq!(x.get(0), Value::from(2.0));
        assert_eq!(x.get(1), Value::from(1.0));
        assert_eq!(x.get(2), Value::from(2.0));

        let s = summary.column("s").unwrap();
        assert_eq!(s.get(0), Value::from("2"));
        assert_eq!(s.get(2), Value::Null);
        assert_eq!(s.get(4), Value::from("a"));
        assert_eq!(s.get(6), Value::from("b"));
    }

    #[test]
    fn describe_rejects_a_column_named_statistic() {
        let table = Table::new(vec![
            Column::from_strs("statistic", [Some("p50")]),
            Column::from_i64s("n", [Some(1)]),
        ])
        .unwrap();
        assert_eq!(
            table.describe().unwrap_err(),
            ColumnarError::DuplicateColumn("statistic".to_string())
        );
    }
}

use crate::error::{FrameError, FrameResult};
use formula_columnar::{median, sample_std, Column, ColumnBuilder, DataType, Value};
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::sync::Arc;

/// Reducers available to `group_by` and to whole-table aggregate expressions.
///
/// `Sum`, `Mean`, `Min`, `Max`, `Std` and `Median` ignore nulls and yield null for a group with no
/// valid values. `Count` counts every row in the group, nulls included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggKind {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    First,
    Last,
    CollectList,
    /// Sample standard deviation (`ddof = 1`).
    Std,
    Median,
    NullCount,
    /// Distinct values, null counted as one value.
    NUnique,
}

impl AggKind {
    pub fn name(self) -> &'static str {
        match self {
            AggKind::Sum => "sum",
            AggKind::Mean => "mean",
            AggKind::Min => "min",
            AggKind::Max => "max",
            AggKind::Count => "count",
            AggKind::First => "first",
            AggKind::Last => "last",
            AggKind::CollectList => "list",
            AggKind::Std => "std",
            AggKind::Median => "median",
            AggKind::NullCount => "null_count",
            AggKind::NUnique => "n_unique",
        }
    }

    /// Result dtype for an input of `input`, or a type error if the reducer does not apply.
    pub fn output_dtype(self, input: &DataType) -> FrameResult<DataType> {
        let unsupported = || {
            Err(FrameError::Type(format!(
                "cannot compute {} of a {input} column",
                self.name()
            )))
        };
        match self {
            AggKind::Count | AggKind::NullCount | AggKind::NUnique => Ok(DataType::Int64),
            AggKind::First | AggKind::Last => Ok(input.clone()),
            AggKind::CollectList => Ok(DataType::List(Box::new(input.clone()))),
            AggKind::Sum => match input {
                DataType::Int64 | DataType::Bool => Ok(DataType::Int64),
                DataType::Float64 | DataType::Null => Ok(input.clone()),
                _ => unsupported(),
            },
            AggKind::Mean | AggKind::Std | AggKind::Median => match input {
                DataType::Int64 | DataType::Float64 | DataType::Bool | DataType::Null => {
                    Ok(DataType::Float64)
                }
                _ => unsupported(),
            },
            AggKind::Min | AggKind::Max => {
                if input.is_ordered() || input == &DataType::Null {
                    Ok(input.clone())
                } else {
                    unsupported()
                }
            }
        }
    }
}

/// Reduce `column` once per group of row indices; the output has one row per group.
pub(crate) fn aggregate(kind: AggKind, column: &Column, groups: &[Vec<usize>]) -> FrameResult<Column> {
    let dtype = kind.output_dtype(column.dtype())?;
    let mut builder = ColumnBuilder::new(column.name(), dtype, groups.len());
    for rows in groups {
        builder.push(&reduce(kind, column, rows))?;
    }
    Ok(builder.finish())
}

/// Reduce the rows `rows` of `column`. The caller has checked the dtype with
/// [`AggKind::output_dtype`].
pub(crate) fn reduce(kind: AggKind, column: &Column, rows: &[usize]) -> Value {
    let valid = || rows.iter().copied().filter(|&row| column.is_valid(row));
    match kind {
        AggKind::Count => Value::Int64(rows.len() as i64),
        AggKind::NullCount => Value::Int64((rows.len() - valid().count()) as i64),
        AggKind::First => rows.first().map_or(Value::Null, |&row| column.get(row)),
        AggKind::Last => rows.last().map_or(Value::Null, |&row| column.get(row)),
        AggKind::CollectList => {
            Value::List(rows.iter().map(|&row| column.get(row)).collect::<Arc<[Value]>>())
        }
        AggKind::NUnique => {
            let distinct: HashSet<Value> = rows.iter().map(|&row| column.get(row)).collect();
            Value::Int64(distinct.len() as i64)
        }
        AggKind::Min => valid()
            .reduce(|best, row| if column.cmp_at(row, best).is_lt() { row } else { best })
            .map_or(Value::Null, |row| column.get(row)),
        AggKind::Max => valid()
            .reduce(|best, row| if column.cmp_at(row, best).is_gt() { row } else { best })
            .map_or(Value::Null, |row| column.get(row)),
        AggKind::Sum => sum(column, rows),
        AggKind::Mean => {
            let values = numeric_values(column, rows);
            if values.is_empty() {
                Value::Null
            } else {
                Value::from(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggKind::Std => sample_std(&numeric_values(column, rows)).map_or(Value::Null, Value::from),
        AggKind::Median => median(&numeric_values(column, rows)).map_or(Value::Null, Value::from),
    }
}

fn sum(column: &Column, rows: &[usize]) -> Value {
    match column.dtype() {
        DataType::Float64 => {
            let values = numeric_values(column, rows);
            if values.is_empty() {
                Value::Null
            } else {
                Value::Float64(OrderedFloat(values.iter().sum()))
            }
        }
        DataType::Int64 | DataType::Bool => {
            let mut total: i128 = 0;
            let mut seen = false;
            for &row in rows {
                let v = column
                    .i64_at(row)
                    .or_else(|| column.bool_at(row).map(i64::from));
                if let Some(v) = v {
                    total += i128::from(v);
                    seen = true;
                }
            }
            match (seen, i64::try_from(total)) {
                (true, Ok(total)) => Value::Int64(total),
                // Overflow is reported as a missing result rather than a wrapped value.
                _ => Value::Null,
            }
        }
        _ => Value::Null,
    }
}

fn numeric_values(column: &Column, rows: &[usize]) -> Vec<f64> {
    rows.iter()
        .filter_map(|&row| {
            column
                .f64_at(row)
                .or_else(|| column.bool_at(row).map(|b| if b { 1.0 } else { 0.0 }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn groups() -> Vec<Vec<usize>> {
        vec![vec![0, 2, 4], vec![1, 3], vec![5]]
    }

    #[test]
    fn reducers_skip_nulls_but_count_keeps_them() {
        let col = Column::from_i64s("n", [Some(1), None, Some(5), None, None, None]);
        let agg = |kind| aggregate(kind, &col, &groups()).unwrap().to_values();

        assert_eq!(agg(AggKind::Sum), vec![Value::from(6), Value::Null, Value::Null]);
        assert_eq!(agg(AggKind::Mean), vec![Value::from(3.0), Value::Null, Value::Null]);
        assert_eq!(agg(AggKind::Min), vec![Value::from(1), Value::Null, Value::Null]);
        assert_eq!(agg(AggKind::Max), vec![Value::from(5), Value::Null, Value::Null]);
        assert_eq!(agg(AggKind::Count), vec![Value::from(3), Value::from(2), Value::from(1)]);
        assert_eq!(
            agg(AggKind::NullCount),
            vec![Value::from(1), Value::from(2), Value::from(1)]
        );
        assert_eq!(agg(AggKind::First), vec![Value::from(1), Value::Null, Value::Null]);
        assert_eq!(agg(AggKind::Last), vec![Value::Null, Value::Null, Value::Null]);
    }

    #[test]
    fn collect_list_keeps_nulls_in_order() {
        let col = Column::from_strs("s", [Some("a"), Some("b"), None, Some("c"), Some("a"), None]);
        let out = aggregate(AggKind::CollectList, &col, &groups()).unwrap();
        assert_eq!(out.dtype(), &DataType::List(Box::new(DataType::Utf8)));
        assert_eq!(
            out.get(0),
            Value::List(Arc::from(vec![Value::from("a"), Value::Null, Value::from("a")]))
        );
        assert_eq!(
            aggregate(AggKind::NUnique, &col, &groups()).unwrap().to_values(),
            vec![Value::from(2), Value::from(2), Value::from(1)]
        );
    }

    #[test]
    fn integer_sum_overflow_is_null() {
        let col = Column::from_i64s("n", [Some(i64::MAX), Some(1)]);
        assert_eq!(reduce(AggKind::Sum, &col, &[0, 1]), Value::Null);
        assert_eq!(reduce(AggKind::Sum, &col, &[0]), Value::from(i64::MAX));
    }

    #[test]
    fn std_and_median_use_sample_statistics() {
        let col = Column::from_f64s("x", [Some(2.0), Some(4.0), Some(4.0), Some(4.0), Some(5.0)]);
        let rows = [0, 1, 2, 3, 4];
        assert_eq!(reduce(AggKind::Median, &col, &rows), Value::from(4.0));
        let std = reduce(AggKind::Std, &col, &rows).as_f64().unwrap();
        assert!((std - 1.2f64.sqrt()).abs() < 1e-12);
        assert_eq!(reduce(AggKind::Std, &col, &[0]), Value::Null);
    }

    #[test]
    fn type_checks_reject_text_arithmetic() {
        let col = Column::from_strs("s", [Some("a")]);
        let err = aggregate(AggKind::Sum, &col, &[vec![0]]).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Type);
        assert_eq!(
            AggKind::Max.output_dtype(&DataType::Utf8).unwrap(),
            DataType::Utf8
        );
        assert_eq!(
            AggKind::Sum.output_dtype(&DataType::Bool).unwrap(),
            DataType::Int64
        );
    }
}

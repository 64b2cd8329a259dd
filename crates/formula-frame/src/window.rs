use crate::error::{FrameError, FrameResult};
use crate::eval::eval_expr;
use crate::expr::Expr;
use crate::group::partition;
use formula_columnar::{Column, ColumnBuilder, DataType, Table};
use std::collections::VecDeque;
use std::ops::RangeInclusive;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RollingKind {
    Min,
    Max,
    Sum,
    Mean,
}

impl RollingKind {
    pub fn name(self) -> &'static str {
        match self {
            RollingKind::Min => "min",
            RollingKind::Max => "max",
            RollingKind::Sum => "sum",
            RollingKind::Mean => "mean",
        }
    }
}

/// Trailing window of `window_size` positions ending at each row.
///
/// Rows before the first full window are null. Nulls inside a window are skipped; a window with
/// no valid values is null.
pub fn rolling(column: &Column, window_size: usize, kind: RollingKind) -> FrameResult<Column> {
    if window_size == 0 {
        return Err(FrameError::InvalidArgument(
            "rolling window_size must be at least 1".to_string(),
        ));
    }
    let dtype = column.dtype();
    match kind {
        RollingKind::Min | RollingKind::Max if dtype.is_ordered() || dtype == &DataType::Null => {
            Ok(rolling_extreme(column, window_size, kind))
        }
        RollingKind::Sum | RollingKind::Mean if dtype.is_numeric() || dtype == &DataType::Null => {
            Ok(rolling_sum_mean(column, window_size, kind))
        }
        _ => Err(FrameError::Type(format!(
            "cannot compute rolling {} of a {dtype} column",
            kind.name()
        ))),
    }
}

/// Monotonic-deque min/max: the deque holds valid row indices whose values are strictly
/// improving from back to front, so the front is the window's extreme.
fn rolling_extreme(column: &Column, window_size: usize, kind: RollingKind) -> Column {
    let mut window: VecDeque<usize> = VecDeque::new();
    let mut picks = Vec::with_capacity(column.len());

    for row in 0..column.len() {
        if column.is_valid(row) {
            while let Some(&back) = window.back() {
                let ord = column.cmp_at(back, row);
                let dominated = match kind {
                    RollingKind::Max => ord.is_le(),
                    _ => ord.is_ge(),
                };
                if !dominated {
                    break;
                }
                window.pop_back();
            }
            window.push_back(row);
        }

        if row + 1 < window_size {
            picks.push(None);
            continue;
        }
        let start = row + 1 - window_size;
        while window.front().is_some_and(|&front| front < start) {
            window.pop_front();
        }
        picks.push(window.front().copied());
    }

    column.take_opt(&picks)
}

fn windows(len: usize, window_size: usize) -> impl Iterator<Item = Option<RangeInclusive<usize>>> {
    (0..len).map(move |row| (row + 1 >= window_size).then(|| row + 1 - window_size..=row))
}

fn rolling_sum_mean(column: &Column, window_size: usize, kind: RollingKind) -> Column {
    let len = column.len();
    let name = column.name();
    match (kind, column.dtype()) {
        (RollingKind::Sum, DataType::Null) => column.clone(),
        (RollingKind::Sum, DataType::Int64) => Column::from_i64s(
            name,
            windows(len, window_size).map(|range| {
                let mut seen = false;
                let mut total: i128 = 0;
                for v in range?.filter_map(|row| column.i64_at(row)) {
                    total += i128::from(v);
                    seen = true;
                }
                if seen {
                    i64::try_from(total).ok()
                } else {
                    None
                }
            }),
        ),
        (RollingKind::Sum, _) => Column::from_f64s(
            name,
            windows(len, window_size).map(|range| {
                let values: Vec<f64> = range?.filter_map(|row| column.f64_at(row)).collect();
                (!values.is_empty()).then(|| values.iter().sum())
            }),
        ),
        _ => Column::from_f64s(
            name,
            windows(len, window_size).map(|range| {
                let values: Vec<f64> = range?.filter_map(|row| column.f64_at(row)).collect();
                (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
            }),
        ),
    }
}

/// Evaluate `expr` within each partition of `partition_by` and write each partition's result
/// back to that partition's rows. Single-row results (aggregates) are repeated across the
/// partition.
pub(crate) fn over(expr: &Expr, partition_by: &[String], table: &Table) -> FrameResult<Column> {
    if partition_by.is_empty() {
        return Err(FrameError::InvalidArgument(
            "over() needs at least one partition column".to_string(),
        ));
    }
    let mut needed: Vec<&str> = expr.root_columns();
    for key in partition_by {
        if !needed.contains(&key.as_str()) {
            needed.push(key);
        }
    }
    let projected = Table::new(
        needed
            .iter()
            .map(|name| table.column(name).cloned())
            .collect::<Result<Vec<_>, _>>()?,
    )?;

    let name = expr.output_name();
    if projected.row_count() == 0 {
        return Ok(eval_expr(expr, &projected)?.slice(0, 0).rename(name));
    }

    let groups = partition(&projected, partition_by)?;
    let mut pieces = Vec::with_capacity(groups.len());
    let mut dtype = DataType::Null;
    for rows in groups.rows() {
        let piece = eval_expr(expr, &projected.take_rows(rows))?;
        if piece.len() != 1 && piece.len() != rows.len() {
            return Err(FrameError::Shape(format!(
                "over() expression produced {} rows for a partition of {}",
                piece.len(),
                rows.len()
            )));
        }
        dtype = dtype.unify(piece.dtype()).ok_or_else(|| {
            FrameError::Type(format!(
                "over() partitions produced incompatible types {dtype} and {}",
                piece.dtype()
            ))
        })?;
        pieces.push(piece);
    }
    let pieces = pieces
        .iter()
        .map(|piece| piece.cast(&dtype))
        .collect::<Result<Vec<_>, _>>()?;

    let mut slots = vec![(0usize, 0usize); projected.row_count()];
    for (group, rows) in groups.rows().iter().enumerate() {
        let scalar = pieces[group].len() == 1;
        for (pos, &row) in rows.iter().enumerate() {
            slots[row] = (group, if scalar { 0 } else { pos });
        }
    }

    let mut builder = ColumnBuilder::new(name, dtype, slots.len());
    for (group, pos) in slots {
        builder.push(&pieces[group].get(pos))?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use formula_columnar::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn rolling_max_skips_nulls_and_fills_warmup() {
        let col = Column::from_f64s("t", [Some(1.0), Some(5.0), Some(3.0), None, Some(2.0)]);
        let out = rolling(&col, 3, RollingKind::Max).unwrap();
        assert_eq!(
            out.to_values(),
            vec![
                Value::Null,
                Value::Null,
                Value::from(5.0),
                Value::from(5.0),
                Value::from(3.0)
            ]
        );
    }

    #[test]
    fn rolling_min_all_null_window_is_null() {
        let col = Column::from_i64s("n", [Some(4), None, None, Some(1)]);
        let out = rolling(&col, 2, RollingKind::Min).unwrap();
        assert_eq!(
            out.to_values(),
            vec![Value::Null, Value::from(4), Value::Null, Value::from(1)]
        );
    }

    #[test]
    fn rolling_sum_and_mean() {
        let col = Column::from_i64s("n", [Some(1), Some(2), None, Some(4)]);
        assert_eq!(
            rolling(&col, 2, RollingKind::Sum).unwrap().to_values(),
            vec![Value::Null, Value::from(3), Value::from(2), Value::from(4)]
        );
        assert_eq!(
            rolling(&col, 3, RollingKind::Mean).unwrap().to_values(),
            vec![Value::Null, Value::Null, Value::from(1.5), Value::from(3.0)]
        );
    }

    #[test]
    fn window_wider_than_column_is_all_null() {
        let col = Column::from_f64s("t", [Some(1.0), Some(2.0)]);
        let out = rolling(&col, 5, RollingKind::Max).unwrap();
        assert_eq!(out.null_count(), 2);
    }

    #[test]
    fn rejects_zero_window_and_text_sums() {
        let col = Column::from_strs("s", [Some("a")]);
        assert!(matches!(
            rolling(&col, 0, RollingKind::Max),
            Err(FrameError::InvalidArgument(_))
        ));
        assert!(rolling(&col, 1, RollingKind::Max).is_ok());
        assert!(matches!(
            rolling(&col, 1, RollingKind::Sum),
            Err(FrameError::Type(_))
        ));
    }
}

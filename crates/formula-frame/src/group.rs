use crate::agg::{self, AggKind};
use crate::config::EngineConfig;
use crate::error::{FrameError, FrameResult};
use crate::eval::{apply_binary, apply_conditional, apply_unary, eval_expr};
use crate::expr::Expr;
use crate::parallel::try_map_ordered;
use formula_columnar::{Column, Table, Value};
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

/// Row partitions of a table, in first-appearance order of their key tuples.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Groups {
    rows: Vec<Vec<usize>>,
}

impl Groups {
    pub(crate) fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn first_rows(&self) -> Vec<usize> {
        self.rows.iter().map(|rows| rows[0]).collect()
    }
}

/// Partition rows by the tuple of `keys` values. Null is an ordinary key value and floats group
/// by total-order equality (NaN with NaN).
pub(crate) fn partition(table: &Table, keys: &[String]) -> FrameResult<Groups> {
    let key_columns = keys
        .iter()
        .map(|key| table.column(key))
        .collect::<Result<Vec<_>, _>>()?;

    let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut rows: Vec<Vec<usize>> = Vec::new();
    for row in 0..table.row_count() {
        let key: Vec<Value> = key_columns.iter().map(|c| c.get(row)).collect();
        match index.entry(key) {
            Entry::Occupied(entry) => rows[*entry.get()].push(row),
            Entry::Vacant(entry) => {
                entry.insert(rows.len());
                rows.push(vec![row]);
            }
        }
    }
    Ok(Groups { rows })
}

/// Group `table` by `keys` and evaluate `aggs` once per group.
///
/// The output holds the key columns (first value of each group) followed by one column per
/// aggregate, one row per distinct key tuple in first-appearance order.
pub fn group_by(
    table: &Table,
    keys: &[String],
    aggs: &[Expr],
    config: &EngineConfig,
) -> FrameResult<Table> {
    if keys.is_empty() {
        return Err(FrameError::InvalidArgument(
            "group_by needs at least one key column".to_string(),
        ));
    }
    if let Some(expr) = aggs.iter().find(|expr| expr.has_rolling()) {
        return Err(FrameError::Type(format!(
            "rolling window in {expr} cannot be evaluated per group"
        )));
    }
    let mut names: HashSet<String> = HashSet::new();
    for name in keys.iter().cloned().chain(aggs.iter().map(Expr::output_name)) {
        if !names.insert(name.clone()) {
            return Err(FrameError::DuplicateAlias(name));
        }
    }

    let groups = partition(table, keys)?;
    log::debug!(
        "group_by {:?}: {} rows into {} groups, {} aggregates",
        keys,
        table.row_count(),
        groups.len(),
        aggs.len()
    );

    let first_rows = groups.first_rows();
    let mut columns = keys
        .iter()
        .map(|key| -> FrameResult<Column> { Ok(table.column(key)?.take(&first_rows)) })
        .collect::<FrameResult<Vec<_>>>()?;

    let aggregated = try_map_ordered(config, table.row_count(), aggs, |expr| {
        let column = eval_grouped(expr, table, &groups)?;
        Ok::<_, FrameError>(column.broadcast(groups.len()).rename(expr.output_name()))
    })?;
    for column in &aggregated {
        if column.len() != groups.len() {
            return Err(FrameError::Shape(format!(
                "aggregate {} produced {} rows for {} groups",
                column.name(),
                column.len(),
                groups.len()
            )));
        }
    }
    columns.extend(aggregated);
    Ok(Table::new(columns)?)
}

/// Evaluate `expr` in group context: one output row per group, or a single row for
/// expressions that read no columns.
pub(crate) fn eval_grouped(expr: &Expr, table: &Table, groups: &Groups) -> FrameResult<Column> {
    match expr {
        Expr::Alias { expr, name } => Ok(eval_grouped(expr, table, groups)?.rename(name.as_str())),
        Expr::Agg { kind, input } => {
            if input.has_aggregation() {
                return Err(FrameError::Type(format!(
                    "nested aggregation in {expr} is not supported"
                )));
            }
            let column = eval_expr(input, table)?.broadcast(table.row_count());
            agg::aggregate(*kind, &column, groups.rows())
        }
        Expr::Len => Ok(Column::from_i64s(
            "count",
            groups.rows().iter().map(|rows| Some(rows.len() as i64)),
        )),
        expr if !expr.has_aggregation() => {
            if expr.root_columns().is_empty() {
                return eval_expr(expr, table);
            }
            // A bare per-row expression keeps every value of the group.
            let column = eval_expr(expr, table)?.broadcast(table.row_count());
            agg::aggregate(AggKind::CollectList, &column, groups.rows())
        }
        Expr::UnaryOp { op, expr } => apply_unary(*op, &eval_grouped(expr, table, groups)?),
        Expr::BinaryOp { op, left, right } => apply_binary(
            *op,
            &eval_grouped(left, table, groups)?,
            &eval_grouped(right, table, groups)?,
        ),
        Expr::Conditional { branches, otherwise } => {
            let branches = branches
                .iter()
                .map(|(predicate, value)| -> FrameResult<(Column, Column)> {
                    Ok((
                        eval_grouped(predicate, table, groups)?,
                        eval_grouped(value, table, groups)?,
                    ))
                })
                .collect::<FrameResult<Vec<_>>>()?;
            apply_conditional(&branches, &eval_grouped(otherwise, table, groups)?)
        }
        Expr::Cast { expr, dtype } => Ok(eval_grouped(expr, table, groups)?.cast(dtype)?),
        other => Err(FrameError::Type(format!(
            "{other} cannot be evaluated per group"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, len, lit, sum};
    use crate::ErrorKind;
    use formula_columnar::DataType;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn platforms() -> Table {
        Table::new(vec![
            Column::from_strs("platform", [Some("ios"), None, Some("web"), Some("ios"), None]),
            Column::from_i64s("userid", [Some(1), Some(2), Some(3), Some(4), Some(5)]),
            Column::from_f64s("dlbytes", [Some(10.0), None, Some(2.5), Some(5.0), Some(1.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn partitions_in_first_appearance_order_with_null_group() {
        let groups = partition(&platforms(), &["platform".to_string()]).unwrap();
        assert_eq!(groups.rows(), &[vec![0, 3], vec![1, 4], vec![2]]);
        assert_eq!(groups.first_rows(), vec![0, 1, 2]);
    }

    #[test]
    fn group_by_mixes_reducers_and_implicit_lists() {
        let out = group_by(
            &platforms(),
            &["platform".to_string()],
            &[sum("dlbytes"), len().alias("row_cnt"), col("userid")],
            &EngineConfig::sequential(),
        )
        .unwrap();

        assert_eq!(out.column_names(), vec!["platform", "dlbytes", "row_cnt", "userid"]);
        assert_eq!(
            out.column("platform").unwrap().to_values(),
            vec![Value::from("ios"), Value::Null, Value::from("web")]
        );
        assert_eq!(
            out.column("dlbytes").unwrap().to_values(),
            vec![Value::from(15.0), Value::from(1.0), Value::from(2.5)]
        );
        assert_eq!(
            out.column("row_cnt").unwrap().to_values(),
            vec![Value::from(2), Value::from(2), Value::from(1)]
        );
        let users = out.column("userid").unwrap();
        assert_eq!(users.dtype(), &DataType::List(Box::new(DataType::Int64)));
        assert_eq!(
            users.get(1),
            Value::List(Arc::from(vec![Value::from(2), Value::from(5)]))
        );
    }

    #[test]
    fn aggregates_combine_arithmetically() {
        let out = group_by(
            &platforms(),
            &["platform".to_string()],
            &[(col("userid").max() - col("userid").min() + lit(1)).alias("span")],
            &EngineConfig::sequential(),
        )
        .unwrap();
        assert_eq!(
            out.column("span").unwrap().to_values(),
            vec![Value::from(4), Value::from(4), Value::from(1)]
        );
    }

    #[test]
    fn duplicate_output_names_are_rejected() {
        let err = group_by(
            &platforms(),
            &["platform".to_string()],
            &[sum("dlbytes"), col("dlbytes").max()],
            &EngineConfig::sequential(),
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::DuplicateAlias(name) if name == "dlbytes"));
    }

    #[test]
    fn rolling_windows_are_rejected_per_group() {
        for expr in [
            col("dlbytes").rolling_sum(2).alias("r"),
            col("dlbytes").rolling_max(2).max().alias("r"),
        ] {
            let err = group_by(
                &platforms(),
                &["platform".to_string()],
                &[expr],
                &EngineConfig::sequential(),
            )
            .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Type);
        }
    }

    #[test]
    fn empty_input_yields_empty_groups() {
        let empty = platforms().head(0);
        let out = group_by(
            &empty,
            &["platform".to_string()],
            &[sum("dlbytes"), len()],
            &EngineConfig::sequential(),
        )
        .unwrap();
        assert_eq!(out.shape(), (0, 3));
    }
}

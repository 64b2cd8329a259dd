//! Row-context expression evaluation.
//!
//! Null handling follows three-valued logic: comparisons and arithmetic with a null operand are
//! null, `and`/`or` are Kleene connectives (`null & false == false`, `null | true == true`), and
//! `is_null`/`is_not_null` never produce nulls. Literals and aggregates evaluate to single-row
//! columns that broadcast against full-height operands.

use crate::agg;
use crate::error::{FrameError, FrameResult};
use crate::expr::{BinaryOp, Expr, UnaryOp};
use crate::window;
use formula_columnar::{Column, ColumnBuilder, DataType, Table, Value};

/// Evaluate `expr` against `table`.
///
/// Per-row expressions produce `table.row_count()` rows. Aggregates, [`len`](crate::len) and
/// expressions built only from literals produce a single row.
pub fn evaluate(expr: &Expr, table: &Table) -> FrameResult<Column> {
    Ok(eval_expr(expr, table)?.rename(expr.output_name()))
}

pub(crate) fn eval_expr(expr: &Expr, table: &Table) -> FrameResult<Column> {
    match expr {
        Expr::Column(name) => Ok(table.column(name)?.clone()),
        Expr::Literal(value) => literal_column(value),
        Expr::Alias { expr, name } => Ok(eval_expr(expr, table)?.rename(name.as_str())),
        Expr::UnaryOp { op, expr } => apply_unary(*op, &eval_expr(expr, table)?),
        Expr::BinaryOp { op, left, right } => {
            apply_binary(*op, &eval_expr(left, table)?, &eval_expr(right, table)?)
        }
        Expr::Conditional { branches, otherwise } => {
            let branches = branches
                .iter()
                .map(|(predicate, value)| -> FrameResult<(Column, Column)> {
                    Ok((eval_expr(predicate, table)?, eval_expr(value, table)?))
                })
                .collect::<FrameResult<Vec<_>>>()?;
            apply_conditional(&branches, &eval_expr(otherwise, table)?)
        }
        Expr::Agg { kind, input } => {
            if input.has_aggregation() {
                return Err(FrameError::Type(format!(
                    "nested aggregation in {expr} is not supported"
                )));
            }
            let column = eval_expr(input, table)?;
            let all_rows: Vec<usize> = (0..column.len()).collect();
            agg::aggregate(*kind, &column, &[all_rows])
        }
        Expr::Len => Ok(Column::from_i64s("count", [Some(table.row_count() as i64)])),
        Expr::Rolling {
            input,
            window_size,
            kind,
        } => {
            let column = eval_expr(input, table)?.broadcast(table.row_count());
            window::rolling(&column, *window_size, *kind)
        }
        Expr::Over { expr, partition_by } => window::over(expr, partition_by, table),
        Expr::Cast { expr, dtype } => Ok(eval_expr(expr, table)?.cast(dtype)?),
        Expr::StrToDatetime {
            expr,
            format,
            strict,
        } => str_to_datetime(&eval_expr(expr, table)?, format, *strict),
    }
}

fn literal_column(value: &Value) -> FrameResult<Column> {
    match value.dtype() {
        None if value.is_null() => Ok(Column::full_null("literal", DataType::Null, 1)),
        None => Err(FrameError::Type("list literals are not supported".to_string())),
        Some(dtype) => Ok(Column::from_values("literal", dtype, [value.clone()])?),
    }
}

/// Row index into a column that may be a broadcast scalar.
#[inline]
fn at(column: &Column, row: usize) -> usize {
    if column.len() == 1 {
        0
    } else {
        row
    }
}

fn broadcast_len(what: &str, columns: &[&Column]) -> FrameResult<usize> {
    let mut len = 1;
    for column in columns {
        match column.len() {
            1 => {}
            n if len == 1 || n == len => len = n,
            n => {
                return Err(FrameError::Shape(format!(
                    "`{what}` operands have {len} and {n} rows"
                )))
            }
        }
    }
    Ok(len)
}

pub(crate) fn apply_unary(op: UnaryOp, column: &Column) -> FrameResult<Column> {
    let name = column.name();
    let len = column.len();
    match op {
        UnaryOp::IsNull => Ok(Column::from_bools(
            name,
            (0..len).map(|row| Some(!column.is_valid(row))),
        )),
        UnaryOp::IsNotNull => Ok(Column::from_bools(
            name,
            (0..len).map(|row| Some(column.is_valid(row))),
        )),
        UnaryOp::Not => match column.dtype() {
            DataType::Bool | DataType::Null => Ok(Column::from_bools(
                name,
                (0..len).map(|row| column.bool_at(row).map(|b| !b)),
            )),
            other => Err(FrameError::Type(format!("cannot negate a {other} column with `!`"))),
        },
        UnaryOp::Negate => match column.dtype() {
            DataType::Int64 => Ok(Column::from_i64s(
                name,
                (0..len).map(|row| column.i64_at(row).and_then(i64::checked_neg)),
            )),
            DataType::Float64 => Ok(Column::from_f64s(
                name,
                (0..len).map(|row| column.f64_at(row).map(|v| -v)),
            )),
            DataType::Null => Ok(column.clone()),
            other => Err(FrameError::Type(format!("cannot negate a {other} column"))),
        },
    }
}

pub(crate) fn apply_binary(op: BinaryOp, left: &Column, right: &Column) -> FrameResult<Column> {
    let len = broadcast_len(op.symbol(), &[left, right])?;
    let invalid = || FrameError::InvalidOperation {
        op: op.symbol(),
        left: left.dtype().clone(),
        right: right.dtype().clone(),
    };
    if op.is_arithmetic() {
        arithmetic(op, left, right, len).ok_or_else(invalid)
    } else if op.is_comparison() {
        compare(op, left, right, len).ok_or_else(invalid)
    } else {
        logical(op, left, right, len).ok_or_else(invalid)
    }
}

/// `None` when the operand types do not support arithmetic.
fn arithmetic(op: BinaryOp, left: &Column, right: &Column, len: usize) -> Option<Column> {
    let (l, r) = (left.dtype(), right.dtype());
    let operand = |d: &DataType| d.is_numeric() || d == &DataType::Null;
    if !operand(l) || !operand(r) {
        return None;
    }
    let name = left.name();
    if l == &DataType::Null && r == &DataType::Null && op != BinaryOp::Divide {
        return Some(Column::full_null(name, DataType::Null, len));
    }

    let integer = op != BinaryOp::Divide && l != &DataType::Float64 && r != &DataType::Float64;
    if integer {
        return Some(Column::from_i64s(
            name,
            (0..len).map(|row| {
                let a = left.i64_at(at(left, row))?;
                let b = right.i64_at(at(right, row))?;
                match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Subtract => a.checked_sub(b),
                    BinaryOp::Multiply => a.checked_mul(b),
                    BinaryOp::Modulo => a.checked_rem(b),
                    _ => None,
                }
            }),
        ));
    }

    Some(Column::from_f64s(
        name,
        (0..len).map(|row| {
            let a = left.f64_at(at(left, row))?;
            let b = right.f64_at(at(right, row))?;
            match op {
                BinaryOp::Add => Some(a + b),
                BinaryOp::Subtract => Some(a - b),
                BinaryOp::Multiply => Some(a * b),
                BinaryOp::Divide => Some(a / b),
                BinaryOp::Modulo => Some(a % b),
                _ => None,
            }
        }),
    ))
}

fn compare(op: BinaryOp, left: &Column, right: &Column, len: usize) -> Option<Column> {
    let comparable = match (left.dtype(), right.dtype()) {
        (DataType::Null, _) | (_, DataType::Null) => true,
        (a, b) if a.is_numeric() && b.is_numeric() => true,
        (a, b) => a == b && a.is_ordered(),
    };
    if !comparable {
        return None;
    }
    Some(Column::from_bools(
        left.name(),
        (0..len).map(|row| {
            let ord = left
                .get(at(left, row))
                .try_cmp(&right.get(at(right, row)))?;
            Some(match op {
                BinaryOp::Equals => ord.is_eq(),
                BinaryOp::NotEquals => ord.is_ne(),
                BinaryOp::Less => ord.is_lt(),
                BinaryOp::LessEquals => ord.is_le(),
                BinaryOp::Greater => ord.is_gt(),
                _ => ord.is_ge(),
            })
        }),
    ))
}

fn logical(op: BinaryOp, left: &Column, right: &Column, len: usize) -> Option<Column> {
    let operand = |d: &DataType| matches!(d, DataType::Bool | DataType::Null);
    if !operand(left.dtype()) || !operand(right.dtype()) {
        return None;
    }
    Some(Column::from_bools(
        left.name(),
        (0..len).map(|row| {
            let a = left.bool_at(at(left, row));
            let b = right.bool_at(at(right, row));
            match op {
                BinaryOp::And => match (a, b) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                },
                _ => match (a, b) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                },
            }
        }),
    ))
}

/// Pick, per row, the value of the first branch whose predicate is non-null true, falling back
/// to `otherwise`.
pub(crate) fn apply_conditional(
    branches: &[(Column, Column)],
    otherwise: &Column,
) -> FrameResult<Column> {
    let mut operands: Vec<&Column> = Vec::with_capacity(branches.len() * 2 + 1);
    let mut dtype = otherwise.dtype().clone();
    for (predicate, value) in branches {
        if !matches!(predicate.dtype(), DataType::Bool | DataType::Null) {
            return Err(FrameError::Type(format!(
                "when() predicate must be bool, got {}",
                predicate.dtype()
            )));
        }
        dtype = dtype.unify(value.dtype()).ok_or_else(|| {
            FrameError::Type(format!(
                "when/then branches mix {dtype} and {}",
                value.dtype()
            ))
        })?;
        operands.push(predicate);
        operands.push(value);
    }
    operands.push(otherwise);
    let len = broadcast_len("when/then/otherwise", &operands)?;

    let values = branches
        .iter()
        .map(|(_, value)| value.cast(&dtype))
        .collect::<Result<Vec<_>, _>>()?;
    let otherwise = otherwise.cast(&dtype)?;
    let name = values.first().unwrap_or(&otherwise).name().to_string();

    let mut builder = ColumnBuilder::new(name, dtype, len);
    for row in 0..len {
        let chosen = branches
            .iter()
            .position(|(predicate, _)| predicate.bool_at(at(predicate, row)) == Some(true));
        let source = chosen.map_or(&otherwise, |idx| &values[idx]);
        builder.push(&source.get(at(source, row)))?;
    }
    Ok(builder.finish())
}

pub(crate) fn parse_datetime(text: &str, format: &str) -> Option<i64> {
    chrono::NaiveDateTime::parse_from_str(text, format)
        .ok()
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|dt| dt.and_utc().timestamp_micros())
}

fn str_to_datetime(column: &Column, format: &str, strict: bool) -> FrameResult<Column> {
    match column.dtype() {
        DataType::Utf8 => {}
        DataType::Null => {
            return Ok(Column::full_null(column.name(), DataType::Datetime, column.len()))
        }
        other => {
            return Err(FrameError::Type(format!(
                "str_to_datetime expects a str column, got {other}"
            )))
        }
    }
    let mut out = Vec::with_capacity(column.len());
    for row in 0..column.len() {
        let Some(text) = column.str_at(row) else {
            out.push(None);
            continue;
        };
        match parse_datetime(text, format) {
            Some(micros) => out.push(Some(micros)),
            None if strict => {
                return Err(FrameError::Parse {
                    value: text.to_string(),
                    format: format.to_string(),
                })
            }
            None => out.push(None),
        }
    }
    Ok(Column::from_datetimes(column.name(), out))
}

use crate::config::EngineConfig;
use crate::error::{FrameError, FrameResult};
use crate::expr::{col, Expr};
use crate::group;
use crate::ops::{self, SortKey};
use crate::window::RollingKind;
use formula_columnar::Table;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One deferred step of a [`QueryPlan`].
#[derive(Clone, Debug, PartialEq)]
pub enum PlanOp {
    Filter(Expr),
    Select(Vec<Expr>),
    WithColumns(Vec<Expr>),
    GroupBy {
        keys: Vec<String>,
        aggs: Vec<Expr>,
    },
    Sort(Vec<SortKey>),
    Window {
        column: String,
        window_size: usize,
        kind: RollingKind,
        alias: String,
    },
    Head(usize),
    Tail(usize),
}

/// Run one plan step through the same functions the eager [`FrameOps`](crate::FrameOps) methods
/// call.
fn apply_op(table: &Table, op: &PlanOp, config: &EngineConfig) -> FrameResult<Table> {
    match op {
        PlanOp::Filter(predicate) => ops::filter(table, predicate),
        PlanOp::Select(exprs) => ops::select(table, exprs, config),
        PlanOp::WithColumns(exprs) => ops::with_columns(table, exprs, config),
        PlanOp::GroupBy { keys, aggs } => group::group_by(table, keys, aggs, config),
        PlanOp::Sort(keys) => ops::sort(table, keys),
        PlanOp::Window {
            column,
            window_size,
            kind,
            alias,
        } => {
            let expr = col(column.as_str()).rolling(*kind, *window_size).alias(alias.as_str());
            ops::with_columns(table, &[expr], config)
        }
        PlanOp::Head(n) => Ok(table.head(*n)),
        PlanOp::Tail(n) => Ok(table.tail(*n)),
    }
}

fn write_exprs(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    f.write_str("[")?;
    for (idx, expr) in exprs.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{expr}")?;
    }
    f.write_str("]")
}

impl fmt::Display for PlanOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOp::Filter(predicate) => write!(f, "FILTER {predicate}"),
            PlanOp::Select(exprs) => {
                f.write_str("SELECT ")?;
                write_exprs(f, exprs)
            }
            PlanOp::WithColumns(exprs) => {
                f.write_str("WITH_COLUMNS ")?;
                write_exprs(f, exprs)
            }
            PlanOp::GroupBy { keys, aggs } => {
                write!(f, "GROUP_BY {keys:?} AGG ")?;
                write_exprs(f, aggs)
            }
            PlanOp::Sort(keys) => {
                f.write_str("SORT BY")?;
                for key in keys {
                    let direction = if key.descending { "DESC" } else { "ASC" };
                    let nulls = if key.nulls_last { "LAST" } else { "FIRST" };
                    write!(f, " {:?} {direction} NULLS {nulls}", key.column)?;
                }
                Ok(())
            }
            PlanOp::Window {
                column,
                window_size,
                kind,
                alias,
            } => write!(
                f,
                "ROLLING {}({column:?}, {window_size}) AS {alias:?}",
                kind.name().to_uppercase()
            ),
            PlanOp::Head(n) => write!(f, "HEAD {n}"),
            PlanOp::Tail(n) => write!(f, "TAIL {n}"),
        }
    }
}

/// Cooperative cancellation for [`QueryPlan::collect_with`]. Clones share one flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A deferred sequence of operations over a shared source table.
///
/// Builder methods return a new plan and leave the receiver unchanged, so a plan can be
/// extended in several directions. Nothing runs until [`QueryPlan::collect`].
#[derive(Clone, Debug)]
pub struct QueryPlan {
    source: Arc<Table>,
    ops: Vec<PlanOp>,
    config: EngineConfig,
}

impl QueryPlan {
    pub fn new(source: Table) -> Self {
        Self::from_shared(Arc::new(source))
    }

    pub fn from_shared(source: Arc<Table>) -> Self {
        Self {
            source,
            ops: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn source(&self) -> &Table {
        &self.source
    }

    pub fn ops(&self) -> &[PlanOp] {
        &self.ops
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn with_config(&self, config: EngineConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    pub fn then(&self, op: PlanOp) -> Self {
        let mut ops = Vec::with_capacity(self.ops.len() + 1);
        ops.extend(self.ops.iter().cloned());
        ops.push(op);
        Self {
            source: Arc::clone(&self.source),
            ops,
            config: self.config,
        }
    }

    pub fn filter(&self, predicate: Expr) -> Self {
        self.then(PlanOp::Filter(predicate))
    }

    pub fn select<I>(&self, exprs: I) -> Self
    where
        I: IntoIterator<Item = Expr>,
    {
        self.then(PlanOp::Select(exprs.into_iter().collect()))
    }

    pub fn with_columns<I>(&self, exprs: I) -> Self
    where
        I: IntoIterator<Item = Expr>,
    {
        self.then(PlanOp::WithColumns(exprs.into_iter().collect()))
    }

    pub fn group_by<K, S, A>(&self, keys: K, aggs: A) -> Self
    where
        K: IntoIterator<Item = S>,
        S: Into<String>,
        A: IntoIterator<Item = Expr>,
    {
        self.then(PlanOp::GroupBy {
            keys: keys.into_iter().map(Into::into).collect(),
            aggs: aggs.into_iter().collect(),
        })
    }

    pub fn sort(&self, column: &str, descending: bool) -> Self {
        self.then(PlanOp::Sort(vec![SortKey::new(column, descending)]))
    }

    pub fn sort_by(&self, keys: Vec<SortKey>) -> Self {
        self.then(PlanOp::Sort(keys))
    }

    pub fn rolling(&self, column: &str, window_size: usize, kind: RollingKind, alias: &str) -> Self {
        self.then(PlanOp::Window {
            column: column.to_string(),
            window_size,
            kind,
            alias: alias.to_string(),
        })
    }

    pub fn head(&self, n: usize) -> Self {
        self.then(PlanOp::Head(n))
    }

    pub fn tail(&self, n: usize) -> Self {
        self.then(PlanOp::Tail(n))
    }

    /// Human-readable listing of the source and each step.
    pub fn describe_plan(&self) -> String {
        let (rows, columns) = self.source.shape();
        let mut out = format!("SOURCE {rows} rows x {columns} columns");
        for (idx, op) in self.ops.iter().enumerate() {
            out.push_str(&format!("\n  {}: {op}", idx + 1));
        }
        out
    }

    pub fn collect(&self) -> FrameResult<Table> {
        self.collect_with(&CancellationToken::new())
    }

    /// Replay the plan against the source. `token` is checked before every step; a cancelled
    /// run returns [`FrameError::Cancelled`] and produces no table.
    pub fn collect_with(&self, token: &CancellationToken) -> FrameResult<Table> {
        let total = self.ops.len();
        let mut current = Table::clone(&self.source);
        for (idx, op) in self.ops.iter().enumerate() {
            let step = idx + 1;
            if token.is_cancelled() {
                log::debug!("plan cancelled before step {step}/{total}");
                return Err(FrameError::Cancelled { step, total });
            }
            log::debug!(
                "plan step {step}/{total}: {op} ({} rows in)",
                current.row_count()
            );
            current = apply_op(&current, op, &self.config)?;
            log::trace!("plan step {step}/{total} produced {} rows", current.row_count());
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lit, sum};
    use crate::ops::FrameOps;
    use formula_columnar::{Column, Value};
    use pretty_assertions::assert_eq;

    fn sales() -> Table {
        Table::new(vec![
            Column::from_strs("region", [Some("n"), Some("s"), Some("n"), None]),
            Column::from_i64s("amount", [Some(5), Some(7), None, Some(2)]),
        ])
        .unwrap()
    }

    #[test]
    fn builder_calls_leave_the_receiver_untouched() {
        let base = sales().lazy().filter(col("amount").gt(lit(1)));
        let sorted = base.sort("amount", true);
        let grouped = base.group_by(["region"], [sum("amount")]);
        assert_eq!(base.ops().len(), 1);
        assert_eq!(sorted.ops().len(), 2);
        assert_eq!(grouped.ops().len(), 2);
        assert_eq!(base.collect().unwrap().row_count(), 3);
    }

    #[test]
    fn collect_matches_eager_execution() {
        let table = sales();
        let lazy = table
            .lazy()
            .with_columns([(col("amount") * lit(2)).alias("double")])
            .filter(col("double").gt_eq(lit(4)))
            .sort("double", false)
            .collect()
            .unwrap();
        let eager = table
            .with_columns([(col("amount") * lit(2)).alias("double")])
            .and_then(|t| t.filter(col("double").gt_eq(lit(4))))
            .and_then(|t| t.sort("double", false))
            .unwrap();
        assert_eq!(lazy, eager);
        assert_eq!(
            lazy.column("double").unwrap().to_values(),
            vec![Value::from(4), Value::from(10), Value::from(14)]
        );
    }

    #[test]
    fn cancelled_plans_stop_between_steps() {
        let plan = sales().lazy().filter(col("amount").is_not_null()).head(1);
        let token = CancellationToken::new();
        token.clone().cancel();
        let err = plan.collect_with(&token).unwrap_err();
        assert!(matches!(err, FrameError::Cancelled { step: 1, total: 2 }));
        assert_eq!(sales().lazy().collect_with(&token).unwrap(), sales());
    }

    #[test]
    fn errors_surface_at_collect_time() {
        let plan = sales().lazy().select([col("missing")]);
        assert!(matches!(plan.collect(), Err(FrameError::UnknownColumn(name)) if name == "missing"));
    }

    #[test]
    fn describe_lists_each_step() {
        let plan = sales()
            .lazy()
            .filter(col("amount").is_not_null())
            .rolling("amount", 2, RollingKind::Max, "peak")
            .tail(2);
        assert_eq!(
            plan.describe_plan(),
            "SOURCE 4 rows x 2 columns\n  1: FILTER col(\"amount\").is_not_null()\n  2: ROLLING MAX(\"amount\", 2) AS \"peak\"\n  3: TAIL 2"
        );
    }
}

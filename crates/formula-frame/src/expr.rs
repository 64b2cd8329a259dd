//! Expression AST and the builder functions used to assemble it.
//!
//! Expressions are plain values: building one never touches a table. They are evaluated by
//! [`evaluate`](crate::evaluate) (row context) or inside `group_by` (group context).

use crate::agg::AggKind;
use crate::window::RollingKind;
use formula_columnar::{DataType, Value};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Value),
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `when(p1).then(v1).when(p2).then(v2)....otherwise(default)`; the first branch whose
    /// predicate is non-null true wins.
    Conditional {
        branches: Vec<(Expr, Expr)>,
        otherwise: Box<Expr>,
    },
    Agg {
        kind: AggKind,
        input: Box<Expr>,
    },
    /// Number of rows in the evaluation context (the table, or the group).
    Len,
    Alias {
        expr: Box<Expr>,
        name: String,
    },
    Rolling {
        input: Box<Expr>,
        window_size: usize,
        kind: RollingKind,
    },
    /// Evaluate `expr` separately within each partition and scatter the results back to the
    /// partition's rows.
    Over {
        expr: Box<Expr>,
        partition_by: Vec<String>,
    },
    Cast {
        expr: Box<Expr>,
        dtype: DataType,
    },
    StrToDatetime {
        expr: Box<Expr>,
        format: String,
        strict: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    IsNull,
    IsNotNull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    Less,
    LessEquals,
    Greater,
    GreaterEquals,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equals => "==",
            BinaryOp::NotEquals => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEquals => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEquals => ">=",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equals
                | BinaryOp::NotEquals
                | BinaryOp::Less
                | BinaryOp::LessEquals
                | BinaryOp::Greater
                | BinaryOp::GreaterEquals
        )
    }
}

pub fn col(name: impl Into<String>) -> Expr {
    Expr::Column(name.into())
}

pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// Row count of the evaluation context, named `count`.
pub fn len() -> Expr {
    Expr::Len
}

pub fn when(predicate: Expr) -> When {
    When {
        branches: Vec::new(),
        predicate,
    }
}

macro_rules! column_agg_fns {
    ($($name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $name(column: impl Into<String>) -> Expr {
                col(column).agg(AggKind::$kind)
            }
        )*
    };
}

column_agg_fns! {
    sum => Sum,
    mean => Mean,
    min => Min,
    max => Max,
    count => Count,
    first => First,
    last => Last,
    collect_list => CollectList,
}

/// A `when` whose `then` has not been supplied yet.
#[derive(Clone, Debug)]
pub struct When {
    branches: Vec<(Expr, Expr)>,
    predicate: Expr,
}

impl When {
    pub fn then(self, value: Expr) -> Then {
        let mut branches = self.branches;
        branches.push((self.predicate, value));
        Then { branches }
    }
}

/// A complete chain of branches; finish with [`Then::otherwise`] or convert directly, in which
/// case unmatched rows are null.
#[derive(Clone, Debug)]
pub struct Then {
    branches: Vec<(Expr, Expr)>,
}

impl Then {
    pub fn when(self, predicate: Expr) -> When {
        When {
            branches: self.branches,
            predicate,
        }
    }

    pub fn otherwise(self, value: Expr) -> Expr {
        Expr::Conditional {
            branches: self.branches,
            otherwise: Box::new(value),
        }
    }
}

impl From<Then> for Expr {
    fn from(then: Then) -> Self {
        then.otherwise(lit(Value::Null))
    }
}

impl Expr {
    pub fn alias(self, name: impl Into<String>) -> Expr {
        Expr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    fn unary(self, op: UnaryOp) -> Expr {
        Expr::UnaryOp {
            op,
            expr: Box::new(self),
        }
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::BinaryOp {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn is_null(self) -> Expr {
        self.unary(UnaryOp::IsNull)
    }

    pub fn is_not_null(self) -> Expr {
        self.unary(UnaryOp::IsNotNull)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Equals, other)
    }

    pub fn neq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEquals, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Less, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LessEquals, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Greater, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GreaterEquals, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn agg(self, kind: AggKind) -> Expr {
        Expr::Agg {
            kind,
            input: Box::new(self),
        }
    }

    pub fn sum(self) -> Expr {
        self.agg(AggKind::Sum)
    }

    pub fn mean(self) -> Expr {
        self.agg(AggKind::Mean)
    }

    pub fn min(self) -> Expr {
        self.agg(AggKind::Min)
    }

    pub fn max(self) -> Expr {
        self.agg(AggKind::Max)
    }

    /// Number of rows, nulls included.
    pub fn count(self) -> Expr {
        self.agg(AggKind::Count)
    }

    pub fn first(self) -> Expr {
        self.agg(AggKind::First)
    }

    pub fn last(self) -> Expr {
        self.agg(AggKind::Last)
    }

    pub fn list(self) -> Expr {
        self.agg(AggKind::CollectList)
    }

    pub fn std(self) -> Expr {
        self.agg(AggKind::Std)
    }

    pub fn median(self) -> Expr {
        self.agg(AggKind::Median)
    }

    pub fn null_count(self) -> Expr {
        self.agg(AggKind::NullCount)
    }

    pub fn n_unique(self) -> Expr {
        self.agg(AggKind::NUnique)
    }

    pub fn rolling(self, kind: RollingKind, window_size: usize) -> Expr {
        Expr::Rolling {
            input: Box::new(self),
            window_size,
            kind,
        }
    }

    pub fn rolling_min(self, window_size: usize) -> Expr {
        self.rolling(RollingKind::Min, window_size)
    }

    pub fn rolling_max(self, window_size: usize) -> Expr {
        self.rolling(RollingKind::Max, window_size)
    }

    pub fn rolling_sum(self, window_size: usize) -> Expr {
        self.rolling(RollingKind::Sum, window_size)
    }

    pub fn rolling_mean(self, window_size: usize) -> Expr {
        self.rolling(RollingKind::Mean, window_size)
    }

    pub fn over<I, S>(self, partition_by: I) -> Expr
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::Over {
            expr: Box::new(self),
            partition_by: partition_by.into_iter().map(Into::into).collect(),
        }
    }

    pub fn cast(self, dtype: DataType) -> Expr {
        Expr::Cast {
            expr: Box::new(self),
            dtype,
        }
    }

    /// Parse Utf8 values with a chrono format string. Non-strict parsing turns unparseable
    /// values into nulls; strict parsing fails the evaluation.
    pub fn str_to_datetime(self, format: impl Into<String>, strict: bool) -> Expr {
        Expr::StrToDatetime {
            expr: Box::new(self),
            format: format.into(),
            strict,
        }
    }

    /// Name of the column this expression produces when no alias is given: the left-most column
    /// reference, `count` for [`len`] and `literal` for a bare literal.
    pub fn output_name(&self) -> String {
        match self {
            Expr::Column(name) => name.clone(),
            Expr::Alias { name, .. } => name.clone(),
            Expr::Literal(_) => "literal".to_string(),
            Expr::Len => "count".to_string(),
            Expr::UnaryOp { expr, .. }
            | Expr::Over { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::StrToDatetime { expr, .. } => expr.output_name(),
            Expr::Agg { input, .. } | Expr::Rolling { input, .. } => input.output_name(),
            Expr::BinaryOp { left, .. } => left.output_name(),
            Expr::Conditional { branches, otherwise } => branches
                .first()
                .map(|(_, value)| value.output_name())
                .unwrap_or_else(|| otherwise.output_name()),
        }
    }

    /// Whether evaluation reduces rows (an aggregate or [`len`] outside of any `over`).
    pub fn has_aggregation(&self) -> bool {
        match self {
            Expr::Agg { .. } | Expr::Len => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::Over { .. } => false,
            Expr::UnaryOp { expr, .. }
            | Expr::Alias { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::StrToDatetime { expr, .. } => expr.has_aggregation(),
            Expr::Rolling { input, .. } => input.has_aggregation(),
            Expr::BinaryOp { left, right, .. } => left.has_aggregation() || right.has_aggregation(),
            Expr::Conditional { branches, otherwise } => {
                otherwise.has_aggregation()
                    || branches
                        .iter()
                        .any(|(p, v)| p.has_aggregation() || v.has_aggregation())
            }
        }
    }

    /// True when a rolling window appears outside any `over` partition.
    pub(crate) fn has_rolling(&self) -> bool {
        match self {
            Expr::Rolling { .. } => true,
            Expr::Column(_) | Expr::Literal(_) | Expr::Len | Expr::Over { .. } => false,
            Expr::UnaryOp { expr, .. }
            | Expr::Alias { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::StrToDatetime { expr, .. } => expr.has_rolling(),
            Expr::Agg { input, .. } => input.has_rolling(),
            Expr::BinaryOp { left, right, .. } => left.has_rolling() || right.has_rolling(),
            Expr::Conditional { branches, otherwise } => {
                otherwise.has_rolling()
                    || branches.iter().any(|(p, v)| p.has_rolling() || v.has_rolling())
            }
        }
    }

    /// Column names referenced anywhere in the expression (partition keys included), in
    /// first-reference order without duplicates.
    pub fn root_columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        fn push<'a>(name: &'a str, out: &mut Vec<&'a str>) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
        match self {
            Expr::Column(name) => push(name, out),
            Expr::Literal(_) | Expr::Len => {}
            Expr::UnaryOp { expr, .. }
            | Expr::Alias { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::StrToDatetime { expr, .. } => expr.collect_columns(out),
            Expr::Agg { input, .. } | Expr::Rolling { input, .. } => input.collect_columns(out),
            Expr::Over { expr, partition_by } => {
                expr.collect_columns(out);
                for key in partition_by {
                    push(key, out);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Conditional { branches, otherwise } => {
                for (predicate, value) in branches {
                    predicate.collect_columns(out);
                    value.collect_columns(out);
                }
                otherwise.collect_columns(out);
            }
        }
    }
}

macro_rules! impl_binary_operator {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl std::ops::$trait for Expr {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    self.binary(BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

impl_binary_operator! {
    Add::add => Add,
    Sub::sub => Subtract,
    Mul::mul => Multiply,
    Div::div => Divide,
    Rem::rem => Modulo,
    BitAnd::bitand => And,
    BitOr::bitor => Or,
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        self.unary(UnaryOp::Negate)
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        self.unary(UnaryOp::Not)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "col({name:?})"),
            Expr::Literal(value) => write!(f, "lit({value})"),
            Expr::UnaryOp { op, expr } => match op {
                UnaryOp::Not => write!(f, "!{expr}"),
                UnaryOp::Negate => write!(f, "-{expr}"),
                UnaryOp::IsNull => write!(f, "{expr}.is_null()"),
                UnaryOp::IsNotNull => write!(f, "{expr}.is_not_null()"),
            },
            Expr::BinaryOp { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Conditional { branches, otherwise } => {
                for (idx, (predicate, value)) in branches.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "when({predicate}).then({value})")?;
                }
                write!(f, ".otherwise({otherwise})")
            }
            Expr::Agg { kind, input } => write!(f, "{input}.{}()", kind.name()),
            Expr::Len => f.write_str("len()"),
            Expr::Alias { expr, name } => write!(f, "{expr}.alias({name:?})"),
            Expr::Rolling {
                input,
                window_size,
                kind,
            } => write!(f, "{input}.rolling_{}({window_size})", kind.name()),
            Expr::Over { expr, partition_by } => write!(f, "{expr}.over({partition_by:?})"),
            Expr::Cast { expr, dtype } => write!(f, "{expr}.cast({dtype})"),
            Expr::StrToDatetime {
                expr,
                format,
                strict,
            } => write!(f, "{expr}.str_to_datetime({format:?}, strict={strict})"),
        }
    }
}

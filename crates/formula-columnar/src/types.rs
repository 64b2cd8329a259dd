#![forbid(unsafe_code)]

use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Logical column type.
///
/// `Datetime` values are naive timestamps stored as microseconds since the Unix epoch.
/// `Null` is the type of a column built from an untyped null literal and unifies with every
/// other type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Datetime,
    List(Box<DataType>),
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Float64)
    }

    /// Whether values of this type have a total order usable by min/max/sort.
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            DataType::Bool
                | DataType::Int64
                | DataType::Float64
                | DataType::Utf8
                | DataType::Datetime
        )
    }

    /// The common supertype of two types, if one exists without a lossy cast.
    pub fn unify(&self, other: &DataType) -> Option<DataType> {
        match (self, other) {
            (a, b) if a == b => Some(a.clone()),
            (DataType::Null, other) | (other, DataType::Null) => Some(other.clone()),
            (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
                Some(DataType::Float64)
            }
            (DataType::List(a), DataType::List(b)) => {
                a.unify(b).map(|inner| DataType::List(Box::new(inner)))
            }
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => f.write_str("null"),
            DataType::Bool => f.write_str("bool"),
            DataType::Int64 => f.write_str("i64"),
            DataType::Float64 => f.write_str("f64"),
            DataType::Utf8 => f.write_str("str"),
            DataType::Datetime => f.write_str("datetime[μs]"),
            DataType::List(inner) => write!(f, "list[{inner}]"),
        }
    }
}

/// A single cell value. `Null` is the explicit absent-value marker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(OrderedFloat<f64>),
    Utf8(Arc<str>),
    Datetime(i64),
    List(Arc<[Value]>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The type of this value; `None` for `Null` (it has no intrinsic type) and for lists,
    /// whose element type is carried by the owning column.
    pub fn dtype(&self) -> Option<DataType> {
        match self {
            Value::Null | Value::List(_) => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::Int64(_) => Some(DataType::Int64),
            Value::Float64(_) => Some(DataType::Float64),
            Value::Utf8(_) => Some(DataType::Utf8),
            Value::Datetime(_) => Some(DataType::Datetime),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value (integers widen to `f64`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Ordering between two non-null values of compatible types.
    ///
    /// Int64 and Float64 compare numerically; floats use the total order of [`OrderedFloat`]
    /// (NaN sorts above every number). Returns `None` for incomparable pairs and for nulls.
    pub fn try_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            (Value::Float64(a), Value::Float64(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Float64(b)) => Some(OrderedFloat(*a as f64).cmp(b)),
            (Value::Float64(a), Value::Int64(b)) => Some(a.cmp(&OrderedFloat(*b as f64))),
            (Value::Utf8(a), Value::Utf8(b)) => Some(a.as_ref().cmp(b.as_ref())),
            (Value::Datetime(a), Value::Datetime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{}", v.0),
            Value::Utf8(s) => write!(f, "{s:?}"),
            Value::Datetime(micros) => match chrono::DateTime::from_timestamp_micros(*micros) {
                Some(dt) => write!(f, "{}", dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.f")),
                None => write!(f, "datetime({micros})"),
            },
            Value::List(values) => {
                f.write_str("[")?;
                for (idx, v) in values.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int64(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(OrderedFloat(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(Arc::from(v))
    }
}

impl From<Arc<str>> for Value {
    fn from(v: Arc<str>) -> Self {
        Value::Utf8(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unify_promotes_ints_and_absorbs_null() {
        assert_eq!(
            DataType::Int64.unify(&DataType::Float64),
            Some(DataType::Float64)
        );
        assert_eq!(DataType::Null.unify(&DataType::Utf8), Some(DataType::Utf8));
        assert_eq!(DataType::Utf8.unify(&DataType::Bool), None);
    }

    #[test]
    fn mixed_numeric_ordering() {
        assert_eq!(
            Value::from(2).try_cmp(&Value::from(2.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::from("a").try_cmp(&Value::from(1)), None);
        assert_eq!(Value::Null.try_cmp(&Value::Null), None);
    }

    #[test]
    fn option_converts_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }
}

#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::error::{ColumnarError, ColumnarResult};
use crate::types::{DataType, Value};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::sync::Arc;

/// Float bounds of the `i64` range: `[-2^63, 2^63)`.
const I64_LOWER_F64: f64 = -9_223_372_036_854_775_808.0;
const I64_UPPER_F64: f64 = 9_223_372_036_854_775_808.0;

/// Physical storage behind a [`Column`].
///
/// `Int64` and `Datetime` columns share `I64` storage. Slots whose validity bit is clear hold an
/// arbitrary default and must not be read as values.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValues {
    Null,
    Bool(BitVec),
    I64(Vec<i64>),
    F64(Vec<f64>),
    Str(Vec<Arc<str>>),
    List(Vec<Arc<[Value]>>),
}

/// A named, typed, nullable sequence of values.
///
/// Values and validity are reference counted: renaming or projecting a column never copies its
/// data, and no API mutates a column after construction.
#[derive(Clone, Debug)]
pub struct Column {
    name: Arc<str>,
    dtype: DataType,
    len: usize,
    values: Arc<ColumnValues>,
    validity: Arc<BitVec>,
}

impl Column {
    fn from_parts(name: Arc<str>, dtype: DataType, values: ColumnValues, validity: BitVec) -> Self {
        Self {
            name,
            dtype,
            len: validity.len(),
            values: Arc::new(values),
            validity: Arc::new(validity),
        }
    }

    /// A column of `len` nulls.
    pub fn full_null(name: impl Into<Arc<str>>, dtype: DataType, len: usize) -> Self {
        let values = match &dtype {
            DataType::Null => ColumnValues::Null,
            DataType::Bool => ColumnValues::Bool(BitVec::with_len_all_false(len)),
            DataType::Int64 | DataType::Datetime => ColumnValues::I64(vec![0; len]),
            DataType::Float64 => ColumnValues::F64(vec![0.0; len]),
            DataType::Utf8 => ColumnValues::Str(vec![Arc::from(""); len]),
            DataType::List(_) => ColumnValues::List(vec![Arc::from(Vec::new()); len]),
        };
        Self::from_parts(name.into(), dtype, values, BitVec::with_len_all_false(len))
    }

    pub fn from_values(
        name: impl Into<Arc<str>>,
        dtype: DataType,
        values: impl IntoIterator<Item = Value>,
    ) -> ColumnarResult<Self> {
        let mut builder = ColumnBuilder::new(name, dtype, 0);
        for value in values {
            builder.push(&value)?;
        }
        Ok(builder.finish())
    }

    pub fn from_bools(name: impl Into<Arc<str>>, values: impl IntoIterator<Item = Option<bool>>) -> Self {
        let mut data = BitVec::new();
        let mut validity = BitVec::new();
        for v in values {
            data.push(v.unwrap_or(false));
            validity.push(v.is_some());
        }
        Self::from_parts(name.into(), DataType::Bool, ColumnValues::Bool(data), validity)
    }

    pub fn from_i64s(name: impl Into<Arc<str>>, values: impl IntoIterator<Item = Option<i64>>) -> Self {
        let (data, validity) = split_options(values, 0);
        Self::from_parts(name.into(), DataType::Int64, ColumnValues::I64(data), validity)
    }

    /// Datetime column from microseconds since the Unix epoch.
    pub fn from_datetimes(
        name: impl Into<Arc<str>>,
        values: impl IntoIterator<Item = Option<i64>>,
    ) -> Self {
        let (data, validity) = split_options(values, 0);
        Self::from_parts(name.into(), DataType::Datetime, ColumnValues::I64(data), validity)
    }

    pub fn from_f64s(name: impl Into<Arc<str>>, values: impl IntoIterator<Item = Option<f64>>) -> Self {
        let (data, validity) = split_options(values, 0.0);
        Self::from_parts(name.into(), DataType::Float64, ColumnValues::F64(data), validity)
    }

    pub fn from_strs<S: Into<Arc<str>>>(
        name: impl Into<Arc<str>>,
        values: impl IntoIterator<Item = Option<S>>,
    ) -> Self {
        let (data, validity) = split_options(
            values.into_iter().map(|v| v.map(Into::into)),
            Arc::<str>::from(""),
        );
        Self::from_parts(name.into(), DataType::Utf8, ColumnValues::Str(data), validity)
    }

    pub fn from_lists(
        name: impl Into<Arc<str>>,
        inner: DataType,
        values: impl IntoIterator<Item = Option<Arc<[Value]>>>,
    ) -> Self {
        let (data, validity) = split_options(values, Arc::<[Value]>::from(Vec::new()));
        Self::from_parts(
            name.into(),
            DataType::List(Box::new(inner)),
            ColumnValues::List(data),
            validity,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn validity(&self) -> &BitVec {
        &self.validity
    }

    pub fn null_count(&self) -> usize {
        self.validity.count_zeros()
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        idx < self.len && self.validity.get(idx)
    }

    /// Whether `other` is backed by the same value buffer (e.g. a renamed projection).
    pub fn shares_values_with(&self, other: &Column) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }

    pub fn get(&self, idx: usize) -> Value {
        if !self.is_valid(idx) {
            return Value::Null;
        }
        match (&*self.values, &self.dtype) {
            (ColumnValues::Null, _) => Value::Null,
            (ColumnValues::Bool(data), _) => Value::Bool(data.get(idx)),
            (ColumnValues::I64(data), DataType::Datetime) => Value::Datetime(data[idx]),
            (ColumnValues::I64(data), _) => Value::Int64(data[idx]),
            (ColumnValues::F64(data), _) => Value::Float64(OrderedFloat(data[idx])),
            (ColumnValues::Str(data), _) => Value::Utf8(data[idx].clone()),
            (ColumnValues::List(data), _) => Value::List(data[idx].clone()),
        }
    }

    pub fn bool_at(&self, idx: usize) -> Option<bool> {
        match &*self.values {
            ColumnValues::Bool(data) if self.is_valid(idx) => Some(data.get(idx)),
            _ => None,
        }
    }

    pub fn i64_at(&self, idx: usize) -> Option<i64> {
        match &*self.values {
            ColumnValues::I64(data) if self.is_valid(idx) => Some(data[idx]),
            _ => None,
        }
    }

    /// Numeric value at `idx`; Int64 widens to `f64`.
    pub fn f64_at(&self, idx: usize) -> Option<f64> {
        if !self.is_valid(idx) {
            return None;
        }
        match (&*self.values, &self.dtype) {
            (ColumnValues::F64(data), _) => Some(data[idx]),
            (ColumnValues::I64(data), DataType::Int64) => Some(data[idx] as f64),
            _ => None,
        }
    }

    pub fn str_at(&self, idx: usize) -> Option<&str> {
        match &*self.values {
            ColumnValues::Str(data) if self.is_valid(idx) => Some(&data[idx]),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len).map(move |idx| self.get(idx))
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.iter().collect()
    }

    pub fn rename(&self, name: impl Into<Arc<str>>) -> Column {
        Column {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Gather rows by index; indices may repeat.
    pub fn take(&self, indices: &[usize]) -> Column {
        let values = match &*self.values {
            ColumnValues::Null => ColumnValues::Null,
            ColumnValues::Bool(data) => ColumnValues::Bool(data.take(indices)),
            ColumnValues::I64(data) => ColumnValues::I64(indices.iter().map(|&i| data[i]).collect()),
            ColumnValues::F64(data) => ColumnValues::F64(indices.iter().map(|&i| data[i]).collect()),
            ColumnValues::Str(data) => {
                ColumnValues::Str(indices.iter().map(|&i| data[i].clone()).collect())
            }
            ColumnValues::List(data) => {
                ColumnValues::List(indices.iter().map(|&i| data[i].clone()).collect())
            }
        };
        Self::from_parts(
            self.name.clone(),
            self.dtype.clone(),
            values,
            self.validity.take(indices),
        )
    }

    /// Gather rows by optional index; `None` produces a null slot.
    pub fn take_opt(&self, indices: &[Option<usize>]) -> Column {
        let dense: Vec<usize> = indices.iter().map(|i| i.unwrap_or(0)).collect();
        if self.len == 0 {
            return Column::full_null(self.name.clone(), self.dtype.clone(), indices.len());
        }
        let gathered = self.take(&dense);
        let mut validity = (*gathered.validity).clone();
        for (pos, idx) in indices.iter().enumerate() {
            if idx.is_none() {
                validity.set(pos, false);
            }
        }
        Column {
            validity: Arc::new(validity),
            ..gathered
        }
    }

    /// Keep rows whose bit is set in `mask`.
    pub fn filter(&self, mask: &BitVec) -> Column {
        debug_assert_eq!(mask.len(), self.len, "filter mask length mismatch");
        if mask.all_true() {
            return self.clone();
        }
        let indices: Vec<usize> = mask.iter_ones().collect();
        self.take(&indices)
    }

    pub fn slice(&self, offset: usize, len: usize) -> Column {
        let end = offset.saturating_add(len).min(self.len);
        let start = offset.min(end);
        if start == 0 && end == self.len {
            return self.clone();
        }
        let indices: Vec<usize> = (start..end).collect();
        self.take(&indices)
    }

    /// Repeat a single-row column `len` times. Columns of any other length are returned as-is.
    pub fn broadcast(&self, len: usize) -> Column {
        if self.len != 1 || len == 1 {
            return self.clone();
        }
        self.take(&vec![0; len])
    }

    /// Cast to `to`. Lossless widenings, Int64/Datetime reinterpretation, truncating
    /// Float64 → Int64 (non-finite and out-of-range values become null) and rendering to Utf8
    /// are supported.
    pub fn cast(&self, to: &DataType) -> ColumnarResult<Column> {
        if &self.dtype == to {
            return Ok(self.clone());
        }
        let invalid = || ColumnarError::InvalidCast {
            column: self.name.to_string(),
            from: self.dtype.clone(),
            to: to.clone(),
        };
        let name = self.name.clone();
        let out = match (&self.dtype, to) {
            (DataType::Null, to) => Column::full_null(name, to.clone(), self.len),
            (DataType::Int64, DataType::Float64) | (DataType::Bool, DataType::Float64) => {
                Column::from_f64s(name, (0..self.len).map(|i| self.cast_numeric_at(i)))
            }
            (DataType::Bool, DataType::Int64) => Column::from_i64s(
                name,
                (0..self.len).map(|i| self.bool_at(i).map(i64::from)),
            ),
            (DataType::Float64, DataType::Int64) => Column::from_i64s(
                name,
                (0..self.len).map(|i| {
                    self.f64_at(i)
                        .map(f64::trunc)
                        .filter(|v| (I64_LOWER_F64..I64_UPPER_F64).contains(v))
                        .map(|v| v as i64)
                }),
            ),
            (DataType::Int64, DataType::Datetime) => {
                Column::from_datetimes(name, (0..self.len).map(|i| self.i64_at(i)))
            }
            (DataType::Datetime, DataType::Int64) => {
                Column::from_i64s(name, (0..self.len).map(|i| self.i64_at(i)))
            }
            (_, DataType::Utf8) => Column::from_strs(
                name,
                self.iter().map(|v| match v {
                    Value::Null => None,
                    Value::Utf8(s) => Some(s),
                    other => Some(Arc::from(other.to_string())),
                }),
            ),
            _ => return Err(invalid()),
        };
        Ok(out)
    }

    fn cast_numeric_at(&self, idx: usize) -> Option<f64> {
        self.f64_at(idx)
            .or_else(|| self.bool_at(idx).map(|b| if b { 1.0 } else { 0.0 }))
    }

    /// Compare two valid slots of this column.
    pub fn cmp_at(&self, a: usize, b: usize) -> Ordering {
        match &*self.values {
            ColumnValues::Null | ColumnValues::List(_) => Ordering::Equal,
            ColumnValues::Bool(data) => data.get(a).cmp(&data.get(b)),
            ColumnValues::I64(data) => data[a].cmp(&data[b]),
            ColumnValues::F64(data) => OrderedFloat(data[a]).cmp(&OrderedFloat(data[b])),
            ColumnValues::Str(data) => data[a].as_ref().cmp(data[b].as_ref()),
        }
    }

    /// Stable sort permutation. Nulls go first unless `nulls_last` is set, regardless of
    /// `descending`.
    pub fn arg_sort(&self, descending: bool, nulls_last: bool) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.len).collect();
        indices.sort_by(|&a, &b| self.cmp_rows(a, b, descending, nulls_last));
        indices
    }

    /// Row comparison used by single- and multi-key sorts.
    pub fn cmp_rows(&self, a: usize, b: usize, descending: bool, nulls_last: bool) -> Ordering {
        match (self.is_valid(a), self.is_valid(b)) {
            (false, false) => Ordering::Equal,
            (false, true) => {
                if nulls_last {
                    Ordering::Greater
                } else {
                    Ordering::Less
                }
            }
            (true, false) => {
                if nulls_last {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            }
            (true, true) => {
                let ord = self.cmp_at(a, b);
                if descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.dtype == other.dtype
            && self.len == other.len
            && (0..self.len).all(|i| self.get(i) == other.get(i))
    }
}

fn split_options<T: Clone>(values: impl IntoIterator<Item = Option<T>>, default: T) -> (Vec<T>, BitVec) {
    let iter = values.into_iter();
    let mut data = Vec::with_capacity(iter.size_hint().0);
    let mut validity = BitVec::with_capacity_bits(iter.size_hint().0);
    for v in iter {
        validity.push(v.is_some());
        data.push(v.unwrap_or_else(|| default.clone()));
    }
    (data, validity)
}

/// Incremental, type-checked construction of a [`Column`] from [`Value`]s.
pub struct ColumnBuilder {
    name: Arc<str>,
    dtype: DataType,
    values: ColumnValues,
    validity: BitVec,
}

impl ColumnBuilder {
    pub fn new(name: impl Into<Arc<str>>, dtype: DataType, capacity: usize) -> Self {
        let values = match &dtype {
            DataType::Null => ColumnValues::Null,
            DataType::Bool => ColumnValues::Bool(BitVec::with_capacity_bits(capacity)),
            DataType::Int64 | DataType::Datetime => ColumnValues::I64(Vec::with_capacity(capacity)),
            DataType::Float64 => ColumnValues::F64(Vec::with_capacity(capacity)),
            DataType::Utf8 => ColumnValues::Str(Vec::with_capacity(capacity)),
            DataType::List(_) => ColumnValues::List(Vec::with_capacity(capacity)),
        };
        Self {
            name: name.into(),
            dtype,
            values,
            validity: BitVec::with_capacity_bits(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.validity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validity.is_empty()
    }

    pub fn push_null(&mut self) {
        match &mut self.values {
            ColumnValues::Null => {}
            ColumnValues::Bool(data) => data.push(false),
            ColumnValues::I64(data) => data.push(0),
            ColumnValues::F64(data) => data.push(0.0),
            ColumnValues::Str(data) => data.push(Arc::from("")),
            ColumnValues::List(data) => data.push(Arc::from(Vec::new())),
        }
        self.validity.push(false);
    }

    pub fn name(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn dtype(&self) -> &DataType {
        &self.dtype
    }

    /// Whether [`ColumnBuilder::push`] would accept `value`.
    pub fn accepts(&self, value: &Value) -> bool {
        match (&self.dtype, value) {
            (_, Value::Null) => true,
            (DataType::List(_), Value::List(_)) => true,
            (dtype, value) => value.dtype().as_ref() == Some(dtype),
        }
    }

    pub(crate) fn mismatch(&self, value: &Value) -> ColumnarError {
        ColumnarError::TypeMismatch {
            column: self.name.to_string(),
            expected: self.dtype.clone(),
            value: value.to_string(),
        }
    }

    pub fn push(&mut self, value: &Value) -> ColumnarResult<()> {
        if value.is_null() {
            self.push_null();
            return Ok(());
        }
        match (&mut self.values, &self.dtype, value) {
            (ColumnValues::Bool(data), _, Value::Bool(v)) => data.push(*v),
            (ColumnValues::I64(data), DataType::Int64, Value::Int64(v))
            | (ColumnValues::I64(data), DataType::Datetime, Value::Datetime(v)) => data.push(*v),
            (ColumnValues::F64(data), _, Value::Float64(v)) => data.push(v.0),
            (ColumnValues::Str(data), _, Value::Utf8(v)) => data.push(v.clone()),
            (ColumnValues::List(data), _, Value::List(v)) => data.push(v.clone()),
            _ => return Err(self.mismatch(value)),
        }
        self.validity.push(true);
        Ok(())
    }

    pub fn finish(self) -> Column {
        Column::from_parts(self.name, self.dtype, self.values, self.validity)
    }
}

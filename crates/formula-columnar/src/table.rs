#![forbid(unsafe_code)]

use crate::bitmap::BitVec;
use crate::column::{Column, ColumnBuilder};
use crate::error::{ColumnarError, ColumnarResult};
use crate::types::{DataType, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: DataType,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }
}

/// Ordered `name -> dtype` mapping with unique names.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    fields: Vec<ColumnSchema>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(fields: Vec<ColumnSchema>) -> ColumnarResult<Self> {
        let mut index = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), idx).is_some() {
                return Err(ColumnarError::DuplicateColumn(field.name.clone()));
            }
        }
        Ok(Self { fields, index })
    }

    pub fn fields(&self) -> &[ColumnSchema] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

/// An ordered set of equal-length columns.
///
/// Tables are immutable values: every operation returns a new table whose untouched columns share
/// storage with the input.
#[derive(Clone, Debug)]
pub struct Table {
    schema: Schema,
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> ColumnarResult<Self> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        for column in &columns {
            if column.len() != rows {
                return Err(ColumnarError::LengthMismatch {
                    column: column.name().to_string(),
                    expected: rows,
                    actual: column.len(),
                });
            }
        }
        let schema = Schema::new(
            columns
                .iter()
                .map(|c| ColumnSchema::new(c.name(), c.dtype().clone()))
                .collect(),
        )?;
        Ok(Self {
            schema,
            columns,
            rows,
        })
    }

    pub fn empty() -> Self {
        Self {
            schema: Schema::default(),
            columns: Vec::new(),
            rows: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns.len())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    pub fn dtypes(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.dtype().clone()).collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    pub fn column(&self, name: &str) -> ColumnarResult<&Column> {
        self.column_index(name)
            .map(|idx| &self.columns[idx])
            .ok_or_else(|| ColumnarError::UnknownColumn(name.to_string()))
    }

    pub fn get_cell(&self, row: usize, col: usize) -> Value {
        self.columns
            .get(col)
            .map(|c| c.get(row))
            .unwrap_or(Value::Null)
    }

    /// The values of one row in column order.
    pub fn row(&self, row: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.get(row)).collect()
    }

    /// Column-major copy of every cell: `out[c][r]`.
    pub fn to_values(&self) -> Vec<Vec<Value>> {
        self.columns.iter().map(Column::to_values).collect()
    }

    pub fn take_rows(&self, indices: &[usize]) -> Table {
        Table {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.take(indices)).collect(),
            rows: indices.len(),
        }
    }

    pub fn filter_mask(&self, mask: &BitVec) -> Table {
        debug_assert_eq!(mask.len(), self.rows, "filter mask length mismatch");
        Table {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.filter(mask)).collect(),
            rows: mask.count_ones(),
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> Table {
        let end = offset.saturating_add(len).min(self.rows);
        let start = offset.min(end);
        Table {
            schema: self.schema.clone(),
            columns: self.columns.iter().map(|c| c.slice(start, end - start)).collect(),
            rows: end - start,
        }
    }

    pub fn head(&self, n: usize) -> Table {
        self.slice(0, n)
    }

    pub fn tail(&self, n: usize) -> Table {
        self.slice(self.rows.saturating_sub(n), n)
    }

    /// Replace the same-named column in place, or append a new one.
    pub fn with_column(&self, column: Column) -> ColumnarResult<Table> {
        if !self.columns.is_empty() && column.len() != self.rows {
            return Err(ColumnarError::LengthMismatch {
                column: column.name().to_string(),
                expected: self.rows,
                actual: column.len(),
            });
        }
        let mut columns = self.columns.clone();
        match self.column_index(column.name()) {
            Some(idx) => columns[idx] = column,
            None => columns.push(column),
        }
        Table::new(columns)
    }

    pub fn drop_column(&self, name: &str) -> ColumnarResult<Table> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| ColumnarError::UnknownColumn(name.to_string()))?;
        let mut columns = self.columns.clone();
        columns.remove(idx);
        if columns.is_empty() {
            return Ok(Table::empty());
        }
        Table::new(columns)
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.rows == other.rows && self.columns == other.columns
    }
}

/// Row-at-a-time table construction against a fixed schema.
pub struct TableBuilder {
    schema: Schema,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

impl TableBuilder {
    pub fn new(schema: Vec<ColumnSchema>) -> ColumnarResult<Self> {
        let schema = Schema::new(schema)?;
        let builders = schema
            .fields()
            .iter()
            .map(|f| ColumnBuilder::new(Arc::<str>::from(f.name.as_str()), f.dtype.clone(), 0))
            .collect();
        Ok(Self {
            schema,
            builders,
            rows: 0,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Append one row. On error the builder is left unchanged.
    pub fn append_row(&mut self, row: &[Value]) -> ColumnarResult<()> {
        if row.len() != self.builders.len() {
            return Err(ColumnarError::RowArity {
                expected: self.builders.len(),
                actual: row.len(),
            });
        }
        if let Some((builder, value)) = self
            .builders
            .iter()
            .zip(row)
            .find(|(builder, value)| !builder.accepts(value))
        {
            return Err(builder.mismatch(value));
        }
        for (builder, value) in self.builders.iter_mut().zip(row) {
            builder.push(value)?;
        }
        self.rows += 1;
        Ok(())
    }

    pub fn finalize(self) -> Table {
        let columns: Vec<Column> = self.builders.into_iter().map(ColumnBuilder::finish).collect();
        let rows = if columns.is_empty() { 0 } else { self.rows };
        Table {
            schema: self.schema,
            columns,
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn accounts() -> Table {
        let mut builder = TableBuilder::new(vec![
            ColumnSchema::new("ID", DataType::Int64),
            ColumnSchema::new("Name", DataType::Utf8),
        ])
        .unwrap();
        for (id, name) in [(1, Some("Ann")), (2, None), (3, Some("Cy"))] {
            builder
                .append_row(&[Value::from(id), Value::from(name)])
                .unwrap();
        }
        builder.finalize()
    }

    #[test]
    fn builder_roundtrips_rows_and_schema() {
        let table = accounts();
        assert_eq!(table.shape(), (3, 2));
        assert_eq!(table.column_names(), vec!["ID", "Name"]);
        assert_eq!(table.dtypes(), vec![DataType::Int64, DataType::Utf8]);
        assert_eq!(table.row(1), vec![Value::from(2), Value::Null]);
        assert_eq!(table.get_cell(2, 1), Value::from("Cy"));
        assert_eq!(table.get_cell(2, 9), Value::Null);
    }

    #[test]
    fn builder_rejects_bad_rows_without_partial_writes() {
        let mut builder = TableBuilder::new(vec![
            ColumnSchema::new("a", DataType::Int64),
            ColumnSchema::new("b", DataType::Bool),
        ])
        .unwrap();
        let err = builder
            .append_row(&[Value::from(1), Value::from("nope")])
            .unwrap_err();
        assert!(matches!(err, ColumnarError::TypeMismatch { .. }));
        assert!(matches!(
            builder.append_row(&[Value::from(1)]),
            Err(ColumnarError::RowArity { .. })
        ));
        builder.append_row(&[Value::from(7), Value::from(true)]).unwrap();

        let table = builder.finalize();
        assert_eq!(table.row_count(), 1);
        assert_eq!(table.column("a").unwrap().to_values(), vec![Value::from(7)]);
    }

    #[test]
    fn new_rejects_ragged_and_duplicate_columns() {
        let a = Column::from_i64s("a", [Some(1), Some(2)]);
        let b = Column::from_i64s("b", [Some(1)]);
        assert!(matches!(
            Table::new(vec![a.clone(), b]),
            Err(ColumnarError::LengthMismatch { .. })
        ));
        assert!(matches!(
            Table::new(vec![a.clone(), a]),
            Err(ColumnarError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn head_tail_and_slices_clamp() {
        let table = accounts();
        assert_eq!(table.head(2).row_count(), 2);
        assert_eq!(table.head(10).row_count(), 3);
        assert_eq!(
            table.tail(1).column("ID").unwrap().to_values(),
            vec![Value::from(3)]
        );
        assert_eq!(table.slice(5, 2).row_count(), 0);
    }

    #[test]
    fn with_column_replaces_in_place() {
        let table = accounts();
        let out = table
            .with_column(Column::from_bools("ID", [Some(true), None, Some(false)]))
            .unwrap();
        assert_eq!(out.column_names(), vec!["ID", "Name"]);
        assert_eq!(out.dtypes()[0], DataType::Bool);
        assert!(out.columns()[1].shares_values_with(&table.columns()[1]));
    }
}

use formula_columnar::{
    BitVec, Column, ColumnSchema, ColumnarError, DataType, Table, TableBuilder, Value,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn orders() -> Table {
    Table::new(vec![
        Column::from_strs("customer", [Some("ann"), None, Some("cy"), Some("ann")]),
        Column::from_i64s("qty", [Some(3), Some(1), None, Some(7)]),
        Column::from_f64s("price", [Some(2.5), Some(10.0), Some(1.0), None]),
    ])
    .unwrap()
}

#[test]
fn builder_checks_arity_and_types_without_partial_rows() {
    let mut builder = TableBuilder::new(vec![
        ColumnSchema::new("id", DataType::Int64),
        ColumnSchema::new("label", DataType::Utf8),
    ])
    .unwrap();
    builder.append_row(&[Value::from(1), Value::from("a")]).unwrap();

    let err = builder.append_row(&[Value::from(2)]).unwrap_err();
    assert_eq!(err, ColumnarError::RowArity { expected: 2, actual: 1 });

    let err = builder
        .append_row(&[Value::from(2), Value::from(3.5)])
        .unwrap_err();
    assert!(matches!(err, ColumnarError::TypeMismatch { ref column, .. } if column == "label"));

    builder.append_row(&[Value::Null, Value::Null]).unwrap();
    let table = builder.finalize();
    assert_eq!(table.shape(), (2, 2));
    assert_eq!(table.row(1), vec![Value::Null, Value::Null]);
}

#[test]
fn constructing_rejects_ragged_and_duplicate_columns() {
    let ragged = Table::new(vec![
        Column::from_i64s("a", [Some(1), Some(2)]),
        Column::from_i64s("b", [Some(1)]),
    ]);
    assert!(matches!(ragged, Err(ColumnarError::LengthMismatch { .. })));

    let dup = Table::new(vec![
        Column::from_i64s("a", [Some(1)]),
        Column::from_f64s("a", [Some(1.0)]),
    ]);
    assert_eq!(dup.unwrap_err(), ColumnarError::DuplicateColumn("a".to_string()));
}

#[test]
fn derived_tables_share_untouched_buffers() {
    let table = orders();
    let widened = table
        .with_column(table.column("qty").unwrap().cast(&DataType::Float64).unwrap())
        .unwrap();
    assert_eq!(widened.column_names(), vec!["customer", "qty", "price"]);
    assert_eq!(widened.column("qty").unwrap().dtype(), &DataType::Float64);
    assert!(widened
        .column("price")
        .unwrap()
        .shares_values_with(table.column("price").unwrap()));

    let dropped = table.drop_column("customer").unwrap();
    assert_eq!(dropped.column_names(), vec!["qty", "price"]);
    assert!(dropped
        .column("qty")
        .unwrap()
        .shares_values_with(table.column("qty").unwrap()));
    assert_eq!(table.column_count(), 3);
}

#[test]
fn row_selection_keeps_schema() {
    let table = orders();
    let picked = table.take_rows(&[3, 0]);
    assert_eq!(
        picked.column("qty").unwrap().to_values(),
        vec![Value::from(7), Value::from(3)]
    );

    let mask = BitVec::from_bools([false, true, false, true]);
    let filtered = table.filter_mask(&mask);
    assert_eq!(filtered.schema(), table.schema());
    assert_eq!(
        filtered.column("customer").unwrap().to_values(),
        vec![Value::Null, Value::from("ann")]
    );

    assert_eq!(table.head(10), table);
    assert_eq!(table.tail(1).row(0), table.row(3));
    assert_eq!(table.slice(1, 2).row_count(), 2);
}

#[test]
fn describe_summarizes_numeric_and_text_columns() {
    let summary = orders().describe().unwrap();
    assert_eq!(summary.column_names(), vec!["statistic", "customer", "qty", "price"]);
    assert_eq!(
        summary.column("statistic").unwrap().to_values()[0],
        Value::from("count")
    );
    assert_eq!(summary.column("qty").unwrap().get(0), Value::from(3.0));
    assert_eq!(summary.column("qty").unwrap().get(1), Value::from(1.0));
    assert_eq!(summary.column("qty").unwrap().get(6), Value::from(7.0));
    assert_eq!(summary.column("customer").unwrap().get(4), Value::from("ann"));
    assert_eq!(summary.column("customer").unwrap().get(2), Value::Null);
}

#[test]
fn unknown_columns_are_reported_by_name() {
    let err = orders().column("total").unwrap_err();
    assert_eq!(err.to_string(), "unknown column: total");
}

proptest! {
    #[test]
    fn arg_sort_orders_valid_values_with_nulls_first(
        values in prop::collection::vec(prop::option::of(-50i64..50), 0..40),
        descending in any::<bool>(),
    ) {
        let column = Column::from_i64s("v", values.iter().copied());
        let order = column.arg_sort(descending, false);
        prop_assert_eq!(order.len(), values.len());

        let sorted: Vec<Option<i64>> = order.iter().map(|&idx| values[idx]).collect();
        let nulls = values.iter().filter(|v| v.is_none()).count();
        prop_assert!(sorted[..nulls].iter().all(Option::is_none));

        let valid: Vec<i64> = sorted[nulls..].iter().flatten().copied().collect();
        let in_order = valid.windows(2).all(|pair| {
            if descending { pair[0] >= pair[1] } else { pair[0] <= pair[1] }
        });
        prop_assert!(in_order);
    }

    #[test]
    fn filter_mask_keeps_selected_rows_in_order(
        rows in prop::collection::vec((prop::option::of(any::<i64>()), any::<bool>()), 0..40),
    ) {
        let table = Table::new(vec![Column::from_i64s("v", rows.iter().map(|(v, _)| *v))]).unwrap();
        let mask = BitVec::from_bools(rows.iter().map(|(_, keep)| *keep));
        let expected: Vec<Value> = rows
            .iter()
            .filter(|(_, keep)| *keep)
            .map(|(v, _)| Value::from(*v))
            .collect();
        prop_assert_eq!(table.filter_mask(&mask).column("v").unwrap().to_values(), expected);
    }
}

#![no_main]

use libfuzzer_sys::fuzz_target;

use formula_frame::prelude::*;
use formula_frame::read_csv;

/// Bound the input so a single run cannot allocate an arbitrarily large table.
const MAX_INPUT_BYTES: usize = 64 * 1024;

fn schema() -> Vec<ColumnSchema> {
    vec![
        ColumnSchema::new("key", DataType::Utf8),
        ColumnSchema::new("n", DataType::Int64),
        ColumnSchema::new("x", DataType::Float64),
        ColumnSchema::new("flag", DataType::Bool),
        ColumnSchema::new("at", DataType::Datetime),
    ]
}

fuzz_target!(|data: &[u8]| {
    if data.len() > MAX_INPUT_BYTES {
        return;
    }
    let options = CsvReadOptions::default()
        .without_header()
        .with_null_tokens(["", "NA"]);
    let Ok(table) = read_csv(data, &schema(), &options) else {
        return;
    };
    assert_eq!(table.column_count(), 5);

    let grouped = table
        .group_by(["key"], [sum("n"), mean("x"), len().alias("rows")])
        .expect("group_by over a well-typed table");
    let total: i64 = grouped
        .column("rows")
        .expect("rows column")
        .to_values()
        .iter()
        .map(|v| match v {
            Value::Int64(n) => *n,
            _ => 0,
        })
        .sum();
    assert_eq!(total as usize, table.row_count());

    let windowed = table
        .rolling("x", 3, RollingKind::Max, "peak")
        .expect("rolling over a float column");
    assert_eq!(windowed.row_count(), table.row_count());
});

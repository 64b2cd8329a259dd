use crate::error::{FrameError, FrameResult};
use crate::eval::parse_datetime;
use formula_columnar::{ColumnSchema, DataType, Table, TableBuilder, Value};
use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::path::Path;

pub const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsvReadOptions {
    pub delimiter: u8,
    pub has_header: bool,
    /// Cells equal to any of these strings (before trimming) load as null.
    pub null_tokens: Vec<String>,
    /// `chrono` format for Datetime columns. Date-only formats load as midnight.
    pub datetime_format: String,
}

impl Default for CsvReadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            null_tokens: vec![String::new()],
            datetime_format: DEFAULT_DATETIME_FORMAT.to_string(),
        }
    }
}

impl CsvReadOptions {
    pub fn with_null_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn without_header(mut self) -> Self {
        self.has_header = false;
        self
    }

    pub fn with_datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = format.into();
        self
    }
}

/// Load CSV text into a table with exactly the columns of `schema`, in schema order.
///
/// With a header, fields are matched to the schema by name and every header column must be
/// declared. Without one, fields map to the schema positionally. Rows in parse errors are
/// 1-based record numbers in the file, header included.
pub fn read_csv<R: Read>(
    reader: R,
    schema: &[ColumnSchema],
    options: &CsvReadOptions,
) -> FrameResult<Table> {
    if let Some(field) = schema
        .iter()
        .find(|field| matches!(field.dtype, DataType::List(_)))
    {
        return Err(FrameError::Type(format!(
            "column {} has type {}, which cannot be read from csv",
            field.name, field.dtype
        )));
    }
    let mut builder = TableBuilder::new(schema.to_vec())?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .from_reader(reader);
    let mut records = csv_reader.records();

    let positions = if options.has_header {
        match records.next() {
            Some(header) => header_positions(&header?, schema)?,
            None => return Ok(builder.finalize()),
        }
    } else {
        (0..schema.len()).collect()
    };

    let mut row = vec![Value::Null; schema.len()];
    for record in records {
        let record = record?;
        let record_no = record.position().map(|p| p.record() + 1).unwrap_or(0);
        if record.len() != positions.len() {
            return Err(FrameError::Csv {
                row: record_no,
                column: String::new(),
                reason: format!("expected {} fields, found {}", positions.len(), record.len()),
            });
        }
        for (raw, &target) in record.iter().zip(&positions) {
            let field = &schema[target];
            row[target] =
                parse_cell(raw, &field.dtype, options).map_err(|reason| FrameError::Csv {
                    row: record_no,
                    column: field.name.clone(),
                    reason,
                })?;
        }
        builder.append_row(&row)?;
    }

    let table = builder.finalize();
    log::debug!(
        "read_csv: loaded {} rows x {} columns",
        table.row_count(),
        table.column_count()
    );
    Ok(table)
}

pub fn read_csv_path(
    path: impl AsRef<Path>,
    schema: &[ColumnSchema],
    options: &CsvReadOptions,
) -> FrameResult<Table> {
    let path = path.as_ref();
    log::debug!("read_csv: opening {}", path.display());
    let file = std::fs::File::open(path)?;
    read_csv(BufReader::new(file), schema, options)
}

/// Schema index for every header field.
fn header_positions(header: &csv::StringRecord, schema: &[ColumnSchema]) -> FrameResult<Vec<usize>> {
    let by_name: HashMap<&str, usize> = schema
        .iter()
        .enumerate()
        .map(|(idx, field)| (field.name.as_str(), idx))
        .collect();

    let mut seen = vec![false; schema.len()];
    let mut positions = Vec::with_capacity(header.len());
    for name in header.iter() {
        let name = name.trim();
        let idx = *by_name
            .get(name)
            .ok_or_else(|| FrameError::UnknownColumn(name.to_string()))?;
        if std::mem::replace(&mut seen[idx], true) {
            return Err(FrameError::DuplicateAlias(name.to_string()));
        }
        positions.push(idx);
    }
    if let Some(missing) = seen.iter().position(|seen| !seen) {
        return Err(FrameError::UnknownColumn(schema[missing].name.clone()));
    }
    Ok(positions)
}

fn parse_cell(raw: &str, dtype: &DataType, options: &CsvReadOptions) -> Result<Value, String> {
    if options.null_tokens.iter().any(|token| token == raw) {
        return Ok(Value::Null);
    }
    let text = raw.trim();
    match dtype {
        DataType::Utf8 => Ok(Value::from(raw)),
        DataType::Int64 => text
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|err| format!("invalid integer {raw:?}: {err}")),
        DataType::Float64 => text
            .parse::<f64>()
            .map(Value::from)
            .map_err(|err| format!("invalid float {raw:?}: {err}")),
        DataType::Bool => {
            if text.eq_ignore_ascii_case("true") {
                Ok(Value::Bool(true))
            } else if text.eq_ignore_ascii_case("false") {
                Ok(Value::Bool(false))
            } else {
                Err(format!("invalid bool {raw:?}"))
            }
        }
        DataType::Datetime => parse_datetime(text, &options.datetime_format)
            .map(Value::Datetime)
            .ok_or_else(|| {
                format!(
                    "invalid datetime {raw:?} for format {:?}",
                    options.datetime_format
                )
            }),
        DataType::Null => Err(format!("expected a null token, found {raw:?}")),
        DataType::List(_) => Err("list cells cannot be read from csv".to_string()),
    }
}

//! The four dataset query tools: validate, total, top-N, and filter.

use async_trait::async_trait;
use serde_json::{json, Value};

use tabletalk_core::dataset::{DatasetLoader, Table};
use tabletalk_core::errors::DatasetError;

use crate::AnalysisTool;

const REQUIRED_COLUMNS: [&str; 2] = ["product", "revenue"];
const DEFAULT_NUMERIC_COLUMN: &str = "revenue";
const DEFAULT_TOP_N: u64 = 5;

/// Checks dataset presence, schema, and quality. Strict policy: any issue
/// (missing values, negative revenue) makes the payload `ok: false`, which
/// ends tool usage for the current turn.
pub struct ValidateData {
    loader: DatasetLoader,
}

impl ValidateData {
    pub fn new(loader: DatasetLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl AnalysisTool for ValidateData {
    fn name(&self) -> &'static str {
        "validate_data"
    }

    fn description(&self) -> &'static str {
        "Check the dataset for missing columns, missing values, and negative revenue."
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {}, "additionalProperties": false })
    }

    async fn execute(&self, _input: Value) -> Value {
        let table = match self.loader.load() {
            Ok(table) => table,
            Err(error) => return load_error(&error),
        };

        let missing: Vec<_> = REQUIRED_COLUMNS
            .iter()
            .filter(|required| table.column_index(required).is_none())
            .collect();
        if !missing.is_empty() {
            let names: Vec<_> = missing.iter().map(|name| name.to_string()).collect();
            return json!({
                "ok": false,
                "status": "insufficient",
                "message": format!("Missing columns: {}", names.join(", ")),
            });
        }

        if table.rows.is_empty() {
            return json!({
                "ok": false,
                "status": "insufficient",
                "message": "No rows in dataset.",
            });
        }

        let mut issues = Vec::new();
        if table.has_empty_cells() {
            issues.push("Dataset contains missing values.".to_string());
        }
        if let Some(index) = table.column_index("revenue") {
            let negatives = table
                .numeric_column(index)
                .into_iter()
                .filter(|value| matches!(value, Some(v) if *v < 0.0))
                .count();
            if negatives > 0 {
                issues.push(format!("{negatives} rows have negative revenue."));
            }
        }

        let ok = issues.is_empty();
        json!({
            "ok": ok,
            "status": if ok { "valid" } else { "insufficient" },
            "issues": issues,
            "rows": table.rows.len(),
            "columns": table.headers,
        })
    }
}

/// Sums a numeric column; non-numeric cells count as zero.
pub struct CalculateTotal {
    loader: DatasetLoader,
}

impl CalculateTotal {
    pub fn new(loader: DatasetLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl AnalysisTool for CalculateTotal {
    fn name(&self) -> &'static str {
        "calculate_total"
    }

    fn description(&self) -> &'static str {
        "Calculate the total of a numeric column. Input: {\"column\": str}."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "column": { "type": "string", "description": "column to sum (default: revenue)" }
            }
        })
    }

    async fn execute(&self, input: Value) -> Value {
        let table = match self.loader.load() {
            Ok(table) => table,
            Err(error) => return load_error(&error),
        };

        let column = string_arg(&input, "column").unwrap_or_else(|| DEFAULT_NUMERIC_COLUMN.into());
        let Some(index) = table.column_index(&column) else {
            return unknown_column(&column, &table);
        };

        let total: f64 = table.numeric_column(index).into_iter().flatten().sum();
        json!({ "ok": true, "column": column, "total": total })
    }
}

/// Returns up to N rows sorted descending by a numeric column.
pub struct GetTopN {
    loader: DatasetLoader,
}

impl GetTopN {
    pub fn new(loader: DatasetLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl AnalysisTool for GetTopN {
    fn name(&self) -> &'static str {
        "get_top_n"
    }

    fn description(&self) -> &'static str {
        "Return the top-N rows sorted by a numeric column. Input: {\"column\": str, \"n\": int}."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "column": { "type": "string", "description": "column to sort by (default: revenue)" },
                "n": { "type": "integer", "description": "number of rows (default: 5)" }
            }
        })
    }

    async fn execute(&self, input: Value) -> Value {
        let table = match self.loader.load() {
            Ok(table) => table,
            Err(error) => return load_error(&error),
        };

        let column = string_arg(&input, "column").unwrap_or_else(|| DEFAULT_NUMERIC_COLUMN.into());
        let n = match input.get("n") {
            None | Some(Value::Null) => DEFAULT_TOP_N,
            Some(value) => match value.as_u64() {
                Some(n) => n,
                None => {
                    return json!({ "ok": false, "error": "'n' must be a non-negative integer." })
                }
            },
        };

        let Some(index) = table.column_index(&column) else {
            return unknown_column(&column, &table);
        };

        let numeric = table.numeric_column(index);
        let mut order: Vec<usize> = (0..table.rows.len()).collect();
        // Non-numeric cells sort last, matching ascending=False over NaNs.
        order.sort_by(|a, b| {
            let left = numeric[*a].unwrap_or(f64::NEG_INFINITY);
            let right = numeric[*b].unwrap_or(f64::NEG_INFINITY);
            right.partial_cmp(&left).unwrap_or(std::cmp::Ordering::Equal)
        });

        let rows: Vec<Value> = order
            .into_iter()
            .take(n as usize)
            .map(|row_index| table.row_object(row_index))
            .collect();

        json!({ "ok": true, "n": n, "rows": rows })
    }
}

/// Filters rows by case-insensitive equality on a column, reporting the
/// matching rows and the revenue sum over the matches.
pub struct FilterByValue {
    loader: DatasetLoader,
}

impl FilterByValue {
    pub fn new(loader: DatasetLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl AnalysisTool for FilterByValue {
    fn name(&self) -> &'static str {
        "filter_by_value"
    }

    fn description(&self) -> &'static str {
        "Filter rows where column == value. Input: {\"column\": str, \"value\": str}."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "column": { "type": "string" },
                "value": { "type": "string" }
            },
            "required": ["column", "value"]
        })
    }

    async fn execute(&self, input: Value) -> Value {
        let table = match self.loader.load() {
            Ok(table) => table,
            Err(error) => return load_error(&error),
        };

        let (Some(column), Some(value)) =
            (string_arg(&input, "column"), string_arg(&input, "value"))
        else {
            return json!({ "ok": false, "error": "Both 'column' and 'value' are required." });
        };

        let Some(index) = table.column_index(&column) else {
            return unknown_column(&column, &table);
        };

        let wanted = value.to_ascii_lowercase();
        let matches: Vec<usize> = (0..table.rows.len())
            .filter(|row| table.rows[*row][index].trim().to_ascii_lowercase() == wanted)
            .collect();

        let total = match table.column_index("revenue") {
            Some(revenue_index) => {
                let numeric = table.numeric_column(revenue_index);
                matches.iter().filter_map(|row| numeric[*row]).sum()
            }
            None => 0.0,
        };

        let rows: Vec<Value> = matches.iter().map(|row| table.row_object(*row)).collect();
        json!({ "ok": true, "count": rows.len(), "total": total, "rows": rows })
    }
}

fn load_error(error: &DatasetError) -> Value {
    json!({ "ok": false, "status": "error", "error": format!("Could not load dataset: {error}") })
}

fn unknown_column(column: &str, table: &Table) -> Value {
    json!({
        "ok": false,
        "error": format!(
            "Column '{}' not found. Available: {}",
            column,
            table.headers.join(", ")
        ),
    })
}

fn string_arg(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(|value| value.trim().to_string()).filter(|value| {
        !value.is_empty()
    })
}

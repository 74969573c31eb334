use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Number, Value};

use crate::errors::DatasetError;

/// Loads the tabular dataset from disk. Constructed by the caller and
/// injected into tool calls; every call reloads the file so a dataset
/// edited between queries is always observed.
#[derive(Clone, Debug)]
pub struct DatasetLoader {
    path: PathBuf,
}

impl DatasetLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Table, DatasetError> {
        if !self.path.exists() {
            return Err(DatasetError::NotFound(self.path.clone()));
        }

        let raw = fs::read_to_string(&self.path)
            .map_err(|source| DatasetError::Io { path: self.path.clone(), source })?;
        Table::parse(&raw)
    }
}

/// An in-memory table: lower-cased header names plus string cells.
/// Numeric interpretation happens on demand per column.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn parse(raw: &str) -> Result<Self, DatasetError> {
        let mut lines = raw.lines().enumerate();

        let headers = match lines.next() {
            Some((_, header_line)) => split_csv_line(header_line)
                .into_iter()
                .map(|field| field.trim().to_ascii_lowercase())
                .collect::<Vec<_>>(),
            None => {
                return Err(DatasetError::Malformed {
                    line: 1,
                    message: "file is empty".to_string(),
                })
            }
        };

        let mut rows = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }

            let fields = split_csv_line(line);
            if fields.len() != headers.len() {
                return Err(DatasetError::Malformed {
                    line: index + 1,
                    message: format!(
                        "expected {} fields, found {}",
                        headers.len(),
                        fields.len()
                    ),
                });
            }
            rows.push(fields);
        }

        Ok(Self { headers, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let wanted = name.trim().to_ascii_lowercase();
        self.headers.iter().position(|header| *header == wanted)
    }

    /// Per-cell numeric view of a column; cells that do not parse yield
    /// `None` (mirroring coerce-to-NaN semantics).
    pub fn numeric_column(&self, index: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| parse_numeric(&row[index])).collect()
    }

    /// One row as a JSON object keyed by header, with numeric-looking
    /// cells emitted as numbers.
    pub fn row_object(&self, index: usize) -> Value {
        let mut object = Map::new();
        for (header, cell) in self.headers.iter().zip(&self.rows[index]) {
            let value = match parse_numeric(cell).and_then(Number::from_f64) {
                Some(number) => Value::Number(number),
                None => Value::String(cell.clone()),
            };
            object.insert(header.clone(), value);
        }
        Value::Object(object)
    }

    pub fn has_empty_cells(&self) -> bool {
        self.rows.iter().any(|row| row.iter().any(|cell| cell.trim().is_empty()))
    }
}

fn parse_numeric(cell: &str) -> Option<f64> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Minimal CSV field splitter: handles double-quoted fields with embedded
/// commas and doubled-quote escapes. The dataset is a fixed two-column
/// file, so a full CSV dialect is deliberately out of scope.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{DatasetLoader, Table};
    use crate::errors::DatasetError;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write csv");
        file
    }

    #[test]
    fn parses_and_lowercases_headers() {
        let table = Table::parse("Product,Revenue\nWidget,100.5\nGadget,200\n").unwrap();
        assert_eq!(table.headers, vec!["product", "revenue"]);
        assert_eq!(table.rows.len(), 2);
    }

    #[test]
    fn quoted_fields_keep_embedded_commas() {
        let table = Table::parse("product,revenue\n\"Widget, Large\",100\n").unwrap();
        assert_eq!(table.rows[0][0], "Widget, Large");
    }

    #[test]
    fn ragged_row_is_malformed() {
        let result = Table::parse("product,revenue\nWidget\n");
        assert!(matches!(result, Err(DatasetError::Malformed { line: 2, .. })));
    }

    #[test]
    fn numeric_column_coerces_bad_cells_to_none() {
        let table = Table::parse("product,revenue\nWidget,100\nGadget,oops\nDoohickey,\n").unwrap();
        let index = table.column_index("revenue").unwrap();
        assert_eq!(table.numeric_column(index), vec![Some(100.0), None, None]);
    }

    #[test]
    fn row_object_types_numeric_cells() {
        let table = Table::parse("product,revenue\nWidget,100.5\n").unwrap();
        let object = table.row_object(0);
        assert_eq!(object["product"], "Widget");
        assert_eq!(object["revenue"], 100.5);
    }

    #[test]
    fn missing_file_is_not_found() {
        let loader = DatasetLoader::new("/nonexistent/nowhere.csv");
        assert!(matches!(loader.load(), Err(DatasetError::NotFound(_))));
    }

    #[test]
    fn loader_reloads_fresh_contents() {
        let file = write_csv("product,revenue\nWidget,1\n");
        let loader = DatasetLoader::new(file.path());
        assert_eq!(loader.load().unwrap().rows.len(), 1);

        std::fs::write(file.path(), "product,revenue\nWidget,1\nGadget,2\n").unwrap();
        assert_eq!(loader.load().unwrap().rows.len(), 2);
    }
}

use crate::dataset::{Dataset, Value};
use crate::error::PipelineError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Load a dataset from a CSV file
///
/// The first record is the header row. Cells are trimmed and classified
/// with [`Value::parse`]; rows shorter than the header are padded with
/// missing values.
///
/// # Errors
/// * [`PipelineError::FileNotFound`] if the file does not exist
/// * [`PipelineError::Unreadable`] if it exists but cannot be opened
/// * [`PipelineError::Parse`] for invalid UTF-8 or a row wider than the header
///
/// # Examples
/// ```no_run
/// use dashboard::loader::from_csv;
///
/// match from_csv("datasets/people.csv") {
///     Ok(ds) => println!("loaded {} rows", ds.row_count()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Dataset, PipelineError> {
    let path = filepath.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(PipelineError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    from_reader(file)
}

/// Parse CSV content from any reader
pub fn from_reader<R: Read>(reader: R) -> Result<Dataset, PipelineError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true) // short rows are padded below
        .from_reader(reader);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.len() > columns.len() {
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            return Err(PipelineError::Parse {
                line,
                message: format!(
                    "expected {} fields, found {}",
                    columns.len(),
                    record.len()
                ),
            });
        }
        // a lone empty field is a blank line
        if record.len() == 1 && record[0].is_empty() && columns.len() > 1 {
            continue;
        }
        rows.push(record.iter().map(Value::parse).collect());
    }

    Ok(Dataset::new(columns, rows))
}

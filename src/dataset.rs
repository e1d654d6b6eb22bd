use crate::normalizer::ColumnNormalizer;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Cell spellings treated as missing values
const MISSING_MARKERS: [&str; 6] = ["", "na", "n/a", "nan", "null", "none"];

/// A single scalar cell of a dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Classify a raw CSV cell
    pub fn parse(raw: &str) -> Value {
        let trimmed = raw.trim();
        if MISSING_MARKERS.contains(&trimmed.to_lowercase().as_str()) {
            return Value::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            Ok(_) => Value::Missing,
            Err(_) => Value::Text(trimmed.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Missing => Ok(()),
        }
    }
}

/// In-memory table loaded from an uploaded CSV
///
/// Every row has exactly one value per column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Build a dataset, padding short rows with [`Value::Missing`] and
    /// cutting long ones to the column count.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Missing);
                row
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when there is nothing to plot: no columns or no data rows
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All cells of a column, `None` if the column does not exist
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Numeric cells of a column in row order; text and missing cells are
    /// dropped.
    pub fn numeric_values(&self, name: &str) -> Option<Vec<f64>> {
        Some(self.column(name)?.filter_map(Value::as_f64).collect())
    }

    /// `(row index, value)` for every numeric cell of a column
    pub fn indexed_numeric_values(&self, name: &str) -> Option<Vec<(usize, f64)>> {
        Some(
            self.column(name)?
                .enumerate()
                .filter_map(|(i, v)| v.as_f64().map(|n| (i, n)))
                .collect(),
        )
    }

    /// Row-aligned numeric pairs; rows where either side is not a number
    /// are dropped.
    pub fn numeric_pairs(&self, x: &str, y: &str) -> Option<Vec<(f64, f64)>> {
        let xi = self.column_index(x)?;
        let yi = self.column_index(y)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| Some((row[xi].as_f64()?, row[yi].as_f64()?)))
                .collect(),
        )
    }

    /// Occurrences of each distinct non-missing value, most frequent first
    /// (ties ordered by label).
    pub fn category_counts(&self, name: &str) -> Option<Vec<(String, usize)>> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for value in self.column(name)? {
            if value.is_missing() {
                continue;
            }
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
        let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Some(counts)
    }

    /// Rename the columns through `normalizer`, keeping names unique
    pub fn normalized(mut self, normalizer: &ColumnNormalizer) -> Self {
        self.columns = dedup_columns(normalizer.normalize(&self.columns));
        self
    }

    /// The first `n` rows
    pub fn head(&self, n: usize) -> Dataset {
        Dataset {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

/// Suffix repeated names with `.1`, `.2`, ... so every column is unique
pub fn dedup_columns(columns: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(columns.len());
    for name in columns {
        let mut candidate = name.clone();
        let mut n = 1;
        while taken.contains(&candidate) {
            candidate = format!("{}.{}", name, n);
            n += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(
            vec!["Age".to_string(), "City".to_string(), "Salary".to_string()],
            vec![
                vec![Value::parse("31"), Value::parse("Pune"), Value::parse("52000")],
                vec![Value::parse("45"), Value::parse("Delhi"), Value::parse("n/a")],
                vec![Value::parse("x"), Value::parse("Pune")],
            ],
        )
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse(" 4.5 "), Value::Number(4.5));
        assert_eq!(Value::parse("NaN"), Value::Missing);
        assert_eq!(Value::parse(""), Value::Missing);
        assert_eq!(Value::parse("NULL"), Value::Missing);
        assert_eq!(Value::parse("inf"), Value::Missing);
        assert_eq!(Value::parse("Pune "), Value::Text("Pune".to_string()));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let ds = sample();
        assert_eq!(ds.row_count(), 3);
        assert_eq!(ds.rows()[2].len(), 3);
        assert_eq!(ds.rows()[2][2], Value::Missing);
    }

    #[test]
    fn test_numeric_and_category_columns() {
        let ds = sample();
        assert_eq!(ds.numeric_values("Age"), Some(vec![31.0, 45.0]));
        assert_eq!(ds.indexed_numeric_values("Salary"), Some(vec![(0, 52000.0)]));
        assert_eq!(ds.numeric_pairs("Age", "Salary"), Some(vec![(31.0, 52000.0)]));
        assert_eq!(
            ds.category_counts("City"),
            Some(vec![("Pune".to_string(), 2), ("Delhi".to_string(), 1)])
        );
        assert_eq!(ds.numeric_values("Missing"), None);
    }

    #[test]
    fn test_normalized_renames_and_dedups() {
        let normalizer = ColumnNormalizer::from_pairs([
            ("age", "age"),
            ("salary", "income"),
            ("city", "income"),
        ]);
        let ds = sample().normalized(&normalizer);
        assert_eq!(ds.columns().to_vec(), vec!["age", "income", "income.1"]);
        // values stay in place, only names change
        assert_eq!(ds.numeric_values("income.1"), Some(vec![52000.0]));
    }

    #[test]
    fn test_dedup_columns() {
        let cols = vec!["a", "b", "a", "a", "a.1"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(dedup_columns(cols), vec!["a", "b", "a.1", "a.2", "a.1.1"]);
    }

    #[test]
    fn test_empty_and_head() {
        assert!(Dataset::new(vec![], vec![]).is_empty());
        assert!(Dataset::new(vec!["a".to_string()], vec![]).is_empty());
        let ds = sample();
        assert!(!ds.is_empty());
        assert_eq!(ds.head(2).row_count(), 2);
        assert_eq!(ds.head(10).row_count(), 3);
    }
}

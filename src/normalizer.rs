use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One row of the synonym table: every alias (and the canonical name
/// itself) maps to `canonical`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SynonymEntry {
    pub canonical: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// Maps raw CSV headers to canonical field names
///
/// Lookups are case-insensitive and ignore surrounding whitespace.
/// Unknown headers pass through trimmed; normalization never fails and
/// never reorders or drops columns.
#[derive(Debug, Clone, Default)]
pub struct ColumnNormalizer {
    synonyms: HashMap<String, String>,
}

fn lookup_key(header: &str) -> String {
    header.trim().to_lowercase()
}

impl ColumnNormalizer {
    /// Build the lookup table from configured synonym entries.
    ///
    /// When an alias appears in several entries the later entry wins.
    pub fn new(entries: &[SynonymEntry]) -> Self {
        let mut synonyms = HashMap::new();
        for entry in entries {
            let canonical = entry.canonical.trim().to_string();
            synonyms.insert(lookup_key(&canonical), canonical.clone());
            for alias in &entry.aliases {
                synonyms.insert(lookup_key(alias), canonical.clone());
            }
        }
        Self { synonyms }
    }

    /// Build the lookup table from `(alias, canonical)` pairs
    pub fn from_pairs<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: AsRef<str>,
        C: Into<String>,
    {
        let synonyms = pairs
            .into_iter()
            .map(|(alias, canonical)| (lookup_key(alias.as_ref()), canonical.into()))
            .collect();
        Self { synonyms }
    }

    pub fn len(&self) -> usize {
        self.synonyms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
    }

    /// Canonical name for `header`, if the table knows it
    pub fn canonical(&self, header: &str) -> Option<&str> {
        self.synonyms.get(&lookup_key(header)).map(String::as_str)
    }

    pub fn normalize_header(&self, header: &str) -> String {
        match self.canonical(header) {
            Some(canonical) => canonical.to_string(),
            None => header.trim().to_string(),
        }
    }

    /// Normalize a header row, preserving its length and order
    pub fn normalize<S: AsRef<str>>(&self, headers: &[S]) -> Vec<String> {
        headers
            .iter()
            .map(|h| self.normalize_header(h.as_ref()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> ColumnNormalizer {
        ColumnNormalizer::new(&[
            SynonymEntry {
                canonical: "age".to_string(),
                aliases: vec!["years".to_string()],
            },
            SynonymEntry {
                canonical: "income".to_string(),
                aliases: vec!["salary".to_string(), "Annual Income".to_string()],
            },
            SynonymEntry {
                canonical: "city".to_string(),
                aliases: vec![],
            },
        ])
    }

    #[test]
    fn test_canonical_order_is_preserved() {
        let n = normalizer();
        assert_eq!(
            n.normalize(&["Age", "Income", "city"]),
            vec!["age", "income", "city"]
        );
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let n = normalizer();
        for raw in ["SALARY", "  salary ", "Salary\t", "annual income", " ANNUAL INCOME"] {
            assert_eq!(n.normalize_header(raw), "income", "header {:?}", raw);
        }
        assert_eq!(n.normalize_header(" YEARS "), "age");
    }

    #[test]
    fn test_unmapped_headers_pass_through_trimmed() {
        let n = normalizer();
        let raw = ["  Zip Code ", "Notes", "age"];
        let out = n.normalize(&raw);
        assert_eq!(out.len(), raw.len());
        assert_eq!(out, vec!["Zip Code", "Notes", "age"]);
    }

    #[test]
    fn test_from_pairs() {
        let n = ColumnNormalizer::from_pairs([("Qty", "quantity"), ("units", "quantity")]);
        assert_eq!(n.len(), 2);
        assert_eq!(n.canonical("QTY"), Some("quantity"));
        assert_eq!(n.canonical("price"), None);
    }

    #[test]
    fn test_empty_table_is_identity() {
        let n = ColumnNormalizer::default();
        assert!(n.is_empty());
        assert_eq!(n.normalize(&["A", "B"]), vec!["A", "B"]);
        assert!(n.normalize::<&str>(&[]).is_empty());
    }
}

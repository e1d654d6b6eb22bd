use crate::graph::PlotSpec;
use crate::normalizer::SynonymEntry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the optional configuration file (extension is
/// resolved by the `config` crate)
pub const DEFAULT_CONFIG_FILE: &str = "config/dashboard";

/// Prefix of environment overrides, e.g. `DASHBOARD_SERVER__BIND`
pub const ENV_PREFIX: &str = "DASHBOARD";

/// Process-wide settings, loaded once at start-up and passed explicitly
/// to the pipeline and the web layer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub chart: ChartSettings,
    pub synonyms: Vec<SynonymEntry>,
    pub plots: Vec<PlotSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
    /// Upper bound for a single multipart upload body
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub uploads_dir: PathBuf,
    pub static_dir: PathBuf,
    /// Directory under `static_dir` holding one PNG per user
    pub graphs_subdir: String,
    pub database_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ChartSettings {
    pub width: u32,
    pub height: u32,
    pub preview_rows: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("datasets"),
            static_dir: PathBuf::from("static"),
            graphs_subdir: "graphs".to_string(),
            database_dir: PathBuf::from("database"),
            allowed_extensions: vec!["csv".to_string()],
        }
    }
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 900,
            preview_rows: 5,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            chart: ChartSettings::default(),
            synonyms: default_synonyms(),
            plots: default_plots(),
        }
    }
}

impl StorageSettings {
    pub fn graphs_dir(&self) -> PathBuf {
        self.static_dir.join(&self.graphs_subdir)
    }
}

impl Settings {
    /// Load settings from an optional TOML file plus `DASHBOARD_*`
    /// environment variables, on top of the built-in defaults.
    ///
    /// With `path == None` the file `config/dashboard.*` is used when it
    /// exists. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        settings.try_deserialize()
    }
}

fn synonym(canonical: &str, aliases: &[&str]) -> SynonymEntry {
    SynonymEntry {
        canonical: canonical.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

/// Built-in column synonym table used when the configuration does not
/// provide one
pub fn default_synonyms() -> Vec<SynonymEntry> {
    vec![
        synonym("age", &["years", "age (years)", "age_years"]),
        synonym(
            "income",
            &["salary", "annual income", "annual_income", "earnings", "wage"],
        ),
        synonym("city", &["town", "location", "city name"]),
        synonym("gender", &["sex"]),
        synonym("name", &["full name", "full_name", "customer name"]),
        synonym("date", &["day", "timestamp", "time"]),
        synonym("category", &["type", "class", "group"]),
        synonym("price", &["cost", "unit price", "unit_price"]),
        synonym("quantity", &["qty", "count", "units"]),
        synonym("country", &["nation"]),
    ]
}

/// Built-in plot set used when the configuration does not provide one
pub fn default_plots() -> Vec<PlotSpec> {
    vec![
        PlotSpec::Histogram {
            column: "age".to_string(),
            bins: 10,
        },
        PlotSpec::Histogram {
            column: "income".to_string(),
            bins: 10,
        },
        PlotSpec::CategoryCount {
            column: "city".to_string(),
            top: 10,
        },
        PlotSpec::Scatter {
            x: "age".to_string(),
            y: "income".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.storage.uploads_dir, PathBuf::from("datasets"));
        assert_eq!(
            settings.storage.graphs_dir(),
            PathBuf::from("static").join("graphs")
        );
        assert_eq!(settings.storage.allowed_extensions, vec!["csv".to_string()]);
        assert_eq!(settings.plots.len(), 4);
        assert!(settings.synonyms.iter().any(|s| s.canonical == "income"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dashboard.toml");
        fs::write(
            &path,
            r#"
[storage]
uploads_dir = "/srv/uploads"

[chart]
width = 640
height = 480

[[synonyms]]
canonical = "revenue"
aliases = ["Sales", "turnover"]

[[plots]]
kind = "histogram"
column = "revenue"

[[plots]]
kind = "category_count"
column = "region"
top = 3
"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.storage.uploads_dir, PathBuf::from("/srv/uploads"));
        // untouched sections keep their defaults
        assert_eq!(settings.storage.graphs_subdir, "graphs");
        assert_eq!(settings.chart.width, 640);
        assert_eq!(settings.chart.preview_rows, 5);
        assert_eq!(settings.synonyms.len(), 1);
        assert_eq!(settings.synonyms[0].aliases, vec!["Sales", "turnover"]);
        assert_eq!(
            settings.plots,
            vec![
                PlotSpec::Histogram {
                    column: "revenue".to_string(),
                    bins: 10
                },
                PlotSpec::CategoryCount {
                    column: "region".to_string(),
                    top: 3
                },
            ]
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(Settings::load(Some(&path)).is_err());
    }
}

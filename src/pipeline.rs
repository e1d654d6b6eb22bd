use crate::dataset::Dataset;
use crate::error::PipelineError;
use crate::graph::{Artifact, GraphGenerator};
use crate::settings::Settings;
use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// URL prefix under which the static directory is served
pub const STATIC_URL_PREFIX: &str = "/static";

/// What a dashboard view gets back from one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChartOutcome {
    /// A fresh artifact was written
    ArtifactReady {
        path: PathBuf,
        /// Where the web layer serves the artifact, when it lives under
        /// the static directory
        url: Option<String>,
        plots: Vec<String>,
        skipped: Vec<String>,
    },
    /// No dataset, or nothing in it that can be charted
    NoData,
    /// The dataset exists but the chart could not be produced
    GenerationFailed,
}

impl ChartOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, ChartOutcome::ArtifactReady { .. })
    }
}

/// Sequences loading, normalization and chart generation for one
/// dashboard view
///
/// Runs synchronously; every failure is logged and reduced to a
/// [`ChartOutcome`].
#[derive(Clone, Debug)]
pub struct Pipeline {
    generator: GraphGenerator,
    static_dir: PathBuf,
    preview_rows: usize,
}

impl Pipeline {
    /// Creates an orchestrator
    ///
    /// # Arguments
    /// * `generator` - Chart generator for the users' datasets
    /// * `static_dir` - Directory served under `/static`; artifacts inside
    ///   it get a URL in [`ChartOutcome::ArtifactReady`]
    /// * `preview_rows` - Number of rows returned by [`Pipeline::preview`]
    pub fn new(generator: GraphGenerator, static_dir: impl Into<PathBuf>, preview_rows: usize) -> Self {
        Self {
            generator,
            static_dir: static_dir.into(),
            preview_rows,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            GraphGenerator::from_settings(settings),
            settings.storage.static_dir.clone(),
            settings.chart.preview_rows,
        )
    }

    pub fn generator(&self) -> &GraphGenerator {
        &self.generator
    }

    /// Regenerate the chart of `username` from their latest upload
    ///
    /// # Arguments
    /// * `username` - Owner of the chart
    /// * `latest_filename` - Stored name of the user's most recent upload,
    ///   `None` when they have not uploaded anything
    ///
    /// # Returns
    /// * The outcome to show; failures are logged, never returned
    pub fn run(&self, username: &str, latest_filename: Option<&str>) -> ChartOutcome {
        let Some(filename) = latest_filename else {
            info!("no dataset uploaded by {}", username);
            return ChartOutcome::NoData;
        };

        match self.generator.generate(username, filename) {
            Ok(artifact) => self.ready(artifact),
            Err(e) if e.is_no_data() => {
                warn!("no chart for {} from {}: {}", username, filename, e);
                ChartOutcome::NoData
            }
            Err(e) => {
                error!("chart generation failed for {} from {}: {}", username, filename, e);
                ChartOutcome::GenerationFailed
            }
        }
    }

    /// First rows of the normalized dataset, for display next to the chart
    pub fn preview(&self, filename: &str) -> Result<Dataset, PipelineError> {
        Ok(self.generator.load_dataset(filename)?.head(self.preview_rows))
    }

    fn ready(&self, artifact: Artifact) -> ChartOutcome {
        let url = self.url_for(&artifact.path);
        ChartOutcome::ArtifactReady {
            url,
            plots: artifact.plots,
            skipped: artifact.skipped.iter().map(|s| s.to_string()).collect(),
            path: artifact.path,
        }
    }

    fn url_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.static_dir).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("{}/{}", STATIC_URL_PREFIX, parts.join("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphOptions, PlotSpec};
    use crate::normalizer::ColumnNormalizer;
    use std::fs;

    fn pipeline(root: &Path) -> Pipeline {
        let generator = GraphGenerator::new(
            root.join("datasets"),
            root.join("static").join("graphs"),
            ColumnNormalizer::from_pairs([("Age", "age")]),
            vec![PlotSpec::Histogram {
                column: "age".to_string(),
                bins: 4,
            }],
            GraphOptions {
                width: 320,
                height: 240,
            },
        );
        Pipeline::new(generator, root.join("static"), 2)
    }

    #[test]
    fn test_no_filename_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(pipeline(dir.path()).run("alice", None), ChartOutcome::NoData);
    }

    #[test]
    fn test_missing_file_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = pipeline(dir.path()).run("alice", Some("ghost.csv"));
        assert_eq!(outcome, ChartOutcome::NoData);
    }

    #[test]
    fn test_malformed_csv_is_generation_failed() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("datasets");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("bad.csv"), "Age\n1\n2,3\n").unwrap();

        let outcome = pipeline(dir.path()).run("alice", Some("bad.csv"));
        assert_eq!(outcome, ChartOutcome::GenerationFailed);
    }

    #[test]
    fn test_success_reports_static_url() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = dir.path().join("datasets");
        fs::create_dir_all(&uploads).unwrap();
        fs::write(uploads.join("people.csv"), "Age\n21\n34\n55\n").unwrap();

        let p = pipeline(dir.path());
        match p.run("alice", Some("people.csv")) {
            ChartOutcome::ArtifactReady {
                path,
                url,
                plots,
                skipped,
            } => {
                assert_eq!(path, dir.path().join("static/graphs/alice.png"));
                assert!(path.exists());
                assert_eq!(url.as_deref(), Some("/static/graphs/alice.png"));
                assert_eq!(plots, vec!["Distribution of age"]);
                assert!(skipped.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let preview = p.preview("people.csv").unwrap();
        assert_eq!(preview.columns().to_vec(), vec!["age"]);
        assert_eq!(preview.row_count(), 2);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(ChartOutcome::NoData).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "no_data" }));
    }
}

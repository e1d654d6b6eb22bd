use std::fmt;
use std::io;
use std::path::PathBuf;

/// Failures of the upload → normalize → visualize pipeline
///
/// None of these escape the [`Pipeline`](crate::pipeline::Pipeline); the
/// orchestrator reduces them to a [`ChartOutcome`](crate::pipeline::ChartOutcome).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The stored dataset file does not exist
    #[error("dataset file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The stored dataset file exists but could not be opened or read
    #[error("dataset file {} could not be read: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed CSV content
    #[error("malformed CSV at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// The dataset has no data rows or no columns
    #[error("dataset has no rows or no columns")]
    EmptyDataset,

    /// Every configured plot was skipped
    #[error("none of the configured plots could be drawn")]
    NothingToPlot,

    /// The dataset filename is not a plain name inside the uploads directory
    #[error("dataset filename {0:?} is not a stored upload name")]
    InvalidFilename(String),

    /// The username sanitizes to an empty artifact name
    #[error("username {0:?} cannot be used as an artifact name")]
    InvalidUsername(String),

    /// The plotting backend failed
    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// True for conditions where the caller should show a "no chart" state
    /// rather than a failure notice.
    pub fn is_no_data(&self) -> bool {
        matches!(
            self,
            PipelineError::FileNotFound(_)
                | PipelineError::InvalidFilename(_)
                | PipelineError::Unreadable { .. }
                | PipelineError::EmptyDataset
                | PipelineError::NothingToPlot
        )
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        PipelineError::Parse {
            line,
            message: err.to_string(),
        }
    }
}

/// Why a single plot was left out of an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The column is not present after normalization
    MissingColumn(String),
    /// The column exists but holds no usable numeric values
    NoNumericValues(String),
    /// The column exists but every cell is missing
    NoValues(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingColumn(col) => write!(f, "column '{}' is missing", col),
            SkipReason::NoNumericValues(col) => {
                write!(f, "column '{}' has no numeric values", col)
            }
            SkipReason::NoValues(col) => write!(f, "column '{}' has no values", col),
        }
    }
}

/// A plot that could not be produced. Non-fatal: the remaining plots are
/// still drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotSkipped {
    pub plot: String,
    pub reason: SkipReason,
}

impl fmt::Display for PlotSkipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} skipped: {}", self.plot, self.reason)
    }
}

/// Failures of the upload intake and the JSON record store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("record file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    /// Nothing usable is left of the filename after sanitizing
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    #[error("unsupported file type: {0:?}")]
    UnsupportedFileType(String),

    #[error("feedback cannot be empty")]
    EmptyFeedback,
}

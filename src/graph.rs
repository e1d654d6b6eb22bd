use crate::dataset::Dataset;
use crate::error::{PipelineError, PlotSkipped, SkipReason};
use crate::loader;
use crate::normalizer::ColumnNormalizer;
use crate::settings::Settings;
use crate::upload::secure_filename;
use log::{debug, info, warn};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

fn default_bins() -> usize {
    10
}

fn default_top() -> usize {
    10
}

/// One summary plot over the normalized columns of a dataset
///
/// The plot set is configuration, not code: see `[[plots]]` in the
/// settings file.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlotSpec {
    /// Distribution of a numeric column
    Histogram {
        column: String,
        #[serde(default = "default_bins")]
        bins: usize,
    },

    /// Occurrences of the most frequent values of a column
    CategoryCount {
        column: String,
        #[serde(default = "default_top")]
        top: usize,
    },

    /// Relationship between two numeric columns
    Scatter { x: String, y: String },

    /// A numeric column in row order
    Line { column: String },
}

impl PlotSpec {
    /// Caption drawn above the panel
    pub fn title(&self) -> String {
        match self {
            PlotSpec::Histogram { column, .. } => format!("Distribution of {}", column),
            PlotSpec::CategoryCount { column, .. } => format!("Count by {}", column),
            PlotSpec::Scatter { x, y } => format!("{} vs {}", y, x),
            PlotSpec::Line { column } => format!("{} by row", column),
        }
    }
}

/// Pixel size of the generated image
#[derive(Clone, Debug)]
pub struct GraphOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 900,
        }
    }
}

/// Handle to a generated chart image
#[derive(Clone, Debug, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    /// Titles of the panels that were drawn, in configured order
    pub plots: Vec<String>,
    pub skipped: Vec<PlotSkipped>,
}

/// A plot resolved against a dataset, ready to draw
#[derive(Clone, Debug)]
enum Panel {
    Histogram {
        title: String,
        column: String,
        start: f64,
        width: f64,
        counts: Vec<u32>,
    },
    Bars {
        title: String,
        column: String,
        labels: Vec<String>,
        counts: Vec<u32>,
    },
    Scatter {
        title: String,
        x: String,
        y: String,
        points: Vec<(f64, f64)>,
    },
    Line {
        title: String,
        column: String,
        points: Vec<(f64, f64)>,
    },
}

impl Panel {
    fn title(&self) -> &str {
        match self {
            Panel::Histogram { title, .. }
            | Panel::Bars { title, .. }
            | Panel::Scatter { title, .. }
            | Panel::Line { title, .. } => title,
        }
    }
}

/// Reads a user's dataset and renders the configured plots into one PNG
/// per user.
#[derive(Clone, Debug)]
pub struct GraphGenerator {
    uploads_dir: PathBuf,
    graphs_dir: PathBuf,
    normalizer: ColumnNormalizer,
    plots: Vec<PlotSpec>,
    options: GraphOptions,
}

impl GraphGenerator {
    /// Creates a generator
    ///
    /// # Arguments
    /// * `uploads_dir` - Directory holding the stored CSV uploads
    /// * `graphs_dir` - Directory the per-user PNG artifacts are written to
    /// * `normalizer` - Header synonym table applied before plots are resolved
    /// * `plots` - Plots to draw, in panel order
    /// * `options` - Image size
    pub fn new(
        uploads_dir: impl Into<PathBuf>,
        graphs_dir: impl Into<PathBuf>,
        normalizer: ColumnNormalizer,
        plots: Vec<PlotSpec>,
        options: GraphOptions,
    ) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            graphs_dir: graphs_dir.into(),
            normalizer,
            plots,
            options,
        }
    }

    /// Creates a generator from the storage, chart, synonym and plot
    /// sections of the settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.storage.uploads_dir.clone(),
            settings.storage.graphs_dir(),
            ColumnNormalizer::new(&settings.synonyms),
            settings.plots.clone(),
            GraphOptions {
                width: settings.chart.width,
                height: settings.chart.height,
            },
        )
    }

    pub fn normalizer(&self) -> &ColumnNormalizer {
        &self.normalizer
    }

    pub fn graphs_dir(&self) -> &Path {
        &self.graphs_dir
    }

    /// Where an uploaded file is stored
    ///
    /// # Arguments
    /// * `filename` - Stored name of the upload, as recorded by the store
    ///
    /// # Returns
    /// * The path under the uploads directory, or `InvalidFilename` when
    ///   the name is empty or carries path components (`../x.csv`,
    ///   `sub/x.csv`) and would resolve outside it
    pub fn dataset_path(&self, filename: &str) -> Result<PathBuf, PipelineError> {
        if filename.is_empty() || secure_filename(filename) != filename {
            return Err(PipelineError::InvalidFilename(filename.to_string()));
        }
        Ok(self.uploads_dir.join(filename))
    }

    /// The single artifact slot of a user
    pub fn artifact_path(&self, username: &str) -> Result<PathBuf, PipelineError> {
        let stem = secure_filename(username);
        if stem.is_empty() {
            return Err(PipelineError::InvalidUsername(username.to_string()));
        }
        Ok(self.graphs_dir.join(format!("{}.png", stem)))
    }

    /// Load and normalize a stored dataset
    pub fn load_dataset(&self, filename: &str) -> Result<Dataset, PipelineError> {
        let dataset = loader::from_csv(self.dataset_path(filename)?)?;
        Ok(dataset.normalized(&self.normalizer))
    }

    /// Generate the chart for `username` from `<uploads_dir>/<filename>`
    ///
    /// Overwrites any previous artifact of that user. Nothing is written
    /// when the dataset is empty or none of the plots can be drawn.
    ///
    /// # Arguments
    /// * `username` - Owner of the chart; sanitized into the artifact name
    /// * `filename` - Stored name of the user's latest upload
    ///
    /// # Returns
    /// * The written [`Artifact`] with the drawn and skipped plots, or the
    ///   reason no chart could be produced
    pub fn generate(&self, username: &str, filename: &str) -> Result<Artifact, PipelineError> {
        let path = self.artifact_path(username)?;
        let dataset = loader::from_csv(self.dataset_path(filename)?)?;
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let dataset = dataset.normalized(&self.normalizer);
        debug!(
            "generating chart for {} from {} ({} rows, columns {:?})",
            username,
            filename,
            dataset.row_count(),
            dataset.columns()
        );
        self.render(&dataset, &path)
    }

    /// Render the configured plots of an already normalized dataset to
    /// `path`.
    pub fn render(&self, dataset: &Dataset, path: &Path) -> Result<Artifact, PipelineError> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }

        let mut panels = Vec::new();
        let mut skipped = Vec::new();
        for spec in &self.plots {
            match resolve_panel(spec, dataset) {
                Ok(panel) => panels.push(panel),
                Err(reason) => {
                    let skip = PlotSkipped {
                        plot: spec.title(),
                        reason,
                    };
                    warn!("{}", skip);
                    skipped.push(skip);
                }
            }
        }

        if panels.is_empty() {
            return Err(PipelineError::NothingToPlot);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // render next to the target, then swap it in
        let tmp = temp_path_for(path);
        let drawn = panic::catch_unwind(AssertUnwindSafe(|| {
            draw_panels(&panels, &self.options, &tmp).map_err(|e| e.to_string())
        }))
        .unwrap_or_else(|_| Err("plotting backend panicked".to_string()));
        if let Err(e) = drawn {
            let _ = fs::remove_file(&tmp);
            return Err(PipelineError::Render(e));
        }
        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }

        info!(
            "wrote {} ({} plots, {} skipped)",
            path.display(),
            panels.len(),
            skipped.len()
        );

        Ok(Artifact {
            path: path.to_path_buf(),
            plots: panels.iter().map(|p| p.title().to_string()).collect(),
            skipped,
        })
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    // keep the .png extension, the bitmap backend picks the encoder from it
    path.with_file_name(format!(".{}.{}.tmp.png", stem, uuid::Uuid::new_v4()))
}

/// Pull the data a plot needs out of the dataset
fn resolve_panel(spec: &PlotSpec, dataset: &Dataset) -> Result<Panel, SkipReason> {
    let title = spec.title();
    match spec {
        PlotSpec::Histogram { column, bins } => {
            let values = numeric_column(dataset, column)?;
            let (start, width, counts) = bin_values(&values, *bins);
            Ok(Panel::Histogram {
                title,
                column: column.clone(),
                start,
                width,
                counts,
            })
        }
        PlotSpec::CategoryCount { column, top } => {
            let counts = dataset
                .category_counts(column)
                .ok_or_else(|| SkipReason::MissingColumn(column.clone()))?;
            if counts.is_empty() {
                return Err(SkipReason::NoValues(column.clone()));
            }
            let (labels, counts): (Vec<String>, Vec<u32>) = counts
                .into_iter()
                .take((*top).max(1))
                .map(|(label, n)| (label, n as u32))
                .unzip();
            Ok(Panel::Bars {
                title,
                column: column.clone(),
                labels,
                counts,
            })
        }
        PlotSpec::Scatter { x, y } => {
            let points = dataset.numeric_pairs(x, y).ok_or_else(|| {
                let absent = if dataset.column_index(x).is_none() { x } else { y };
                SkipReason::MissingColumn(absent.clone())
            })?;
            if points.is_empty() {
                return Err(SkipReason::NoNumericValues(format!("{}/{}", x, y)));
            }
            Ok(Panel::Scatter {
                title,
                x: x.clone(),
                y: y.clone(),
                points,
            })
        }
        PlotSpec::Line { column } => {
            let points: Vec<(f64, f64)> = dataset
                .indexed_numeric_values(column)
                .ok_or_else(|| SkipReason::MissingColumn(column.clone()))?
                .into_iter()
                .map(|(i, v)| (i as f64, v))
                .collect();
            if points.is_empty() {
                return Err(SkipReason::NoNumericValues(column.clone()));
            }
            Ok(Panel::Line {
                title,
                column: column.clone(),
                points,
            })
        }
    }
}

fn numeric_column(dataset: &Dataset, column: &str) -> Result<Vec<f64>, SkipReason> {
    let values = dataset
        .numeric_values(column)
        .ok_or_else(|| SkipReason::MissingColumn(column.to_string()))?;
    if values.is_empty() {
        return Err(SkipReason::NoNumericValues(column.to_string()));
    }
    Ok(values)
}

/// Equal-width histogram bins over `values` (non-empty)
///
/// Returns the left edge of the first bin, the bin width and the counts.
/// A constant column gets a single bin of width 1 centred on the value.
fn bin_values(values: &[f64], bins: usize) -> (f64, f64, Vec<u32>) {
    let bins = bins.max(1);
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    if max <= min {
        return (min - 0.5, 1.0, vec![values.len() as u32]);
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0u32; bins];
    for v in values {
        let idx = (((v - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    (min, width, counts)
}

/// Axis range covering `values` with a small margin
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    if max <= min {
        return (min - 1.0)..(max + 1.0);
    }
    let pad = (max - min) * 0.05;
    (min - pad)..(max + pad)
}

/// Grid shape for `n` panels: `ceil(sqrt(n))` columns
fn grid_shape(n: usize) -> (usize, usize) {
    let cols = (n as f64).sqrt().ceil().max(1.0) as usize;
    let rows = n.div_ceil(cols);
    (rows, cols)
}

/// Draw every panel into one bitmap at `path`
fn draw_panels(
    panels: &[Panel],
    options: &GraphOptions,
    path: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(path, (options.width, options.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let (rows, cols) = grid_shape(panels.len());
    let areas = root.split_evenly((rows, cols));
    for (panel, area) in panels.iter().zip(areas.iter()) {
        match panel {
            Panel::Histogram {
                title,
                column,
                start,
                width,
                counts,
            } => draw_histogram(area, title, column, *start, *width, counts)?,
            Panel::Bars {
                title,
                column,
                labels,
                counts,
            } => draw_bars(area, title, column, labels, counts)?,
            Panel::Scatter {
                title,
                x,
                y,
                points,
            } => draw_scatter(area, title, x, y, points)?,
            Panel::Line {
                title,
                column,
                points,
            } => draw_line(area, title, column, points)?,
        }
    }

    root.present()?;
    Ok(())
}

type Area<'a> = DrawingArea<BitMapBackend<'a>, Shift>;

/// Chart frame shared by every panel
fn frame<'a, 'b, 'c>(area: &'a Area<'c>, title: &str) -> ChartBuilder<'a, 'b, BitMapBackend<'c>> {
    let mut builder = ChartBuilder::on(area);
    builder
        .caption(title, ("sans-serif", 20).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40);
    builder
}

/// Tick count for a `0..=max_count` count axis: one tick per integer,
/// at most ten
fn count_labels(max_count: u32) -> usize {
    (max_count as usize + 1).clamp(2, 10)
}

fn draw_histogram(
    area: &Area<'_>,
    title: &str,
    column: &str,
    start: f64,
    width: f64,
    counts: &[u32],
) -> Result<(), Box<dyn Error>> {
    let end = start + width * counts.len() as f64;
    let max_count = counts.iter().copied().max().unwrap_or(0);

    let mut chart = frame(area, title).build_cartesian_2d(start..end, 0u32..max_count + 1)?;

    chart
        .configure_mesh()
        .y_labels(count_labels(max_count))
        .x_desc(column)
        .y_desc("count")
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, &c)| {
        let x0 = start + width * i as f64;
        Rectangle::new([(x0, 0), (x0 + width, c)], BLUE.mix(0.6).filled())
    }))?;

    Ok(())
}

fn draw_bars(
    area: &Area<'_>,
    title: &str,
    column: &str,
    labels: &[String],
    counts: &[u32],
) -> Result<(), Box<dyn Error>> {
    let max_count = counts.iter().copied().max().unwrap_or(0);

    let mut chart = frame(area, title)
        .build_cartesian_2d((0..labels.len()).into_segmented(), 0u32..max_count + 1)?;

    let label_of = |v: &SegmentValue<usize>| match v {
        SegmentValue::Exact(i) | SegmentValue::CenterOf(i) => {
            labels.get(*i).cloned().unwrap_or_default()
        }
        SegmentValue::Last => String::new(),
    };

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(labels.len().max(1))
        .x_label_formatter(&label_of)
        .y_labels(count_labels(max_count))
        .x_desc(column)
        .y_desc("count")
        .draw()?;

    chart.draw_series(
        Histogram::vertical(&chart)
            .style(BLUE.filled())
            .margin(5)
            .data(counts.iter().enumerate().map(|(i, &c)| (i, c))),
    )?;

    Ok(())
}

fn draw_scatter(
    area: &Area<'_>,
    title: &str,
    x: &str,
    y: &str,
    points: &[(f64, f64)],
) -> Result<(), Box<dyn Error>> {
    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(points.iter().map(|p| p.1));

    let mut chart = frame(area, title).build_cartesian_2d(x_range, y_range)?;

    chart.configure_mesh().x_desc(x).y_desc(y).draw()?;

    chart.draw_series(
        points
            .iter()
            .map(|&(px, py)| Circle::new((px, py), 3, GREEN.filled())),
    )?;

    Ok(())
}

fn draw_line(
    area: &Area<'_>,
    title: &str,
    column: &str,
    points: &[(f64, f64)],
) -> Result<(), Box<dyn Error>> {
    let x_range = padded_range(points.iter().map(|p| p.0));
    let y_range = padded_range(points.iter().map(|p| p.1));

    let mut chart = frame(area, title).build_cartesian_2d(x_range, y_range)?;

    chart.configure_mesh().x_desc("row").y_desc(column).draw()?;

    chart.draw_series(LineSeries::new(points.iter().copied(), &RED))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    fn dataset(columns: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Value::parse(v)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_plot_titles() {
        assert_eq!(
            PlotSpec::Histogram {
                column: "age".to_string(),
                bins: 5
            }
            .title(),
            "Distribution of age"
        );
        assert_eq!(
            PlotSpec::Scatter {
                x: "age".to_string(),
                y: "income".to_string()
            }
            .title(),
            "income vs age"
        );
    }

    #[test]
    fn test_bin_values() {
        let (start, width, counts) = bin_values(&[0.0, 1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(start, 0.0);
        assert_eq!(width, 2.0);
        assert_eq!(counts, vec![2, 3]);

        let (start, width, counts) = bin_values(&[7.0, 7.0, 7.0], 10);
        assert_eq!((start, width), (6.5, 1.0));
        assert_eq!(counts, vec![3]);
    }

    #[test]
    fn test_grid_shape() {
        assert_eq!(grid_shape(1), (1, 1));
        assert_eq!(grid_shape(2), (1, 2));
        assert_eq!(grid_shape(3), (2, 2));
        assert_eq!(grid_shape(4), (2, 2));
        assert_eq!(grid_shape(5), (2, 3));
    }

    #[test]
    fn test_padded_range() {
        assert_eq!(padded_range(std::iter::empty()), 0.0..1.0);
        assert_eq!(padded_range([2.0].into_iter()), 1.0..3.0);
        let r = padded_range([0.0, 10.0].into_iter());
        assert!(r.start < 0.0 && r.end > 10.0);
    }

    #[test]
    fn test_resolve_skips_missing_and_non_numeric_columns() {
        let ds = dataset(&["age", "city"], &[&["31", "Pune"], &["x", "Delhi"]]);

        let missing = resolve_panel(
            &PlotSpec::Histogram {
                column: "income".to_string(),
                bins: 10,
            },
            &ds,
        );
        assert_eq!(
            missing.unwrap_err(),
            SkipReason::MissingColumn("income".to_string())
        );

        let not_numeric = resolve_panel(
            &PlotSpec::Line {
                column: "city".to_string(),
            },
            &ds,
        );
        assert_eq!(
            not_numeric.unwrap_err(),
            SkipReason::NoNumericValues("city".to_string())
        );

        let scatter = resolve_panel(
            &PlotSpec::Scatter {
                x: "age".to_string(),
                y: "income".to_string(),
            },
            &ds,
        );
        assert_eq!(
            scatter.unwrap_err(),
            SkipReason::MissingColumn("income".to_string())
        );
    }

    #[test]
    fn test_resolve_category_count_takes_top() {
        let ds = dataset(
            &["city"],
            &[&["Pune"], &["Delhi"], &["Pune"], &["Goa"], &[""]],
        );
        let panel = resolve_panel(
            &PlotSpec::CategoryCount {
                column: "city".to_string(),
                top: 2,
            },
            &ds,
        )
        .unwrap();
        match panel {
            Panel::Bars { labels, counts, .. } => {
                assert_eq!(labels, vec!["Pune", "Delhi"]);
                assert_eq!(counts, vec![2, 1]);
            }
            other => panic!("unexpected panel {:?}", other),
        }
    }

    #[test]
    fn test_artifact_path_is_keyed_by_sanitized_username() {
        let generator = GraphGenerator::new(
            "uploads",
            "static/graphs",
            ColumnNormalizer::default(),
            vec![],
            GraphOptions::default(),
        );
        assert_eq!(
            generator.artifact_path("alice").unwrap(),
            PathBuf::from("static/graphs/alice.png")
        );
        assert_eq!(
            generator.artifact_path("../bob").unwrap(),
            PathBuf::from("static/graphs/bob.png")
        );
        assert!(matches!(
            generator.artifact_path("../"),
            Err(PipelineError::InvalidUsername(_))
        ));
    }

    #[test]
    fn test_dataset_path_stays_inside_uploads_dir() {
        let generator = GraphGenerator::new(
            "uploads",
            "static/graphs",
            ColumnNormalizer::default(),
            vec![],
            GraphOptions::default(),
        );
        assert_eq!(
            generator.dataset_path("people.csv").unwrap(),
            PathBuf::from("uploads/people.csv")
        );
        for name in ["../../x.csv", "sub/x.csv", "/etc/passwd", ""] {
            assert!(
                matches!(
                    generator.dataset_path(name),
                    Err(PipelineError::InvalidFilename(_))
                ),
                "{:?} accepted",
                name
            );
        }
    }

    #[test]
    fn test_count_labels_never_zero() {
        assert_eq!(count_labels(0), 2);
        assert_eq!(count_labels(1), 2);
        assert_eq!(count_labels(4), 5);
        assert_eq!(count_labels(500), 10);
    }

    #[test]
    fn test_temp_path_keeps_png_extension() {
        let tmp = temp_path_for(Path::new("static/graphs/alice.png"));
        assert_eq!(tmp.parent(), Some(Path::new("static/graphs")));
        assert_eq!(tmp.extension().and_then(|e| e.to_str()), Some("png"));
        assert_ne!(tmp, PathBuf::from("static/graphs/alice.png"));
    }
}

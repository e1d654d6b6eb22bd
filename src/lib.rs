/*!
# Dataset Dashboard

A small web dashboard: users upload a CSV dataset and get an
auto-generated chart of their most recent upload; visitors can leave
feedback.

## Architecture

### Pipeline (upload → normalize → visualize)
- **Loader** - Parses a stored CSV into a [`Dataset`] of typed cells
- **Column Normalizer** - Maps raw headers to canonical names through a
  configurable synonym table; unknown headers pass through
- **Graph Generator** - Resolves the configured plot set against the
  normalized columns, skips plots whose columns are absent and renders
  the rest into one PNG per user
- **Orchestrator** - Runs generation for a `(username, filename)` pair and
  reduces every outcome to `ArtifactReady | NoData | GenerationFailed`

### Surroundings
- **Upload intake** - Filename sanitizing and extension checks
- **Record store** - JSON-file records of uploads and feedback
- **Web layer** (feature `web`) - axum routes for uploading, the
  dashboard view, feedback and the generated graphs

## Modules

- **settings**: Configuration loading (file + environment)
- **normalizer**: Column synonym table and header normalization
- **dataset**: In-memory table and cell values
- **loader**: CSV parsing
- **graph**: Plot specifications and chart rendering
- **pipeline**: Orchestration of one dashboard view
- **upload**: Storing uploaded files
- **store**: Upload and feedback records
- **app**: Routing and handlers

## REST API Endpoints

- `POST /users/{username}/uploads` - Upload a CSV (multipart field `csv_file`)
- `GET /users/{username}/uploads` - List a user's uploads
- `GET /users/{username}/dashboard` - Regenerate and describe the user's chart
- `POST /feedback` - Leave feedback
- `/static/graphs/{username}.png` - Generated charts
*/

pub mod dataset;
pub mod error;
pub mod graph;
pub mod loader;
pub mod normalizer;
pub mod pipeline;
pub mod settings;
pub mod store;
pub mod upload;

#[cfg(feature = "web")]
pub mod app;

pub use dataset::{Dataset, Value};
pub use error::{PipelineError, PlotSkipped, SkipReason, StoreError};
pub use graph::{Artifact, GraphGenerator, GraphOptions, PlotSpec};
pub use normalizer::{ColumnNormalizer, SynonymEntry};
pub use pipeline::{ChartOutcome, Pipeline};
pub use settings::Settings;
pub use store::{Database, Feedback, UploadedFile};

use std::path::PathBuf;

/// Failures that abort a run. Row-level problems (bad currency cells, missing
/// grouping keys) never surface here; they degrade to missing values instead.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("required column `{column}` not found in {}", path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

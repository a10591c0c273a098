use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Required tool `{0}` was not found on PATH")]
    MissingTool(String),

    #[error("`{tool}` exited with {status}")]
    ToolFailed { tool: String, status: ExitStatus },

    #[error("IO error {1}: {0}")]
    IoError(#[source] std::io::Error, PathBuf),

    #[error(transparent)]
    CoreError(#[from] firetiles_core::CoreError),

    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    PmtError(#[from] pmtiles::PmtError),

    #[error("{} is not a PMTiles archive (bad magic header)", .0.display())]
    BadMagic(PathBuf),

    #[error("Source file not found: {}", .0.display())]
    MissingSource(PathBuf),

    #[error("No tiles found in {}", .0.display())]
    NoTiles(PathBuf),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

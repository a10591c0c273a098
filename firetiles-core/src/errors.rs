use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error("IO error {1}: {0}")]
    IoError(#[source] std::io::Error, PathBuf),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error("Not a valid GeoJSON file {1}: {0}")]
    InvalidGeoJson(#[source] Box<geojson::Error>, PathBuf),

    #[error("Failed to write feature stream: {0}")]
    OutputError(#[source] std::io::Error),

    #[error("Data directory not found: {}", .0.display())]
    DataDirNotFound(PathBuf),

    #[error("No matching GeoJSON files were found in {}", .0.display())]
    NoSlicesFound(PathBuf),

    #[error("Invalid H3 resolution {0}, must be between 0 and 15")]
    InvalidResolution(u8),

    #[error(
        "{count} H3 aggregates have no raw feature coverage for the same cell and day. Examples: {examples:?}"
    )]
    CoverageGap {
        count: usize,
        examples: Vec<String>,
    },
}

pub type CoreResult<T> = Result<T, CoreError>;

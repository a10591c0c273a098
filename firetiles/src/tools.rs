//! External tool discovery.
//!
//! Every build step delegates the heavy lifting to well-known geospatial
//! binaries; the pipeline only checks they exist up front so a missing tool
//! fails fast with a readable message instead of half-way through a build.

use std::path::PathBuf;

use crate::errors::{PipelineError, PipelineResult};

pub const TIPPECANOE: &str = "tippecanoe";
pub const PMTILES: &str = "pmtiles";
pub const GDAL_POLYGONIZE: &str = "gdal_polygonize.py";
pub const OGR2OGR: &str = "ogr2ogr";

/// Search `PATH` for an executable.
#[must_use]
pub fn find_tool(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Resolve a required tool or fail with a [`PipelineError::MissingTool`].
pub fn require_tool(name: &str) -> PipelineResult<PathBuf> {
    find_tool(name).ok_or_else(|| PipelineError::MissingTool(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_ubiquitous_binary() {
        // `sh` is on PATH in any environment these tests run in
        assert!(find_tool("sh").is_some());
    }

    #[test]
    fn missing_tool_is_an_error() {
        let err = require_tool("definitely-not-a-real-tool-3093").unwrap_err();
        assert!(matches!(err, PipelineError::MissingTool(name) if name.contains("3093")));
    }
}

//! Tile build orchestration.
//!
//! Each build is a fixed sequence: stream NDJSON features into tippecanoe's
//! stdin, check the MBTiles it wrote, convert to PMTiles with the `pmtiles`
//! CLI, and verify the result. Steps run strictly one after another and the
//! first failure aborts the build.

use std::ffi::{OsStr, OsString};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use firetiles_core::errors::{CoreError, CoreResult};
use firetiles_core::h3agg::{H3StreamOptions, write_h3_stream};
use firetiles_core::stats::load_stats_map;
use firetiles_core::stream::{DateWindow, write_raw_stream};
use tracing::info;

use crate::errors::{PipelineError, PipelineResult};
use crate::tools::{PMTILES, TIPPECANOE, require_tool};
use crate::{mbtiles, verify};

/// Vector layer name shared by every fire tileset.
pub const LAYER_NAME: &str = "fires";
/// Human-readable tileset name stored in the archive metadata.
pub const TILESET_NAME: &str = "Fire events";

/// Common knobs for the raw and H3 builds.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub data_dir: PathBuf,
    pub tiles_dir: PathBuf,
    pub max_zoom: u8,
    pub window: DateWindow,
}

/// Tippecanoe invocation reading NDJSON from stdin.
///
/// The flag set matches what the deploy pipeline has always passed: keep
/// every point (`-r1`), drop densest when a tile overflows, no tiny-polygon
/// or line simplification surprises (`-pS`), no duplicate-key joining
/// (`-pk`), overwrite the previous archive.
#[must_use]
pub fn tippecanoe_stdin_args(
    output: &Path,
    layer: &str,
    name: &str,
    min_zoom: u8,
    max_zoom: u8,
) -> Vec<OsString> {
    vec![
        OsString::from("-o"),
        output.into(),
        format!("-Z{min_zoom}").into(),
        format!("-z{max_zoom}").into(),
        OsString::from("--layer"),
        layer.into(),
        OsString::from("--name"),
        name.into(),
        OsString::from("--drop-densest-as-needed"),
        OsString::from("--extend-zooms-if-still-dropping"),
        OsString::from("-pk"),
        OsString::from("-pS"),
        OsString::from("-r1"),
        OsString::from("--force"),
        OsString::from("-"),
    ]
}

/// Run an external tool to completion, mapping a nonzero exit to an error.
pub(crate) fn run_checked(tool_name: &str, args: &[OsString]) -> PipelineResult<()> {
    let tool = require_tool(tool_name)?;
    info!("Running {tool_name} {}", display_args(args));
    let status = Command::new(&tool)
        .args(args)
        .status()
        .map_err(|e| PipelineError::IoError(e, tool.clone()))?;
    if !status.success() {
        return Err(PipelineError::ToolFailed {
            tool: tool_name.to_string(),
            status,
        });
    }
    Ok(())
}

fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether a stream error is just the consumer closing its end early.
#[must_use]
pub fn is_broken_pipe(err: &CoreError) -> bool {
    match err {
        CoreError::OutputError(io) => io.kind() == ErrorKind::BrokenPipe,
        CoreError::JsonError(json) => json.io_error_kind() == Some(ErrorKind::BrokenPipe),
        _ => false,
    }
}

/// Spawn tippecanoe and feed its stdin from `producer`.
///
/// A broken pipe from the producer is not an error by itself: tippecanoe may
/// exit first, and its exit status is what decides the outcome.
pub fn run_tippecanoe<F>(args: &[OsString], producer: F) -> PipelineResult<()>
where
    F: FnOnce(&mut dyn Write) -> CoreResult<()>,
{
    let tool = require_tool(TIPPECANOE)?;
    info!("Running {TIPPECANOE} {}", display_args(args));
    let mut child = Command::new(&tool)
        .args(args)
        .stdin(Stdio::piped())
        .spawn()
        .map_err(|e| PipelineError::IoError(e, tool.clone()))?;

    let stdin = child.stdin.take().expect("stdin was requested as piped");
    let mut writer = BufWriter::new(stdin);
    let produced = producer(&mut writer).and_then(|()| {
        writer
            .flush()
            .map_err(CoreError::OutputError)
    });
    drop(writer);

    let status = child
        .wait()
        .map_err(|e| PipelineError::IoError(e, tool.clone()))?;
    if !status.success() {
        return Err(PipelineError::ToolFailed {
            tool: TIPPECANOE.to_string(),
            status,
        });
    }
    match produced {
        Ok(()) => Ok(()),
        Err(err) if is_broken_pipe(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Convert an MBTiles archive to PMTiles with the `pmtiles` CLI.
pub fn convert_to_pmtiles(mbtiles_path: &Path, pmtiles_path: &Path) -> PipelineResult<()> {
    run_checked(
        PMTILES,
        &[
            OsString::from("convert"),
            mbtiles_path.into(),
            pmtiles_path.into(),
        ],
    )
}

/// Inspect the MBTiles intermediate, convert it, verify the PMTiles output.
async fn finish_archive(mbtiles_path: &Path, pmtiles_path: &Path) -> PipelineResult<()> {
    let summary = mbtiles::summarize(mbtiles_path).await?;
    info!("{}: {summary}", mbtiles_path.display());
    convert_to_pmtiles(mbtiles_path, pmtiles_path)?;
    let pmt = verify::verify_pmtiles(pmtiles_path).await?;
    info!("{}: {pmt}", pmtiles_path.display());
    Ok(())
}

fn prepare_tiles_dir(config: &BuildConfig) -> PipelineResult<()> {
    // Fail on missing tools before any expensive streaming starts
    require_tool(TIPPECANOE)?;
    require_tool(PMTILES)?;
    std::fs::create_dir_all(&config.tiles_dir)
        .map_err(|e| PipelineError::IoError(e, config.tiles_dir.clone()))
}

/// Build the raw fire-event tileset: every feature at every zoom.
pub async fn build_raw(config: &BuildConfig, min_zoom: u8) -> PipelineResult<PathBuf> {
    prepare_tiles_dir(config)?;
    let mbtiles_path = config.tiles_dir.join("fires.mbtiles");
    let pmtiles_path = config.tiles_dir.join("fires.pmtiles");

    let args = tippecanoe_stdin_args(
        &mbtiles_path,
        LAYER_NAME,
        TILESET_NAME,
        min_zoom,
        config.max_zoom,
    );
    run_tippecanoe(&args, |out| {
        write_raw_stream(&config.data_dir, &config.window, out)
    })?;

    finish_archive(&mbtiles_path, &pmtiles_path).await?;
    Ok(pmtiles_path)
}

/// Build the combined tileset: H3 hexagons at low zooms, raw features above.
pub async fn build_h3(
    config: &BuildConfig,
    options: &H3StreamOptions,
    stats_gdf: Option<&Path>,
) -> PipelineResult<PathBuf> {
    prepare_tiles_dir(config)?;
    let mbtiles_path = config.tiles_dir.join("fires_h3.mbtiles");
    let pmtiles_path = config.tiles_dir.join("fires_h3.pmtiles");

    let stats = load_stats_map(stats_gdf);
    let args = tippecanoe_stdin_args(&mbtiles_path, LAYER_NAME, TILESET_NAME, 0, config.max_zoom);
    run_tippecanoe(&args, |out| {
        write_h3_stream(&config.data_dir, options, &stats, out)
    })?;

    finish_archive(&mbtiles_path, &pmtiles_path).await?;
    Ok(pmtiles_path)
}

/// `OsStr` view of the argv for logging and tests.
#[must_use]
pub fn args_as_strs(args: &[OsString]) -> Vec<&OsStr> {
    args.iter().map(OsString::as_os_str).collect()
}

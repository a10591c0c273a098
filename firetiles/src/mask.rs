//! Mask tile build: NetCDF raster mask to a pair of PMTiles archives.
//!
//! GDAL does the raster-to-vector work (`gdal_polygonize.py`, then an
//! `ogr2ogr` SQLite dissolve of the masked cells). Tippecanoe tiles the
//! dissolved polygon twice, full detail and a simplified low-zoom variant,
//! and both archives are converted and verified like every other output.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::errors::{PipelineError, PipelineResult};
use crate::pipeline::convert_to_pmtiles;
use crate::tools::{GDAL_POLYGONIZE, OGR2OGR, PMTILES, TIPPECANOE, require_tool};
use crate::{pipeline, verify};

pub const MASK_LAYER: &str = "mask";
pub const MASK_NAME: &str = "Fire mask";

/// Raster band holding the mask values.
const MASK_BAND: &str = "1";

#[derive(Clone, Debug)]
pub struct MaskBuildConfig {
    /// Single-band NetCDF mask raster.
    pub source: PathBuf,
    pub tiles_dir: PathBuf,
    /// Max zoom of the detailed archive.
    pub max_zoom: u8,
    /// Max zoom of the simplified archive.
    pub low_max_zoom: u8,
}

/// Tippecanoe invocation reading a GeoJSON file (polygon input).
#[must_use]
pub fn tippecanoe_file_args(
    output: &Path,
    max_zoom: u8,
    simplification: Option<u8>,
    input: &Path,
) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-o"),
        output.into(),
        OsString::from("-Z0"),
        format!("-z{max_zoom}").into(),
        OsString::from("--layer"),
        MASK_LAYER.into(),
        OsString::from("--name"),
        MASK_NAME.into(),
        OsString::from("--detect-shared-borders"),
        OsString::from("--force"),
    ];
    if let Some(factor) = simplification {
        args.push(format!("--simplification={factor}").into());
    }
    args.push(input.into());
    args
}

fn polygonize_args(source: &Path, polygons: &Path) -> Vec<OsString> {
    vec![
        source.into(),
        OsString::from("-b"),
        OsString::from(MASK_BAND),
        OsString::from("-f"),
        OsString::from("GeoJSON"),
        polygons.into(),
        OsString::from(MASK_LAYER),
        OsString::from("DN"),
    ]
}

fn dissolve_args(polygons: &Path, dissolved: &Path) -> Vec<OsString> {
    vec![
        OsString::from("-f"),
        OsString::from("GeoJSON"),
        dissolved.into(),
        polygons.into(),
        OsString::from("-dialect"),
        OsString::from("sqlite"),
        OsString::from("-sql"),
        OsString::from(format!(
            "SELECT ST_Union(geometry) AS geometry FROM {MASK_LAYER} WHERE DN = 1"
        )),
    ]
}

/// Build the detailed and simplified mask archives. Returns both PMTiles
/// paths on success.
pub async fn build_mask(config: &MaskBuildConfig) -> PipelineResult<(PathBuf, PathBuf)> {
    for tool in [GDAL_POLYGONIZE, OGR2OGR, TIPPECANOE, PMTILES] {
        require_tool(tool)?;
    }
    if !config.source.is_file() {
        return Err(PipelineError::MissingSource(config.source.clone()));
    }
    std::fs::create_dir_all(&config.tiles_dir)
        .map_err(|e| PipelineError::IoError(e, config.tiles_dir.clone()))?;

    let polygons = config.tiles_dir.join("mask_polygons.geojson");
    let dissolved = config.tiles_dir.join("mask_dissolved.geojson");
    pipeline::run_checked(GDAL_POLYGONIZE, &polygonize_args(&config.source, &polygons))?;
    pipeline::run_checked(OGR2OGR, &dissolve_args(&polygons, &dissolved))?;

    let detailed = tile_mask_variant(config, &dissolved, "mask", config.max_zoom, None).await?;
    let simplified =
        tile_mask_variant(config, &dissolved, "mask_low", config.low_max_zoom, Some(10)).await?;
    Ok((detailed, simplified))
}

async fn tile_mask_variant(
    config: &MaskBuildConfig,
    dissolved: &Path,
    stem: &str,
    max_zoom: u8,
    simplification: Option<u8>,
) -> PipelineResult<PathBuf> {
    let mbtiles_path = config.tiles_dir.join(format!("{stem}.mbtiles"));
    let pmtiles_path = config.tiles_dir.join(format!("{stem}.pmtiles"));
    pipeline::run_checked(
        TIPPECANOE,
        &tippecanoe_file_args(&mbtiles_path, max_zoom, simplification, dissolved),
    )?;
    convert_to_pmtiles(&mbtiles_path, &pmtiles_path)?;
    let info = verify::verify_pmtiles(&pmtiles_path).await?;
    info!("{}: {info}", pmtiles_path.display());
    Ok(pmtiles_path)
}

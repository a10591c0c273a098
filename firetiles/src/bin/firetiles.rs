use std::io::Write as _;
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Parser, Subcommand};
use firetiles::pipeline::{self, BuildConfig};
use firetiles::{MaskBuildConfig, build_mask, mbtiles, verify};
use firetiles_core::h3agg::{H3StreamOptions, write_h3_stream};
use firetiles_core::manifest::write_manifest;
use firetiles_core::stats::load_stats_map;
use firetiles_core::stream::{DateWindow, write_raw_stream};
use firetiles_core::timeparse::{end_date_exclusive, parse_date_arg};
use firetiles_core::{CoreResult, coverage};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Defines the styles used for the CLI help output.
const HELP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Blue.on_default().bold())
    .usage(AnsiColor::Blue.on_default().bold())
    .literal(AnsiColor::White.on_default())
    .placeholder(AnsiColor::Green.on_default());

#[derive(Parser, PartialEq, Debug)]
#[command(
    version,
    name = "firetiles",
    about = "Build and inspect PMTiles archives from wildfire-event GeoJSON slices",
    after_help = "Use RUST_LOG environment variable to control logging level, e.g. RUST_LOG=debug or RUST_LOG=firetiles=debug. Logs go to stderr so the NDJSON stream commands stay pipeable.",
    styles = HELP_STYLES
)]
pub struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, PartialEq, Debug)]
enum Commands {
    /// Regenerate manifest.json for the slice directory
    #[command(name = "manifest")]
    Manifest {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Print the raw NDJSON feature stream to stdout
    #[command(name = "stream")]
    Stream {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Print the combined H3-aggregate + raw NDJSON stream to stdout
    #[command(name = "stream-h3")]
    StreamH3 {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        h3: H3Args,
    },
    /// Check that every H3 day cell is backed by at least one raw feature
    #[command(name = "validate-coverage", alias = "check-coverage")]
    ValidateCoverage {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Build the raw tileset (fires.mbtiles + fires.pmtiles)
    #[command(name = "build")]
    Build {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        tiles: TilesArgs,
        /// Minimum zoom of the raw tileset
        #[arg(long, env = "RAW_MIN_ZOOM", default_value_t = 0)]
        min_zoom: u8,
    },
    /// Build the combined tileset (fires_h3.mbtiles + fires_h3.pmtiles)
    #[command(name = "build-h3")]
    BuildH3 {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        window: WindowArgs,
        #[command(flatten)]
        tiles: TilesArgs,
        #[command(flatten)]
        h3: H3Args,
    },
    /// Build the mask tilesets (mask.pmtiles + mask_low.pmtiles) from a NetCDF raster
    #[command(name = "build-mask")]
    BuildMask {
        /// Single-band NetCDF mask raster
        source: PathBuf,
        #[command(flatten)]
        tiles: TilesArgs,
        /// Max zoom of the simplified low-zoom variant
        #[arg(long, env = "LOW_ZOOM_MAX", default_value_t = 4)]
        low_max_zoom: u8,
    },
    /// Inspect a PMTiles archive, or the MBTiles intermediate
    #[command(name = "verify", alias = "info")]
    Verify {
        /// `.pmtiles` or `.mbtiles` file to inspect
        file: PathBuf,
    },
}

#[derive(Clone, PartialEq, Debug, clap::Args)]
struct DataArgs {
    /// Directory holding the GeoJSON time slices
    #[arg(long, env = "DATA_DIR", default_value = "GeoJson")]
    data_dir: PathBuf,
}

#[derive(Clone, Default, PartialEq, Debug, clap::Args)]
struct WindowArgs {
    /// Keep only features on or after this UTC date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date_arg)]
    start_date: Option<f64>,
    /// Keep only features up to and including this UTC date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date_arg)]
    end_date: Option<f64>,
}

impl WindowArgs {
    fn into_window(self) -> DateWindow {
        DateWindow {
            start_ts: self.start_date,
            end_ts: self.end_date.map(end_date_exclusive),
        }
    }
}

#[derive(Clone, PartialEq, Debug, clap::Args)]
struct H3Args {
    /// H3 resolution of the hex aggregates (0..=15)
    #[arg(long, env = "H3_RES", default_value_t = 4)]
    h3_res: u8,
    /// Highest zoom at which the hex layer renders
    #[arg(long, env = "LOW_ZOOM_MAX", default_value_t = 4)]
    low_zoom_max: u8,
    /// Lowest zoom at which raw features render, defaults to low_zoom_max + 1
    #[arg(long, env = "HIGH_ZOOM_MIN")]
    high_zoom_min: Option<u8>,
    /// Emit only the hex aggregates, skipping the raw features
    #[arg(long)]
    omit_raw: bool,
    /// Per-fire lifetime stats GeoDataFrame export (gdf_<id>.geojson sidecar)
    #[arg(long)]
    stats_gdf: Option<PathBuf>,
}

impl H3Args {
    fn into_options(self, window: DateWindow) -> CoreResult<(H3StreamOptions, Option<PathBuf>)> {
        let options = H3StreamOptions::new(
            self.h3_res,
            self.low_zoom_max,
            self.high_zoom_min,
            !self.omit_raw,
            window,
        )?;
        Ok((options, self.stats_gdf))
    }
}

#[derive(Clone, PartialEq, Debug, clap::Args)]
struct TilesArgs {
    /// Directory receiving the tile archives
    #[arg(long, env = "TILES_DIR", default_value = "tiles")]
    tiles_dir: PathBuf,
    /// Max zoom of the tileset
    #[arg(long, env = "MAX_ZOOM", default_value_t = 10)]
    max_zoom: u8,
}

impl TilesArgs {
    fn into_config(self, data_dir: PathBuf, window: DateWindow) -> BuildConfig {
        BuildConfig {
            data_dir,
            tiles_dir: self.tiles_dir,
            max_zoom: self.max_zoom,
            window,
        }
    }
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("firetiles=info,firetiles_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = main_int().await {
        error!("{err}");
        std::process::exit(1);
    }
}

async fn main_int() -> anyhow::Result<()> {
    let args = Args::parse();
    match args.command {
        Commands::Manifest { data } => {
            let (path, count) = write_manifest(&data.data_dir)?;
            println!("Wrote {} with {count} slices", path.display());
        }
        Commands::Stream { data, window } => {
            let window = window.into_window();
            stream_to_stdout(|out| write_raw_stream(&data.data_dir, &window, out))?;
        }
        Commands::StreamH3 { data, window, h3 } => {
            let (options, stats_gdf) = h3.into_options(window.into_window())?;
            let stats = load_stats_map(stats_gdf.as_deref());
            stream_to_stdout(|out| write_h3_stream(&data.data_dir, &options, &stats, out))?;
        }
        Commands::ValidateCoverage { data } => {
            let checked = coverage::validate_coverage(&data.data_dir)?;
            println!("Coverage OK: {checked} hex/day keys all backed by raw features");
        }
        Commands::Build {
            data,
            window,
            tiles,
            min_zoom,
        } => {
            let config = tiles.into_config(data.data_dir, window.into_window());
            let output = pipeline::build_raw(&config, min_zoom).await?;
            println!("{}", output.display());
        }
        Commands::BuildH3 {
            data,
            window,
            tiles,
            h3,
        } => {
            let (options, stats_gdf) = h3.into_options(window.into_window())?;
            let config = tiles.into_config(data.data_dir, options.window);
            let output = pipeline::build_h3(&config, &options, stats_gdf.as_deref()).await?;
            println!("{}", output.display());
        }
        Commands::BuildMask {
            source,
            tiles,
            low_max_zoom,
        } => {
            let config = MaskBuildConfig {
                source,
                tiles_dir: tiles.tiles_dir,
                max_zoom: tiles.max_zoom,
                low_max_zoom,
            };
            let (detailed, simplified) = build_mask(&config).await?;
            println!("{}", detailed.display());
            println!("{}", simplified.display());
        }
        Commands::Verify { file } => {
            if file.extension().is_some_and(|ext| ext == "mbtiles") {
                let summary = mbtiles::summarize(&file).await?;
                println!("{}: {summary}", file.display());
            } else {
                let info = verify::verify_pmtiles(&file).await?;
                println!("{}: {info}", file.display());
            }
        }
    }

    Ok(())
}

/// Run a stream producer against locked stdout. A broken pipe means the
/// consumer closed its end early, which is fine for `firetiles stream | head`.
fn stream_to_stdout<F>(producer: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut dyn std::io::Write) -> CoreResult<()>,
{
    let stdout = std::io::stdout().lock();
    let mut out = std::io::BufWriter::new(stdout);
    let result = producer(&mut out).and_then(|()| {
        out.flush()
            .map_err(firetiles_core::CoreError::OutputError)
    });
    match result {
        Ok(()) => Ok(()),
        Err(err) if pipeline::is_broken_pipe(&err) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use clap::error::ErrorKind;

    use super::*;

    #[test]
    fn stream_defaults() {
        assert_eq!(
            Args::parse_from(["firetiles", "stream"]),
            Args {
                command: Commands::Stream {
                    data: DataArgs {
                        data_dir: PathBuf::from("GeoJson"),
                    },
                    window: WindowArgs::default(),
                }
            }
        );
    }

    #[test]
    fn stream_with_date_window() {
        let args = Args::parse_from([
            "firetiles",
            "stream",
            "--data-dir",
            "slices",
            "--start-date",
            "2023-08-01",
            "--end-date",
            "2023-08-14",
        ]);
        let Commands::Stream { data, window } = args.command else {
            panic!("expected stream");
        };
        assert_eq!(data.data_dir, PathBuf::from("slices"));
        let window = window.into_window();
        assert_eq!(window.start_ts, Some(1_690_848_000.0));
        // End date is inclusive on the CLI, exclusive in the window
        assert_eq!(window.end_ts, Some(1_692_057_600.0));
    }

    #[test]
    fn bad_date_is_rejected() {
        assert_eq!(
            Args::try_parse_from(["firetiles", "stream", "--start-date", "08/01/2023"])
                .unwrap_err()
                .kind(),
            ErrorKind::ValueValidation
        );
    }

    #[test]
    fn stream_h3_defaults_follow_the_deploy_pipeline() {
        let args = Args::parse_from(["firetiles", "stream-h3"]);
        let Commands::StreamH3 { h3, .. } = args.command else {
            panic!("expected stream-h3");
        };
        assert_eq!(h3.h3_res, 4);
        assert_eq!(h3.low_zoom_max, 4);
        assert_eq!(h3.high_zoom_min, None);
        assert!(!h3.omit_raw);

        let (options, _) = h3.into_options(DateWindow::default()).expect("valid");
        assert_eq!(options.high_zoom_min, 5);
        assert!(options.include_raw);
    }

    #[test]
    fn h3_resolution_out_of_range_fails_late_with_a_core_error() {
        let args = Args::parse_from(["firetiles", "stream-h3", "--h3-res", "16"]);
        let Commands::StreamH3 { h3, .. } = args.command else {
            panic!("expected stream-h3");
        };
        assert!(h3.into_options(DateWindow::default()).is_err());
    }

    #[test]
    fn build_mask_takes_a_source_and_two_zoom_ceilings() {
        assert_eq!(
            Args::parse_from([
                "firetiles",
                "build-mask",
                "mask.nc",
                "--max-zoom",
                "12",
                "--low-max-zoom",
                "3",
            ]),
            Args {
                command: Commands::BuildMask {
                    source: PathBuf::from("mask.nc"),
                    tiles: TilesArgs {
                        tiles_dir: PathBuf::from("tiles"),
                        max_zoom: 12,
                    },
                    low_max_zoom: 3,
                }
            }
        );
    }

    #[test]
    fn verify_requires_a_file() {
        assert_eq!(
            Args::try_parse_from(["firetiles", "verify"])
                .unwrap_err()
                .kind(),
            ErrorKind::MissingRequiredArgument
        );
    }
}

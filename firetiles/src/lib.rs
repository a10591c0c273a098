#![doc = include_str!("../README.md")]

mod errors;
pub use errors::{PipelineError, PipelineResult};

pub mod mask;
pub mod mbtiles;
pub mod pipeline;
pub mod tools;
pub mod verify;

pub use mask::{MaskBuildConfig, build_mask};
pub use mbtiles::TilesetSummary;
pub use pipeline::{BuildConfig, build_h3, build_raw};
pub use verify::PmtilesInfo;

//! Domain logic for the firetiles pipeline: reading wildfire-event GeoJSON
//! time slices, streaming tippecanoe-ready NDJSON, aggregating features into
//! H3 cells for low zooms, generating the viewer manifest, and validating
//! that the hex layer never outruns the raw layer.

pub mod coverage;
pub mod errors;
pub mod feature;
pub mod h3agg;
pub mod manifest;
pub mod slice;
pub mod stats;
pub mod stream;
pub mod timeparse;

#[cfg(test)]
pub(crate) mod testutil;

pub use errors::{CoreError, CoreResult};
pub use h3agg::H3StreamOptions;
pub use stream::DateWindow;

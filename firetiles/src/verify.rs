//! PMTiles output verification.
//!
//! Two layers of checking: the cheap 7-byte magic sniff the deploy scripts
//! have always relied on, and a full header read through the pmtiles crate
//! that also reports the zoom range and tile count.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::Read as _;
use std::path::Path;

use pmtiles::{AsyncPmTilesReader, MmapBackend};

use crate::errors::{PipelineError, PipelineResult};

/// Leading bytes of every PMTiles v3 archive.
pub const PMTILES_MAGIC: &[u8; 7] = b"PMTiles";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PmtilesInfo {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_count: u64,
}

impl Display for PmtilesInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} addressed tiles, zoom {}..={}",
            self.tile_count, self.min_zoom, self.max_zoom
        )
    }
}

/// Check that a file starts with the PMTiles magic bytes.
pub fn check_magic(path: &Path) -> PipelineResult<()> {
    let mut file = File::open(path).map_err(|e| PipelineError::IoError(e, path.to_path_buf()))?;
    let mut magic = [0u8; PMTILES_MAGIC.len()];
    if file.read_exact(&mut magic).is_err() || &magic != PMTILES_MAGIC {
        return Err(PipelineError::BadMagic(path.to_path_buf()));
    }
    Ok(())
}

/// Verify an archive end to end: magic bytes, then a parseable header.
pub async fn verify_pmtiles(path: &Path) -> PipelineResult<PmtilesInfo> {
    check_magic(path)?;
    let backend = MmapBackend::try_from(path).await?;
    let reader = AsyncPmTilesReader::try_from_source(backend).await?;
    let header = reader.get_header();
    Ok(PmtilesInfo {
        min_zoom: header.min_zoom,
        max_zoom: header.max_zoom,
        tile_count: header.n_addressed_tiles().map_or(0, std::num::NonZeroU64::get),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_the_magic_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ok.pmtiles");
        std::fs::write(&path, b"PMTiles\x03rest-of-header").expect("write");
        check_magic(&path).expect("magic matches");
    }

    #[test]
    fn rejects_wrong_or_short_files() {
        let dir = tempfile::tempdir().expect("tempdir");

        let wrong = dir.path().join("wrong.pmtiles");
        std::fs::write(&wrong, b"SQLite format 3\0").expect("write");
        assert!(matches!(
            check_magic(&wrong).unwrap_err(),
            PipelineError::BadMagic(_)
        ));

        let short = dir.path().join("short.pmtiles");
        std::fs::write(&short, b"PM").expect("write");
        assert!(matches!(
            check_magic(&short).unwrap_err(),
            PipelineError::BadMagic(_)
        ));

        assert!(matches!(
            check_magic(&dir.path().join("absent.pmtiles")).unwrap_err(),
            PipelineError::IoError(..)
        ));
    }

    #[tokio::test]
    async fn truncated_archive_fails_header_parse() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("truncated.pmtiles");
        std::fs::write(&path, b"PMTiles\x03only-a-stub").expect("write");
        assert!(verify_pmtiles(&path).await.is_err());
    }
}

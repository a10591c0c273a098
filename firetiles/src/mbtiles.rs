//! Read-only inspection of tippecanoe's MBTiles output.
//!
//! The intermediate archive is opaque to the pipeline except for this check:
//! after the tiling stage we confirm tiles actually landed and log what the
//! archive holds before converting it to PMTiles.

use std::fmt::{Display, Formatter};
use std::path::Path;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection as _, Row as _, SqliteConnection};
use tracing::debug;

use crate::errors::{PipelineError, PipelineResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilesetSummary {
    pub tile_count: u64,
    pub min_zoom: Option<u8>,
    pub max_zoom: Option<u8>,
    pub metadata: Vec<(String, String)>,
}

impl Display for TilesetSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} tiles", self.tile_count)?;
        if let (Some(min), Some(max)) = (self.min_zoom, self.max_zoom) {
            write!(f, ", zoom {min}..={max}")?;
        }
        if let Some((_, name)) = self.metadata.iter().find(|(key, _)| key == "name") {
            write!(f, ", name `{name}`")?;
        }
        Ok(())
    }
}

async fn open_readonly(path: &Path) -> PipelineResult<SqliteConnection> {
    debug!("Opening {} readonly", path.display());
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    Ok(SqliteConnection::connect_with(&options).await?)
}

/// Summarize an MBTiles archive. An empty tiles table is an error: it means
/// tippecanoe produced nothing worth shipping.
pub async fn summarize(path: &Path) -> PipelineResult<TilesetSummary> {
    let mut conn = open_readonly(path).await?;

    let row = sqlx::query(
        "SELECT COUNT(*) AS tile_count, MIN(zoom_level) AS min_zoom, MAX(zoom_level) AS max_zoom FROM tiles",
    )
    .fetch_one(&mut conn)
    .await?;
    let tile_count: i64 = row.try_get("tile_count")?;
    let min_zoom: Option<i64> = row.try_get("min_zoom")?;
    let max_zoom: Option<i64> = row.try_get("max_zoom")?;

    let metadata = sqlx::query("SELECT name, value FROM metadata ORDER BY name")
        .fetch_all(&mut conn)
        .await?
        .into_iter()
        .map(|row| {
            let name: String = row.try_get("name")?;
            let value: String = row.try_get("value")?;
            Ok((name, value))
        })
        .collect::<Result<Vec<_>, sqlx::Error>>()?;

    conn.close().await?;

    if tile_count == 0 {
        return Err(PipelineError::NoTiles(path.to_path_buf()));
    }

    Ok(TilesetSummary {
        tile_count: tile_count as u64,
        min_zoom: min_zoom.map(|z| z as u8),
        max_zoom: max_zoom.map(|z| z as u8),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sqlx::Executor as _;

    use super::*;

    async fn create_fixture(path: &Path, tiles: &[(i64, i64, i64)]) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .expect("creates db");
        conn.execute(
            "CREATE TABLE metadata (name TEXT, value TEXT);
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);",
        )
        .await
        .expect("schema");
        sqlx::query("INSERT INTO metadata (name, value) VALUES ('name', 'Fire events'), ('format', 'pbf')")
            .execute(&mut conn)
            .await
            .expect("metadata");
        for (z, x, y) in tiles {
            sqlx::query(
                "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?, ?, ?, x'00')",
            )
            .bind(z)
            .bind(x)
            .bind(y)
            .execute(&mut conn)
            .await
            .expect("tile");
        }
        conn.close().await.expect("close");
    }

    #[tokio::test]
    async fn summarizes_tiles_and_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fires.mbtiles");
        create_fixture(&path, &[(0, 0, 0), (3, 1, 2), (5, 9, 9)]).await;

        let summary = summarize(&path).await.expect("summarizes");
        assert_eq!(summary.tile_count, 3);
        assert_eq!(summary.min_zoom, Some(0));
        assert_eq!(summary.max_zoom, Some(5));
        assert!(
            summary
                .metadata
                .contains(&("name".to_string(), "Fire events".to_string()))
        );
        assert_eq!(summary.to_string(), "3 tiles, zoom 0..=5, name `Fire events`");
    }

    #[tokio::test]
    async fn empty_archive_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.mbtiles");
        create_fixture(&path, &[]).await;
        let err = summarize(&path).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoTiles(_)));
    }
}

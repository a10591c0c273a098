//! Consistency check between the H3 layer and the raw feature layer.
//!
//! The hex layer derives its day from the `time_floor`-first timestamp
//! precedence while raw features use `time`/`timestamp`. A feature carrying
//! only `time_floor` would aggregate into a hex cell that has no raw feature
//! on the same day, so zooming in on that day would show an empty map under a
//! populated hexagon. This check walks the data once and reports every
//! `(resolution, day, cell)` the hex layer would emit that the raw layer
//! cannot back.

use std::collections::HashSet;
use std::path::Path;

use h3o::{LatLng, Resolution};
use itertools::Itertools as _;
use tracing::info;

use crate::errors::{CoreError, CoreResult};
use crate::feature::{
    AGG_TIME_KEYS, RAW_TIME_KEYS, fire_id, representative_lonlat, timestamp_raw,
};
use crate::slice::SliceReader;
use crate::timeparse::{day_bucket, parse_timestamp};

/// Resolutions validated, covering every configuration the hex layer ships.
pub const RESOLUTIONS: [Resolution; 4] = [
    Resolution::One,
    Resolution::Two,
    Resolution::Three,
    Resolution::Four,
];

const MAX_REPORTED_EXAMPLES: usize = 5;

type CoverageKey = (Resolution, String, h3o::CellIndex);

fn keys_for(
    lonlat: Option<(f64, f64)>,
    ts: Option<f64>,
    out: &mut HashSet<CoverageKey>,
) {
    let (Some((lon, lat)), Some(ts)) = (lonlat, ts) else {
        return;
    };
    let (Some(day), Ok(latlng)) = (day_bucket(ts), LatLng::new(lat, lon)) else {
        return;
    };
    for res in RESOLUTIONS {
        out.insert((res, day.label.clone(), latlng.to_cell(res)));
    }
}

/// Validate that every hex aggregate has raw feature coverage for the same
/// cell and day. Returns the number of aggregate keys checked.
pub fn validate_coverage(dir: &Path) -> CoreResult<usize> {
    let mut agg_keys: HashSet<CoverageKey> = HashSet::new();
    let mut raw_keys: HashSet<CoverageKey> = HashSet::new();

    let reader = SliceReader::new(dir)?;
    for feature in reader.features() {
        if fire_id(&feature).is_none() {
            continue;
        }
        let lonlat = representative_lonlat(&feature);
        let agg_ts = timestamp_raw(&feature, AGG_TIME_KEYS).and_then(parse_timestamp);
        let raw_ts = timestamp_raw(&feature, RAW_TIME_KEYS).and_then(parse_timestamp);
        keys_for(lonlat, agg_ts, &mut agg_keys);
        keys_for(lonlat, raw_ts, &mut raw_keys);
    }

    let missing: Vec<&CoverageKey> = agg_keys.difference(&raw_keys).sorted().collect();
    if !missing.is_empty() {
        let examples = missing
            .iter()
            .take(MAX_REPORTED_EXAMPLES)
            .map(|(res, day, cell)| format!("res={res} day={day} cell={cell}"))
            .collect();
        return Err(CoreError::CoverageGap {
            count: missing.len(),
            examples,
        });
    }

    info!(
        "Validation passed: every H3 aggregate has raw feature coverage ({} keys)",
        agg_keys.len()
    );
    Ok(agg_keys.len())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::testutil::write_json;

    #[test]
    fn consistent_data_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_json(
            &dir.path().join("slice.geojson"),
            &json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {"id_fire_event": "1", "time": "2023-08-14T01:00:00Z"},
                    "geometry": {"type": "Point", "coordinates": [-120.0, 39.0]}
                }]
            }),
        );
        let checked = validate_coverage(dir.path()).expect("passes");
        assert_eq!(checked, RESOLUTIONS.len());
    }

    #[test]
    fn time_floor_only_feature_is_a_gap() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_json(
            &dir.path().join("slice.geojson"),
            &json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {"id_fire_event": "1", "time_floor": "2023-08-14T01:00:00Z"},
                    "geometry": {"type": "Point", "coordinates": [-120.0, 39.0]}
                }]
            }),
        );
        let err = validate_coverage(dir.path()).unwrap_err();
        let CoreError::CoverageGap { count, examples } = err else {
            panic!("expected coverage gap");
        };
        assert_eq!(count, RESOLUTIONS.len());
        assert!(!examples.is_empty());
        assert!(examples[0].contains("2023-08-14"));
    }

    #[test]
    fn features_without_id_are_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_json(
            &dir.path().join("slice.geojson"),
            &json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature",
                    "properties": {"time_floor": "2023-08-14T01:00:00Z"},
                    "geometry": {"type": "Point", "coordinates": [-120.0, 39.0]}
                }]
            }),
        );
        let checked = validate_coverage(dir.path()).expect("nothing to check");
        assert_eq!(checked, 0);
    }
}

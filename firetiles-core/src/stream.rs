//! Newline-delimited GeoJSON feature stream for tippecanoe.
//!
//! One compact-JSON feature per line on stdout is the contract the tiling
//! stage consumes; everything human-readable goes to the log on stderr.

use std::io::Write;
use std::path::Path;

use geojson::Feature;
use serde_json::json;

use crate::errors::{CoreError, CoreResult};
use crate::feature::{FIRE_ID_KEY, RAW_TIME_KEYS, fire_id, timestamp_raw};
use crate::slice::SliceReader;
use crate::timeparse::{day_bucket, in_range, parse_timestamp};

/// Properties kept on raw streamed features; everything else is dropped to
/// keep tile attributes small.
pub const ALLOWED_KEYS: &[&str] = &[
    FIRE_ID_KEY,
    "frp",
    "fros",
    "duration",
    "time",
    "timestamp",
];

/// Optional UTC date window, `[start, end)` in epoch seconds.
#[derive(Clone, Copy, Debug, Default)]
pub struct DateWindow {
    pub start_ts: Option<f64>,
    pub end_ts: Option<f64>,
}

/// Serialize one feature as a compact NDJSON line.
pub fn write_ndjson_line<W: Write + ?Sized>(out: &mut W, feature: &Feature) -> CoreResult<()> {
    serde_json::to_writer(&mut *out, feature)?;
    out.write_all(b"\n").map_err(CoreError::OutputError)
}

/// Reduce a feature to its streamed form, or `None` when it is filtered out.
///
/// Features without a fire id are skipped; features whose timestamp parses
/// and falls outside the window are skipped; features with no parseable
/// timestamp always pass, without the derived time properties.
#[must_use]
pub fn minimal_feature(feature: &Feature, window: &DateWindow) -> Option<Feature> {
    let id = fire_id(feature)?;
    let mut props = geojson::JsonObject::new();
    if let Some(source) = feature.properties.as_ref() {
        for key in ALLOWED_KEYS {
            if let Some(value) = source.get(*key) {
                props.insert((*key).to_string(), value.clone());
            }
        }
    }
    props.insert(FIRE_ID_KEY.to_string(), json!(id));

    let ts = timestamp_raw(feature, RAW_TIME_KEYS).and_then(parse_timestamp);
    if let Some(ts) = ts {
        if !in_range(ts, window.start_ts, window.end_ts) {
            return None;
        }
        props.insert("time_ts".to_string(), json!(ts));
        if let Some(day) = day_bucket(ts) {
            props.insert("day_start_ts".to_string(), json!(day.start_ts));
            props.insert("day_end_ts".to_string(), json!(day.end_ts));
        }
    }

    Some(Feature {
        bbox: None,
        geometry: feature.geometry.clone(),
        id: None,
        properties: Some(props),
        foreign_members: None,
    })
}

/// Stream all raw features from a data directory as NDJSON.
pub fn write_raw_stream<W: Write + ?Sized>(
    dir: &Path,
    window: &DateWindow,
    out: &mut W,
) -> CoreResult<()> {
    let reader = SliceReader::new(dir)?;
    for feature in reader.features() {
        if let Some(minimal) = minimal_feature(&feature, window) {
            write_ndjson_line(out, &minimal)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::testutil::{feature_with, write_json};

    #[test]
    fn strips_unlisted_properties_and_coerces_id() {
        let feature = feature_with(
            json!({
                "id_fire_event": 7,
                "frp": 3.5,
                "confidence": "high",
                "time": "2023-08-14T12:30:00Z"
            }),
            None,
        );
        let minimal = minimal_feature(&feature, &DateWindow::default()).expect("kept");
        let props = minimal.properties.expect("props");
        assert_eq!(props["id_fire_event"], json!("7"));
        assert_eq!(props["frp"], json!(3.5));
        assert!(!props.contains_key("confidence"));
        assert_eq!(props["time_ts"], json!(1_692_016_200.0));
        assert_eq!(props["day_start_ts"], json!(1_691_971_200.0));
        assert_eq!(props["day_end_ts"], json!(1_692_057_600.0));
    }

    #[test]
    fn skips_features_without_fire_id() {
        let feature = feature_with(json!({"frp": 1.0}), None);
        assert!(minimal_feature(&feature, &DateWindow::default()).is_none());
    }

    #[test]
    fn date_window_filters_parsed_timestamps_only() {
        let window = DateWindow {
            start_ts: Some(1_691_971_200.0),           // 2023-08-14
            end_ts: Some(1_691_971_200.0 + 86_400.0),  // exclusive next day
        };
        let inside = feature_with(
            json!({"id_fire_event": "a", "time": "2023-08-14T12:00:00Z"}),
            None,
        );
        let before = feature_with(
            json!({"id_fire_event": "b", "time": "2023-08-13T23:59:59Z"}),
            None,
        );
        let at_boundary = feature_with(
            json!({"id_fire_event": "c", "time": "2023-08-15T00:00:00Z"}),
            None,
        );
        let unparseable = feature_with(json!({"id_fire_event": "d", "time": "???"}), None);

        assert!(minimal_feature(&inside, &window).is_some());
        assert!(minimal_feature(&before, &window).is_none());
        assert!(minimal_feature(&at_boundary, &window).is_none());
        let kept = minimal_feature(&unparseable, &window).expect("no-timestamp passes");
        assert!(!kept.properties.expect("props").contains_key("time_ts"));
    }

    #[test]
    fn raw_stream_is_one_feature_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_json(
            &dir.path().join("slice.geojson"),
            &json!({
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "properties": {"id_fire_event": "1", "time": "2023-08-14T12:00:00Z"},
                        "geometry": {"type": "Point", "coordinates": [-120.0, 39.0]}
                    },
                    {
                        "type": "Feature",
                        "properties": {"no_id": true},
                        "geometry": {"type": "Point", "coordinates": [-121.0, 38.0]}
                    }
                ]
            }),
        );
        let mut out = Vec::new();
        write_raw_stream(dir.path(), &DateWindow::default(), &mut out).expect("streams");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(parsed["type"], json!("Feature"));
        assert_eq!(parsed["properties"]["id_fire_event"], json!("1"));
    }
}

//! Optional per-fire statistics sidecar.
//!
//! A stats GeoJSON carries one feature per fire event with `time_start` and
//! `time_end` properties; the combined stream uses it to backfill the
//! lifetime range onto raw features that lack one.

use std::collections::HashMap;
use std::path::Path;

use geojson::{Feature, GeoJson};
use serde_json::Value;
use tracing::warn;

use crate::feature::property;
use crate::timeparse::parse_timestamp;

/// Lifetime range of one fire event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FireStats {
    pub time_start: Option<String>,
    pub time_end: Option<String>,
    pub time_start_ts: Option<f64>,
    pub time_end_ts: Option<f64>,
}

pub type FireStatsMap = HashMap<String, FireStats>;

fn stats_fire_id(feature: &Feature) -> Option<String> {
    for key in ["fire_event_id", "id_fire_event"] {
        match property(feature, key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn timed(feature: &Feature, key: &str) -> (Option<String>, Option<f64>) {
    let Some(raw) = property(feature, key).and_then(Value::as_str) else {
        return (None, None);
    };
    (Some(raw.to_string()), parse_timestamp(raw))
}

/// Load the stats map; a missing or malformed file yields an empty map with
/// a warning, never an error.
#[must_use]
pub fn load_stats_map(path: Option<&Path>) -> FireStatsMap {
    let Some(path) = path else {
        return FireStatsMap::new();
    };
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("Failed to read stats file {}: {err}", path.display());
            return FireStatsMap::new();
        }
    };
    let collection = match text.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => collection,
        Ok(_) => {
            warn!(
                "Stats file {} is not a FeatureCollection, ignoring",
                path.display()
            );
            return FireStatsMap::new();
        }
        Err(err) => {
            warn!("Failed to parse stats file {}: {err}", path.display());
            return FireStatsMap::new();
        }
    };

    let mut map = FireStatsMap::new();
    for feature in &collection.features {
        let Some(fire_id) = stats_fire_id(feature) else {
            continue;
        };
        let (time_start, time_start_ts) = timed(feature, "time_start");
        let (time_end, time_end_ts) = timed(feature, "time_end");
        map.insert(
            fire_id,
            FireStats {
                time_start,
                time_end,
                time_start_ts,
                time_end_ts,
            },
        );
    }
    map
}

//! Property and geometry access helpers for fire-event features.

use geojson::{Feature, Value as GeomValue};
use serde_json::Value;

/// Property key carrying the fire event identifier.
pub const FIRE_ID_KEY: &str = "id_fire_event";

/// Timestamp lookup order used by the aggregation pipeline.
pub const AGG_TIME_KEYS: &[&str] = &["time_floor", "time", "timestamp"];
/// Timestamp lookup order used by the raw feature stream.
pub const RAW_TIME_KEYS: &[&str] = &["time", "timestamp"];

/// FROS values at or below this are sentinels for missing data.
const FROS_MISSING_SENTINEL: f64 = -900.0;

#[must_use]
pub fn property<'a>(feature: &'a Feature, key: &str) -> Option<&'a Value> {
    feature.properties.as_ref()?.get(key)
}

/// The fire event id as a string, if present.
#[must_use]
pub fn fire_id(feature: &Feature) -> Option<String> {
    match property(feature, FIRE_ID_KEY)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Fire radiative power in MW; missing or malformed values count as zero.
#[must_use]
pub fn frp(feature: &Feature) -> f64 {
    property(feature, "frp").and_then(numeric).unwrap_or(0.0)
}

/// Fire rate of spread, with the `-999`-style missing sentinel mapped to `None`.
#[must_use]
pub fn fros(feature: &Feature) -> Option<f64> {
    let value = property(feature, "fros").and_then(numeric)?;
    if value <= FROS_MISSING_SENTINEL {
        None
    } else {
        Some(value)
    }
}

/// First string timestamp found following the given key precedence.
#[must_use]
pub fn timestamp_raw<'a>(feature: &'a Feature, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| property(feature, key).and_then(Value::as_str))
}

/// A representative (lon, lat) for any geometry.
///
/// Points are used directly; everything else is approximated by the centroid
/// of all coordinate positions, which is what the low-zoom aggregation keys
/// cells on.
#[must_use]
pub fn representative_lonlat(feature: &Feature) -> Option<(f64, f64)> {
    let geometry = feature.geometry.as_ref()?;
    if let GeomValue::Point(pos) = &geometry.value {
        if pos.len() >= 2 && pos[0].is_finite() && pos[1].is_finite() {
            return Some((pos[0], pos[1]));
        }
        return None;
    }
    let mut positions = Vec::new();
    collect_positions(&geometry.value, &mut positions);
    if positions.is_empty() {
        return None;
    }
    let n = positions.len() as f64;
    let (lon_sum, lat_sum) = positions
        .iter()
        .fold((0.0, 0.0), |(lon, lat), p| (lon + p.0, lat + p.1));
    Some((lon_sum / n, lat_sum / n))
}

fn collect_positions(value: &GeomValue, out: &mut Vec<(f64, f64)>) {
    let mut push = |pos: &[f64]| {
        if pos.len() >= 2 {
            out.push((pos[0], pos[1]));
        }
    };
    match value {
        GeomValue::Point(pos) => push(pos),
        GeomValue::MultiPoint(line) | GeomValue::LineString(line) => {
            for pos in line {
                push(pos);
            }
        }
        GeomValue::MultiLineString(lines) | GeomValue::Polygon(lines) => {
            for line in lines {
                for pos in line {
                    push(pos);
                }
            }
        }
        GeomValue::MultiPolygon(polygons) => {
            for polygon in polygons {
                for ring in polygon {
                    for pos in ring {
                        push(pos);
                    }
                }
            }
        }
        GeomValue::GeometryCollection(geometries) => {
            for geometry in geometries {
                collect_positions(&geometry.value, out);
            }
        }
    }
}

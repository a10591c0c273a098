//! H3 cell aggregation for the low-zoom layer.
//!
//! The combined stream interleaves raw features (tagged with a tippecanoe
//! minzoom so they only render at high zooms) and, once the pass is done,
//! per-cell per-day aggregates rendered as hexagon polygons for the low
//! zooms. Aggregates are keyed by `(cell, UTC day)` so FRP sums stay within
//! one day slice, and each fire event contributes to a key's sums only once.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use geojson::{Feature, Geometry, JsonObject, Value as GeomValue};
use h3o::{CellIndex, LatLng, Resolution};
use serde_json::json;

use crate::errors::{CoreError, CoreResult};
use crate::feature::{AGG_TIME_KEYS, fire_id, fros, frp, representative_lonlat, timestamp_raw};
use crate::slice::SliceReader;
use crate::stats::{FireStats, FireStatsMap};
use crate::stream::{DateWindow, write_ndjson_line};
use crate::timeparse::{DayBucket, day_bucket, in_range, parse_timestamp};

/// FRP is MW; FRE in MJ over one 10-minute observation interval.
const FRE_INTERVAL_SECONDS: f64 = 600.0;

/// Settings for the combined H3 + raw stream.
#[derive(Clone, Copy, Debug)]
pub struct H3StreamOptions {
    pub resolution: Resolution,
    /// Highest zoom at which the hex layer renders.
    pub low_zoom_max: u8,
    /// Lowest zoom at which raw features render.
    pub high_zoom_min: u8,
    pub include_raw: bool,
    pub window: DateWindow,
}

impl H3StreamOptions {
    /// Build options from CLI-level integers, defaulting `high_zoom_min` to
    /// one zoom past the hex layer.
    pub fn new(
        resolution: u8,
        low_zoom_max: u8,
        high_zoom_min: Option<u8>,
        include_raw: bool,
        window: DateWindow,
    ) -> CoreResult<Self> {
        let resolution =
            Resolution::try_from(resolution).map_err(|_| CoreError::InvalidResolution(resolution))?;
        Ok(Self {
            resolution,
            low_zoom_max,
            high_zoom_min: high_zoom_min.unwrap_or(low_zoom_max.saturating_add(1)),
            include_raw,
            window,
        })
    }
}

#[derive(Debug, Default)]
struct Aggregate {
    fire_ids: HashSet<String>,
    count: u64,
    frp_sum: f64,
    fre_sum: f64,
    frp_max: f64,
    fros_sum: f64,
    fros_max: f64,
    fros_count: u64,
    sample_time: Option<String>,
    day: Option<DayBucket>,
}

impl Aggregate {
    fn observe(
        &mut self,
        fire_id: &str,
        frp: f64,
        fros: Option<f64>,
        raw_time: Option<&str>,
        day: &DayBucket,
    ) {
        if self.day.is_none() {
            self.day = Some(day.clone());
        }
        // Sums count each fire event once per cell/day; max and sample time
        // track every observation.
        if !self.fire_ids.contains(fire_id) {
            self.fire_ids.insert(fire_id.to_string());
            self.count += 1;
            self.frp_sum += frp;
            self.fre_sum += frp * FRE_INTERVAL_SECONDS;
            if let Some(fros) = fros {
                self.fros_sum += fros;
                self.fros_max = self.fros_max.max(fros);
                self.fros_count += 1;
            }
        }
        self.frp_max = self.frp_max.max(frp);
        if let Some(raw) = raw_time {
            self.sample_time = Some(raw.to_string());
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Closed lon/lat ring around an H3 cell.
fn cell_ring(cell: CellIndex) -> Vec<Vec<f64>> {
    let mut ring: Vec<Vec<f64>> = cell
        .boundary()
        .iter()
        .map(|vertex| vec![vertex.lng(), vertex.lat()])
        .collect();
    if let Some(first) = ring.first().cloned()
        && ring.last() != Some(&first)
    {
        ring.push(first);
    }
    ring
}

fn cell_feature(cell: CellIndex, agg: &Aggregate, low_zoom_max: u8) -> Feature {
    let frp_avg = if agg.count > 0 {
        agg.frp_sum / agg.count as f64
    } else {
        0.0
    };
    let fre_mean = if agg.count > 0 {
        agg.fre_sum / agg.count as f64
    } else {
        0.0
    };
    let fros_avg = if agg.fros_count > 0 {
        Some(agg.fros_sum / agg.fros_count as f64)
    } else {
        None
    };
    let day = agg.day.as_ref();

    let mut props = JsonObject::new();
    props.insert("cell".to_string(), json!(cell.to_string()));
    props.insert("res".to_string(), json!(u8::from(cell.resolution())));
    props.insert("count".to_string(), json!(agg.count));
    props.insert("frp_sum".to_string(), json!(round3(agg.frp_sum)));
    props.insert("frp_max".to_string(), json!(round3(agg.frp_max)));
    props.insert("frp_avg".to_string(), json!(round3(frp_avg)));
    props.insert("fre_sum_mj".to_string(), json!(round3(agg.fre_sum)));
    props.insert("fre_mean_mj".to_string(), json!(round3(fre_mean)));
    props.insert("last_time".to_string(), json!(agg.sample_time));
    // One day slice per aggregate, so the time range is the day itself
    props.insert("time_min".to_string(), json!(day.map(|d| d.label.clone())));
    props.insert("time_max".to_string(), json!(day.map(|d| d.label.clone())));
    props.insert("time_min_ts".to_string(), json!(day.map(|d| d.start_ts)));
    props.insert("time_max_ts".to_string(), json!(day.map(|d| d.end_ts)));
    props.insert("day_start_ts".to_string(), json!(day.map(|d| d.start_ts)));
    props.insert("day_end_ts".to_string(), json!(day.map(|d| d.end_ts)));
    props.insert("day_label".to_string(), json!(day.map(|d| d.label.clone())));
    props.insert("fros_sum".to_string(), json!(round3(agg.fros_sum)));
    props.insert("fros_max".to_string(), json!(round3(agg.fros_max)));
    props.insert("fros_avg".to_string(), json!(fros_avg.map(round3)));
    props.insert(
        "tippecanoe".to_string(),
        json!({"minzoom": 0, "maxzoom": low_zoom_max}),
    );

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeomValue::Polygon(vec![cell_ring(cell)]))),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

/// Raw feature for the combined stream: full properties, normalized time,
/// optional lifetime backfill from the stats map, and a minzoom hint.
#[must_use]
pub fn tag_raw_feature(feature: &Feature, minzoom: u8, stats: Option<&FireStats>) -> Feature {
    let mut props = feature.properties.clone().unwrap_or_default();
    if let Some(ts) = timestamp_raw(feature, AGG_TIME_KEYS).and_then(parse_timestamp) {
        props.insert("time_ts".to_string(), json!(ts));
        if let Some(floor) = props.get("time_floor").cloned() {
            props.insert("time".to_string(), floor);
        }
    }
    if let Some(stats) = stats
        && !props.contains_key("time_min_ts")
    {
        if let Some(ts) = stats.time_start_ts {
            props.insert("time_min_ts".to_string(), json!(ts));
        }
        if let Some(ts) = stats.time_end_ts {
            props.insert("time_max_ts".to_string(), json!(ts));
        }
        if let Some(iso) = &stats.time_start {
            props.insert("time_min".to_string(), json!(iso));
        }
        if let Some(iso) = &stats.time_end {
            props.insert("time_max".to_string(), json!(iso));
        }
    }
    props.insert("tippecanoe".to_string(), json!({"minzoom": minzoom}));

    Feature {
        bbox: None,
        geometry: feature.geometry.clone(),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

/// Stream the combined H3-aggregated and raw feature set as NDJSON.
pub fn write_h3_stream<W: Write + ?Sized>(
    dir: &Path,
    options: &H3StreamOptions,
    stats: &FireStatsMap,
    out: &mut W,
) -> CoreResult<()> {
    let mut summary: HashMap<(CellIndex, i64), Aggregate> = HashMap::new();
    let reader = SliceReader::new(dir)?;

    for feature in reader.features() {
        let Some(id) = fire_id(&feature) else {
            continue;
        };
        let frp = frp(&feature);
        let raw_time = timestamp_raw(&feature, AGG_TIME_KEYS).map(str::to_owned);
        let ts = raw_time.as_deref().and_then(parse_timestamp);
        if let Some(ts) = ts
            && !in_range(ts, options.window.start_ts, options.window.end_ts)
        {
            continue;
        }
        let fros = fros(&feature);

        if let (Some((lon, lat)), Some(ts)) = (representative_lonlat(&feature), ts)
            && let Some(day) = day_bucket(ts)
            && let Ok(latlng) = LatLng::new(lat, lon)
        {
            let cell = latlng.to_cell(options.resolution);
            summary
                .entry((cell, day.start_ts as i64))
                .or_default()
                .observe(&id, frp, fros, raw_time.as_deref(), &day);
        }

        if options.include_raw {
            let tagged = tag_raw_feature(&feature, options.high_zoom_min, stats.get(&id));
            write_ndjson_line(out, &tagged)?;
        }
    }

    // Deterministic flush order: by day, then cell id
    let mut keys: Vec<_> = summary.keys().copied().collect();
    keys.sort_by_key(|(cell, day)| (*day, u64::from(*cell)));
    for key in keys {
        let agg = &summary[&key];
        write_ndjson_line(out, &cell_feature(key.0, agg, options.low_zoom_max))?;
    }
    Ok(())
}

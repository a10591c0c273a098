//! Reading GeoJSON time-slice files from a data directory.
//!
//! A slice is one `*.geojson` `FeatureCollection`, optionally carrying a
//! legacy `crs` member. Slices named `gdf_<id>.geojson` hold per-fire
//! geometries without an `id_fire_event` property; the id and the file-wide
//! time range are backfilled onto each feature so downstream streams can key
//! on them.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use geojson::{Feature, FeatureCollection, GeoJson, Value as GeomValue};
use regex::Regex;
use serde_json::{Value, json};
use tracing::warn;

use crate::errors::{CoreError, CoreResult};
use crate::feature::{AGG_TIME_KEYS, FIRE_ID_KEY, timestamp_raw};
use crate::timeparse::{parse_timestamp, to_iso};

/// WGS84 spheroid radius in meters, shared with the web-mercator math.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

static EPSG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"EPSG::?(\d+)").expect("valid regex"));
static GDF_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^gdf_(\d+)\.geojson$").expect("valid regex"));

/// Coordinate reference systems a slice may be stored in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceProjection {
    /// Plain WGS84 lon/lat, no transform needed.
    Wgs84,
    /// EPSG:3857 meters, reprojected to WGS84 on load.
    WebMercator,
}

/// Detect the projection from a legacy `crs` name such as
/// `urn:ogc:def:crs:EPSG::3857`. `None` means the code was missing or is not
/// one we can reproject.
#[must_use]
pub fn detect_projection(crs_name: &str) -> Option<SliceProjection> {
    let code: u32 = EPSG_RE.captures(crs_name)?.get(1)?.as_str().parse().ok()?;
    match code {
        4326 => Some(SliceProjection::Wgs84),
        3857 | 900_913 => Some(SliceProjection::WebMercator),
        _ => None,
    }
}

/// Inverse spherical web-mercator projection.
#[must_use]
pub fn webmercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / EARTH_RADIUS).to_degrees();
    let lat = f64::atan(f64::sinh(y / EARTH_RADIUS)).to_degrees();
    (lng, lat)
}

fn map_positions(value: &mut GeomValue, transform: &impl Fn(&mut Vec<f64>)) {
    match value {
        GeomValue::Point(pos) => transform(pos),
        GeomValue::MultiPoint(line) | GeomValue::LineString(line) => {
            for pos in line {
                transform(pos);
            }
        }
        GeomValue::MultiLineString(lines) | GeomValue::Polygon(lines) => {
            for line in lines {
                for pos in line {
                    transform(pos);
                }
            }
        }
        GeomValue::MultiPolygon(polygons) => {
            for polygon in polygons {
                for ring in polygon {
                    for pos in ring {
                        transform(pos);
                    }
                }
            }
        }
        GeomValue::GeometryCollection(geometries) => {
            for geometry in geometries {
                map_positions(&mut geometry.value, transform);
            }
        }
    }
}

/// Reproject every coordinate of a feature from web-mercator to WGS84,
/// keeping any extra position dimensions untouched.
pub fn reproject_feature(feature: &mut Feature) {
    if let Some(geometry) = feature.geometry.as_mut() {
        map_positions(&mut geometry.value, &|pos: &mut Vec<f64>| {
            if pos.len() >= 2 {
                let (lng, lat) = webmercator_to_wgs84(pos[0], pos[1]);
                pos[0] = lng;
                pos[1] = lat;
            }
        });
    }
}

fn crs_name(collection: &FeatureCollection) -> Option<String> {
    let crs = collection.foreign_members.as_ref()?.get("crs")?;
    match crs {
        Value::String(name) => Some(name.clone()),
        Value::Object(map) => {
            if let Some(Value::Object(props)) = map.get("properties")
                && let Some(Value::String(name)) = props.get("name")
            {
                return Some(name.clone());
            }
            if let Some(Value::String(name)) = map.get("name") {
                return Some(name.clone());
            }
            None
        }
        _ => None,
    }
}

fn time_floor_range(features: &[Feature]) -> Option<(f64, f64)> {
    let mut range: Option<(f64, f64)> = None;
    for feature in features {
        let Some(ts) = timestamp_raw(feature, AGG_TIME_KEYS).and_then(parse_timestamp) else {
            continue;
        };
        range = Some(match range {
            Some((min, max)) => (min.min(ts), max.max(ts)),
            None => (ts, ts),
        });
    }
    range
}

fn backfill_gdf_id(features: &mut [Feature], file_id: &str, range: Option<(f64, f64)>) {
    for feature in features {
        let props = feature.properties.get_or_insert_with(Default::default);
        if props.contains_key(FIRE_ID_KEY) {
            continue;
        }
        props.insert(FIRE_ID_KEY.to_string(), json!(file_id));
        if let Some((min_ts, max_ts)) = range {
            props.insert("time_min_ts".to_string(), json!(min_ts));
            props.insert("time_max_ts".to_string(), json!(max_ts));
            if let Some(iso) = to_iso(min_ts) {
                props.insert("time_min".to_string(), json!(iso));
            }
            if let Some(iso) = to_iso(max_ts) {
                props.insert("time_max".to_string(), json!(iso));
            }
        }
    }
}

/// Load one slice file: parse, reproject if needed, backfill gdf ids.
pub fn load_slice(path: &Path) -> CoreResult<Vec<Feature>> {
    let file = File::open(path).map_err(|e| CoreError::IoError(e, path.to_path_buf()))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).map_err(|e| {
        CoreError::InvalidGeoJson(Box::new(geojson::Error::MalformedJson(e)), path.to_path_buf())
    })?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        warn!("Skipping {}: not a FeatureCollection", path.display());
        return Ok(Vec::new());
    };

    let projection = match crs_name(&collection) {
        Some(name) => match detect_projection(&name) {
            Some(projection) => projection,
            None => {
                // Projected-meter coordinates would silently corrupt the
                // tileset if passed through as lon/lat
                warn!(
                    "Unsupported CRS `{name}` in {}, skipping its features",
                    path.display()
                );
                return Ok(Vec::new());
            }
        },
        None => SliceProjection::Wgs84,
    };

    let mut features = collection.features;
    if projection == SliceProjection::WebMercator {
        for feature in &mut features {
            reproject_feature(feature);
        }
    }

    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if let Some(caps) = GDF_ID_RE.captures(file_name) {
        let range = time_floor_range(&features);
        backfill_gdf_id(&mut features, &caps[1], range);
    }

    Ok(features)
}

/// Lists and iterates the slice files of a data directory in filename order.
#[derive(Debug)]
pub struct SliceReader {
    paths: VecDeque<PathBuf>,
}

impl SliceReader {
    pub fn new(dir: &Path) -> CoreResult<Self> {
        if !dir.is_dir() {
            return Err(CoreError::DataDirNotFound(dir.to_path_buf()));
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| CoreError::IoError(e, dir.to_path_buf()))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("geojson")
            })
            .collect();
        paths.sort_by_key(|path| path.file_name().map(std::ffi::OsStr::to_os_string));
        Ok(Self {
            paths: paths.into(),
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate all features across all slices. Files that fail to load are
    /// skipped with a warning, matching the tolerant ingest behavior the
    /// pipeline has always had.
    pub fn features(self) -> impl Iterator<Item = Feature> {
        FeatureIter {
            paths: self.paths,
            current: Vec::new().into_iter(),
        }
    }
}

struct FeatureIter {
    paths: VecDeque<PathBuf>,
    current: std::vec::IntoIter<Feature>,
}

impl Iterator for FeatureIter {
    type Item = Feature;

    fn next(&mut self) -> Option<Feature> {
        loop {
            if let Some(feature) = self.current.next() {
                return Some(feature);
            }
            let path = self.paths.pop_front()?;
            match load_slice(&path) {
                Ok(features) => self.current = features.into_iter(),
                Err(err) => warn!("Skipping {}: {err}", path.display()),
            }
        }
    }
}

//! Shared fixtures for unit tests.

use std::path::Path;

use geojson::{Feature, Geometry};
use serde_json::Value;

pub(crate) fn feature_with(props: Value, geometry: Option<Geometry>) -> Feature {
    let properties = match props {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => panic!("test properties must be an object, got {other}"),
    };
    Feature {
        bbox: None,
        geometry,
        id: None,
        properties,
        foreign_members: None,
    }
}

pub(crate) fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_string(value).expect("serializes")).expect("writes");
}

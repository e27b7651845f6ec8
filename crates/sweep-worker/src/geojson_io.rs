//! GeoJSON I/O for the CLI: reads a `StreetsGeoJSON` feature collection from
//! disk (spec §6 input contract) and serializes a finished `Route` back out
//! as a `LineString` feature collection.

use std::path::Path;

use anyhow::{bail, Context, Result};
use geo::{Coord, LineString};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};
use sweep_core::types::{Route, StreetFeature, StreetTags};

/// Reads a `FeatureCollection` of `LineString` features from `path` and
/// converts each into a `StreetFeature`, following the properties named in
/// spec §6 (`highway, name, oneway, maxspeed, osm_id`). Features whose
/// geometry isn't a `LineString` are skipped, not treated as an error — the
/// pipeline itself is responsible for rejecting geometrically invalid
/// streets (spec §4.1 step 1).
pub fn load_streets(path: impl AsRef<Path>) -> Result<Vec<StreetFeature>> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("reading {}", path.as_ref().display()))?;
    let geojson: geojson::GeoJson = text.parse().context("parsing GeoJSON")?;
    let collection = FeatureCollection::try_from(geojson).context("expected a FeatureCollection")?;

    let mut streets = Vec::new();
    for feature in collection.features {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let Value::LineString(positions) = &geometry.value else {
            continue;
        };
        if positions.len() < 2 {
            continue;
        }
        let coords: Vec<Coord<f64>> = positions
            .iter()
            .map(|p| Coord { x: p[0], y: p[1] })
            .collect();

        let props = feature.properties.unwrap_or_default();
        streets.push(StreetFeature {
            geometry: LineString::new(coords),
            tags: tags_from_properties(&props),
        });
    }
    Ok(streets)
}

fn tags_from_properties(props: &Map<String, JsonValue>) -> StreetTags {
    StreetTags {
        highway: props.get("highway").and_then(|v| v.as_str()).map(str::to_string),
        name: props.get("name").and_then(|v| v.as_str()).map(str::to_string),
        oneway: props
            .get("oneway")
            .map(|v| match v {
                JsonValue::Bool(b) => *b,
                JsonValue::String(s) => matches!(s.as_str(), "yes" | "true" | "1"),
                JsonValue::Number(n) => n.as_i64() == Some(1),
                _ => false,
            })
            .unwrap_or(false),
        maxspeed: props
            .get("maxspeed")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_f64().map(|n| n.to_string()))),
        osm_id: props.get("osm_id").and_then(|v| v.as_i64()),
    }
}

/// Serializes a finished `Route` as a single-feature `LineString`
/// `FeatureCollection` (spec §6 output contract: `geometry` is a GeoJSON
/// `LineString`).
pub fn route_to_geojson(route: &Route) -> String {
    let positions: Vec<Vec<f64>> = route.geometry.0.iter().map(|c| vec![c.x, c.y]).collect();
    let mut properties = Map::new();
    properties.insert("length_m".to_string(), json_f64(route.length_m));
    properties.insert("drive_time_s".to_string(), json_f64(route.drive_time_s));
    properties.insert("valid".to_string(), JsonValue::Bool(route.valid));

    let feature = Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::LineString(positions))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    };
    let collection = FeatureCollection {
        bbox: None,
        features: vec![feature],
        foreign_members: None,
    };
    geojson::GeoJson::from(collection).to_string()
}

fn json_f64(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

/// Writes `route` to `path` as GeoJSON, or fails loudly if the target
/// directory doesn't exist — this is a CLI convenience, not a library
/// contract, so a missing parent directory is a user error worth surfacing.
pub fn write_route(route: &Route, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            bail!("output directory {} does not exist", parent.display());
        }
    }
    std::fs::write(path, route_to_geojson(route)).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

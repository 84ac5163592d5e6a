use super::WGS84;
use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject};
use std::fs;
use std::path::Path;

pub fn read(path: &Path) -> Result<Vec<Feature>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Unable to read {}", path.display()))?;
    let geojson: GeoJson = content
        .parse()
        .with_context(|| format!("Invalid GeoJSON in {}", path.display()))?;
    Ok(into_features(geojson))
}

/// Flattens any GeoJSON document into a list of features. A bare geometry
/// becomes a single feature without properties.
pub fn into_features(geojson: GeoJson) -> Vec<Feature> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature::from(geometry)],
    }
}

pub fn write(features: &[Feature], path: &Path, epsg: u32) -> Result<()> {
    // RFC 7946 is WGS 84 only; anything else gets the legacy crs member.
    let foreign_members = (epsg != WGS84).then(|| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{epsg}") }
            }),
        );
        members
    });

    let collection = FeatureCollection {
        bbox: None,
        features: features.to_vec(),
        foreign_members,
    };
    let content = serde_json::to_string(&collection)?;
    fs::write(path, content).with_context(|| format!("Unable to write {}", path.display()))?;
    Ok(())
}

use crate::error::Error;
use crate::vector;
use anyhow::{Context, Result};
use geo::{unary_union, MultiPolygon, Polygon};
use geojson::{Feature, GeoJson, Geometry};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Where the area of interest comes from.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(untagged)]
pub enum AoiSource {
    /// A vector file whose features are dissolved into one geometry.
    File(PathBuf),
    /// A geometry that is used as is.
    Geometry(Geometry),
    /// Inline features, dissolved like a file.
    Features(Vec<Feature>),
}

impl FromStr for AoiSource {
    type Err = anyhow::Error;

    /// Inline GeoJSON when the text looks like a JSON object, a path otherwise.
    fn from_str(s: &str) -> Result<Self> {
        if !s.trim_start().starts_with('{') {
            return Ok(Self::File(PathBuf::from(s)));
        }
        let geojson: GeoJson = s.parse().context("Invalid inline GeoJSON AOI")?;
        Ok(match geojson {
            GeoJson::Geometry(geometry) => Self::Geometry(geometry),
            GeoJson::Feature(feature) => Self::Features(vec![feature]),
            GeoJson::FeatureCollection(fc) => Self::Features(fc.features),
        })
    }
}

impl AoiSource {
    /// Produces the single geometry used as the search's spatial filter.
    ///
    /// Geometries pass through untouched, validity is left to the provider.
    pub fn resolve(&self) -> Result<Geometry> {
        match self {
            Self::Geometry(geometry) => Ok(geometry.clone()),
            Self::Features(features) => dissolve(features),
            Self::File(path) => {
                let features = vector::read_vector_file(path)
                    .with_context(|| format!("Unable to load AOI from {}", path.display()))?;
                dissolve(&features)
            }
        }
    }
}

/// Unions every polygonal feature into one geometry; a single polygon stays
/// a `Polygon`, anything else becomes a `MultiPolygon`.
fn dissolve(features: &[Feature]) -> Result<Geometry> {
    let mut polygons: Vec<Polygon<f64>> = vec![];
    for geometry in features.iter().filter_map(|f| f.geometry.as_ref()) {
        let geometry = geo::Geometry::<f64>::try_from(&geometry.value)?;
        collect_polygons(geometry, &mut polygons)?;
    }
    if polygons.is_empty() {
        return Err(Error::UnsupportedAoi("no polygon features found".to_string()).into());
    }

    let mut union: MultiPolygon<f64> = unary_union(polygons.iter());
    let value = if union.0.len() == 1 {
        geojson::Value::from(&union.0.remove(0))
    } else {
        geojson::Value::from(&union)
    };
    Ok(Geometry::new(value))
}

fn collect_polygons(geometry: geo::Geometry<f64>, out: &mut Vec<Polygon<f64>>) -> Result<()> {
    match geometry {
        geo::Geometry::Polygon(p) => out.push(p),
        geo::Geometry::MultiPolygon(mp) => out.extend(mp.0),
        geo::Geometry::Rect(r) => out.push(r.to_polygon()),
        geo::Geometry::Triangle(t) => out.push(t.to_polygon()),
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out)?;
            }
        }
        other => {
            return Err(Error::UnsupportedAoi(format!(
                "AOI geometries must be polygonal, found {}",
                geometry_name(&other)
            ))
            .into())
        }
    }
    Ok(())
}

fn geometry_name(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        _ => "Geometry",
    }
}

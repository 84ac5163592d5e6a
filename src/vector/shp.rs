use anyhow::{Context, Result};
use geo::{Coord, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geojson::{Feature, JsonObject};
use shapefile::dbase::FieldValue;
use shapefile::{PolygonRing, Shape};
use std::path::Path;

pub fn read(path: &Path) -> Result<Vec<Feature>> {
    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Unable to open shapefile {}", path.display()))?;

    let mut features = vec![];
    for result in reader.iter_shapes_and_records() {
        let (shape, record) =
            result.with_context(|| format!("Unable to read feature from {}", path.display()))?;

        let geometry = to_geo(&shape).map(|g| geojson::Geometry::new(geojson::Value::from(&g)));

        let mut properties = JsonObject::new();
        for (name, value) in record.into_iter() {
            properties.insert(name, field_to_json(value));
        }

        features.push(Feature {
            bbox: None,
            geometry,
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    Ok(features)
}

fn field_to_json(value: FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => s.into(),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) => n.into(),
        FieldValue::Float(Some(f)) => f.into(),
        FieldValue::Integer(i) => i.into(),
        FieldValue::Logical(Some(b)) => b.into(),
        FieldValue::Date(Some(d)) => {
            format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()).into()
        }
        _ => serde_json::Value::Null,
    }
}

fn rings_to_polygons<P>(
    rings: &[PolygonRing<P>],
    f: impl Fn(&P) -> (f64, f64) + Copy,
) -> MultiPolygon<f64> {
    let mut polygons: Vec<Polygon<f64>> = vec![];
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => {
                polygons.push(Polygon::new(LineString::new(xy(points, f)), vec![]))
            }
            // inner rings belong to the most recent outer ring
            PolygonRing::Inner(points) => {
                if let Some(last) = polygons.last_mut() {
                    last.interiors_push(LineString::new(xy(points, f)));
                }
            }
        }
    }
    MultiPolygon::new(polygons)
}

fn xy<P>(points: &[P], f: impl Fn(&P) -> (f64, f64)) -> Vec<Coord<f64>> {
    points
        .iter()
        .map(|p| {
            let (x, y) = f(p);
            Coord { x, y }
        })
        .collect()
}

fn to_geo(shape: &Shape) -> Option<geo::Geometry<f64>> {
    let geometry: geo::Geometry<f64> = match shape {
        Shape::NullShape => return None,
        Shape::Point(p) => Point::new(p.x, p.y).into(),
        Shape::PointM(p) => Point::new(p.x, p.y).into(),
        Shape::PointZ(p) => Point::new(p.x, p.y).into(),
        Shape::Multipoint(mp) => {
            MultiPoint::from(xy(mp.points(), |p| (p.x, p.y))).into()
        }
        Shape::MultipointM(mp) => {
            MultiPoint::from(xy(mp.points(), |p| (p.x, p.y))).into()
        }
        Shape::MultipointZ(mp) => {
            MultiPoint::from(xy(mp.points(), |p| (p.x, p.y))).into()
        }
        Shape::Polyline(l) => MultiLineString::new(
            l.parts().iter().map(|part| xy(part, |p| (p.x, p.y)).into()).collect(),
        )
        .into(),
        Shape::PolylineM(l) => MultiLineString::new(
            l.parts().iter().map(|part| xy(part, |p| (p.x, p.y)).into()).collect(),
        )
        .into(),
        Shape::PolylineZ(l) => MultiLineString::new(
            l.parts().iter().map(|part| xy(part, |p| (p.x, p.y)).into()).collect(),
        )
        .into(),
        Shape::Polygon(poly) => rings_to_polygons(poly.rings(), |p| (p.x, p.y)).into(),
        Shape::PolygonM(poly) => rings_to_polygons(poly.rings(), |p| (p.x, p.y)).into(),
        Shape::PolygonZ(poly) => rings_to_polygons(poly.rings(), |p| (p.x, p.y)).into(),
        Shape::Multipatch(_) => return None,
    };
    Some(geometry)
}

//! Minimal GeoPackage 1.3 feature table support on top of SQLite.
use super::WGS84;
use anyhow::{Context, Result};
use geo::BoundingRect;
use geojson::{Feature, JsonObject};
use geozero::wkb::{GpkgWkb, WkbDialect};
use geozero::{CoordDimensions, ToGeo, ToWkb};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

const APPLICATION_ID: u32 = 0x4750_4B47; // "GPKG"
const USER_VERSION: u32 = 10300;
const TABLE: &str = "metadata";
const GEOMETRY_COLUMN: &str = "geom";

const WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;

const CORE_TABLES: &str = r#"
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
CREATE TABLE gpkg_extensions (
    table_name TEXT,
    column_name TEXT,
    extension_name TEXT NOT NULL,
    definition TEXT NOT NULL,
    scope TEXT NOT NULL,
    CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
CREATE TABLE gpkg_data_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    name TEXT,
    title TEXT,
    description TEXT,
    mime_type TEXT,
    constraint_name TEXT,
    CONSTRAINT pk_gdc PRIMARY KEY (table_name, column_name),
    CONSTRAINT gdc_tn UNIQUE (table_name, name)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', NULL),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', NULL);
INSERT INTO gpkg_extensions VALUES
    ('gpkg_data_columns', NULL, 'gpkg_schema', 'http://www.geopackage.org/spec/#extension_schema', 'read-write');
"#;

/// Marks TEXT columns holding serialised arrays and objects.
const JSON_MIME_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnType {
    Boolean,
    Integer,
    Real,
    Text,
    /// Arrays and objects, stored as JSON text.
    Json,
}

impl ColumnType {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(n) if n.is_i64() => Some(Self::Integer),
            Value::Number(_) => Some(Self::Real),
            Value::String(_) => Some(Self::Text),
            Value::Array(_) | Value::Object(_) => Some(Self::Json),
        }
    }

    fn merge(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Integer, Self::Real) | (Self::Real, Self::Integer) => Self::Real,
            _ => Self::Text,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text | Self::Json => "TEXT",
        }
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Property columns in name order, typed from the values seen across all features.
fn infer_columns(features: &[Feature]) -> Vec<(String, ColumnType)> {
    let mut columns: BTreeMap<String, Option<ColumnType>> = BTreeMap::new();
    for props in features.iter().filter_map(|f| f.properties.as_ref()) {
        for (key, value) in props {
            let seen = columns.entry(key.clone()).or_insert(None);
            *seen = match (*seen, ColumnType::of(value)) {
                (Some(a), Some(b)) => Some(a.merge(b)),
                (a, b) => a.or(b),
            };
        }
    }
    columns
        .into_iter()
        .filter(|(key, _)| key != "fid" && key != GEOMETRY_COLUMN)
        .map(|(key, t)| (key, t.unwrap_or(ColumnType::Text)))
        .collect()
}

fn to_sql(value: Option<&Value>, column: ColumnType) -> SqlValue {
    match (value, column) {
        (None | Some(Value::Null), _) => SqlValue::Null,
        (Some(Value::Bool(b)), ColumnType::Boolean) => SqlValue::Integer(i64::from(*b)),
        (Some(Value::Number(n)), ColumnType::Integer) => {
            n.as_i64().map(SqlValue::Integer).unwrap_or(SqlValue::Null)
        }
        (Some(Value::Number(n)), ColumnType::Real) => {
            n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null)
        }
        (Some(Value::String(s)), _) => SqlValue::Text(s.clone()),
        (Some(other), _) => SqlValue::Text(other.to_string()),
    }
}

/// GeoPackage binary geometry with an XY envelope.
fn encode_geometry(geometry: &geo::Geometry<f64>, srs_id: i32) -> Result<Vec<u8>> {
    let envelope = geometry
        .bounding_rect()
        .map(|r| vec![r.min().x, r.max().x, r.min().y, r.max().y])
        .unwrap_or_default();
    let blob =
        geometry.to_wkb_dialect(WkbDialect::Geopackage, CoordDimensions::xy(), Some(srs_id), envelope)?;
    Ok(blob)
}

fn decode_geometry(blob: &[u8]) -> Result<geo::Geometry<f64>> {
    let geometry = GpkgWkb(blob.to_vec())
        .to_geo()
        .context("Invalid GeoPackage geometry blob")?;
    Ok(geometry)
}

fn to_geo(feature: &Feature) -> Result<Option<geo::Geometry<f64>>> {
    feature
        .geometry
        .as_ref()
        .map(|g| geo::Geometry::<f64>::try_from(&g.value))
        .transpose()
        .context("Unable to convert feature geometry")
}

pub fn write(features: &[Feature], path: &Path, epsg: u32) -> Result<()> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("Unable to create {}", path.display()))?;
    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;
    conn.execute_batch(CORE_TABLES)?;

    let srs_id = epsg as i32;
    let (srs_name, definition) = if epsg == WGS84 {
        ("WGS 84 geodetic", WGS84_WKT)
    } else {
        ("Unknown", "undefined")
    };
    conn.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, ?3, NULL)",
        params![srs_name, srs_id, definition],
    )?;

    let geometries = features.iter().map(to_geo).collect::<Result<Vec<_>>>()?;
    let extent = geometries
        .iter()
        .flatten()
        .filter_map(|g| g.bounding_rect())
        .reduce(|a, b| {
            geo::Rect::new(
                geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            )
        });

    let columns = infer_columns(features);
    let column_defs: String = columns
        .iter()
        .map(|(name, t)| format!(", {} {}", quote(name), t.sql()))
        .collect();

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "CREATE TABLE {} (fid INTEGER PRIMARY KEY AUTOINCREMENT, {} GEOMETRY{})",
        quote(TABLE),
        quote(GEOMETRY_COLUMN),
        column_defs
    ))?;
    tx.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, min_x, min_y, max_x, max_y, srs_id)
         VALUES (?1, 'features', ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            TABLE,
            extent.map(|r| r.min().x),
            extent.map(|r| r.min().y),
            extent.map(|r| r.max().x),
            extent.map(|r| r.max().y),
            srs_id
        ],
    )?;
    tx.execute(
        "INSERT INTO gpkg_geometry_columns VALUES (?1, ?2, 'GEOMETRY', ?3, 0, 0)",
        params![TABLE, GEOMETRY_COLUMN, srs_id],
    )?;
    for (name, _) in columns.iter().filter(|(_, t)| *t == ColumnType::Json) {
        tx.execute(
            "INSERT INTO gpkg_data_columns (table_name, column_name, name, mime_type) VALUES (?1, ?2, ?2, ?3)",
            params![TABLE, name, JSON_MIME_TYPE],
        )?;
    }

    let placeholders: String = (0..=columns.len()).map(|_| ", ?").collect();
    let names: String = columns.iter().map(|(name, _)| format!(", {}", quote(name))).collect();
    let insert = format!(
        "INSERT INTO {} ({}{}) VALUES ({})",
        quote(TABLE),
        quote(GEOMETRY_COLUMN),
        names,
        &placeholders[2..]
    );
    {
        let mut stmt = tx.prepare(&insert)?;
        for (feature, geometry) in features.iter().zip(&geometries) {
            let blob = geometry
                .as_ref()
                .map(|g| encode_geometry(g, srs_id))
                .transpose()?
                .map_or(SqlValue::Null, SqlValue::Blob);
            let props = feature.properties.as_ref();
            let values = std::iter::once(blob).chain(
                columns
                    .iter()
                    .map(|(name, t)| to_sql(props.and_then(|p| p.get(name)), *t)),
            );
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;
    Ok(())
}

/// Declared column types of `table`, upper-cased.
fn declared_types(conn: &Connection, table: &str) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
    let types = stmt
        .query_map([table], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?.to_ascii_uppercase()))
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(types)
}

/// Columns of `table` registered as JSON in the schema extension, if present.
fn json_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let registered: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'gpkg_data_columns')",
        [],
        |row| row.get(0),
    )?;
    if !registered {
        return Ok(HashSet::new());
    }
    let mut stmt = conn.prepare(
        "SELECT column_name FROM gpkg_data_columns WHERE table_name = ?1 AND mime_type = ?2",
    )?;
    let columns = stmt
        .query_map(params![table, JSON_MIME_TYPE], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(columns)
}

pub fn read(path: &Path) -> Result<Vec<Feature>> {
    let conn = Connection::open(path)
        .with_context(|| format!("Unable to open {}", path.display()))?;

    let (table, geometry_column): (String, String) = conn
        .query_row(
            "SELECT table_name, column_name FROM gpkg_geometry_columns ORDER BY table_name LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .with_context(|| format!("No feature table in {}", path.display()))?;

    let declared = declared_types(&conn, &table)?;
    let json_columns = json_columns(&conn, &table)?;

    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote(&table)))?;
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query([])?;

    let mut features = vec![];
    while let Some(row) = rows.next()? {
        let mut properties = JsonObject::new();
        let mut geometry = None;
        for (i, name) in names.iter().enumerate() {
            let value = row.get_ref(i)?;
            if name == &geometry_column {
                if let ValueRef::Blob(blob) = value {
                    let g = decode_geometry(blob)?;
                    geometry = Some(geojson::Geometry::new(geojson::Value::from(&g)));
                }
                continue;
            }
            if name == "fid" {
                continue;
            }
            let boolean = declared.get(name).is_some_and(|t| t == "BOOLEAN");
            let json = match value {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(n) if boolean => Value::Bool(n != 0),
                ValueRef::Integer(n) => Value::from(n),
                ValueRef::Real(f) => Value::from(f),
                ValueRef::Text(t) if json_columns.contains(name) => serde_json::from_slice(t)
                    .unwrap_or_else(|_| Value::from(String::from_utf8_lossy(t).into_owned())),
                ValueRef::Text(t) => Value::from(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(_) => continue,
            };
            properties.insert(name.clone(), json);
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(props: Value) -> Feature {
        Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![1.0, 2.0]))),
            id: None,
            properties: props.as_object().cloned(),
            foreign_members: None,
        }
    }

    #[test]
    fn test_column_types_widen() {
        let features = vec![
            feature(json!({"a": 1, "b": true, "c": "x", "d": 1})),
            feature(json!({"a": 1.5, "b": null, "c": 3, "e": [1, 2]})),
        ];
        let columns = infer_columns(&features);
        assert_eq!(
            columns,
            vec![
                ("a".to_string(), ColumnType::Real),
                ("b".to_string(), ColumnType::Boolean),
                ("c".to_string(), ColumnType::Text),
                ("d".to_string(), ColumnType::Integer),
                ("e".to_string(), ColumnType::Json),
            ]
        );
    }

    #[test]
    fn test_header_and_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gpkg");
        write(&[feature(json!({"id": "a"}))], &path, WGS84).unwrap();

        let conn = Connection::open(&path).unwrap();
        let app_id: u32 = conn
            .query_row("PRAGMA application_id", [], |r| r.get(0))
            .unwrap();
        assert_eq!(app_id, APPLICATION_ID);
        let srs: i64 = conn
            .query_row("SELECT srs_id FROM gpkg_contents", [], |r| r.get(0))
            .unwrap();
        assert_eq!(srs, 4326);
    }

    #[test]
    fn test_booleans_and_json_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gpkg");
        let props = json!({
            "ground_control": true,
            "published": false,
            "bands": ["red", "green", "blue"],
            "sun": {"azimuth": 131.2, "elevation": 52.1},
            "gsd": 3
        });
        write(&[feature(props.clone())], &path, WGS84).unwrap();

        let read = read(&path).unwrap();
        assert_eq!(Value::Object(read[0].properties.clone().unwrap()), props);
    }

    #[test]
    fn test_plain_text_that_looks_like_json_stays_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.gpkg");
        write(&[feature(json!({"note": "[1, 2]"}))], &path, WGS84).unwrap();

        let read = read(&path).unwrap();
        assert_eq!(read[0].properties.as_ref().unwrap()["note"], "[1, 2]");
    }

    #[test]
    fn test_geometry_blob_round_trip() {
        let g = geo::Geometry::Point(geo::Point::new(-66.7, 18.3));
        let blob = encode_geometry(&g, 4326).unwrap();
        assert_eq!(&blob[..2], b"GP");
        assert_eq!(&blob[4..8], &4326_i32.to_le_bytes());
        assert_eq!(decode_geometry(&blob).unwrap(), g);
    }
}

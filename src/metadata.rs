use crate::catalog::SceneRecord;
use crate::vector::{self, VectorFormat, WGS84};
use anyhow::Result;
use chrono::{DateTime, Local, TimeZone};
use geojson::Feature;
use std::path::{Path, PathBuf};
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Writes every record to a new `metadata-<timestamp>` file in `directory`
/// and returns its path. An empty slice still produces a file.
pub fn persist(records: &[SceneRecord], directory: &Path, format: VectorFormat) -> Result<PathBuf> {
    persist_at(records, directory, format, Local::now())
}

pub fn persist_at<Tz: TimeZone>(
    records: &[SceneRecord],
    directory: &Path,
    format: VectorFormat,
    timestamp: DateTime<Tz>,
) -> Result<PathBuf>
where
    Tz::Offset: std::fmt::Display,
{
    let path = directory.join(file_name(&timestamp, format));
    let features: Vec<Feature> = records.iter().map(to_feature).collect();
    vector::write_vector_table(&features, &path, format, WGS84)?;
    info!("Metadata written to {}", path.display());
    Ok(path)
}

fn file_name<Tz: TimeZone>(timestamp: &DateTime<Tz>, format: VectorFormat) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "metadata-{}.{}",
        timestamp.format(TIMESTAMP_FORMAT),
        format.extension()
    )
}

/// Flattens a record: its properties, the scene id under `id`, and its
/// footprint as the feature geometry.
fn to_feature(record: &SceneRecord) -> Feature {
    let mut properties = record.properties.clone();
    properties.insert("id".to_string(), record.id.clone().into());
    Feature {
        bbox: None,
        geometry: Some(record.geometry.clone()),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::mock::scenes;
    use chrono::Utc;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 29, 20, 50, 23).unwrap()
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            file_name(&timestamp(), VectorFormat::GeoJson),
            "metadata-20240529_205023.geojson"
        );
        assert_eq!(
            file_name(&timestamp(), VectorFormat::GeoPackage),
            "metadata-20240529_205023.gpkg"
        );
    }

    #[test]
    fn test_records_survive_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let records = scenes(25, "2020-01-15T14:03:11.000Z", 0.05);

        for format in [VectorFormat::GeoJson, VectorFormat::GeoPackage] {
            let path = persist_at(&records, dir.path(), format, timestamp()).unwrap();
            let features = vector::read_vector_file(&path).unwrap();
            assert_eq!(features.len(), 25, "{format}");
            for (record, feature) in records.iter().zip(&features) {
                let props = feature.properties.as_ref().unwrap();
                assert_eq!(props["id"], record.id.as_str(), "{format}");
                assert_eq!(props["item_type"], "PSScene", "{format}");
                assert_eq!(props["cloud_cover"], 0.05, "{format}");
                assert_eq!(props["ground_control"], true, "{format}");
                assert_eq!(
                    props["instrument_bands"],
                    serde_json::json!(["blue", "green", "red", "nir"]),
                    "{format}"
                );
                assert!(feature.geometry.is_some(), "{format}");
            }
        }
    }

    #[test]
    fn test_empty_records_still_write_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = persist_at(&[], dir.path(), VectorFormat::GeoJson, timestamp()).unwrap();
        assert!(path.exists());
        assert!(vector::read_vector_file(&path).unwrap().is_empty());
    }

    #[test]
    fn test_same_second_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let records = scenes(1, "2020-01-15T14:03:11.000Z", 0.05);
        persist_at(&records, dir.path(), VectorFormat::GeoPackage, timestamp()).unwrap();
        let err = persist_at(&records, dir.path(), VectorFormat::GeoPackage, timestamp()).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::OutputExists(_))));
    }
}

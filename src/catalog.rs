use crate::error::Error;
use crate::filter::SearchFilter;
use anyhow::Result;
use chrono::{DateTime, Days, NaiveDate, Utc};
use geojson::{Geometry, JsonObject};
use serde::{Deserialize, Serialize};
use tracing::info;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A catalog search hit.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SceneRecord {
    pub id: String,
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: JsonObject,
    #[serde(rename = "_permissions", default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

/// Inclusive range of calendar days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Parses two `YYYY-MM-DD` dates. An inverted range is rejected rather
    /// than handed to the provider.
    pub fn parse(start: &str, end: &str) -> Result<Self, Error> {
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        if start > end {
            return Err(Error::InvertedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start_of_range(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// First instant after the range, i.e. midnight following `end`.
    pub fn end_of_range(&self) -> DateTime<Utc> {
        let next = self.end.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
        next.and_time(chrono::NaiveTime::MIN).and_utc()
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|source| Error::DateFormat {
        value: value.to_string(),
        source,
    })
}

/// Parameters of a single catalog search.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct SceneQuery {
    pub start_date: String,
    pub end_date: String,
    pub item_types: Vec<String>,
    pub cloud_cover: f64,
}

pub trait Catalog {
    /// Runs one search over all `item_types` and returns every hit.
    async fn search(
        self: &Self,
        item_types: &[String],
        geometry: &Geometry,
        filter: &SearchFilter,
    ) -> Result<Vec<SceneRecord>>;
}

/// Builds the scene filter for `query` and searches `aoi` once.
///
/// Dates and the cloud cover threshold are validated before anything is
/// sent. An empty result is returned as an empty vector.
pub async fn search_scenes(
    catalog: &impl Catalog,
    aoi: &Geometry,
    query: &SceneQuery,
) -> Result<Vec<SceneRecord>> {
    let dates = DateRange::parse(&query.start_date, &query.end_date)?;
    if !(0.0..=1.0).contains(&query.cloud_cover) {
        return Err(Error::CloudCover(query.cloud_cover).into());
    }

    let filter = SearchFilter::scenes(&dates, query.cloud_cover);
    let scenes = catalog.search(&query.item_types, aoi, &filter).await?;
    info!("Found {} images.", scenes.len());
    Ok(scenes)
}

//! Search filters in the Data API's JSON shape.
//!
//! The same tree that is sent to the provider can be evaluated locally with
//! [`SearchFilter::matches`], which is how the in-process catalog used by the
//! tests narrows its results.
use crate::catalog::{DateRange, SceneRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Permission required for a scene to be orderable.
pub const PERMISSION: &str = "assets:download";
pub const ACQUIRED: &str = "acquired";
pub const CLOUD_COVER: &str = "cloud_cover";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum SearchFilter {
    AndFilter {
        config: Vec<SearchFilter>,
    },
    PermissionFilter {
        config: Vec<String>,
    },
    DateRangeFilter {
        field_name: String,
        config: Bounds<DateTime<Utc>>,
    },
    RangeFilter {
        field_name: String,
        config: Bounds<f64>,
    },
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Bounds<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<T>,
}

impl<T> Default for Bounds<T> {
    fn default() -> Self {
        Self {
            gt: None,
            gte: None,
            lt: None,
            lte: None,
        }
    }
}

impl<T: PartialOrd> Bounds<T> {
    fn contains(&self, v: &T) -> bool {
        self.gt.as_ref().map_or(true, |b| v > b)
            && self.gte.as_ref().map_or(true, |b| v >= b)
            && self.lt.as_ref().map_or(true, |b| v < b)
            && self.lte.as_ref().map_or(true, |b| v <= b)
    }
}

impl SearchFilter {
    pub fn and(filters: Vec<SearchFilter>) -> Self {
        Self::AndFilter { config: filters }
    }

    pub fn permission() -> Self {
        Self::PermissionFilter {
            config: vec![PERMISSION.to_string()],
        }
    }

    pub fn date_range(field_name: &str, bounds: Bounds<DateTime<Utc>>) -> Self {
        Self::DateRangeFilter {
            field_name: field_name.to_string(),
            config: bounds,
        }
    }

    pub fn range(field_name: &str, bounds: Bounds<f64>) -> Self {
        Self::RangeFilter {
            field_name: field_name.to_string(),
            config: bounds,
        }
    }

    /// Downloadable scenes acquired within `dates` with cloud cover at most
    /// `max_cloud_cover`.
    pub fn scenes(dates: &DateRange, max_cloud_cover: f64) -> Self {
        // both calendar days are included: [start 00:00, day after end 00:00)
        let acquired = Bounds {
            gte: Some(dates.start_of_range()),
            lt: Some(dates.end_of_range()),
            ..Default::default()
        };
        let cloud_cover = Bounds {
            lte: Some(max_cloud_cover),
            ..Default::default()
        };
        Self::and(vec![
            Self::permission(),
            Self::date_range(ACQUIRED, acquired),
            Self::range(CLOUD_COVER, cloud_cover),
        ])
    }

    /// Evaluates the filter against a scene the way the Data API would.
    /// Missing or mistyped fields never match.
    pub fn matches(&self, record: &SceneRecord) -> bool {
        match self {
            Self::AndFilter { config } => config.iter().all(|f| f.matches(record)),
            Self::PermissionFilter { config } => config.iter().all(|required| {
                let action = required.rsplit(':').next().unwrap_or(required);
                record
                    .permissions
                    .iter()
                    .any(|p| p.rsplit(':').next() == Some(action))
            }),
            Self::DateRangeFilter { field_name, config } => record
                .properties
                .get(field_name)
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map_or(false, |t| config.contains(&t.with_timezone(&Utc))),
            Self::RangeFilter { field_name, config } => record
                .properties
                .get(field_name)
                .and_then(|v| v.as_f64())
                .map_or(false, |v| config.contains(&v)),
        }
    }
}

use crate::aoi::AoiSource;
use crate::catalog::SceneQuery;
use crate::error::Error;
use crate::order::DownloadOptions;
use crate::vector::VectorFormat;
use anyhow::Result;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const API_KEY_ENV: &str = "PL_API_KEY";
pub const DEFAULT_DOWNLOAD_DIR: &str = "./planet_downloads";

const DATA_URL: &str = "https://api.planet.com/data/v1/";
const ORDERS_URL: &str = "https://api.planet.com/compute/ops/orders/v2/";

/// What to search for and how to order it.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct AcquisitionRequest {
    pub aoi: AoiSource,
    pub start_date: String,
    pub end_date: String,
    #[serde(default = "default_item_types")]
    pub item_types: Vec<String>,
    #[serde(default = "default_bundles")]
    pub bundles: Vec<String>,
    #[serde(default = "default_cloud_cover")]
    pub cloud_cover: f64,
    #[serde(default)]
    pub provider: ProviderConfig,
}

pub fn default_item_types() -> Vec<String> {
    vec!["PSScene".to_string()]
}

pub fn default_bundles() -> Vec<String> {
    vec!["analytic_udm2".to_string()]
}

pub fn default_cloud_cover() -> f64 {
    0.2
}

impl AcquisitionRequest {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let request: Self = toml::from_str(&content)?;
        Ok(request)
    }

    pub fn write<P: AsRef<Path>>(self: &Self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn query(self: &Self) -> SceneQuery {
        SceneQuery {
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
            item_types: self.item_types.clone(),
            cloud_cover: self.cloud_cover,
        }
    }
}

/// Where results land and how downloads behave.
#[derive(Clone, Debug)]
pub struct OutputOptions {
    pub download_dir: PathBuf,
    pub metadata_format: VectorFormat,
    pub download: DownloadOptions,
    /// Order plan file rewritten after every order state change.
    pub ledger: Option<PathBuf>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            metadata_format: VectorFormat::GeoJson,
            download: DownloadOptions::default(),
            ledger: None,
        }
    }
}

/// Endpoints and polling cadence of the provider.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub data_url: Url,
    pub orders_url: Url,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub page_size: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            data_url: Url::parse(DATA_URL).expect("DATA_URL should always parse"),
            orders_url: Url::parse(ORDERS_URL).expect("ORDERS_URL should always parse"),
            poll_interval_secs: 30,
            max_poll_attempts: 200,
            page_size: 250,
        }
    }
}

impl ProviderConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Provider credential. Never printed.
#[derive(Debug)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    /// Uses `explicit` when given, otherwise the `PL_API_KEY` environment
    /// variable.
    pub fn resolve(explicit: Option<String>) -> Result<Self, Error> {
        Self::resolve_with(explicit, |name| std::env::var(name).ok())
    }

    fn resolve_with(
        explicit: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, Error> {
        explicit
            .or_else(|| lookup(API_KEY_ENV))
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)
            .ok_or(Error::MissingApiKey)
    }

    pub fn secret(&self) -> &SecretString {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const REQUEST: &str = r#"
aoi = "inputs/utuado.geojson"
start_date = "2020-01-01"
end_date = "2020-02-01"
bundles = ["analytic_udm2", "visual"]
"#;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let request: AcquisitionRequest = toml::from_str(REQUEST).unwrap();
        assert!(matches!(request.aoi, AoiSource::File(ref p) if p.ends_with("utuado.geojson")));
        assert_eq!(request.item_types, vec!["PSScene"]);
        assert_eq!(request.bundles, vec!["analytic_udm2", "visual"]);
        assert_eq!(request.cloud_cover, 0.2);
        assert_eq!(request.provider, ProviderConfig::default());
        assert_eq!(request.provider.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_inline_geometry_and_provider_table() {
        let content = r#"
start_date = "2020-01-01"
end_date = "2020-02-01"
cloud_cover = 0.1

[aoi]
type = "Polygon"
coordinates = [[[-66.73, 18.30], [-66.73, 18.25], [-66.65, 18.25], [-66.65, 18.30], [-66.73, 18.30]]]

[provider]
poll_interval_secs = 5
"#;
        let request: AcquisitionRequest = toml::from_str(content).unwrap();
        assert!(matches!(request.aoi, AoiSource::Geometry(_)));
        assert_eq!(request.provider.poll_interval_secs, 5);
        assert_eq!(request.provider.max_poll_attempts, 200);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.toml");
        let request: AcquisitionRequest = toml::from_str(REQUEST).unwrap();
        request.write(&path).unwrap();

        let read = AcquisitionRequest::read(&path).unwrap();
        assert_eq!(read.bundles, request.bundles);
        assert_eq!(read.start_date, "2020-01-01");
    }

    #[test]
    fn test_api_key_resolution_order() {
        let env = |_: &str| Some("from-env".to_string());
        let none = |_: &str| None;

        let key = ApiKey::resolve_with(Some("explicit".to_string()), env).unwrap();
        assert_eq!(key.secret().expose_secret(), "explicit");

        let key = ApiKey::resolve_with(None, env).unwrap();
        assert_eq!(key.secret().expose_secret(), "from-env");

        let err = ApiKey::resolve_with(None, none).unwrap_err();
        assert!(matches!(err, Error::MissingApiKey));

        let err = ApiKey::resolve_with(Some("  ".to_string()), none).unwrap_err();
        assert!(matches!(err, Error::MissingApiKey));
    }

    #[test]
    fn test_api_key_is_redacted() {
        let key = ApiKey::new("super-secret");
        assert!(!format!("{key:?}").contains("super-secret"));
    }
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name given to every order this tool submits.
pub const ORDER_NAME: &str = "planet_download_order";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct OrderRequest {
    pub name: String,
    pub products: Vec<ProductSpec>,
    pub delivery: Delivery,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ProductSpec {
    pub item_ids: Vec<String>,
    pub item_type: String,
    pub product_bundle: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Delivery {
    pub single_archive: bool,
    pub archive_type: String,
}

impl Delivery {
    pub fn single_archive() -> Self {
        Self {
            single_archive: true,
            archive_type: "zip".to_string(),
        }
    }
}

impl OrderRequest {
    /// One product (these scenes, one item type, one bundle) delivered as a
    /// single zip archive.
    pub fn new(item_ids: &[String], item_type: &str, bundle: &str) -> Self {
        Self {
            name: ORDER_NAME.to_string(),
            products: vec![ProductSpec {
                item_ids: item_ids.to_vec(),
                item_type: item_type.to_string(),
                product_bundle: bundle.to_string(),
            }],
            delivery: Delivery::single_archive(),
        }
    }
}

/// Provider-side order reference returned on creation.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderHandle {
    pub id: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Replace files that already exist at the destination.
    pub overwrite: bool,
    pub show_progress: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            show_progress: true,
        }
    }
}

pub trait OrderService {
    async fn create_order(self: &Self, request: &OrderRequest) -> Result<OrderHandle>;

    /// Blocks until the order reaches a deliverable state, or fails.
    async fn wait(self: &Self, order: &OrderHandle) -> Result<()>;

    /// Fetches every delivered file of `order` into `directory`, returning
    /// the local paths.
    async fn download_order(
        self: &Self,
        order: &OrderHandle,
        directory: &Path,
        options: &DownloadOptions,
    ) -> Result<Vec<PathBuf>>;
}

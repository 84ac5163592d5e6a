//! In-process doubles for the provider seams.
use crate::catalog::{Catalog, SceneRecord};
use crate::filter::SearchFilter;
use crate::order::{DownloadOptions, OrderHandle, OrderRequest, OrderService};
use anyhow::{anyhow, Result};
use geojson::Geometry;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// `n` downloadable scenes sharing one acquisition time and cloud cover.
pub fn scenes(n: usize, acquired: &str, cloud_cover: f64) -> Vec<SceneRecord> {
    (0..n)
        .map(|i| {
            serde_json::from_value(json!({
                "id": format!("{}_{:04}", &acquired[..10], i),
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-66.73, 18.30], [-66.73, 18.25], [-66.65, 18.25], [-66.65, 18.30], [-66.73, 18.30]]]
                },
                "properties": {
                    "acquired": acquired,
                    "cloud_cover": cloud_cover,
                    "item_type": "PSScene",
                    "satellite_id": "1005",
                    "ground_control": true,
                    "instrument_bands": ["blue", "green", "red", "nir"]
                },
                "_permissions": ["assets.ortho_analytic_4b:download"]
            }))
            .expect("scene fixture should deserialize")
        })
        .collect()
}

pub struct MockCatalog {
    records: Vec<SceneRecord>,
    calls: Mutex<usize>,
}

impl MockCatalog {
    pub fn new(records: Vec<SceneRecord>) -> Self {
        Self {
            records,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Catalog for MockCatalog {
    async fn search(
        self: &Self,
        _item_types: &[String],
        _geometry: &Geometry,
        filter: &SearchFilter,
    ) -> Result<Vec<SceneRecord>> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct OrdersState {
    created: Vec<OrderRequest>,
    waited: Vec<String>,
    downloaded: Vec<String>,
}

/// Records every call; optionally fails the n-th (zero based) create or wait.
#[derive(Default)]
pub struct MockOrders {
    state: Mutex<OrdersState>,
    fail_create_at: Option<usize>,
    fail_wait_at: Option<usize>,
}

impl MockOrders {
    pub fn failing_create(n: usize) -> Self {
        Self {
            fail_create_at: Some(n),
            ..Default::default()
        }
    }

    pub fn failing_wait(n: usize) -> Self {
        Self {
            fail_wait_at: Some(n),
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn waited(&self) -> Vec<String> {
        self.state.lock().unwrap().waited.clone()
    }

    pub fn downloaded(&self) -> Vec<String> {
        self.state.lock().unwrap().downloaded.clone()
    }
}

impl OrderService for MockOrders {
    async fn create_order(self: &Self, request: &OrderRequest) -> Result<OrderHandle> {
        let mut state = self.state.lock().unwrap();
        if self.fail_create_at == Some(state.created.len()) {
            return Err(anyhow!("quota exceeded"));
        }
        state.created.push(request.clone());
        Ok(OrderHandle {
            id: format!("order-{}", state.created.len()),
        })
    }

    async fn wait(self: &Self, order: &OrderHandle) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if self.fail_wait_at == Some(state.waited.len()) {
            return Err(crate::error::Error::OrderFailed {
                order_id: order.id.clone(),
                state: "failed".to_string(),
            }
            .into());
        }
        state.waited.push(order.id.clone());
        Ok(())
    }

    async fn download_order(
        self: &Self,
        order: &OrderHandle,
        directory: &Path,
        options: &DownloadOptions,
    ) -> Result<Vec<PathBuf>> {
        let dst = directory.join(&order.id).join(format!("{}.zip", order.id));
        if !dst.exists() || options.overwrite {
            fs::create_dir_all(dst.parent().unwrap())?;
            fs::write(&dst, b"PK")?;
        }
        self.state.lock().unwrap().downloaded.push(order.id.clone());
        Ok(vec![dst])
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

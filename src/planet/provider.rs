use super::responses::{OrderState, OrderStatus, SearchPage};
use crate::catalog::{Catalog, SceneRecord};
use crate::config::{ApiKey, ProviderConfig};
use crate::download;
use crate::error::Error;
use crate::filter::SearchFilter;
use crate::order::{DownloadOptions, OrderHandle, OrderRequest, OrderService};
use anyhow::Result;
use geojson::Geometry;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde_json::json;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;

/// Data API search and Orders API v2 over HTTPS.
pub struct Provider {
    client: Client,
    api_key: ApiKey,
    config: ProviderConfig,
}

impl Provider {
    pub fn new(api_key: ApiKey, config: ProviderConfig) -> Self {
        Self::with_client(Client::new(), api_key, config)
    }

    pub fn with_client(client: Client, api_key: ApiKey, mut config: ProviderConfig) -> Self {
        // base URLs are joined with relative paths
        for url in [&mut config.data_url, &mut config.orders_url] {
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
        }
        Self {
            client,
            api_key,
            config,
        }
    }

    fn authed(self: &Self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(self.api_key.secret().expose_secret(), Some(""))
    }

    fn search_url(self: &Self) -> Result<Url> {
        let mut url = self.config.data_url.join("quick-search")?;
        url.query_pairs_mut()
            .append_pair("_page_size", &self.config.page_size.to_string());
        Ok(url)
    }

    fn order_url(self: &Self, order_id: &str) -> Result<Url> {
        Ok(self.config.orders_url.join(order_id)?)
    }

    async fn order_status(self: &Self, order_id: &str) -> Result<OrderStatus> {
        let status = self
            .authed(self.client.get(self.order_url(order_id)?))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(status)
    }
}

/// Result names are relative paths; anything that could leave the download
/// directory is rejected.
fn result_path(directory: &Path, name: &str) -> Result<PathBuf, Error> {
    let relative = Path::new(name);
    let normal = relative.components().all(|c| matches!(c, Component::Normal(_)));
    if name.is_empty() || !normal {
        return Err(Error::UnsafeResultName(name.to_string()));
    }
    Ok(directory.join(relative))
}

impl Catalog for Provider {
    async fn search(
        self: &Self,
        item_types: &[String],
        geometry: &Geometry,
        filter: &SearchFilter,
    ) -> Result<Vec<SceneRecord>> {
        let body = json!({
            "item_types": item_types,
            "filter": filter,
            "geometry": geometry,
        });
        let mut page: SearchPage = self
            .authed(self.client.post(self.search_url()?))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut records = vec![];
        loop {
            records.append(&mut page.features);
            let Some(next) = page.links.next.take() else {
                break;
            };
            debug!("Fetching next page: {}", next);
            page = self
                .authed(self.client.get(next))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
        }
        Ok(records)
    }
}

impl OrderService for Provider {
    async fn create_order(self: &Self, request: &OrderRequest) -> Result<OrderHandle> {
        let status: OrderStatus = self
            .authed(self.client.post(self.config.orders_url.clone()))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!("Created order: {}", status.id);
        Ok(OrderHandle { id: status.id })
    }

    async fn wait(self: &Self, order: &OrderHandle) -> Result<()> {
        let mut last: Option<OrderState> = None;
        for attempt in 1..=self.config.max_poll_attempts {
            let status = self.order_status(&order.id).await?;
            if last != Some(status.state) {
                info!("Order {} is {}", order.id, status.state);
                last = Some(status.state);
            }
            match status.state {
                OrderState::Success => return Ok(()),
                OrderState::Partial => {
                    warn!("Order {} was only partially fulfilled", order.id);
                    return Ok(());
                }
                OrderState::Failed | OrderState::Cancelled => {
                    return Err(Error::OrderFailed {
                        order_id: order.id.clone(),
                        state: status.state.to_string(),
                    }
                    .into())
                }
                OrderState::Queued | OrderState::Running | OrderState::Unknown => {
                    if attempt < self.config.max_poll_attempts {
                        tokio::time::sleep(self.config.poll_interval()).await
                    }
                }
            }
        }
        Err(Error::OrderTimeout {
            order_id: order.id.clone(),
            attempts: self.config.max_poll_attempts,
        }
        .into())
    }

    async fn download_order(
        self: &Self,
        order: &OrderHandle,
        directory: &Path,
        options: &DownloadOptions,
    ) -> Result<Vec<PathBuf>> {
        let status = self.order_status(&order.id).await?;
        let destinations = status
            .links
            .results
            .iter()
            .map(|result| result_path(directory, &result.name))
            .collect::<Result<Vec<_>, _>>()?;

        let mut files = vec![];
        for (result, dst) in status.links.results.into_iter().zip(destinations) {
            let request = self.authed(self.client.get(result.location));
            download::download(request, &dst, options).await?;
            files.push(dst);
        }
        Ok(files)
    }
}

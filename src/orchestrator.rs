use crate::batch::MAX_ITEMS_PER_ORDER;
use crate::catalog::{self, Catalog};
use crate::config::{AcquisitionRequest, OutputOptions};
use crate::metadata;
use crate::order::OrderService;
use crate::order_plan::OrderPlan;
use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// How a run ended when nothing failed.
#[derive(Debug, PartialEq)]
pub enum RunOutcome {
    /// The search matched no scenes. Nothing was written or ordered and the
    /// download directory is not created.
    NoMatches,
    Completed {
        scenes: usize,
        orders: usize,
        metadata: PathBuf,
    },
}

/// Search, persist metadata, then submit, wait for and download every
/// (chunk, item type, bundle) order in turn.
///
/// The first failing order stops the run. With a ledger configured, the
/// plan on disk shows how far each order got.
pub async fn run(
    catalog: &impl Catalog,
    orders: &impl OrderService,
    request: &AcquisitionRequest,
    output: &OutputOptions,
) -> Result<RunOutcome> {
    info!(
        "Searching {} from {} to {}",
        request.item_types.join(", "),
        request.start_date,
        request.end_date
    );
    let aoi = request.aoi.resolve()?;
    let scenes = catalog::search_scenes(catalog, &aoi, &request.query()).await?;
    if scenes.is_empty() {
        return Ok(RunOutcome::NoMatches);
    }

    fs::create_dir_all(&output.download_dir)?;
    info!("Downloading to {}", output.download_dir.display());
    let metadata = metadata::persist(&scenes, &output.download_dir, output.metadata_format)?;

    let ids: Vec<String> = scenes.iter().map(|s| s.id.clone()).collect();
    let mut plan = OrderPlan::build(
        &ids,
        &request.item_types,
        &request.bundles,
        MAX_ITEMS_PER_ORDER,
        output.download_dir.clone(),
        output.download,
    )
    .with_provider(request.provider.clone());
    if let Some(ledger) = &output.ledger {
        plan = plan.with_ledger(ledger.clone());
    }
    info!("Placing {} orders", plan.tasks.len());
    plan.execute(orders).await?;

    Ok(RunOutcome::Completed {
        scenes: scenes.len(),
        orders: plan.tasks.len(),
        metadata,
    })
}

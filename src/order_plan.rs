use crate::batch;
use crate::config::ProviderConfig;
use crate::order::{DownloadOptions, OrderHandle, OrderRequest, OrderService};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Submitted { order_id: String },
    Ready { order_id: String },
    Downloaded { order_id: String, files: Vec<PathBuf> },
}

/// One (chunk, item type, bundle) combination.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct OrderTask {
    pub chunk: usize,
    pub item_type: String,
    pub bundle: String,
    pub item_ids: Vec<String>,
    pub status: TaskStatus,
}

impl OrderTask {
    pub fn new(chunk: usize, item_ids: &[String], item_type: &str, bundle: &str) -> Self {
        OrderTask {
            chunk,
            item_type: item_type.to_string(),
            bundle: bundle.to_string(),
            item_ids: item_ids.to_vec(),
            status: TaskStatus::Pending,
        }
    }

    pub fn request(&self) -> OrderRequest {
        OrderRequest::new(&self.item_ids, &self.item_type, &self.bundle)
    }
}

/// Every order of a run in submission order, along with how far each got.
///
/// When a ledger path is attached the plan is rewritten after every status
/// change, so an interrupted run can be picked up with [`OrderPlan::read`].
#[derive(Deserialize, Serialize, Debug)]
pub struct OrderPlan {
    pub download_dir: PathBuf,
    pub options: DownloadOptions,
    /// Endpoints and polling of the run, reused on resume.
    #[serde(default)]
    pub provider: ProviderConfig,
    pub tasks: Vec<OrderTask>,
    #[serde(skip)]
    ledger: Option<PathBuf>,
}

impl OrderPlan {
    /// Chunks `item_ids` and crosses each chunk with every item type and
    /// bundle, chunk outermost and bundle innermost.
    pub fn build(
        item_ids: &[String],
        item_types: &[String],
        bundles: &[String],
        max_items: NonZeroUsize,
        download_dir: PathBuf,
        options: DownloadOptions,
    ) -> Self {
        let mut tasks = vec![];
        for (n, chunk) in batch::chunk(item_ids, max_items).enumerate() {
            for item_type in item_types {
                for bundle in bundles {
                    tasks.push(OrderTask::new(n, chunk, item_type, bundle));
                }
            }
        }
        Self {
            download_dir,
            options,
            provider: ProviderConfig::default(),
            tasks,
            ledger: None,
        }
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_ledger(mut self, path: PathBuf) -> Self {
        self.ledger = Some(path);
        self
    }

    /// Loads a plan and keeps `path` as its ledger.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan.with_ledger(path.as_ref().to_path_buf()))
    }

    pub fn write<P: AsRef<Path>>(self: &Self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn checkpoint(self: &Self) -> Result<()> {
        match &self.ledger {
            Some(path) => self.write(path),
            None => Ok(()),
        }
    }

    pub fn pending(self: &Self) -> usize {
        self.tasks
            .iter()
            .filter(|t| !matches!(t.status, TaskStatus::Downloaded { .. }))
            .count()
    }

    /// Runs submit, wait and download for each task in turn.
    ///
    /// Downloaded tasks are skipped; submitted or ready tasks continue with
    /// their existing order instead of placing a new one. The first error
    /// stops the run, leaving later tasks untouched.
    pub async fn execute(self: &mut Self, orders: &impl OrderService) -> Result<()> {
        self.checkpoint()?;
        for i in 0..self.tasks.len() {
            let task = &self.tasks[i];
            info!(
                "Order {}/{}: chunk {} ({} items), {} / {}",
                i + 1,
                self.tasks.len(),
                task.chunk,
                task.item_ids.len(),
                task.item_type,
                task.bundle
            );

            let order = match task.status.clone() {
                TaskStatus::Downloaded { .. } => {
                    info!("Already downloaded, skipping");
                    continue;
                }
                TaskStatus::Pending => {
                    let handle = orders.create_order(&task.request()).await?;
                    info!("Created order: {}", handle.id);
                    self.set_status(i, TaskStatus::Submitted { order_id: handle.id.clone() })?;
                    self.wait_ready(i, orders, handle).await?
                }
                TaskStatus::Submitted { order_id } => {
                    self.wait_ready(i, orders, OrderHandle { id: order_id }).await?
                }
                TaskStatus::Ready { order_id } => OrderHandle { id: order_id },
            };

            let files = orders
                .download_order(&order, &self.download_dir, &self.options)
                .await?;
            info!("Downloaded order {} ({} files)", order.id, files.len());
            self.set_status(
                i,
                TaskStatus::Downloaded {
                    order_id: order.id,
                    files,
                },
            )?;
        }
        Ok(())
    }

    async fn wait_ready(
        self: &mut Self,
        i: usize,
        orders: &impl OrderService,
        order: OrderHandle,
    ) -> Result<OrderHandle> {
        // this may take several minutes
        orders.wait(&order).await?;
        self.set_status(i, TaskStatus::Ready { order_id: order.id.clone() })?;
        Ok(order)
    }

    fn set_status(self: &mut Self, i: usize, status: TaskStatus) -> Result<()> {
        self.tasks[i].status = status;
        self.checkpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockOrders;

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("scene_{i}")).collect()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn plan(n: usize, types: &[&str], bundles: &[&str], dir: &Path) -> OrderPlan {
        OrderPlan::build(
            &ids(n),
            &strings(types),
            &strings(bundles),
            batch::MAX_ITEMS_PER_ORDER,
            dir.to_path_buf(),
            DownloadOptions::default(),
        )
    }

    #[test]
    fn test_task_order_is_chunk_type_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let plan = plan(501, &["PSScene", "SkySatScene"], &["visual", "analytic_udm2"], dir.path());
        let order: Vec<(usize, &str, &str)> = plan
            .tasks
            .iter()
            .map(|t| (t.chunk, t.item_type.as_str(), t.bundle.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, "PSScene", "visual"),
                (0, "PSScene", "analytic_udm2"),
                (0, "SkySatScene", "visual"),
                (0, "SkySatScene", "analytic_udm2"),
                (1, "PSScene", "visual"),
                (1, "PSScene", "analytic_udm2"),
                (1, "SkySatScene", "visual"),
                (1, "SkySatScene", "analytic_udm2"),
            ]
        );
        assert_eq!(plan.tasks[0].item_ids.len(), 500);
        assert_eq!(plan.tasks[7].item_ids, vec!["scene_500".to_string()]);
    }

    #[test]
    fn test_no_bundles_means_no_tasks() {
        let dir = tempfile::tempdir().unwrap();
        assert!(plan(10, &["PSScene"], &[], dir.path()).tasks.is_empty());
        assert!(plan(10, &[], &["visual"], dir.path()).tasks.is_empty());
    }

    #[test]
    fn test_ledger_keeps_provider_settings() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("order-plan.json");
        let provider = ProviderConfig {
            orders_url: url::Url::parse("https://orders.example.com/v2/").unwrap(),
            poll_interval_secs: 5,
            max_poll_attempts: 12,
            ..ProviderConfig::default()
        };
        plan(3, &["PSScene"], &["visual"], dir.path())
            .with_provider(provider.clone())
            .write(&ledger)
            .unwrap();

        assert_eq!(OrderPlan::read(&ledger).unwrap().provider, provider);
    }

    #[test]
    fn test_ledger_without_provider_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("order-plan.json");
        let content = format!(
            r#"{{"download_dir": {:?}, "options": {{"overwrite": false, "show_progress": true}}, "tasks": []}}"#,
            dir.path().display().to_string()
        );
        fs::write(&ledger, content).unwrap();

        assert_eq!(OrderPlan::read(&ledger).unwrap().provider, ProviderConfig::default());
    }

    #[tokio::test]
    async fn test_execute_walks_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = plan(10, &["PSScene"], &["visual", "analytic_udm2"], dir.path());
        let orders = MockOrders::default();

        plan.execute(&orders).await.unwrap();

        assert_eq!(orders.created().len(), 2);
        assert_eq!(orders.waited(), vec!["order-1", "order-2"]);
        assert_eq!(orders.downloaded(), vec!["order-1", "order-2"]);
        assert_eq!(plan.pending(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_in_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("order-plan.json");
        let mut plan = plan(10, &["PSScene"], &["a", "b", "c"], dir.path()).with_ledger(ledger.clone());
        let orders = MockOrders::failing_wait(1);

        assert!(plan.execute(&orders).await.is_err());
        assert_eq!(orders.created().len(), 2);
        assert_eq!(orders.downloaded(), vec!["order-1"]);

        let saved = OrderPlan::read(&ledger).unwrap();
        assert!(matches!(saved.tasks[0].status, TaskStatus::Downloaded { .. }));
        assert_eq!(
            saved.tasks[1].status,
            TaskStatus::Submitted { order_id: "order-2".to_string() }
        );
        assert_eq!(saved.tasks[2].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_resume_reuses_submitted_orders() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = dir.path().join("order-plan.json");
        let mut plan = plan(10, &["PSScene"], &["a", "b", "c"], dir.path()).with_ledger(ledger.clone());
        plan.tasks[0].status = TaskStatus::Downloaded {
            order_id: "old-1".to_string(),
            files: vec![],
        };
        plan.tasks[1].status = TaskStatus::Submitted { order_id: "old-2".to_string() };
        plan.tasks[2].status = TaskStatus::Ready { order_id: "old-3".to_string() };
        plan.write(&ledger).unwrap();

        let mut resumed = OrderPlan::read(&ledger).unwrap();
        let orders = MockOrders::default();
        resumed.execute(&orders).await.unwrap();

        assert!(orders.created().is_empty());
        assert_eq!(orders.waited(), vec!["old-2"]);
        assert_eq!(orders.downloaded(), vec!["old-2", "old-3"]);
        assert_eq!(OrderPlan::read(&ledger).unwrap().pending(), 0);
    }
}

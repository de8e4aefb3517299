//! Background retry of failed object removals

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::db::repositories::OrphanedObjectRepository;
use crate::storage::ObjectStorage;

/// Records handled per sweep
const SWEEP_BATCH: i64 = 100;

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

/// Retries removal of recorded orphaned objects
pub struct OrphanSweeper {
    storage: Arc<dyn ObjectStorage>,
    orphans: Arc<dyn OrphanedObjectRepository>,
}

impl OrphanSweeper {
    pub fn new(storage: Arc<dyn ObjectStorage>, orphans: Arc<dyn OrphanedObjectRepository>) -> Self {
        Self { storage, orphans }
    }

    /// Try every recorded object once
    pub async fn sweep_once(&self) -> anyhow::Result<SweepReport> {
        let mut report = SweepReport::default();

        for orphan in self.orphans.list(SWEEP_BATCH).await? {
            match self.storage.remove(&[orphan.path.clone()]).await {
                Ok(()) => {
                    self.orphans.delete(orphan.id).await?;
                    report.removed += 1;
                }
                Err(e) => {
                    self.orphans.mark_failed(orphan.id, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        if report.removed + report.failed > 0 {
            tracing::info!(removed = report.removed, failed = report.failed, "Orphan sweep finished");
        }
        Ok(report)
    }

    /// Sweep on a fixed interval until the runtime shuts down
    pub fn spawn(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::error!("Orphan sweep failed: {:#}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxOrphanedObjectRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::models::OrphanReason;
    use crate::storage::MemoryObjectStorage;

    #[tokio::test]
    async fn test_sweep_removes_and_retries() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let storage = Arc::new(MemoryObjectStorage::default());
        let orphans = SqlxOrphanedObjectRepository::boxed(pool);
        let sweeper = OrphanSweeper::new(storage.clone(), orphans.clone());

        storage.insert("news/stale.png", b"x");
        orphans
            .record("news/stale.png", OrphanReason::Replaced, "timeout")
            .await
            .unwrap();

        storage.fail_removals(true);
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { removed: 0, failed: 1 });
        let pending = orphans.list(10).await.unwrap();
        assert_eq!(pending[0].attempts, 2);

        storage.fail_removals(false);
        let report = sweeper.sweep_once().await.unwrap();
        assert_eq!(report, SweepReport { removed: 1, failed: 0 });
        assert_eq!(orphans.count().await.unwrap(), 0);
        assert!(!storage.contains("news/stale.png"));
    }
}

//! Retention-based archival
//!
//! For each configured `(product, retention days)` pair, datasets created strictly
//! before `now - days` are archived together with their immediate lineage sources.
//! Sources are never followed further than one level, and archiving a source never
//! archives the datasets derived from it.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use datakube_common::{DatakubeError, ProductRef};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, sync::Arc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::index::{DatasetIndex, IndexResult};

/// Default time of day for the daily archive check.
pub const DEFAULT_ARCHIVE_CHECK_TIME: &str = "01:00";

/// Parse an `HH:MM` time of day
pub fn parse_check_time(raw: &str) -> Result<NaiveTime, DatakubeError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| {
        DatakubeError::Config(format!("invalid archive check time '{raw}' (expected HH:MM): {e}"))
    })
}

/// One retention rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivePolicy {
    pub product: ProductRef,
    pub retention_days: u32,
    pub daily_check_time: NaiveTime,
}

impl ArchivePolicy {
    pub fn new(product: impl Into<String>, retention_days: u32, daily_check_time: NaiveTime) -> Self {
        Self {
            product: ProductRef::new(product),
            retention_days,
            daily_check_time,
        }
    }

    /// Parse a `product:days` pair
    pub fn parse(raw: &str, daily_check_time: NaiveTime) -> Result<Self, DatakubeError> {
        let (product, days) = raw
            .rsplit_once(':')
            .ok_or_else(|| DatakubeError::InvalidArchivePolicy(format!("{raw} (expected product:days)")))?;

        let product = product.trim();
        if product.is_empty() {
            return Err(DatakubeError::InvalidArchivePolicy(format!("{raw} (empty product)")));
        }

        let retention_days = days.trim().parse::<u32>().map_err(|e| {
            DatakubeError::InvalidArchivePolicy(format!("{raw} (days must be a non-negative integer: {e})"))
        })?;

        Ok(Self::new(product, retention_days, daily_check_time))
    }

    /// Datasets created strictly before this instant are archived
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.retention_days))
    }
}

/// What one policy run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub product: Option<ProductRef>,
    /// Datasets older than the cutoff
    pub expired: usize,
    /// Everything archived, sources included
    pub archived: Vec<Uuid>,
}

/// Outcome of archiving the datasets at a list of locations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocationReport {
    pub locations: usize,
    pub archived: usize,
    pub failed: usize,
}

/// Runs archive policies against the index
#[derive(Clone)]
pub struct Archiver {
    index: Arc<dyn DatasetIndex>,
    refresh_dashboard: bool,
}

impl Archiver {
    pub fn new(index: Arc<dyn DatasetIndex>) -> Self {
        Self {
            index,
            refresh_dashboard: false,
        }
    }

    pub fn with_dashboard_refresh(mut self, enabled: bool) -> Self {
        self.refresh_dashboard = enabled;
        self
    }

    /// Apply one policy as of `now`
    #[instrument(skip(self, policy), fields(product = %policy.product, days = policy.retention_days))]
    pub async fn run_policy(&self, policy: &ArchivePolicy, now: DateTime<Utc>) -> IndexResult<ArchiveReport> {
        let cutoff = policy.cutoff(now);
        let expired: Vec<_> = self
            .index
            .search_datasets(&policy.product, DateTime::<Utc>::UNIX_EPOCH, cutoff)
            .await?
            .into_iter()
            .filter(|dataset| dataset.creation_time.is_some_and(|created| created < cutoff))
            .collect();

        let mut report = ArchiveReport {
            product: Some(policy.product.clone()),
            expired: expired.len(),
            archived: Vec::new(),
        };

        if expired.is_empty() {
            info!("No datasets to archive");
            return Ok(report);
        }

        let mut seen = HashSet::new();
        for dataset in &expired {
            for source in self.index.dataset_sources(dataset.id).await? {
                if seen.insert(source.id) {
                    report.archived.push(source.id);
                }
            }
            if seen.insert(dataset.id) {
                report.archived.push(dataset.id);
            }
        }

        info!(
            datasets = ?expired.iter().map(|d| d.id).collect::<Vec<_>>(),
            total = report.archived.len(),
            "Archiving datasets"
        );
        self.index.archive_datasets(&report.archived).await?;
        self.index.update_product_range(&policy.product).await?;

        if self.refresh_dashboard {
            if let Err(e) = self.index.refresh_dashboard(std::slice::from_ref(&policy.product)).await {
                warn!(error = %e, "Failed to refresh dashboard after archival");
            }
        }

        Ok(report)
    }

    /// Archive whatever the index holds at each location URI
    pub async fn archive_locations<I>(&self, locations: I) -> LocationReport
    where
        I: IntoIterator<Item = String>,
    {
        let mut report = LocationReport::default();

        for uri in locations {
            report.locations += 1;

            let datasets = match self.index.datasets_for_location(&uri).await {
                Ok(datasets) => datasets,
                Err(e) => {
                    error!(uri = %uri, error = %e, "Failed to look up datasets");
                    report.failed += 1;
                    continue;
                },
            };

            if datasets.is_empty() {
                warn!(uri = %uri, "No datasets at location");
                continue;
            }

            for dataset in datasets {
                match self.index.archive_datasets(&[dataset.id]).await {
                    Ok(()) => {
                        info!(uri = %uri, dataset_id = %dataset.id, "Archived dataset");
                        report.archived += 1;
                    },
                    Err(e) => {
                        error!(uri = %uri, dataset_id = %dataset.id, error = %e, "Failed to archive dataset");
                        report.failed += 1;
                    },
                }
            }
        }

        report
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::index::{IndexError, InMemoryIndex};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use datakube_common::{DatasetRef, SourcesPolicy};
    use serde_json::Value;

    /// Delegates to an in-memory index but fails every search for one product
    struct BrokenProduct {
        inner: Arc<InMemoryIndex>,
        broken: ProductRef,
    }

    #[async_trait]
    impl DatasetIndex for BrokenProduct {
        async fn add_dataset(&self, doc: &Value, uri: &str, policy: SourcesPolicy) -> IndexResult<DatasetRef> {
            self.inner.add_dataset(doc, uri, policy).await
        }

        async fn search_datasets(
            &self,
            product: &ProductRef,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> IndexResult<Vec<DatasetRef>> {
            if product == &self.broken {
                return Err(IndexError::Rejected("search unavailable".to_string()));
            }
            self.inner.search_datasets(product, from, to).await
        }

        async fn dataset_sources(&self, id: Uuid) -> IndexResult<Vec<DatasetRef>> {
            self.inner.dataset_sources(id).await
        }

        async fn archive_datasets(&self, ids: &[Uuid]) -> IndexResult<()> {
            self.inner.archive_datasets(ids).await
        }

        async fn datasets_for_location(&self, uri: &str) -> IndexResult<Vec<DatasetRef>> {
            self.inner.datasets_for_location(uri).await
        }

        async fn update_product_range(&self, product: &ProductRef) -> IndexResult<()> {
            self.inner.update_product_range(product).await
        }

        async fn refresh_dashboard(&self, products: &[ProductRef]) -> IndexResult<()> {
            self.inner.refresh_dashboard(products).await
        }
    }

    fn check_time() -> NaiveTime {
        parse_check_time("01:00").unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap()
    }

    fn dataset(product: &str, age_days: i64) -> DatasetRef {
        DatasetRef::new(Uuid::new_v4(), ProductRef::new(product))
            .with_creation_time(now() - Duration::days(age_days))
    }

    #[test]
    fn test_parse_policy() {
        let policy = ArchivePolicy::parse("s2_nrt_wofs:30", check_time()).unwrap();
        assert_eq!(policy.product.name(), "s2_nrt_wofs");
        assert_eq!(policy.retention_days, 30);

        assert!(ArchivePolicy::parse("s2_nrt_wofs", check_time()).is_err());
        assert!(ArchivePolicy::parse("s2_nrt_wofs:-1", check_time()).is_err());
        assert!(ArchivePolicy::parse(":30", check_time()).is_err());
        assert!(ArchivePolicy::parse("wofs:thirty", check_time()).is_err());
    }

    #[test]
    fn test_parse_check_time() {
        assert_eq!(parse_check_time("01:00").unwrap(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
        assert_eq!(parse_check_time("23:59").unwrap(), NaiveTime::from_hms_opt(23, 59, 0).unwrap());
        assert!(parse_check_time("25:00").is_err());
        assert!(parse_check_time("1am").is_err());
    }

    #[tokio::test]
    async fn test_only_expired_datasets_and_their_sources_are_archived() {
        let index = Arc::new(InMemoryIndex::new());
        let source = dataset("s2_ard_granule", 45);
        let fresh = dataset("s2_nrt_wofs", 10);
        let stale = dataset("s2_nrt_wofs", 40);
        let fresh_source = dataset("s2_ard_granule", 12);
        index.insert(source.clone(), None, &[]);
        index.insert(fresh_source.clone(), None, &[]);
        index.insert(fresh.clone(), None, &[fresh_source.id]);
        index.insert(stale.clone(), None, &[source.id]);

        let archiver = Archiver::new(index.clone());
        let policy = ArchivePolicy::new("s2_nrt_wofs", 30, check_time());
        let report = archiver.run_policy(&policy, now()).await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.archived, vec![source.id, stale.id]);
        assert!(index.is_archived(stale.id));
        assert!(index.is_archived(source.id));
        assert!(!index.is_archived(fresh.id));
        assert!(!index.is_archived(fresh_source.id));
        assert_eq!(index.range_updates(), vec![ProductRef::new("s2_nrt_wofs")]);
    }

    #[tokio::test]
    async fn test_archiving_a_source_never_archives_derived_datasets() {
        let index = Arc::new(InMemoryIndex::new());
        let source = dataset("s2_ard_granule", 40);
        let derived = dataset("s2_nrt_wofs", 5);
        index.insert(source.clone(), None, &[]);
        index.insert(derived.clone(), None, &[source.id]);

        let policy = ArchivePolicy::new("s2_ard_granule", 30, check_time());
        Archiver::new(index.clone()).run_policy(&policy, now()).await.unwrap();

        assert!(index.is_archived(source.id));
        assert!(!index.is_archived(derived.id));
    }

    #[tokio::test]
    async fn test_shared_sources_are_archived_once() {
        let index = Arc::new(InMemoryIndex::new());
        let source = dataset("s2_ard_granule", 60);
        let first = dataset("s2_nrt_wofs", 50);
        let second = dataset("s2_nrt_wofs", 40);
        index.insert(source.clone(), None, &[]);
        index.insert(first.clone(), None, &[source.id]);
        index.insert(second.clone(), None, &[source.id]);

        let policy = ArchivePolicy::new("s2_nrt_wofs", 30, check_time());
        let report = Archiver::new(index.clone()).run_policy(&policy, now()).await.unwrap();

        assert_eq!(report.archived.len(), 3);
        assert_eq!(index.archive_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_expired_is_a_no_op() {
        let index = Arc::new(InMemoryIndex::new());
        index.insert(dataset("s2_nrt_wofs", 10), None, &[]);

        let policy = ArchivePolicy::new("s2_nrt_wofs", 30, check_time());
        let report = Archiver::new(index.clone()).run_policy(&policy, now()).await.unwrap();

        assert_eq!(report.expired, 0);
        assert!(index.archive_calls().is_empty());
        assert!(index.range_updates().is_empty());
    }

    #[tokio::test]
    async fn test_dataset_exactly_at_cutoff_is_kept() {
        let index = Arc::new(InMemoryIndex::new());
        let boundary = dataset("s2_nrt_wofs", 30);
        index.insert(boundary.clone(), None, &[]);

        let policy = ArchivePolicy::new("s2_nrt_wofs", 30, check_time());
        Archiver::new(index.clone()).run_policy(&policy, now()).await.unwrap();

        assert!(!index.is_archived(boundary.id));
    }

    #[tokio::test]
    async fn test_failing_policy_does_not_block_others() {
        let index = Arc::new(InMemoryIndex::new());
        let stale = dataset("s2_nrt_wofs", 40);
        index.insert(stale.clone(), None, &[]);

        let broken = Arc::new(BrokenProduct {
            inner: index.clone(),
            broken: ProductRef::new("s2_nrt_fc"),
        });

        let archiver = Archiver::new(broken).with_dashboard_refresh(true);
        let failed = archiver
            .run_policy(&ArchivePolicy::new("s2_nrt_fc", 30, check_time()), now())
            .await;
        let report = archiver
            .run_policy(&ArchivePolicy::new("s2_nrt_wofs", 30, check_time()), now())
            .await
            .unwrap();

        assert!(failed.is_err());
        assert_eq!(report.product, Some(ProductRef::new("s2_nrt_wofs")));
        assert!(index.is_archived(stale.id));
        assert_eq!(index.dashboard_refreshes(), vec![vec![ProductRef::new("s2_nrt_wofs")]]);
    }

    #[tokio::test]
    async fn test_archive_locations_counts_outcomes() {
        let index = Arc::new(InMemoryIndex::new());
        let registered = dataset("ls8_usgs_level1", 3);
        index.insert(registered.clone(), Some("s3://deafrica-data/usgs/a.xml"), &[]);

        let report = Archiver::new(index.clone())
            .archive_locations(vec![
                "s3://deafrica-data/usgs/a.xml".to_string(),
                "s3://deafrica-data/usgs/missing.xml".to_string(),
            ])
            .await;

        assert_eq!(
            report,
            LocationReport {
                locations: 2,
                archived: 1,
                failed: 0
            }
        );
        assert!(index.is_archived(registered.id));
    }
}

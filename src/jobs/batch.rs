//! Page-at-a-time processing of large record sets.
//!
//! Each page is fetched after the cursor of the previous page, processed
//! item by item into one [`ChangeSet`] and committed before the next fetch.
//! The cursor lives only for one run: a rerun starts from the beginning and
//! relies on the fetch filter to exclude records already handled.

use std::fmt::Display;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::jobs::types::JobSummary;
use crate::repositories::{ChangeSet, UnitOfWork};

/// A record set walked by [`BatchProcessor`].
#[async_trait]
pub trait PagedWork: Send + Sync {
    type Item: Send + Sync;
    type Cursor: Clone + Display + Send + Sync;

    /// Up to `limit` items ordered by cursor, strictly after `after`.
    async fn fetch(&self, after: Option<&Self::Cursor>, limit: i64) -> AppResult<Vec<Self::Item>>;

    fn cursor(&self, item: &Self::Item) -> Self::Cursor;

    /// Stages the mutations for one item. An error discards only this
    /// item's staged changes.
    async fn process(&self, item: &Self::Item, changes: &mut ChangeSet) -> AppResult<()>;

    /// Runs after the page commit for the items that processed cleanly.
    /// Failures here cannot undo the commit.
    async fn after_commit(&self, _items: &[&Self::Item]) {}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub pages: usize,
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl From<BatchReport> for JobSummary {
    fn from(report: BatchReport) -> Self {
        JobSummary {
            processed: report.succeeded,
            failed: report.failed,
            cancelled: report.cancelled,
            note: Some(format!("{} page(s)", report.pages)),
        }
    }
}

pub struct BatchProcessor {
    unit_of_work: Arc<dyn UnitOfWork>,
    page_size: i64,
    max_items: Option<i64>,
    cancellation: CancellationToken,
}

impl BatchProcessor {
    pub fn new(unit_of_work: Arc<dyn UnitOfWork>, page_size: i64) -> Self {
        Self {
            unit_of_work,
            page_size: page_size.max(1),
            max_items: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Caps the number of items fetched over the whole run.
    pub fn with_max_items(mut self, max_items: i64) -> Self {
        self.max_items = Some(max_items.max(0));
        self
    }

    /// Checked before every page, never mid-page.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub async fn run<W: PagedWork>(&self, work: &W) -> AppResult<BatchReport> {
        let mut report = BatchReport::default();
        let mut cursor: Option<W::Cursor> = None;

        loop {
            if self.cancellation.is_cancelled() {
                tracing::info!(pages = report.pages, "Cancellation requested, stopping between pages");
                report.cancelled = true;
                break;
            }

            let limit = match self.max_items {
                Some(max) => self.page_size.min(max - report.fetched as i64),
                None => self.page_size,
            };
            if limit <= 0 {
                break;
            }

            let items = work.fetch(cursor.as_ref(), limit).await?;
            report.pages += 1;
            report.fetched += items.len();

            let mut changes = ChangeSet::default();
            let mut committed = Vec::with_capacity(items.len());
            for item in &items {
                let mut staged = ChangeSet::default();
                match work.process(item, &mut staged).await {
                    Ok(()) => {
                        changes.merge(staged);
                        committed.push(item);
                    }
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(item = %work.cursor(item), error = %e, "Item failed, continuing with page");
                    }
                }
            }

            let staged = changes.len();
            self.unit_of_work.commit(changes).await?;
            report.succeeded += committed.len();
            tracing::debug!(page = report.pages, fetched = items.len(), staged, "Page committed");

            work.after_commit(&committed).await;

            if (items.len() as i64) < limit {
                break;
            }
            cursor = items.last().map(|item| work.cursor(item));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::BetaFeatureAccess;
    use crate::repositories::MemoryStore;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    /// Integers in a set; processing an item removes it from the set once
    /// the page commits, the way a "not yet handled" filter behaves.
    struct NumberWork {
        pending: Mutex<BTreeSet<u32>>,
        bad: BTreeSet<u32>,
        fetch_sizes: Mutex<Vec<i64>>,
        processed: Mutex<Vec<u32>>,
    }

    impl NumberWork {
        fn new(count: u32) -> Self {
            Self {
                pending: Mutex::new((0..count).collect()),
                bad: BTreeSet::new(),
                fetch_sizes: Mutex::new(Vec::new()),
                processed: Mutex::new(Vec::new()),
            }
        }

        fn with_bad(mut self, bad: impl IntoIterator<Item = u32>) -> Self {
            self.bad = bad.into_iter().collect();
            self
        }
    }

    #[async_trait]
    impl PagedWork for NumberWork {
        type Item = u32;
        type Cursor = u32;

        async fn fetch(&self, after: Option<&u32>, limit: i64) -> AppResult<Vec<u32>> {
            self.fetch_sizes.lock().unwrap().push(limit);
            Ok(self
                .pending
                .lock()
                .unwrap()
                .iter()
                .copied()
                .filter(|n| after.is_none_or(|after| n > after))
                .take(limit as usize)
                .collect())
        }

        fn cursor(&self, item: &u32) -> u32 {
            *item
        }

        async fn process(&self, item: &u32, changes: &mut ChangeSet) -> AppResult<()> {
            changes.grant(BetaFeatureAccess {
                hdid: item.to_string(),
                feature: "f".to_string(),
                created_at: Utc::now(),
            });
            if self.bad.contains(item) {
                return Err(AppError::Validation {
                    field: "item".to_string(),
                    reason: "malformed".to_string(),
                });
            }
            Ok(())
        }

        async fn after_commit(&self, items: &[&u32]) {
            let mut pending = self.pending.lock().unwrap();
            let mut processed = self.processed.lock().unwrap();
            for item in items {
                pending.remove(*item);
                processed.push(**item);
            }
        }
    }

    fn processor(store: &Arc<MemoryStore>, page_size: i64) -> BatchProcessor {
        BatchProcessor::new(store.clone(), page_size)
    }

    #[tokio::test]
    async fn test_user_count_caps_fetch_sizes() {
        let store = Arc::new(MemoryStore::new());
        let work = NumberWork::new(100);

        let report = processor(&store, 10).with_max_items(25).run(&work).await.unwrap();

        assert_eq!(*work.fetch_sizes.lock().unwrap(), vec![10, 10, 5]);
        assert_eq!(report.fetched, 25);
        assert_eq!(report.pages, 3);
        assert_eq!(store.commit_count().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_short_page_ends_run() {
        let store = Arc::new(MemoryStore::new());
        let work = NumberWork::new(23);

        let report = processor(&store, 10).run(&work).await.unwrap();

        assert_eq!(*work.fetch_sizes.lock().unwrap(), vec![10, 10, 10]);
        assert_eq!(report.succeeded, 23);
        assert!(!report.cancelled);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_fetch() {
        let store = Arc::new(MemoryStore::new());
        let work = NumberWork::new(20);

        let report = processor(&store, 10).run(&work).await.unwrap();

        assert_eq!(report.pages, 3);
        assert_eq!(report.succeeded, 20);
        // the empty page stages nothing and commits nothing
        assert_eq!(store.commit_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_one_bad_item_does_not_sink_the_page() {
        let store = Arc::new(MemoryStore::new());
        let work = NumberWork::new(10).with_bad([4]);

        let report = processor(&store, 10).run(&work).await.unwrap();

        assert_eq!(report.succeeded, 9);
        assert_eq!(report.failed, 1);
        assert_eq!(store.beta_grant_count().unwrap(), 9);
        assert!(!store.has_feature("4", "f").unwrap());
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_pages() {
        let store = Arc::new(MemoryStore::new());
        let work = NumberWork::new(50);
        let token = CancellationToken::new();
        token.cancel();

        let report = processor(&store, 10)
            .with_cancellation(token)
            .run(&work)
            .await
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.pages, 0);
        assert!(work.fetch_sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_aborts_run() {
        let store = Arc::new(MemoryStore::new());
        store.fail_commits(true).unwrap();
        let work = NumberWork::new(5);

        let err = processor(&store, 10).run(&work).await.unwrap_err();

        assert!(err.is_transient());
        assert!(work.processed.lock().unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn prop_repeated_runs_process_everything_once(
            count in 0u32..200,
            page_size in 1i64..40,
            cap in proptest::option::of(1i64..60),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let store = Arc::new(MemoryStore::new());
            let work = NumberWork::new(count);

            runtime.block_on(async {
                for _ in 0..=count {
                    if work.pending.lock().unwrap().is_empty() {
                        break;
                    }
                    let mut processor = processor(&store, page_size);
                    if let Some(cap) = cap {
                        processor = processor.with_max_items(cap);
                    }
                    processor.run(&work).await.unwrap();
                }
            });

            let mut processed = work.processed.lock().unwrap().clone();
            prop_assert_eq!(processed.len(), count as usize);
            processed.sort_unstable();
            processed.dedup();
            prop_assert_eq!(processed.len(), count as usize);
        }
    }
}

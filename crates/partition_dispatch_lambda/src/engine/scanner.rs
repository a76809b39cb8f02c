use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use tracing::{debug, error, Span};

use crate::adapters::delay::Delay;
use crate::adapters::store::{PageFetcher, StoreError};
use crate::runtime::contract::{PartitionQuery, Record};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("partition scan failed on page {page_index}: {source}")]
pub struct ScanError {
    pub page_index: usize,
    #[source]
    pub source: StoreError,
}

enum Position<C> {
    Start,
    Resume(C),
    Exhausted,
}

/// Drives a [`PageFetcher`] from the first page until the store stops
/// returning a cursor.
///
/// Pages are requested strictly one after another. A failing page ends the
/// stream with a [`ScanError`] and nothing after it is fetched.
pub struct PartitionScanner<F> {
    fetcher: Arc<F>,
    delay: Arc<dyn Delay>,
    page_delay: Duration,
    span: Span,
}

impl<F: PageFetcher> PartitionScanner<F> {
    pub fn new(fetcher: Arc<F>, delay: Arc<dyn Delay>, page_delay: Duration, span: Span) -> Self {
        Self {
            fetcher,
            delay,
            page_delay,
            span,
        }
    }

    pub fn scan<'a>(
        &'a self,
        query: &'a PartitionQuery,
    ) -> impl Stream<Item = Result<Record, ScanError>> + Send + 'a {
        stream::try_unfold(
            (Position::Start, 0usize),
            move |(position, page_index)| async move {
                let cursor = match position {
                    Position::Start => None,
                    Position::Resume(cursor) => Some(cursor),
                    Position::Exhausted => return Ok(None),
                };

                if cursor.is_some() && !self.page_delay.is_zero() {
                    self.delay.wait(self.page_delay).await;
                }

                let page = self
                    .fetcher
                    .fetch_page(query, cursor)
                    .await
                    .map_err(|source| {
                        error!(parent: &self.span, page_index, error = %source, "scan_failed");
                        ScanError { page_index, source }
                    })?;

                let has_more = page.cursor.is_some();
                debug!(
                    parent: &self.span,
                    page_index,
                    record_count = page.records.len(),
                    has_more,
                    "page_fetched"
                );

                let next = match page.cursor {
                    Some(cursor) => Position::Resume(cursor),
                    None => Position::Exhausted,
                };
                Ok(Some((page.records, (next, page_index + 1))))
            },
        )
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, ScanError>)))
        .try_flatten()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::adapters::store::Page;

    use super::*;

    struct ScriptedFetcher {
        pages: Mutex<VecDeque<Result<Page<usize>, StoreError>>>,
        cursors_seen: Mutex<Vec<Option<usize>>>,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Result<Page<usize>, StoreError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                cursors_seen: Mutex::new(Vec::new()),
            }
        }

        fn cursors_seen(&self) -> Vec<Option<usize>> {
            self.cursors_seen.lock().expect("poisoned mutex").clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        type Cursor = usize;

        async fn fetch_page(
            &self,
            _query: &PartitionQuery,
            cursor: Option<usize>,
        ) -> Result<Page<usize>, StoreError> {
            self.cursors_seen
                .lock()
                .expect("poisoned mutex")
                .push(cursor);
            self.pages
                .lock()
                .expect("poisoned mutex")
                .pop_front()
                .expect("scanner requested more pages than scripted")
        }
    }

    struct RecordingDelay {
        waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Delay for RecordingDelay {
        async fn wait(&self, duration: Duration) {
            self.waits.lock().expect("poisoned mutex").push(duration);
        }
    }

    fn records(range: std::ops::Range<usize>) -> Vec<Record> {
        range
            .map(|index| {
                let mut record = Record::new();
                record.insert("userId".to_string(), Value::from(index));
                record
            })
            .collect()
    }

    fn query() -> PartitionQuery {
        PartitionQuery::new("contest_123", "selection_winner", "1").expect("query should pass")
    }

    fn scanner(
        fetcher: Arc<ScriptedFetcher>,
        delay: Arc<RecordingDelay>,
    ) -> PartitionScanner<ScriptedFetcher> {
        PartitionScanner::new(fetcher, delay, Duration::ZERO, Span::none())
    }

    fn no_delay() -> Arc<RecordingDelay> {
        Arc::new(RecordingDelay {
            waits: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn follows_cursors_until_exhausted() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(Page::with_cursor(records(0..3), 10)),
            Ok(Page::with_cursor(records(3..5), 20)),
            Ok(Page::last(records(5..6))),
        ]));
        let scanner = scanner(Arc::clone(&fetcher), no_delay());
        let query = query();

        let scanned: Vec<Record> = scanner
            .scan(&query)
            .try_collect()
            .await
            .expect("scan should succeed");

        assert_eq!(scanned, records(0..6));
        assert_eq!(fetcher.cursors_seen(), vec![None, Some(10), Some(20)]);
    }

    #[tokio::test]
    async fn empty_pages_with_cursor_keep_scanning() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(Page::with_cursor(Vec::new(), 1)),
            Ok(Page::last(records(0..2))),
        ]));
        let scanner = scanner(Arc::clone(&fetcher), no_delay());
        let query = query();

        let scanned: Vec<Record> = scanner
            .scan(&query)
            .try_collect()
            .await
            .expect("scan should succeed");

        assert_eq!(scanned.len(), 2);
        assert_eq!(fetcher.cursors_seen().len(), 2);
    }

    #[tokio::test]
    async fn store_error_aborts_without_fetching_further_pages() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(Page::with_cursor(records(0..2), 1)),
            Err(StoreError::Query("ProvisionedThroughputExceeded".to_string())),
            Ok(Page::last(records(2..4))),
        ]));
        let scanner = scanner(Arc::clone(&fetcher), no_delay());
        let query = query();

        let error = scanner
            .scan(&query)
            .try_collect::<Vec<Record>>()
            .await
            .expect_err("scan should fail");

        assert_eq!(error.page_index, 1);
        assert!(error.to_string().contains("ProvisionedThroughputExceeded"));
        assert_eq!(fetcher.cursors_seen(), vec![None, Some(1)]);
    }

    #[tokio::test]
    async fn page_delay_applies_between_pages_only() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            Ok(Page::with_cursor(records(0..1), 1)),
            Ok(Page::with_cursor(records(1..2), 2)),
            Ok(Page::last(records(2..3))),
        ]));
        let delay = no_delay();
        let scanner = PartitionScanner::new(
            Arc::clone(&fetcher),
            Arc::clone(&delay) as Arc<dyn Delay>,
            Duration::from_millis(250),
            Span::none(),
        );
        let query = query();

        let scanned: Vec<Record> = scanner
            .scan(&query)
            .try_collect()
            .await
            .expect("scan should succeed");

        assert_eq!(scanned.len(), 3);
        assert_eq!(
            *delay.waits.lock().expect("poisoned mutex"),
            vec![Duration::from_millis(250); 2]
        );
    }
}

//! Per-message unit of work: decode, match, persist.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::dispatcher::BoundedDispatcher;
use crate::error::{DispatchError, ProcessError, StoreError};
use crate::listener::MessageHandler;
use crate::matcher::{match_brands, BrandSet};
use crate::metrics;
use crate::models::StoryEvent;
use crate::repository::{MentionStore, UpsertOutcome};
use crate::retry::RetryPolicy;

/// Outcome of processing one story message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    pub story_id: i64,
    /// Mentions emitted by the matcher, duplicates included
    pub detected: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

impl ProcessReport {
    fn new(story_id: i64, detected: usize) -> Self {
        Self {
            story_id,
            detected,
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct Processor {
    brands: Arc<BrandSet>,
    store: Arc<dyn MentionStore>,
    retry: RetryPolicy,
}

impl Processor {
    pub fn new(brands: Arc<BrandSet>, store: Arc<dyn MentionStore>) -> Self {
        Self {
            brands,
            store,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn brands(&self) -> &BrandSet {
        &self.brands
    }

    /// Process one raw story message.
    ///
    /// Only a decode failure is returned as an error. Every detected mention is
    /// written independently; a failed write is logged and counted in the report
    /// without stopping the remaining writes.
    pub async fn process(&self, payload: &[u8]) -> Result<ProcessReport, ProcessError> {
        let event: StoryEvent = serde_json::from_slice(payload)?;

        let mentions = match_brands(&event.title, event.id, &self.brands);
        let mut report = ProcessReport::new(event.id, mentions.len());

        if mentions.is_empty() {
            debug!(story_id = event.id, "No brand mentions in story title");
            metrics::record_message("no_mentions");
            return Ok(report);
        }

        for mention in &mentions {
            let result = self
                .retry
                .run(|| self.store.upsert(mention), StoreError::is_transient)
                .await;

            match result {
                Ok(UpsertOutcome::Inserted) => {
                    report.inserted += 1;
                    metrics::record_mention_write("inserted");
                }
                Ok(UpsertOutcome::AlreadyExists) => {
                    report.duplicates += 1;
                    metrics::record_mention_write("duplicate");
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::record_mention_write("failed");
                    error!(
                        brand = %mention.brand,
                        story_id = mention.story_id,
                        error = %e,
                        "Failed to store brand mention"
                    );
                }
            }
        }

        metrics::record_message("matched");
        info!(
            story_id = report.story_id,
            detected = report.detected,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failed,
            "Processed story"
        );

        Ok(report)
    }
}

/// Bridges the listener to the worker pool: each message becomes one task.
pub struct DispatchingHandler {
    processor: Processor,
    dispatcher: Arc<BoundedDispatcher>,
}

impl DispatchingHandler {
    pub fn new(processor: Processor, dispatcher: Arc<BoundedDispatcher>) -> Self {
        Self {
            processor,
            dispatcher,
        }
    }
}

#[async_trait]
impl MessageHandler for DispatchingHandler {
    async fn on_message(&self, payload: Vec<u8>) -> Result<(), DispatchError> {
        let processor = self.processor.clone();

        let submitted = self
            .dispatcher
            .submit(async move {
                if let Err(e) = processor.process(&payload).await {
                    metrics::record_message("decode_failed");
                    warn!(
                        error = %e,
                        payload_len = payload.len(),
                        "Dropping undecodable story message"
                    );
                }
            })
            .await;

        if let Err(e) = &submitted {
            metrics::record_message("rejected");
            debug!(error = %e, "Story message not dispatched");
        }

        submitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BrandMention;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Stores pairs in memory; brands listed in `failing` always error
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashSet<(String, i64)>>,
        attempts: Mutex<Vec<String>>,
        failing: HashSet<String>,
    }

    #[async_trait]
    impl MentionStore for MemoryStore {
        async fn upsert(&self, mention: &BrandMention) -> Result<UpsertOutcome, StoreError> {
            self.attempts.lock().unwrap().push(mention.brand.clone());
            if self.failing.contains(&mention.brand) {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            let inserted = self
                .rows
                .lock()
                .unwrap()
                .insert((mention.brand.clone(), mention.story_id));
            Ok(if inserted {
                UpsertOutcome::Inserted
            } else {
                UpsertOutcome::AlreadyExists
            })
        }
    }

    fn processor(store: Arc<MemoryStore>) -> Processor {
        Processor::new(Arc::new(BrandSet::new(["apple", "google", "rust"])), store)
    }

    #[tokio::test]
    async fn test_process_stores_each_mention() {
        let store = Arc::new(MemoryStore::default());
        let report = processor(store.clone())
            .process(br#"{"id": 42, "title": "Apple and Google Announce Partnership", "url": ""}"#)
            .await
            .unwrap();

        assert_eq!(
            report,
            ProcessReport {
                story_id: 42,
                detected: 2,
                inserted: 2,
                duplicates: 0,
                failed: 0,
            }
        );
        assert_eq!(*store.attempts.lock().unwrap(), vec!["apple", "google"]);
    }

    #[tokio::test]
    async fn test_repeated_brand_collapses_to_one_row() {
        let store = Arc::new(MemoryStore::default());
        let report = processor(store.clone())
            .process(br#"{"id": 9, "title": "Rust vs Go: why Rust wins"}"#)
            .await
            .unwrap();

        assert_eq!(report.detected, 2);
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(store.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_stop_remaining_mentions() {
        let store = Arc::new(MemoryStore {
            failing: HashSet::from(["apple".to_string()]),
            ..Default::default()
        });
        let report = processor(store.clone())
            .process(br#"{"id": 5, "title": "Apple sues Google"}"#)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.inserted, 1);
        assert_eq!(*store.attempts.lock().unwrap(), vec!["apple", "google"]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_when_enabled() {
        let store = Arc::new(MemoryStore {
            failing: HashSet::from(["apple".to_string()]),
            ..Default::default()
        });
        let report = processor(store.clone())
            .with_retry(RetryPolicy {
                max_retries: 2,
                initial_backoff: std::time::Duration::from_millis(1),
                jitter: false,
                ..Default::default()
            })
            .process(br#"{"id": 5, "title": "Apple"}"#)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(store.attempts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_no_mentions_is_success() {
        let store = Arc::new(MemoryStore::default());
        let report = processor(store.clone())
            .process(br#"{"id": 1, "title": "pineapple juice"}"#)
            .await
            .unwrap();

        assert_eq!(report, ProcessReport::new(1, 0));
        assert!(store.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload_is_decode_error() {
        let store = Arc::new(MemoryStore::default());
        let p = processor(store.clone());

        assert!(matches!(
            p.process(b"not json").await,
            Err(ProcessError::Decode(_))
        ));
        assert!(matches!(
            p.process(br#"{"title": "Apple"}"#).await,
            Err(ProcessError::Decode(_))
        ));
        assert!(store.attempts.lock().unwrap().is_empty());
    }
}

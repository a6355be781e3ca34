//! Mention persistence
//!
//! The pipeline only depends on [`MentionStore`]; the PostgreSQL implementation
//! relies on the unique index over `(brand, story_id)` so that redelivered stories
//! and repeated keywords collapse into a single row.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{BrandMention, StoredBrandMention};

/// Maximum brand length accepted by the `brand_mentions.brand` column
const MAX_BRAND_LEN: usize = 255;

/// Result of an idempotent mention write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First time this (brand, story_id) pair was seen
    Inserted,
    /// Pair already stored; nothing changed
    AlreadyExists,
}

/// Idempotent sink for detected mentions.
///
/// Implementations must be safe to call concurrently from every worker and must
/// report an existing pair as [`UpsertOutcome::AlreadyExists`], never as an error.
#[async_trait]
pub trait MentionStore: Send + Sync {
    async fn upsert(&self, mention: &BrandMention) -> Result<UpsertOutcome, StoreError>;
}

/// PostgreSQL-backed mention store sharing one connection pool across workers
#[derive(Clone)]
pub struct PgMentionStore {
    pool: PgPool,
}

impl PgMentionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// All mentions recorded for a story, oldest first
    pub async fn list_for_story(
        &self,
        story_id: i64,
    ) -> Result<Vec<StoredBrandMention>, StoreError> {
        let rows = sqlx::query_as::<_, StoredBrandMention>(
            r#"
            SELECT id, brand, story_id, created_at
            FROM brand_mentions
            WHERE story_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(story_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Total number of stored mentions
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM brand_mentions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn validate_mention(mention: &BrandMention) -> Result<(), StoreError> {
    if mention.brand.is_empty() {
        return Err(StoreError::InvalidMention(
            "brand cannot be empty".to_string(),
        ));
    }

    if mention.brand.len() > MAX_BRAND_LEN {
        return Err(StoreError::InvalidMention(format!(
            "brand too long: {} bytes (max {})",
            mention.brand.len(),
            MAX_BRAND_LEN
        )));
    }

    Ok(())
}

#[async_trait]
impl MentionStore for PgMentionStore {
    async fn upsert(&self, mention: &BrandMention) -> Result<UpsertOutcome, StoreError> {
        validate_mention(mention)?;

        // ON CONFLICT DO NOTHING: a duplicate pair affects zero rows instead of failing
        let result = sqlx::query(
            r#"
            INSERT INTO brand_mentions (brand, story_id)
            VALUES ($1, $2)
            ON CONFLICT (brand, story_id) DO NOTHING
            "#,
        )
        .bind(&mention.brand)
        .bind(mention.story_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(
                brand = %mention.brand,
                story_id = mention.story_id,
                "Brand mention stored"
            );
            Ok(UpsertOutcome::Inserted)
        } else {
            debug!(
                brand = %mention.brand,
                story_id = mention.story_id,
                "Brand mention already stored (duplicate)"
            );
            Ok(UpsertOutcome::AlreadyExists)
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Story published/updated event as delivered by the fetcher
///
/// Expected format:
/// ```json
/// {
///   "id": 41234567,
///   "title": "Apple and Google Announce Partnership",
///   "url": "https://example.com/story"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEvent {
    /// Story identifier, unique upstream
    pub id: i64,
    /// Story title; may be empty
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// A brand keyword found as a whole token in a story title
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrandMention {
    pub brand: String,
    pub story_id: i64,
}

impl BrandMention {
    pub fn new(brand: impl Into<String>, story_id: i64) -> Self {
        Self {
            brand: brand.into(),
            story_id,
        }
    }
}

/// Persisted row in `brand_mentions`
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredBrandMention {
    pub id: i64,
    pub brand: String,
    pub story_id: i64,
    pub created_at: DateTime<Utc>,
}

//! Brand mention pipeline
//!
//! Consumes story events, finds configured brand keywords in story titles and
//! records each (brand, story) pair exactly once.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod listener;
pub mod matcher;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod processor;
pub mod repository;
pub mod retry;
pub mod shutdown;

pub use config::Config;
pub use dispatcher::{BoundedDispatcher, DispatcherConfig, DispatcherState};
pub use error::{DispatchError, ListenerError, ProcessError, StoreError};
pub use matcher::{match_brands, normalize_word, BrandSet};
pub use models::{BrandMention, StoryEvent, StoredBrandMention};
pub use pipeline::MentionPipeline;
pub use processor::{ProcessReport, Processor};
pub use repository::{MentionStore, PgMentionStore, UpsertOutcome};
pub use shutdown::Shutdown;

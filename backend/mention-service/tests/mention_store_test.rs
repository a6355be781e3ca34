//! PostgreSQL-backed mention store tests
//!
//! Run with a database at `DATABASE_URL`:
//! `cargo test -p mention-service --test mention_store_test -- --ignored`

use db_pool::{create_pool, DbConfig, DEFAULT_DATABASE_URL};
use mention_service::{BrandMention, MentionStore, PgMentionStore, StoreError, UpsertOutcome};

async fn store() -> PgMentionStore {
    let config = DbConfig {
        service_name: "mention-service-test".to_string(),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        max_connections: 5,
        min_connections: 1,
        ..Default::default()
    };
    let pool = create_pool(config).await.expect("connect to test database");
    let store = PgMentionStore::new(pool);
    store.migrate().await.expect("run migrations");
    store
}

/// Story ids far outside the real range so runs do not collide with live data
fn test_story_id() -> i64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as i64;
    -(nanos.rem_euclid(1_000_000_000_000) + 1)
}

async fn cleanup(store: &PgMentionStore, story_id: i64) {
    sqlx::query("DELETE FROM brand_mentions WHERE story_id = $1")
        .bind(story_id)
        .execute(store.pool())
        .await
        .expect("cleanup");
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_upsert_twice_leaves_one_row() {
    let store = store().await;
    let story_id = test_story_id();
    let mention = BrandMention::new("apple", story_id);

    assert_eq!(store.upsert(&mention).await.unwrap(), UpsertOutcome::Inserted);
    assert_eq!(
        store.upsert(&mention).await.unwrap(),
        UpsertOutcome::AlreadyExists
    );

    let rows = store.list_for_story(story_id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].brand, "apple");
    assert_eq!(rows[0].story_id, story_id);

    cleanup(&store, story_id).await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_same_brand_on_different_stories_are_distinct() {
    let store = store().await;
    let first = test_story_id();
    let second = first - 1;

    store.upsert(&BrandMention::new("zig", first)).await.unwrap();
    store.upsert(&BrandMention::new("zig", second)).await.unwrap();
    store.upsert(&BrandMention::new("linux", first)).await.unwrap();

    assert_eq!(store.list_for_story(first).await.unwrap().len(), 2);
    assert_eq!(store.list_for_story(second).await.unwrap().len(), 1);

    cleanup(&store, first).await;
    cleanup(&store, second).await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_concurrent_upserts_of_same_pair() {
    let store = store().await;
    let story_id = test_story_id();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .upsert(&BrandMention::new("github", story_id))
                .await
                .unwrap()
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap() == UpsertOutcome::Inserted {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(store.list_for_story(story_id).await.unwrap().len(), 1);

    cleanup(&store, story_id).await;
}

#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_empty_brand_is_rejected_before_query() {
    let store = store().await;
    let story_id = test_story_id();

    let err = store.upsert(&BrandMention::new("", story_id)).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidMention(_)));
    assert!(store.list_for_story(story_id).await.unwrap().is_empty());
    assert!(store.count().await.unwrap() >= 0);
}

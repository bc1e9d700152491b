//! End-to-end tests of live hierarchies over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use recognition_engine::events::TreeEventKind;
use recognition_engine::hierarchy::{Hierarchy, PeerQueries};
use recognition_engine::recognition::shares::total;
use recognition_engine::store::records::{node_path, recognition_path};
use recognition_engine::store::{MemoryStore, PublishedShares, Store, StoreEvent};
use recognition_engine::{Config, RecognitionError};

const EPS: f64 = 1e-9;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn published(revision: u64, entries: &[(&str, f64)]) -> PublishedShares {
    PublishedShares::new(
        revision,
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    )
}

/// alice: garden(80) → bob, music(20) → carol
async fn alice(store: Arc<MemoryStore>, config: &Config) -> Hierarchy {
    let alice = Hierarchy::create("alice", "Alice", store, config).await;
    alice.insert_child("alice", "garden", "Garden", 80.0).await.unwrap();
    alice.insert_child("alice", "music", "Music", 20.0).await.unwrap();
    alice.add_contributor("garden", "bob").await.unwrap();
    alice.add_contributor("music", "carol").await.unwrap();
    alice
}

/// bob: tools(30) → alice, food(70) → carol
async fn bob(store: Arc<MemoryStore>, config: &Config) -> Hierarchy {
    let bob = Hierarchy::create("bob", "Bob", store, config).await;
    bob.insert_child("bob", "tools", "Tools", 30.0).await.unwrap();
    bob.insert_child("bob", "food", "Food", 70.0).await.unwrap();
    bob.add_contributor("tools", "alice").await.unwrap();
    bob.add_contributor("food", "carol").await.unwrap();
    bob
}

#[tokio::test]
async fn test_mutual_recognition_through_the_store() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store.clone(), &config).await;
    let bob = bob(store.clone(), &config).await;

    alice.publish_now().await.unwrap();
    bob.publish_now().await.unwrap();
    settle().await;

    assert!((alice.share_of_general_fulfillment("bob").await - 0.8).abs() < EPS);
    assert!((bob.share_of_general_fulfillment("alice").await - 0.3).abs() < EPS);
    assert!((alice.mutual_fulfillment("bob").await - 0.3).abs() < EPS);
    assert!((bob.mutual_fulfillment("alice").await - 0.3).abs() < EPS);

    // carol never published, so nothing is mutual with her yet
    assert_eq!(alice.mutual_fulfillment("carol").await, 0.0);
    let dist = alice.mutual_fulfillment_distribution().await;
    assert_eq!(dist.len(), 1);
    assert!((dist["bob"] - 1.0).abs() < EPS);

    let queries: &dyn PeerQueries = &bob;
    assert!((queries.mutual_fulfillment("alice").await - 0.3).abs() < EPS);
}

#[tokio::test]
async fn test_stale_and_duplicate_reciprocals_dropped() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store, &config).await;

    assert!(alice.apply_reciprocal("bob", &published(5, &[("alice", 0.3)])).await);
    assert!((alice.mutual_fulfillment("bob").await - 0.3).abs() < EPS);

    assert!(!alice.apply_reciprocal("bob", &published(5, &[("alice", 0.9)])).await);
    assert!(!alice.apply_reciprocal("bob", &published(4, &[("alice", 0.9)])).await);
    assert!(!alice.apply_reciprocal("zed", &published(9, &[("alice", 0.9)])).await);

    // carol never published, so bob takes the whole distribution
    assert!(alice.apply_reciprocal("bob", &published(6, &[("alice", 0.9)])).await);
    let dist = alice.mutual_fulfillment_distribution().await;
    assert!((dist["bob"] - 1.0).abs() < EPS);
}

#[tokio::test]
async fn test_unavailable_store_degrades_to_zero() {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
        read_timeout: Duration::from_millis(30),
        ..Config::default()
    };
    store
        .put(
            &recognition_path("bob"),
            serde_json::to_value(published(1, &[("alice", 0.5)])).unwrap(),
        )
        .await
        .unwrap();
    store.set_offline(true);

    let alice = alice(store.clone(), &config).await;
    assert_eq!(alice.mutual_fulfillment("bob").await, 0.0);
    assert!(alice.mutual_fulfillment_distribution().await.is_empty());

    let social = alice.social_distribution_detailed(2).await;
    assert!(social.shares.is_empty());
    assert_eq!(alice.social_distribution(2).await, social.shares);
}

#[tokio::test]
async fn test_caller_errors_are_fail_fast() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store, &config).await;
    let revision = alice.revision().await;

    assert!(matches!(
        alice.set_points("garden", -1.0).await,
        Err(RecognitionError::Validation(_))
    ));
    assert!(matches!(
        alice.add_child("garden", "Sub", 1.0).await,
        Err(RecognitionError::InvalidState(_))
    ));
    assert!(matches!(
        alice.set_manual_fulfillment("garden", 0.5).await,
        Err(RecognitionError::InvalidState(_))
    ));
    assert!(matches!(
        alice.set_manual_fulfillment("alice", 1.5).await,
        Err(RecognitionError::Validation(_))
    ));
    assert!(matches!(
        alice.add_contributor("alice", "bob").await,
        Err(RecognitionError::InvalidState(_))
    ));
    assert!(matches!(
        alice.weight("nope").await,
        Err(RecognitionError::NodeNotFound(_))
    ));

    assert_eq!(alice.revision().await, revision);
}

#[tokio::test]
async fn test_reads_and_manual_fulfillment() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store, &config).await;

    assert!((alice.weight("garden").await.unwrap() - 0.8).abs() < EPS);
    assert!((alice.share_of_parent("music").await.unwrap() - 0.2).abs() < EPS);
    assert_eq!(alice.fulfilled("alice").await.unwrap(), 1.0);
    assert_eq!(alice.desire("alice").await.unwrap(), 0.0);

    alice.set_manual_fulfillment("alice", 0.5).await.unwrap();
    assert!((alice.fulfilled("alice").await.unwrap() - 0.5).abs() < EPS);
    assert!((alice.share_of_general_fulfillment("bob").await - 0.8).abs() < EPS);

    alice.clear_manual_fulfillment("alice").await.unwrap();
    assert_eq!(alice.fulfilled("alice").await.unwrap(), 1.0);
}

#[tokio::test]
async fn test_queries_are_memoized_and_mutations_invalidate() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store, &config).await;

    let first = alice.share_of_general_fulfillment("bob").await;
    let second = alice.share_of_general_fulfillment("bob").await;
    assert_eq!(first.to_bits(), second.to_bits());
    assert_eq!(alice.cache().hits(), 1);

    alice.set_points("music", 80.0).await.unwrap();
    assert!((alice.share_of_general_fulfillment("bob").await - 0.5).abs() < EPS);
}

#[tokio::test]
async fn test_events_emitted() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = Hierarchy::create("alice", "Alice", store, &config).await;
    let mut rx = alice.events().subscribe();

    alice.insert_child("alice", "garden", "Garden", 1.0).await.unwrap();
    alice.rename("garden", "Vegetables").await.unwrap();
    alice.publish_now().await.unwrap();

    let kinds: Vec<_> = (0..3).map(|_| rx.try_recv().unwrap().kind).collect();
    assert_eq!(
        kinds,
        vec![
            TreeEventKind::NodeAdded,
            TreeEventKind::Renamed,
            TreeEventKind::SharesPublished
        ]
    );
}

#[tokio::test]
async fn test_persist_and_load_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store.clone(), &config).await;
    alice.insert_child("alice", "plans", "Plans", 50.0).await.unwrap();
    alice.insert_child("plans", "draft", "Draft", 1.0).await.unwrap();
    alice.insert_child("plans", "shed", "Shed", 3.0).await.unwrap();
    alice.add_contributor("shed", "bob").await.unwrap();
    alice.set_manual_fulfillment("plans", 0.6).await.unwrap();
    alice.remove_child("alice", "music").await.unwrap();
    alice.flush().await;

    assert!(store.get(&node_path("alice", "music")).await.unwrap().is_none());

    let loaded = Hierarchy::load("alice", store.clone(), &config).await.unwrap();
    let original = alice.snapshot().await;
    let restored = loaded.snapshot().await;
    assert_eq!(restored.len(), original.len());
    assert_eq!(restored.root().name, "Alice");
    for node in original.nodes() {
        let copy = restored.node(&node.id).unwrap();
        assert_eq!(copy.points, node.points);
        assert_eq!(copy.contributors, node.contributors);
        assert_eq!(copy.manual_fulfillment, node.manual_fulfillment);
        assert_eq!(copy.kind, node.kind);
    }
    assert!(
        (loaded.fulfilled("plans").await.unwrap() - alice.fulfilled("plans").await.unwrap()).abs()
            < EPS
    );
    assert_eq!(loaded.linked_peers().await, vec!["bob".to_string()]);

    // the startup batch published once
    assert_eq!(loaded.scheduler().run_count(), 1);
    assert!(store.get(&recognition_path("alice")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_contributor_changes_relink_peers() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store, &config).await;
    assert_eq!(alice.linked_peers().await, vec!["bob", "carol"]);

    assert!(alice.remove_contributor("music", "carol").await.unwrap());
    assert!(!alice.remove_contributor("music", "carol").await.unwrap());
    assert_eq!(alice.linked_peers().await, vec!["bob"]);

    alice.add_contributor("music", "dave").await.unwrap();
    assert_eq!(alice.linked_peers().await, vec!["bob", "dave"]);
}

#[tokio::test(start_paused = true)]
async fn test_bursts_publish_once() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store.clone(), &config).await;

    for points in [10.0, 20.0, 30.0, 40.0, 50.0] {
        alice.set_points("music", points).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(store.get(&recognition_path("alice")).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(alice.scheduler().run_count(), 1);

    let value = store.get(&recognition_path("alice")).await.unwrap().unwrap();
    let shares: PublishedShares = serde_json::from_value(value).unwrap();
    // garden 80 / (80 + 50)
    assert!((shares.shares["bob"] - 80.0 / 130.0).abs() < EPS);
    assert!((total(&shares.shares) - 1.0).abs() < EPS);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store, &config).await;

    alice.shutdown().await;
    alice.shutdown().await;
    assert!(alice.linked_peers().await.is_empty());
    assert_eq!(alice.scheduler().pending_count(), 0);
}

#[tokio::test]
async fn test_mutations_rejected_after_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = Hierarchy::create("alice", "Alice", store, &config).await;
    alice.insert_child("alice", "garden", "Garden", 1.0).await.unwrap();
    let revision = alice.revision().await;

    alice.shutdown().await;
    assert!(matches!(
        alice.add_child("alice", "Music", 1.0).await,
        Err(RecognitionError::InvalidState(_))
    ));
    assert!(matches!(
        alice.add_contributor("garden", "bob").await,
        Err(RecognitionError::InvalidState(_))
    ));
    assert!(alice.linked_peers().await.is_empty());
    assert_eq!(alice.revision().await, revision);
}

/// Serves reads and writes from memory but never answers a subscription.
struct StuckSubscriptions(MemoryStore);

#[async_trait]
impl Store for StuckSubscriptions {
    async fn get(&self, path: &str) -> anyhow::Result<Option<Value>> {
        self.0.get(path).await
    }

    async fn put(&self, path: &str, value: Value) -> anyhow::Result<()> {
        self.0.put(path, value).await
    }

    async fn subscribe(&self, _path: &str) -> anyhow::Result<broadcast::Receiver<StoreEvent>> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_stuck_subscription_does_not_block_commit() {
    let store = Arc::new(StuckSubscriptions(MemoryStore::new()));
    let config = Config {
        read_timeout: Duration::from_millis(30),
        ..Config::default()
    };
    let alice = Hierarchy::create("alice", "Alice", store, &config).await;
    alice.insert_child("alice", "garden", "Garden", 1.0).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), alice.add_contributor("garden", "bob"))
        .await
        .expect("commit hung on subscribe")
        .unwrap();

    assert!(alice.linked_peers().await.is_empty());
    assert!((alice.share_of_general_fulfillment("bob").await - 1.0).abs() < EPS);

    // the lock was released, so later commits still go through
    alice.set_points("garden", 2.0).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_follow_applied_order() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let alice = alice(store, &config).await;
    let mut rx = alice.events().subscribe();

    let writers: Vec<_> = (1..=20)
        .map(|points| {
            let alice = alice.clone();
            tokio::spawn(async move { alice.set_points("music", points as f64).await })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap().unwrap();
    }

    let mut last = None;
    while let Ok(event) = rx.try_recv() {
        if event.kind == TreeEventKind::PointsChanged {
            last = Some(event);
        }
    }
    let last = last.unwrap();
    let points = alice.snapshot().await.node("music").unwrap().points;
    assert_eq!(last.payload["points"].as_f64().unwrap(), points);
}

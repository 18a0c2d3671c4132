use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tollgate::{CacheConfig, CacheKey, KeyBuilder, Payload, RequestParams, TieredCache};

const HOUR: Duration = Duration::from_secs(3600);

fn key(name: &str) -> CacheKey {
    KeyBuilder::new().build(&RequestParams::new().with("q", name))
}

fn memory_cache(entries: usize) -> TieredCache {
    TieredCache::new(&CacheConfig::new().max_memory_entries(entries)).unwrap()
}

fn disk_cache(dir: &Path, entries: usize) -> TieredCache {
    TieredCache::new(&CacheConfig::new().max_memory_entries(entries).disk_dir(dir)).unwrap()
}

fn entry_path(dir: &Path, key: &CacheKey) -> std::path::PathBuf {
    dir.join(format!("{key}.entry"))
}

#[tokio::test]
async fn put_then_get_returns_payload() {
    let cache = memory_cache(10);
    let payload = Payload::new(r#"{"results":[]}"#).with_content_type("application/json");
    cache.put(&key("a"), payload.clone(), HOUR).await.unwrap();

    assert_eq!(cache.get(&key("a")).await, Some(payload));
    assert_eq!(cache.get(&key("b")).await, None);

    let stats = cache.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.memory_hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 0.5);
}

#[tokio::test]
async fn entries_expire_after_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let cache = disk_cache(dir.path(), 10);
    cache
        .put(&key("short"), Payload::new("x"), Duration::from_millis(50))
        .await
        .unwrap();
    assert!(cache.get(&key("short")).await.is_some());

    tokio::time::sleep(Duration::from_millis(120)).await;

    assert_eq!(cache.get(&key("short")).await, None);
    // purged from both tiers
    assert_eq!(cache.stats().memory_entries, 0);
    assert!(!entry_path(dir.path(), &key("short")).exists());
    // expired in both tiers, counted once
    assert_eq!(cache.stats().expired, 1);
}

#[tokio::test]
async fn zero_ttl_stores_nothing() {
    let cache = memory_cache(10);
    cache
        .put(&key("a"), Payload::new("x"), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(cache.get(&key("a")).await, None);
    assert_eq!(cache.stats().memory_entries, 0);
}

#[tokio::test]
async fn lru_evicts_least_recently_used() {
    let cache = memory_cache(2);
    cache.put(&key("a"), Payload::new("a"), HOUR).await.unwrap();
    cache.put(&key("b"), Payload::new("b"), HOUR).await.unwrap();

    // touching `a` makes `b` the eviction candidate
    assert!(cache.get(&key("a")).await.is_some());
    cache.put(&key("c"), Payload::new("c"), HOUR).await.unwrap();

    assert!(cache.get(&key("a")).await.is_some());
    assert!(cache.get(&key("b")).await.is_none());
    assert!(cache.get(&key("c")).await.is_some());
    let stats = cache.stats();
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.memory_entries, 2);
}

#[tokio::test]
async fn overwriting_a_key_is_not_an_eviction() {
    let cache = memory_cache(2);
    cache.put(&key("a"), Payload::new("1"), HOUR).await.unwrap();
    cache.put(&key("a"), Payload::new("2"), HOUR).await.unwrap();
    assert_eq!(cache.get(&key("a")).await.unwrap().text(), "2");
    assert_eq!(cache.stats().evictions, 0);
}

#[tokio::test]
async fn disk_tier_survives_restart_and_promotes() {
    let dir = tempfile::tempdir().unwrap();
    let payload = Payload::new("persisted\nbody").with_status(200);
    {
        let cache = disk_cache(dir.path(), 10);
        cache.put(&key("a"), payload.clone(), HOUR).await.unwrap();
    }

    let cache = disk_cache(dir.path(), 10);
    assert_eq!(cache.stats().memory_entries, 0);

    assert_eq!(cache.get(&key("a")).await, Some(payload.clone()));
    assert_eq!(cache.stats().disk_hits, 1);
    assert_eq!(cache.stats().memory_entries, 1);

    assert_eq!(cache.get(&key("a")).await, Some(payload));
    assert_eq!(cache.stats().memory_hits, 1);
}

#[tokio::test]
async fn evicted_entries_are_still_served_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let cache = disk_cache(dir.path(), 1);
    cache.put(&key("a"), Payload::new("a"), HOUR).await.unwrap();
    cache.put(&key("b"), Payload::new("b"), HOUR).await.unwrap();

    assert_eq!(cache.get(&key("a")).await.unwrap().text(), "a");
    let stats = cache.stats();
    assert_eq!(stats.disk_hits, 1);
    // promoting `a` pushed `b` out of memory
    assert_eq!(stats.evictions, 2);
}

#[tokio::test]
async fn corrupt_entry_is_deleted_and_missed() {
    let dir = tempfile::tempdir().unwrap();
    {
        let cache = disk_cache(dir.path(), 10);
        cache.put(&key("a"), Payload::new("x"), HOUR).await.unwrap();
    }
    let path = entry_path(dir.path(), &key("a"));
    fs::write(&path, b"{ this is not a header").unwrap();

    let cache = disk_cache(dir.path(), 10);
    assert_eq!(cache.get(&key("a")).await, None);
    assert!(!path.exists());
    let stats = cache.stats();
    assert_eq!(stats.corrupt, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn cleanup_removes_only_expired_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = disk_cache(dir.path(), 10);
    cache
        .put(&key("short"), Payload::new("s"), Duration::from_millis(50))
        .await
        .unwrap();
    cache.put(&key("long"), Payload::new("l"), HOUR).await.unwrap();
    fs::write(dir.path().join(format!("{}.entry", key("junk"))), b"junk").unwrap();
    fs::write(dir.path().join("notes.txt"), b"not ours").unwrap();

    tokio::time::sleep(Duration::from_millis(120)).await;

    let report = cache.cleanup_expired().await.unwrap();
    assert_eq!(report.memory_expired, 1);
    assert_eq!(report.disk_expired, 1);
    assert_eq!(report.disk_corrupt, 1);
    assert_eq!(report.disk_remaining, 1);

    assert!(cache.get(&key("long")).await.is_some());
    assert!(dir.path().join("notes.txt").exists());
    assert_eq!(cache.disk_entries().await.unwrap(), 1);
}

#[tokio::test]
async fn invalidate_and_clear_empty_both_tiers() {
    let dir = tempfile::tempdir().unwrap();
    let cache = disk_cache(dir.path(), 10);
    for name in ["a", "b", "c"] {
        cache.put(&key(name), Payload::new(name), HOUR).await.unwrap();
    }

    cache.invalidate(&key("a")).await.unwrap();
    assert_eq!(cache.get(&key("a")).await, None);
    assert_eq!(cache.disk_entries().await.unwrap(), 2);

    cache.clear().await.unwrap();
    assert_eq!(cache.get(&key("b")).await, None);
    assert_eq!(cache.stats().memory_entries, 0);
    assert_eq!(cache.disk_entries().await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_puts_and_gets_leave_valid_entries() {
    let dir = tempfile::tempdir().unwrap();
    let cache = std::sync::Arc::new(disk_cache(dir.path(), 4));

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..16 {
        let cache = cache.clone();
        tasks.spawn(async move {
            let k = key(&format!("k{}", i % 4));
            cache.put(&k, Payload::new(format!("v{i}")), HOUR).await.unwrap();
            cache.get(&k).await
        });
    }
    while let Some(result) = tasks.join_next().await {
        assert!(result.unwrap().is_some());
    }

    let fresh = disk_cache(dir.path(), 4);
    for i in 0..4 {
        let text = fresh.get(&key(&format!("k{i}"))).await.unwrap().text();
        assert!(text.starts_with('v'));
    }
    assert_eq!(fresh.disk_entries().await.unwrap(), 4);
}

const RACE_ROUNDS: usize = 200;

async fn stale_then_age(cache: &TieredCache, key: &CacheKey) {
    cache
        .put(key, Payload::new("stale"), Duration::from_millis(1))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cleanup_racing_put_never_loses_fresh_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(disk_cache(dir.path(), 10));
    let key = key("race");

    for round in 0..RACE_ROUNDS {
        stale_then_age(&cache, &key).await;

        let sweeper = tokio::spawn({
            let cache = cache.clone();
            async move { cache.cleanup_expired().await.unwrap() }
        });
        let writer = tokio::spawn({
            let (cache, key) = (cache.clone(), key.clone());
            async move { cache.put(&key, Payload::new("fresh"), HOUR).await.unwrap() }
        });
        sweeper.await.unwrap();
        writer.await.unwrap();

        assert!(
            entry_path(dir.path(), &key).exists(),
            "fresh entry deleted in round {round}"
        );
    }

    let reopened = disk_cache(dir.path(), 10);
    assert_eq!(reopened.get(&key).await, Some(Payload::new("fresh")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn restarted_lookup_racing_put_never_loses_fresh_entry() {
    let dir = tempfile::tempdir().unwrap();
    let writer_cache = Arc::new(disk_cache(dir.path(), 10));
    let key = key("race");

    for round in 0..RACE_ROUNDS {
        stale_then_age(&writer_cache, &key).await;
        // a second cache over the same directory has nothing in memory, so
        // its lookup reads and judges the stale file
        let reader_cache = disk_cache(dir.path(), 10);

        let reader = tokio::spawn({
            let key = key.clone();
            async move { reader_cache.get(&key).await }
        });
        let writer = tokio::spawn({
            let (cache, key) = (writer_cache.clone(), key.clone());
            async move { cache.put(&key, Payload::new("fresh"), HOUR).await.unwrap() }
        });
        let seen = reader.await.unwrap();
        writer.await.unwrap();

        assert_ne!(seen, Some(Payload::new("stale")));
        assert!(
            entry_path(dir.path(), &key).exists(),
            "fresh entry deleted in round {round}"
        );
    }
}

#[tokio::test]
async fn cleanup_reports_entries_it_could_not_remove() {
    let dir = tempfile::tempdir().unwrap();
    let cache = disk_cache(dir.path(), 10);
    cache.put(&key("ok"), Payload::new("x"), HOUR).await.unwrap();
    // an entry-named directory can be neither read nor unlinked as a file
    fs::create_dir(entry_path(dir.path(), &key("stuck"))).unwrap();

    let report = cache.cleanup_expired().await.unwrap();
    assert_eq!(report.disk_failed, 1);
    assert_eq!(report.disk_remaining, 1);

    // and it keeps failing without blocking later sweeps
    let report = cache.cleanup_expired().await.unwrap();
    assert_eq!(report.disk_failed, 1);
}

#[test]
fn zero_capacity_is_rejected() {
    assert!(TieredCache::new(&CacheConfig::new().max_memory_entries(0)).is_err());
}

use super::*;
use crate::encode::ContainerKind;
use crate::foundation::core::Fps;
use crate::scene::RenderParams;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("framecast-cache-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn cfg(dir: &Path, max_bytes: u64, max_entries: usize) -> CacheConfig {
    CacheConfig {
        dir: dir.to_path_buf(),
        max_bytes,
        max_entries,
        evict_to_fraction: 0.5,
    }
}

fn staged(cache: &RenderCache, n: u128, size: usize) -> Artifact {
    let fingerprint = Fingerprint::from_u128(n);
    let location = cache.staging_dir().join(format!("{n}.part"));
    std::fs::write(&location, vec![7u8; size]).unwrap();
    Artifact {
        fingerprint,
        location,
        size_bytes: size as u64,
        duration_secs: 1.0,
        frame_count: 10,
        content_hash: "00".repeat(32),
        container: ContainerKind::RawRgba,
        params: RenderParams::new(2, 2, Fps { num: 10, den: 1 }),
    }
}

#[test]
fn store_moves_file_and_lookup_returns_same_fingerprint() {
    let dir = temp_dir();
    let cache = RenderCache::open(cfg(&dir, 1 << 20, 16)).unwrap();
    let stored = cache.store(staged(&cache, 1, 100)).unwrap();

    assert_eq!(stored.location, dir.join(format!("{}.rgba", Fingerprint::from_u128(1))));
    assert!(stored.location.exists());
    assert!(dir.join(format!("{}.json", Fingerprint::from_u128(1))).exists());

    let hit = cache.lookup(&Fingerprint::from_u128(1)).unwrap();
    assert_eq!(hit.fingerprint, Fingerprint::from_u128(1));
    assert!(cache.lookup(&Fingerprint::from_u128(2)).is_none());
    assert_eq!(cache.stats().total_bytes, 100);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn storing_twice_replaces_entry() {
    let dir = temp_dir();
    let cache = RenderCache::open(cfg(&dir, 1 << 20, 16)).unwrap();
    cache.store(staged(&cache, 1, 100)).unwrap();
    cache.store(staged(&cache, 1, 40)).unwrap();
    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_bytes, 40);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn evicts_least_recently_used_down_to_fraction() {
    let dir = temp_dir();
    let cache = RenderCache::open(cfg(&dir, 1 << 20, 4)).unwrap();
    for n in 1..=4 {
        cache.store(staged(&cache, n, 10)).unwrap();
    }
    // Touch 1 so 2 becomes the oldest.
    cache.lookup(&Fingerprint::from_u128(1)).unwrap();
    cache.store(staged(&cache, 5, 10)).unwrap();

    // Five entries exceed the limit of four; trimming stops at 4 * 0.5 = 2.
    let stats = cache.stats();
    assert_eq!(stats.entries, 2);
    assert!(cache.contains(&Fingerprint::from_u128(5)));
    assert!(cache.contains(&Fingerprint::from_u128(1)));
    assert!(!cache.contains(&Fingerprint::from_u128(2)));
    assert!(!dir.join(format!("{}.rgba", Fingerprint::from_u128(2))).exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn byte_limit_triggers_eviction_but_spares_fresh_entry() {
    let dir = temp_dir();
    let cache = RenderCache::open(cfg(&dir, 100, 16)).unwrap();
    cache.store(staged(&cache, 1, 60)).unwrap();
    let big = cache.store(staged(&cache, 2, 120)).unwrap();
    assert!(big.location.exists());
    assert!(!cache.contains(&Fingerprint::from_u128(1)));
    assert!(cache.contains(&Fingerprint::from_u128(2)));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn pinned_entries_survive_eviction_until_unpinned() {
    let dir = temp_dir();
    let cache = RenderCache::open(cfg(&dir, 1 << 20, 16)).unwrap();
    cache.store(staged(&cache, 1, 10)).unwrap();
    cache.store(staged(&cache, 2, 10)).unwrap();

    let pin = cache.pin(&Fingerprint::from_u128(1)).unwrap();
    let second = cache.pin(&Fingerprint::from_u128(1)).unwrap();
    assert_eq!(cache.stats().pinned, 1);

    let evicted = cache.evict(EvictionPolicy::All);
    assert_eq!(evicted, vec![Fingerprint::from_u128(2)]);
    assert!(cache.evict(EvictionPolicy::Entry(Fingerprint::from_u128(1))).is_empty());

    drop(pin);
    assert!(cache.evict(EvictionPolicy::All).is_empty());
    drop(second);
    assert_eq!(cache.evict(EvictionPolicy::All), vec![Fingerprint::from_u128(1)]);
    assert_eq!(cache.stats(), CacheStats::default());
    assert!(cache.pin(&Fingerprint::from_u128(1)).is_none());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn evict_to_byte_budget() {
    let dir = temp_dir();
    let cache = RenderCache::open(cfg(&dir, 1 << 20, 16)).unwrap();
    for n in 1..=3 {
        cache.store(staged(&cache, n, 10)).unwrap();
    }
    let evicted = cache.evict(EvictionPolicy::ToBytes(15));
    assert_eq!(evicted, vec![Fingerprint::from_u128(1), Fingerprint::from_u128(2)]);
    assert_eq!(cache.stats().total_bytes, 10);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn reopen_rebuilds_index_from_sidecars() {
    let dir = temp_dir();
    {
        let cache = RenderCache::open(cfg(&dir, 1 << 20, 16)).unwrap();
        cache.store(staged(&cache, 1, 10)).unwrap();
        cache.store(staged(&cache, 2, 20)).unwrap();
        std::fs::write(cache.staging_dir().join("leftover.part"), b"x").unwrap();
    }
    std::fs::remove_file(dir.join(format!("{}.rgba", Fingerprint::from_u128(2)))).unwrap();

    let cache = RenderCache::open(cfg(&dir, 1 << 20, 16)).unwrap();
    assert_eq!(cache.stats().entries, 1);
    let hit = cache.lookup(&Fingerprint::from_u128(1)).unwrap();
    assert_eq!(hit.size_bytes, 10);
    assert!(!dir.join(format!("{}.json", Fingerprint::from_u128(2))).exists());
    assert!(!cache.staging_dir().join("leftover.part").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn lookup_drops_entry_whose_file_vanished() {
    let dir = temp_dir();
    let cache = RenderCache::open(cfg(&dir, 1 << 20, 16)).unwrap();
    let a = cache.store(staged(&cache, 1, 10)).unwrap();
    std::fs::remove_file(&a.location).unwrap();
    assert!(cache.lookup(&Fingerprint::from_u128(1)).is_none());
    assert_eq!(cache.stats().entries, 0);
    let _ = std::fs::remove_dir_all(&dir);
}

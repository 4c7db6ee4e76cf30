use super::*;
use crate::encode::ContainerKind;
use crate::foundation::config::CacheConfig;
use crate::foundation::core::Fps;
use crate::foundation::ids::Fingerprint;
use crate::scene::RenderParams;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DIR: AtomicU64 = AtomicU64::new(0);

fn cache() -> (RenderCache, PathBuf) {
    let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("framecast-delivery-{}-{n}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let cache = RenderCache::open(CacheConfig {
        dir: dir.clone(),
        max_bytes: 1 << 20,
        max_entries: 8,
        evict_to_fraction: 1.0,
    })
    .unwrap();
    (cache, dir)
}

fn stored(cache: &RenderCache, n: u128, bytes: &[u8]) -> Arc<Artifact> {
    let location = cache.staging_dir().join(format!("{n}.part"));
    std::fs::write(&location, bytes).unwrap();
    cache
        .store(Artifact {
            fingerprint: Fingerprint::from_u128(n),
            location,
            size_bytes: bytes.len() as u64,
            duration_secs: 1.0,
            frame_count: 1,
            content_hash: String::new(),
            container: ContainerKind::Mp4,
            params: RenderParams::new(2, 2, Fps { num: 1, den: 1 }),
        })
        .unwrap()
}

fn body() -> Vec<u8> {
    (0..=255u8).cycle().take(1000).collect()
}

#[test]
fn full_delivery_reads_everything() {
    let (cache, dir) = cache();
    let a = stored(&cache, 1, &body());
    let mut s = Delivery::new(cache.clone()).deliver(&a, None).unwrap();

    assert!(!s.is_partial());
    assert_eq!(s.content_length(), 1000);
    assert_eq!(s.content_range(), "bytes 0-999/1000");
    assert_eq!(s.mime_type(), "video/mp4");
    let mut out = Vec::new();
    s.read_to_end(&mut out).unwrap();
    assert_eq!(out, body());
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn ranged_delivery_reads_only_the_window() {
    let (cache, dir) = cache();
    let a = stored(&cache, 1, &body());
    let d = Delivery::new(cache.clone());

    let mut s = d
        .deliver(&a, Some(ByteRange::parse("bytes=10-19").unwrap()))
        .unwrap();
    assert!(s.is_partial());
    assert_eq!(s.content_range(), "bytes 10-19/1000");
    let mut out = Vec::new();
    s.read_to_end(&mut out).unwrap();
    assert_eq!(out, body()[10..20].to_vec());

    let mut tail = d
        .deliver(&a, Some(ByteRange::parse("bytes=-4").unwrap()))
        .unwrap();
    let mut out = Vec::new();
    tail.read_to_end(&mut out).unwrap();
    assert_eq!(out, body()[996..].to_vec());
    assert_eq!(tail.content_range(), "bytes 996-999/1000");
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn chunks_cover_the_window() {
    let (cache, dir) = cache();
    let a = stored(&cache, 1, &body());
    let mut s = Delivery::new(cache.clone())
        .deliver(&a, Some(ByteRange::From(900)))
        .unwrap();
    let sizes: Vec<usize> = s.chunks(32).map(|c| c.unwrap().len()).collect();
    assert_eq!(sizes.iter().sum::<usize>(), 100);
    assert_eq!(sizes[0], 32);
    assert_eq!(*sizes.last().unwrap(), 4);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn stream_pins_until_dropped() {
    let (cache, dir) = cache();
    let a = stored(&cache, 1, &body());
    let s = Delivery::new(cache.clone()).deliver(&a, None).unwrap();
    assert_eq!(cache.stats().pinned, 1);
    assert!(cache.evict(crate::cache::EvictionPolicy::All).is_empty());

    drop(s);
    assert_eq!(cache.stats().pinned, 0);
    assert_eq!(
        cache.evict(crate::cache::EvictionPolicy::All),
        vec![Fingerprint::from_u128(1)]
    );
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn missing_artifacts_and_bad_ranges() {
    let (cache, dir) = cache();
    let a = stored(&cache, 1, &body());
    let d = Delivery::new(cache.clone());

    let mut ghost = (*a).clone();
    ghost.fingerprint = Fingerprint::from_u128(9);
    assert!(matches!(
        d.deliver(&ghost, None),
        Err(FramecastError::ArtifactNotFound(_))
    ));
    assert!(matches!(
        d.deliver(&a, Some(ByteRange::From(5000))),
        Err(FramecastError::RangeNotSatisfiable { size: 1000, .. })
    ));
    assert_eq!(cache.stats().pinned, 0);
    let _ = std::fs::remove_dir_all(dir);
}

use crate::cache::artifact::Artifact;
use crate::foundation::config::CacheConfig;
use crate::foundation::error::{FramecastError, FramecastResult};
use crate::foundation::ids::Fingerprint;
use anyhow::Context as _;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

const STAGING_DIR: &str = "staging";
const SIDECAR_EXT: &str = "json";

/// Which entries [`RenderCache::evict`] removes. Pinned entries are never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// When a configured limit is exceeded, trim least recently used entries down to
    /// `evict_to_fraction` of the limits.
    OverLimits,
    /// Trim least recently used entries until the cache holds at most this many bytes.
    ToBytes(u64),
    /// Remove this entry.
    Entry(Fingerprint),
    /// Remove every entry.
    All,
}

/// Point-in-time cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct CacheStats {
    /// Stored artifacts.
    pub entries: usize,
    /// Sum of artifact sizes.
    pub total_bytes: u64,
    /// Artifacts with at least one active pin.
    pub pinned: usize,
}

/// Fingerprint-keyed, size-bounded store of finished artifacts.
///
/// Cheap to clone; clones share the same index. Media files and JSON sidecars live in one
/// directory so the index survives restarts.
#[derive(Clone)]
pub struct RenderCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    cfg: CacheConfig,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Fingerprint, Entry>,
    total_bytes: u64,
    tick: u64,
}

struct Entry {
    artifact: Arc<Artifact>,
    last_access: u64,
    pins: usize,
}

impl CacheState {
    fn touch(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, fp: &Fingerprint) -> Option<Entry> {
        let entry = self.entries.remove(fp)?;
        self.total_bytes = self
            .total_bytes
            .saturating_sub(entry.artifact.size_bytes);
        Some(entry)
    }

    /// Unpinned entries, least recently used first.
    fn lru_candidates(&self, keep: Option<Fingerprint>) -> Vec<Fingerprint> {
        let mut v: Vec<(u64, Fingerprint)> = self
            .entries
            .iter()
            .filter(|(fp, e)| e.pins == 0 && Some(**fp) != keep)
            .map(|(fp, e)| (e.last_access, *fp))
            .collect();
        v.sort_unstable();
        v.into_iter().map(|(_, fp)| fp).collect()
    }
}

impl std::fmt::Debug for RenderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCache")
            .field("dir", &self.inner.cfg.dir)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RenderCache {
    /// Open (or create) the cache directory and rebuild the index from its sidecars.
    ///
    /// Sidecars whose media file is missing or has the wrong size are discarded, leftover staging
    /// files are removed, and the limits are enforced once before returning.
    #[tracing::instrument(skip(cfg), fields(dir = %cfg.dir.display()))]
    pub fn open(cfg: CacheConfig) -> FramecastResult<Self> {
        std::fs::create_dir_all(cfg.dir.join(STAGING_DIR))
            .with_context(|| format!("create cache directory '{}'", cfg.dir.display()))?;
        clear_dir(&cfg.dir.join(STAGING_DIR));

        let mut loaded = Vec::new();
        let read = std::fs::read_dir(&cfg.dir)
            .with_context(|| format!("read cache directory '{}'", cfg.dir.display()))?;
        for dirent in read.flatten() {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SIDECAR_EXT) {
                continue;
            }
            match load_sidecar(&path) {
                Some(artifact) => {
                    let mtime = std::fs::metadata(&artifact.location)
                        .and_then(|m| m.modified())
                        .ok();
                    loaded.push((mtime, artifact));
                }
                None => {
                    tracing::warn!(sidecar = %path.display(), "discarding stale cache sidecar");
                    let _ = std::fs::remove_file(&path);
                }
            }
        }

        // Oldest media file is least recently used.
        loaded.sort_by_key(|(mtime, _)| *mtime);
        let mut state = CacheState::default();
        for (_, artifact) in loaded {
            let last_access = state.touch();
            state.total_bytes += artifact.size_bytes;
            state.entries.insert(
                artifact.fingerprint,
                Entry {
                    artifact: Arc::new(artifact),
                    last_access,
                    pins: 0,
                },
            );
        }
        tracing::info!(
            entries = state.entries.len(),
            total_bytes = state.total_bytes,
            "render cache opened"
        );

        let cache = Self {
            inner: Arc::new(CacheInner {
                cfg,
                state: Mutex::new(state),
            }),
        };
        cache.evict(EvictionPolicy::OverLimits);
        Ok(cache)
    }

    /// Cache directory.
    pub fn dir(&self) -> &Path {
        &self.inner.cfg.dir
    }

    /// Directory for in-progress render outputs; adopted by [`RenderCache::store`].
    pub fn staging_dir(&self) -> PathBuf {
        self.inner.cfg.dir.join(STAGING_DIR)
    }

    /// Artifact for `fp`, counted as an access. Entries whose media file vanished are dropped.
    pub fn lookup(&self, fp: &Fingerprint) -> Option<Arc<Artifact>> {
        let mut st = self.lock();
        let present = st.entries.get(fp)?.artifact.location.exists();
        if !present {
            tracing::warn!(fingerprint = %fp, "cached media file vanished; dropping entry");
            if let Some(entry) = st.remove(fp) {
                remove_files(self.dir(), &entry.artifact);
            }
            return None;
        }
        let tick = st.touch();
        let entry = st.entries.get_mut(fp)?;
        entry.last_access = tick;
        Some(entry.artifact.clone())
    }

    /// Whether an entry for `fp` exists, without counting as an access.
    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.lock().entries.contains_key(fp)
    }

    /// Adopt a staged artifact: move its file into the cache directory and record it.
    ///
    /// Storing a fingerprint that is already present replaces the old entry. Limits are enforced
    /// afterwards; the entry just stored is never the one evicted.
    #[tracing::instrument(skip(self, artifact), fields(fingerprint = %artifact.fingerprint))]
    pub fn store(&self, mut artifact: Artifact) -> FramecastResult<Arc<Artifact>> {
        let fp = artifact.fingerprint;
        let final_path = self.media_path(&artifact);

        let artifact = {
            let mut st = self.lock();
            if artifact.location != final_path {
                std::fs::rename(&artifact.location, &final_path).with_context(|| {
                    format!(
                        "move artifact '{}' into cache",
                        artifact.location.display()
                    )
                })?;
                artifact.location = final_path;
            }
            write_sidecar(&self.sidecar_path(&fp), &artifact)?;

            // Replacing keeps outstanding pins on the entry.
            let mut pins = 0;
            if let Some(old) = st.remove(&fp) {
                pins = old.pins;
                if old.artifact.location != artifact.location {
                    let _ = std::fs::remove_file(&old.artifact.location);
                }
            }
            let last_access = st.touch();
            let artifact = Arc::new(artifact);
            st.total_bytes += artifact.size_bytes;
            st.entries.insert(
                fp,
                Entry {
                    artifact: artifact.clone(),
                    last_access,
                    pins,
                },
            );
            tracing::debug!(size_bytes = artifact.size_bytes, "artifact stored");
            artifact
        };

        self.evict_inner(EvictionPolicy::OverLimits, Some(fp));
        Ok(artifact)
    }

    /// Remove entries according to `policy`. Returns the evicted fingerprints.
    pub fn evict(&self, policy: EvictionPolicy) -> Vec<Fingerprint> {
        self.evict_inner(policy, None)
    }

    fn evict_inner(&self, policy: EvictionPolicy, keep: Option<Fingerprint>) -> Vec<Fingerprint> {
        let cfg = &self.inner.cfg;
        let mut st = self.lock();

        let victims: Vec<Fingerprint> = match policy {
            EvictionPolicy::OverLimits => {
                let over = st.total_bytes > cfg.max_bytes || st.entries.len() > cfg.max_entries;
                if !over {
                    return Vec::new();
                }
                let target_bytes = (cfg.max_bytes as f64 * cfg.evict_to_fraction) as u64;
                let target_entries = (cfg.max_entries as f64 * cfg.evict_to_fraction) as usize;
                take_until(&st, keep, |bytes, entries| {
                    bytes <= target_bytes && entries <= target_entries
                })
            }
            EvictionPolicy::ToBytes(budget) => {
                take_until(&st, keep, |bytes, _| bytes <= budget)
            }
            EvictionPolicy::Entry(fp) => st
                .entries
                .get(&fp)
                .filter(|e| e.pins == 0)
                .map(|_| vec![fp])
                .unwrap_or_default(),
            EvictionPolicy::All => st.lru_candidates(keep),
        };

        for fp in &victims {
            if let Some(entry) = st.remove(fp) {
                remove_files(&cfg.dir, &entry.artifact);
            }
        }
        if !victims.is_empty() {
            tracing::info!(
                evicted = victims.len(),
                remaining = st.entries.len(),
                total_bytes = st.total_bytes,
                "render cache eviction"
            );
        }
        victims
    }

    /// Protect the entry for `fp` from eviction until the returned guard drops.
    pub fn pin(&self, fp: &Fingerprint) -> Option<ArtifactPin> {
        let mut st = self.lock();
        let tick = st.touch();
        let entry = st.entries.get_mut(fp)?;
        entry.pins += 1;
        entry.last_access = tick;
        Some(ArtifactPin {
            cache: self.clone(),
            artifact: entry.artifact.clone(),
        })
    }

    /// All entries, most recently used first.
    pub fn entries(&self) -> Vec<Arc<Artifact>> {
        let st = self.lock();
        let mut v: Vec<(u64, Arc<Artifact>)> = st
            .entries
            .values()
            .map(|e| (e.last_access, e.artifact.clone()))
            .collect();
        v.sort_by(|a, b| b.0.cmp(&a.0));
        v.into_iter().map(|(_, a)| a).collect()
    }

    /// Current occupancy.
    pub fn stats(&self) -> CacheStats {
        let st = self.lock();
        CacheStats {
            entries: st.entries.len(),
            total_bytes: st.total_bytes,
            pinned: st.entries.values().filter(|e| e.pins > 0).count(),
        }
    }

    fn unpin(&self, fp: &Fingerprint) {
        let mut st = self.lock();
        if let Some(entry) = st.entries.get_mut(fp) {
            entry.pins = entry.pins.saturating_sub(1);
        }
    }

    fn media_path(&self, artifact: &Artifact) -> PathBuf {
        self.inner.cfg.dir.join(format!(
            "{}.{}",
            artifact.fingerprint.to_hex(),
            artifact.container.extension()
        ))
    }

    fn sidecar_path(&self, fp: &Fingerprint) -> PathBuf {
        sidecar_path(&self.inner.cfg.dir, fp)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Every mutation is one insert or remove paired with its byte count.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Keeps a cache entry from being evicted while it is being delivered.
///
/// Pins are reference counted; dropping the guard releases this one.
pub struct ArtifactPin {
    cache: RenderCache,
    artifact: Arc<Artifact>,
}

impl ArtifactPin {
    /// The pinned artifact.
    pub fn artifact(&self) -> &Arc<Artifact> {
        &self.artifact
    }
}

impl std::ops::Deref for ArtifactPin {
    type Target = Artifact;

    fn deref(&self) -> &Artifact {
        &self.artifact
    }
}

impl std::fmt::Debug for ArtifactPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPin")
            .field("fingerprint", &self.artifact.fingerprint)
            .finish()
    }
}

impl Drop for ArtifactPin {
    fn drop(&mut self) {
        self.cache.unpin(&self.artifact.fingerprint);
    }
}

fn take_until(
    st: &CacheState,
    keep: Option<Fingerprint>,
    satisfied: impl Fn(u64, usize) -> bool,
) -> Vec<Fingerprint> {
    let mut bytes = st.total_bytes;
    let mut entries = st.entries.len();
    let mut out = Vec::new();
    for fp in st.lru_candidates(keep) {
        if satisfied(bytes, entries) {
            break;
        }
        if let Some(e) = st.entries.get(&fp) {
            bytes = bytes.saturating_sub(e.artifact.size_bytes);
            entries -= 1;
            out.push(fp);
        }
    }
    out
}

fn sidecar_path(dir: &Path, fp: &Fingerprint) -> PathBuf {
    dir.join(format!("{}.{SIDECAR_EXT}", fp.to_hex()))
}

fn write_sidecar(path: &Path, artifact: &Artifact) -> FramecastResult<()> {
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(artifact)
        .map_err(|e| FramecastError::Other(anyhow::Error::new(e)))?;
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("write cache sidecar '{}'", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("commit cache sidecar '{}'", path.display()))?;
    Ok(())
}

fn load_sidecar(path: &Path) -> Option<Artifact> {
    let bytes = std::fs::read(path).ok()?;
    let artifact: Artifact = serde_json::from_slice(&bytes).ok()?;
    if sidecar_path(path.parent()?, &artifact.fingerprint) != path {
        return None;
    }
    let meta = std::fs::metadata(&artifact.location).ok()?;
    (meta.is_file() && meta.len() == artifact.size_bytes).then_some(artifact)
}

fn remove_files(dir: &Path, artifact: &Artifact) {
    if let Err(e) = std::fs::remove_file(&artifact.location)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %artifact.location.display(), error = %e, "failed to delete cached media");
    }
    let _ = std::fs::remove_file(sidecar_path(dir, &artifact.fingerprint));
}

fn clear_dir(dir: &Path) {
    let Ok(read) = std::fs::read_dir(dir) else {
        return;
    };
    for dirent in read.flatten() {
        let _ = std::fs::remove_file(dirent.path());
    }
}

#[cfg(test)]
#[path = "../../tests/unit/cache/store.rs"]
mod tests;

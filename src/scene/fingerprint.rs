use crate::foundation::ids::Fingerprint;
use crate::scene::canonical::CanonicalForm;
use crate::scene::model::RenderParams;
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x8b5ad4a0c7d8e9f1;
const DOMAIN_TAG: &[u8] = b"framecast/scene/v1";

/// Stable fingerprint of a canonical scene rendered with `params`.
pub(crate) fn fingerprint_scene(canonical: &CanonicalForm, params: &RenderParams) -> Fingerprint {
    let mut h = StableHasher::new();
    h.write_bytes(DOMAIN_TAG);
    h.write_u64(canonical.len() as u64);
    h.write_bytes(canonical.as_bytes());
    h.write_u32(params.resolution.width);
    h.write_u32(params.resolution.height);
    let fps = params.fps.normalized();
    h.write_u32(fps.num);
    h.write_u32(fps.den);
    h.write_u8(params.quality.tag());
    h.finish()
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn finish(self) -> Fingerprint {
        Fingerprint::from_u128(self.inner.digest128())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/fingerprint.rs"]
mod tests;

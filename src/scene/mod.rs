//! Scene payloads: boundary model, validation, canonical form, and fingerprinting.

pub(crate) mod canonical;
pub(crate) mod color;
pub(crate) mod ease;
pub(crate) mod fingerprint;
pub mod ir;
pub(crate) mod model;
pub mod validate;

use crate::foundation::ids::Fingerprint;
use std::sync::Arc;

pub use canonical::CanonicalForm;
pub use ease::Ease;
pub use ir::{Animation, Element, ElementState, Scene, Shape};
pub use model::{AnimProperty, Quality, RenderParams};
pub use validate::SceneValidator;

/// A validated, immutable scene together with its canonical form.
///
/// Cheap to clone; the scene and canonical bytes are shared.
#[derive(Clone, Debug)]
pub struct SceneDescription {
    scene: Arc<Scene>,
    canonical: CanonicalForm,
}

impl SceneDescription {
    pub(crate) fn new(scene: Scene, canonical: CanonicalForm) -> Self {
        Self {
            scene: Arc::new(scene),
            canonical,
        }
    }

    /// The typed scene.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Deterministic serialization used for fingerprinting.
    pub fn canonical(&self) -> &CanonicalForm {
        &self.canonical
    }

    /// Identity of this scene rendered with `params`.
    pub fn fingerprint(&self, params: &RenderParams) -> Fingerprint {
        fingerprint::fingerprint_scene(&self.canonical, params)
    }

    /// Frames needed to cover the scene duration at `params.fps`.
    pub fn frame_count(&self, params: &RenderParams) -> u64 {
        if params.fps.num == 0 || params.fps.den == 0 {
            return 0;
        }
        params.fps.secs_to_frames_ceil(self.scene.duration_secs)
    }
}

use crate::foundation::core::FrameIndex;
use crate::foundation::error::RenderError;
use crate::scene::{RenderParams, Scene};

/// A rendered frame as RGBA8 pixels.
#[derive(Clone, Debug)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
    /// Whether the `data` is premultiplied alpha.
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// Pixel at `(x, y)` as `[r, g, b, a]`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        self.data.get(i..i + 4).map(|p| [p[0], p[1], p[2], p[3]])
    }
}

/// Rendering engine: turns a scene and a frame index into pixels.
///
/// Implementations must be callable from several threads at once; the executor renders the frames
/// of a chunk in parallel. Returning [`RenderError::Engine`] with `transient: true` makes the
/// failure eligible for an automatic retry.
pub trait SceneEngine: Send + Sync {
    /// Render one frame of `scene` at `params.resolution`.
    fn render_frame(
        &self,
        scene: &Scene,
        params: &RenderParams,
        frame: FrameIndex,
    ) -> Result<FrameRGBA, RenderError>;

    /// Short engine name for logs.
    fn name(&self) -> &'static str {
        "engine"
    }
}

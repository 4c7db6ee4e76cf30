use crate::foundation::error::{FramecastError, FramecastResult};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Absolute 0-based frame index in scene timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Half-open frame range `[start, end)` in timeline space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FrameRange {
    /// Inclusive range start.
    pub start: FrameIndex,
    /// Exclusive range end.
    pub end: FrameIndex,
}

impl FrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: FrameIndex, end: FrameIndex) -> FramecastResult<Self> {
        if start.0 > end.0 {
            return Err(FramecastError::config("FrameRange start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Number of frames contained in the range.
    pub fn len_frames(self) -> u64 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// Return `true` when the range has no frames.
    pub fn is_empty(self) -> bool {
        self.start.0 == self.end.0
    }

    /// Return `true` when `f` is inside `[start, end)`.
    pub fn contains(self, f: FrameIndex) -> bool {
        self.start.0 <= f.0 && f.0 < self.end.0
    }

    /// Split the range into consecutive sub-ranges of at most `chunk` frames.
    pub fn chunks(self, chunk: u64) -> impl Iterator<Item = FrameRange> {
        let chunk = chunk.max(1);
        let end = self.end.0;
        (self.start.0..end)
            .step_by(chunk as usize)
            .map(move |s| FrameRange {
                start: FrameIndex(s),
                end: FrameIndex((s + chunk).min(end)),
            })
    }
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> FramecastResult<Self> {
        if den == 0 {
            return Err(FramecastError::config("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(FramecastError::config("Fps num must be > 0"));
        }
        Ok(Self { num, den }.normalized())
    }

    /// The same rate in lowest terms, so `8/2` and `4/1` compare equal.
    pub fn normalized(self) -> Self {
        let g = gcd(self.num, self.den);
        if g <= 1 {
            return self;
        }
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Number of frames needed to cover `secs`, rounding partial frames up.
    pub fn secs_to_frames_ceil(self, secs: f64) -> u64 {
        let exact = secs * self.as_f64();
        // Absorb float noise so that 2.0s @ 30fps is 60 frames, not 61.
        let rounded = exact.round();
        if (exact - rounded).abs() < 1e-9 {
            rounded.max(0.0) as u64
        } else {
            exact.ceil().max(0.0) as u64
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Output frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Bytes needed for one tightly packed RGBA8 frame.
    pub fn rgba8_len(self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }
}

/// Premultiplied RGBA8 (r,g,b already multiplied by a).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8Premul {
    /// Red channel premultiplied by alpha.
    pub r: u8,
    /// Green channel premultiplied by alpha.
    pub g: u8,
    /// Blue channel premultiplied by alpha.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8Premul {
    /// Fully transparent black.
    pub fn transparent() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 0,
        }
    }

    /// Opaque black.
    pub fn black() -> Self {
        Self {
            r: 0,
            g: 0,
            b: 0,
            a: 255,
        }
    }

    /// Scale all channels by `opacity` in `[0, 1]`.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let o = opacity.clamp(0.0, 1.0);
        let scale = |c: u8| ((f64::from(c) * o).round()).clamp(0.0, 255.0) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
            a: scale(self.a),
        }
    }

    /// Convert back to straight alpha (for rasterizers taking unpremultiplied colors).
    pub fn to_straight(self) -> [u8; 4] {
        if self.a == 0 {
            return [0, 0, 0, 0];
        }
        let unpremul = |c: u8| {
            let v = (u32::from(c) * 255 + u32::from(self.a) / 2) / u32::from(self.a);
            v.min(255) as u8
        };
        [unpremul(self.r), unpremul(self.g), unpremul(self.b), self.a]
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;

//! JSON boundary model for scene payloads (schema version "1").
//!
//! Keys not named here are ignored by serde and therefore never reach the canonical form.

use crate::foundation::core::{Fps, Resolution};
use crate::scene::color::ColorDef;
use crate::scene::ease::Ease;
use serde::{Deserialize, Serialize};

pub(crate) const SCENE_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SceneDef {
    pub(crate) version: String,
    pub(crate) viewport: ViewportDef,
    pub(crate) duration_secs: f64,
    #[serde(default = "ColorDef::black")]
    pub(crate) background: ColorDef,
    #[serde(default)]
    pub(crate) elements: Vec<ElementDef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub(crate) struct ViewportDef {
    pub(crate) width: f64,
    pub(crate) height: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ElementDef {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default = "default_opacity")]
    pub(crate) opacity: f64,
    #[serde(default)]
    pub(crate) animations: Vec<AnimationDef>,
    #[serde(flatten)]
    pub(crate) kind: ElementKindDef,
}

fn default_opacity() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ElementKindDef {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        #[serde(default)]
        corner_radius: f64,
        #[serde(default = "ColorDef::white")]
        fill: ColorDef,
    },
    Ellipse {
        cx: f64,
        cy: f64,
        rx: f64,
        ry: f64,
        #[serde(default = "ColorDef::white")]
        fill: ColorDef,
    },
    Path {
        d: String,
        #[serde(default = "ColorDef::white")]
        fill: ColorDef,
    },
    Group {
        #[serde(default)]
        children: Vec<ElementDef>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnimationDef {
    pub(crate) property: AnimProperty,
    pub(crate) from: f64,
    pub(crate) to: f64,
    pub(crate) start_sec: f64,
    pub(crate) end_sec: f64,
    #[serde(default)]
    pub(crate) ease: Ease,
}

/// Animatable element property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnimProperty {
    /// Horizontal offset in viewport units.
    TranslateX,
    /// Vertical offset in viewport units.
    TranslateY,
    /// Rotation about the element pivot, in degrees.
    RotationDeg,
    /// Uniform scale about the element pivot.
    Scale,
    /// Element opacity in `[0, 1]`.
    Opacity,
}

/// Encoder quality preset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Fast, low-bitrate previews.
    Draft,
    /// Default balance of speed and size.
    #[default]
    Standard,
    /// Slow, visually lossless output.
    High,
}

impl Quality {
    /// x264 constant rate factor.
    pub fn crf(self) -> u8 {
        match self {
            Self::Draft => 30,
            Self::Standard => 23,
            Self::High => 18,
        }
    }

    /// x264 speed preset.
    pub fn preset(self) -> &'static str {
        match self {
            Self::Draft => "ultrafast",
            Self::Standard => "medium",
            Self::High => "slow",
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Self::Draft => 0,
            Self::Standard => 1,
            Self::High => 2,
        }
    }
}

/// Output parameters for one render. Part of the fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenderParams {
    /// Output resolution.
    pub resolution: Resolution,
    /// Output frame rate.
    pub fps: Fps,
    /// Encoder quality preset.
    #[serde(default)]
    pub quality: Quality,
}

impl RenderParams {
    /// Standard-quality parameters.
    pub fn new(width: u32, height: u32, fps: Fps) -> Self {
        Self {
            resolution: Resolution { width, height },
            fps: fps.normalized(),
            quality: Quality::Standard,
        }
    }

    /// Replace the quality preset.
    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }
}

//! Validated scene representation handed to rendering engines.
//!
//! Built only by the scene validator, so every value here is finite and every path parsed.

use crate::foundation::core::{Affine, BezPath, Point, Rect, Rgba8Premul, Vec2};
use crate::scene::ease::Ease;
use crate::scene::model::AnimProperty;
use kurbo::Shape as _;

/// A validated scene.
#[derive(Debug, Clone)]
pub struct Scene {
    /// Logical coordinate space that is scaled to the output resolution.
    pub viewport: Vec2,
    /// Scene length in seconds.
    pub duration_secs: f64,
    /// Background color painted under every frame.
    pub background: Rgba8Premul,
    /// Top-level elements in paint order.
    pub elements: Vec<Element>,
}

/// One drawable element (or group) with its animations.
#[derive(Debug, Clone)]
pub struct Element {
    /// Optional user-provided id, unique within the scene.
    pub id: Option<String>,
    /// What to draw.
    pub shape: Shape,
    /// Static opacity, overridden by an active opacity animation.
    pub opacity: f64,
    /// Rotation/scale pivot (bounding-box center in viewport units).
    pub pivot: Point,
    /// Animations in declaration order.
    pub animations: Vec<Animation>,
}

/// Recognized element kinds.
#[derive(Debug, Clone)]
pub enum Shape {
    /// Axis-aligned rectangle, optionally rounded.
    Rect {
        /// Bounds in viewport units.
        rect: Rect,
        /// Corner radius (0 for sharp corners).
        corner_radius: f64,
        /// Fill color.
        fill: Rgba8Premul,
    },
    /// Axis-aligned ellipse.
    Ellipse {
        /// Center in viewport units.
        center: Point,
        /// Horizontal and vertical radii.
        radii: Vec2,
        /// Fill color.
        fill: Rgba8Premul,
    },
    /// Arbitrary filled path (parsed from SVG path data).
    Path {
        /// Path geometry in viewport units.
        path: BezPath,
        /// Fill color.
        fill: Rgba8Premul,
    },
    /// Group whose transform and opacity compose onto its children.
    Group {
        /// Children in paint order.
        children: Vec<Element>,
    },
}

/// A tween of one property over `[start_sec, end_sec]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Animation {
    /// Animated property.
    pub property: AnimProperty,
    /// Value at `start_sec`.
    pub from: f64,
    /// Value at and after `end_sec`.
    pub to: f64,
    /// Start time in seconds.
    pub start_sec: f64,
    /// End time in seconds.
    pub end_sec: f64,
    /// Progress easing.
    pub ease: Ease,
}

impl Animation {
    /// Value at time `t`, or `None` before the animation starts.
    pub fn sample(&self, t: f64) -> Option<f64> {
        if t < self.start_sec {
            return None;
        }
        let span = self.end_sec - self.start_sec;
        let p = if span <= 0.0 {
            1.0
        } else {
            (t - self.start_sec) / span
        };
        let e = self.ease.apply(p);
        Some(self.from + (self.to - self.from) * e)
    }
}

/// Element properties resolved at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementState {
    /// Offset in viewport units.
    pub translate: Vec2,
    /// Rotation in degrees about the pivot.
    pub rotation_deg: f64,
    /// Uniform scale about the pivot.
    pub scale: f64,
    /// Opacity in `[0, 1]`.
    pub opacity: f64,
}

impl Element {
    /// Resolve animated properties at time `t` (seconds).
    ///
    /// For each property the most recently started animation wins; properties without a started
    /// animation keep their static value.
    pub fn state_at(&self, t: f64) -> ElementState {
        let mut st = ElementState {
            translate: Vec2::ZERO,
            rotation_deg: 0.0,
            scale: 1.0,
            opacity: self.opacity,
        };
        let mut started = [f64::NEG_INFINITY; 5];
        for a in &self.animations {
            let Some(v) = a.sample(t) else {
                continue;
            };
            let slot = a.property as usize;
            if a.start_sec < started[slot] {
                continue;
            }
            started[slot] = a.start_sec;
            match a.property {
                AnimProperty::TranslateX => st.translate.x = v,
                AnimProperty::TranslateY => st.translate.y = v,
                AnimProperty::RotationDeg => st.rotation_deg = v,
                AnimProperty::Scale => st.scale = v,
                AnimProperty::Opacity => st.opacity = v,
            }
        }
        st.opacity = st.opacity.clamp(0.0, 1.0);
        st
    }

    /// Local transform at time `t` in viewport units.
    pub fn transform_at(&self, t: f64) -> (Affine, f64) {
        let st = self.state_at(t);
        let pivot = self.pivot.to_vec2();
        let affine = Affine::translate(st.translate + pivot)
            * Affine::rotate(st.rotation_deg.to_radians())
            * Affine::scale(st.scale)
            * Affine::translate(-pivot);
        (affine, st.opacity)
    }
}

impl Shape {
    /// Untransformed bounds in viewport units, `None` for empty groups.
    pub fn bounds(&self) -> Option<Rect> {
        match self {
            Self::Rect { rect, .. } => Some(*rect),
            Self::Ellipse { center, radii, .. } => Some(Rect::new(
                center.x - radii.x,
                center.y - radii.y,
                center.x + radii.x,
                center.y + radii.y,
            )),
            Self::Path { path, .. } => Some(path.bounding_box()),
            Self::Group { children } => children
                .iter()
                .filter_map(|c| c.shape.bounds())
                .reduce(|a, b| a.union(b)),
        }
    }
}

impl Scene {
    /// Total number of elements including group members.
    pub fn element_count(&self) -> usize {
        fn count(els: &[Element]) -> usize {
            els.iter()
                .map(|e| match &e.shape {
                    Shape::Group { children } => 1 + count(children),
                    _ => 1,
                })
                .sum()
        }
        count(&self.elements)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/ir.rs"]
mod tests;

use crate::foundation::config::SceneLimits;
use crate::foundation::core::{BezPath, Point, Rect, Vec2};
use crate::foundation::error::{SchemaError, SchemaPathElem, ValidationError};
use crate::scene::SceneDescription;
use crate::scene::canonical::canonicalize;
use crate::scene::ir::{Animation, Element, Scene, Shape};
use crate::scene::model::{
    AnimationDef, ElementDef, ElementKindDef, RenderParams, SCENE_VERSION, SceneDef,
};
use std::collections::HashSet;

/// Turns raw scene payloads into validated [`SceneDescription`]s.
///
/// Pure over its input and the configured limits.
#[derive(Debug, Clone)]
pub struct SceneValidator {
    limits: SceneLimits,
}

impl SceneValidator {
    /// Create a validator enforcing `limits`.
    pub fn new(limits: SceneLimits) -> Self {
        Self { limits }
    }

    /// Limits enforced by this validator.
    pub fn limits(&self) -> &SceneLimits {
        &self.limits
    }

    /// Parse, check, and canonicalize a raw JSON scene payload.
    ///
    /// Oversized payloads are rejected before any parsing happens.
    pub fn validate(&self, raw: &[u8]) -> Result<SceneDescription, ValidationError> {
        if raw.len() > self.limits.max_payload_bytes {
            return Err(ValidationError::single(format!(
                "payload is {} bytes, limit is {}",
                raw.len(),
                self.limits.max_payload_bytes
            )));
        }

        let def: SceneDef = serde_json::from_slice(raw)
            .map_err(|e| ValidationError::single(format!("parse scene JSON: {e}")))?;
        let scene = self.lower(&def)?;
        let canonical = canonicalize(&def)
            .map_err(|e| ValidationError::single(format!("canonicalize scene: {e}")))?;
        Ok(SceneDescription::new(scene, canonical))
    }

    /// Check render parameters against the configured maxima for `scene`.
    pub fn validate_params(
        &self,
        scene: &SceneDescription,
        params: &RenderParams,
    ) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        let l = &self.limits;
        let res = params.resolution;
        let f = |name| [SchemaPathElem::Field("params"), SchemaPathElem::Field(name)];

        for (name, v, max) in [
            ("width", res.width, l.max_width),
            ("height", res.height, l.max_height),
        ] {
            if v == 0 {
                errors.push(SchemaError::at(&f(name), format!("{name} must be > 0")));
            } else if v % 2 != 0 {
                errors.push(SchemaError::at(
                    &f(name),
                    format!("{name} must be even (required for yuv420p output)"),
                ));
            } else if v > max {
                errors.push(SchemaError::at(
                    &f(name),
                    format!("{name} {v} exceeds maximum {max}"),
                ));
            }
        }

        if params.fps.num == 0 || params.fps.den == 0 {
            errors.push(SchemaError::at(&f("fps"), "fps num/den must be non-zero"));
        } else {
            let fps = params.fps.as_f64();
            if fps > l.max_fps {
                errors.push(SchemaError::at(
                    &f("fps"),
                    format!("fps {fps:.3} exceeds maximum {}", l.max_fps),
                ));
            } else {
                let frames = scene.frame_count(params);
                if frames == 0 {
                    errors.push(SchemaError::at(&f("fps"), "render would produce no frames"));
                } else if frames > l.max_frames {
                    errors.push(SchemaError::at(
                        &f("fps"),
                        format!("render would produce {frames} frames, maximum is {}", l.max_frames),
                    ));
                }
            }
        }

        ValidationError::from_errors(errors)
    }

    fn lower(&self, def: &SceneDef) -> Result<Scene, ValidationError> {
        let mut cx = LowerCtx {
            errors: Vec::new(),
            ids: HashSet::new(),
            count: 0,
            duration: def.duration_secs,
            max_elements: self.limits.max_elements,
        };

        if def.version != SCENE_VERSION {
            cx.push(
                &[SchemaPathElem::Field("version")],
                format!("version must be \"{SCENE_VERSION}\""),
            );
        }
        let vp = def.viewport;
        if !(vp.width.is_finite() && vp.width > 0.0 && vp.height.is_finite() && vp.height > 0.0) {
            cx.push(
                &[SchemaPathElem::Field("viewport")],
                "viewport width/height must be finite and > 0",
            );
        }
        if !def.duration_secs.is_finite() || def.duration_secs <= 0.0 {
            cx.push(
                &[SchemaPathElem::Field("duration_secs")],
                "duration_secs must be finite and > 0",
            );
        } else if def.duration_secs > self.limits.max_duration_secs {
            cx.push(
                &[SchemaPathElem::Field("duration_secs")],
                format!(
                    "duration_secs {} exceeds maximum {}",
                    def.duration_secs, self.limits.max_duration_secs
                ),
            );
        }
        if !def.background.is_finite() {
            cx.push(
                &[SchemaPathElem::Field("background")],
                "background color channels must be finite",
            );
        }

        let mut path = vec![SchemaPathElem::Field("elements")];
        let elements = cx.lower_elements(&def.elements, &mut path);

        if cx.count > cx.max_elements {
            cx.push(
                &[SchemaPathElem::Field("elements")],
                format!(
                    "scene has {} elements, maximum is {}",
                    cx.count, cx.max_elements
                ),
            );
        }

        ValidationError::from_errors(cx.errors)?;
        Ok(Scene {
            viewport: Vec2::new(vp.width, vp.height),
            duration_secs: def.duration_secs,
            background: def.background.to_rgba8_premul(),
            elements,
        })
    }
}

struct LowerCtx {
    errors: Vec<SchemaError>,
    ids: HashSet<String>,
    count: usize,
    duration: f64,
    max_elements: usize,
}

impl LowerCtx {
    fn push(&mut self, path: &[SchemaPathElem], msg: impl Into<String>) {
        self.errors.push(SchemaError::at(path, msg));
    }

    fn push_field(&mut self, path: &[SchemaPathElem], field: &'static str, msg: impl Into<String>) {
        let mut full = path.to_vec();
        full.push(SchemaPathElem::Field(field));
        self.push(&full, msg);
    }

    fn finite(&mut self, path: &[SchemaPathElem], fields: &[(&'static str, f64)]) -> bool {
        let mut ok = true;
        for &(name, v) in fields {
            if !v.is_finite() {
                self.push_field(path, name, format!("{name} must be finite"));
                ok = false;
            }
        }
        ok
    }

    fn lower_elements(
        &mut self,
        defs: &[ElementDef],
        path: &mut Vec<SchemaPathElem>,
    ) -> Vec<Element> {
        let mut out = Vec::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            self.count += 1;
            path.push(SchemaPathElem::Index(i));
            if let Some(el) = self.lower_element(def, path) {
                out.push(el);
            }
            path.pop();
        }
        out
    }

    fn lower_element(
        &mut self,
        def: &ElementDef,
        path: &mut Vec<SchemaPathElem>,
    ) -> Option<Element> {
        if let Some(id) = &def.id {
            if id.trim().is_empty() {
                self.push_field(path, "id", "element id must be non-empty when set");
            } else if !self.ids.insert(id.clone()) {
                self.push_field(path, "id", format!("duplicate element id \"{id}\""));
            }
        }
        if !def.opacity.is_finite() || !(0.0..=1.0).contains(&def.opacity) {
            self.push_field(path, "opacity", "opacity must be in [0, 1]");
        }

        let animations = self.lower_animations(&def.animations, path);

        let shape = match &def.kind {
            ElementKindDef::Rect {
                x,
                y,
                width,
                height,
                corner_radius,
                fill,
            } => {
                let ok = self.finite(
                    path,
                    &[
                        ("x", *x),
                        ("y", *y),
                        ("width", *width),
                        ("height", *height),
                        ("corner_radius", *corner_radius),
                    ],
                );
                if *width < 0.0 || *height < 0.0 {
                    self.push(path, "rect width/height must be >= 0");
                }
                if *corner_radius < 0.0 {
                    self.push_field(path, "corner_radius", "corner_radius must be >= 0");
                }
                if !fill.is_finite() {
                    self.push_field(path, "fill", "fill color channels must be finite");
                }
                ok.then(|| Shape::Rect {
                    rect: Rect::new(*x, *y, x + width, y + height),
                    corner_radius: *corner_radius,
                    fill: fill.to_rgba8_premul(),
                })
            }
            ElementKindDef::Ellipse {
                cx,
                cy,
                rx,
                ry,
                fill,
            } => {
                let ok = self.finite(path, &[("cx", *cx), ("cy", *cy), ("rx", *rx), ("ry", *ry)]);
                if *rx < 0.0 || *ry < 0.0 {
                    self.push(path, "ellipse radii must be >= 0");
                }
                if !fill.is_finite() {
                    self.push_field(path, "fill", "fill color channels must be finite");
                }
                ok.then(|| Shape::Ellipse {
                    center: Point::new(*cx, *cy),
                    radii: Vec2::new(*rx, *ry),
                    fill: fill.to_rgba8_premul(),
                })
            }
            ElementKindDef::Path { d, fill } => {
                if !fill.is_finite() {
                    self.push_field(path, "fill", "fill color channels must be finite");
                }
                match BezPath::from_svg(d.trim()) {
                    Ok(bp) if bp.elements().is_empty() => {
                        self.push_field(path, "d", "path data must not be empty");
                        None
                    }
                    Ok(bp) => Some(Shape::Path {
                        path: bp,
                        fill: fill.to_rgba8_premul(),
                    }),
                    Err(e) => {
                        self.push_field(path, "d", format!("invalid SVG path data: {e}"));
                        None
                    }
                }
            }
            ElementKindDef::Group { children } => {
                path.push(SchemaPathElem::Field("children"));
                let children = self.lower_elements(children, path);
                path.pop();
                Some(Shape::Group { children })
            }
        }?;

        let pivot = shape.bounds().map(|r| r.center()).unwrap_or(Point::ZERO);
        Some(Element {
            id: def.id.clone(),
            shape,
            opacity: def.opacity,
            pivot,
            animations,
        })
    }

    fn lower_animations(
        &mut self,
        defs: &[AnimationDef],
        path: &mut Vec<SchemaPathElem>,
    ) -> Vec<Animation> {
        let mut out = Vec::with_capacity(defs.len());
        path.push(SchemaPathElem::Field("animations"));
        for (i, a) in defs.iter().enumerate() {
            path.push(SchemaPathElem::Index(i));
            let ok = self.finite(
                path,
                &[
                    ("from", a.from),
                    ("to", a.to),
                    ("start_sec", a.start_sec),
                    ("end_sec", a.end_sec),
                ],
            );
            if ok {
                if a.start_sec < 0.0 {
                    self.push_field(path, "start_sec", "start_sec must be >= 0");
                }
                if a.end_sec < a.start_sec {
                    self.push_field(path, "end_sec", "end_sec must be >= start_sec");
                }
                if a.end_sec > self.duration {
                    self.push_field(
                        path,
                        "end_sec",
                        format!("end_sec must be <= scene duration ({})", self.duration),
                    );
                }
                out.push(Animation {
                    property: a.property,
                    from: a.from,
                    to: a.to,
                    start_sec: a.start_sec,
                    end_sec: a.end_sec,
                    ease: a.ease,
                });
            }
            path.pop();
        }
        path.pop();
        out
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/validate.rs"]
mod tests;

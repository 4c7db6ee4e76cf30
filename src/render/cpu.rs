use crate::foundation::core::{Affine, BezPath, FrameIndex, Rgba8Premul};
use crate::foundation::error::RenderError;
use crate::render::backend::{FrameRGBA, SceneEngine};
use crate::scene::{Element, RenderParams, Scene, Shape};
use std::cell::RefCell;

/// Flattening tolerance for curves converted to paths, in viewport units.
const PATH_TOLERANCE: f64 = 0.1;

thread_local! {
    static CTX: RefCell<Option<vello_cpu::RenderContext>> = const { RefCell::new(None) };
}

/// CPU rasterizer powered by `vello_cpu`.
///
/// Each rendering thread keeps its own `RenderContext`, reused while the output size is unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuEngine;

impl CpuEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

impl SceneEngine for CpuEngine {
    fn render_frame(
        &self,
        scene: &Scene,
        params: &RenderParams,
        frame: FrameIndex,
    ) -> Result<FrameRGBA, RenderError> {
        let res = params.resolution;
        let (Ok(w), Ok(h)) = (u16::try_from(res.width), u16::try_from(res.height)) else {
            return Err(RenderError::engine(format!(
                "resolution {}x{} exceeds rasterizer limits",
                res.width, res.height
            )));
        };
        if w == 0 || h == 0 {
            return Err(RenderError::engine("resolution must be non-zero"));
        }

        let t = params.fps.frames_to_secs(frame.0);
        let to_output = Affine::scale_non_uniform(
            f64::from(res.width) / scene.viewport.x,
            f64::from(res.height) / scene.viewport.y,
        );

        Ok(with_ctx(w, h, |ctx| {
            ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
            set_color(ctx, scene.background);
            ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                0.0,
                0.0,
                f64::from(w),
                f64::from(h),
            ));

            for el in &scene.elements {
                draw_element(ctx, el, t, to_output, 1.0);
            }

            let mut pixmap = vello_cpu::Pixmap::new(w, h);
            ctx.flush();
            ctx.render_to_pixmap(&mut pixmap);
            FrameRGBA {
                width: res.width,
                height: res.height,
                data: pixmap.data_as_u8_slice().to_vec(),
                premultiplied: true,
            }
        }))
    }

    fn name(&self) -> &'static str {
        "vello_cpu"
    }
}

fn with_ctx<R>(w: u16, h: u16, f: impl FnOnce(&mut vello_cpu::RenderContext) -> R) -> R {
    CTX.with(|cell| {
        let mut slot = cell.borrow_mut();
        let mut ctx = match slot.take() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx,
            _ => vello_cpu::RenderContext::new(w, h),
        };
        ctx.reset();
        let out = f(&mut ctx);
        *slot = Some(ctx);
        out
    })
}

fn draw_element(
    ctx: &mut vello_cpu::RenderContext,
    el: &Element,
    t: f64,
    parent: Affine,
    parent_opacity: f64,
) {
    let (local, opacity) = el.transform_at(t);
    let tr = parent * local;
    let opacity = parent_opacity * opacity;
    if opacity <= 0.0 {
        return;
    }

    match &el.shape {
        Shape::Rect {
            rect,
            corner_radius,
            fill,
        } => {
            ctx.set_transform(affine_to_cpu(tr));
            set_color(ctx, fill.with_opacity(opacity));
            if *corner_radius > 0.0 {
                let rr = kurbo::RoundedRect::from_rect(*rect, *corner_radius);
                ctx.fill_path(&shape_to_cpu(&rr));
            } else {
                ctx.fill_rect(&vello_cpu::kurbo::Rect::new(
                    rect.x0, rect.y0, rect.x1, rect.y1,
                ));
            }
        }
        Shape::Ellipse {
            center,
            radii,
            fill,
        } => {
            ctx.set_transform(affine_to_cpu(tr));
            set_color(ctx, fill.with_opacity(opacity));
            let e = kurbo::Ellipse::new(*center, *radii, 0.0);
            ctx.fill_path(&shape_to_cpu(&e));
        }
        Shape::Path { path, fill } => {
            ctx.set_transform(affine_to_cpu(tr));
            set_color(ctx, fill.with_opacity(opacity));
            ctx.fill_path(&bezpath_to_cpu(path));
        }
        Shape::Group { children } => {
            for child in children {
                draw_element(ctx, child, t, tr, opacity);
            }
        }
    }
}

fn set_color(ctx: &mut vello_cpu::RenderContext, c: Rgba8Premul) {
    let [r, g, b, a] = c.to_straight();
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, a));
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn shape_to_cpu(shape: &impl kurbo::Shape) -> vello_cpu::kurbo::BezPath {
    let mut p = BezPath::new();
    for el in shape.path_elements(PATH_TOLERANCE) {
        p.push(el);
    }
    bezpath_to_cpu(&p)
}

fn bezpath_to_cpu(path: &BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let pt = |p: kurbo::Point| vello_cpu::kurbo::Point::new(p.x, p.y);
    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(pt(p)),
            PathEl::LineTo(p) => out.line_to(pt(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(pt(p1), pt(p2)),
            PathEl::CurveTo(p1, p2, p3) => out.curve_to(pt(p1), pt(p2), pt(p3)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;

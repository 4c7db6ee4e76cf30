use super::*;
use crate::foundation::config::SceneLimits;
use crate::foundation::core::Fps;
use crate::scene::SceneValidator;

fn scene(json: &str) -> Scene {
    SceneValidator::new(SceneLimits::default())
        .validate(json.as_bytes())
        .unwrap()
        .scene()
        .clone()
}

fn params() -> RenderParams {
    RenderParams::new(4, 4, Fps::new(10, 1).unwrap())
}

fn close(a: [u8; 4], b: [u8; 4]) -> bool {
    a.iter().zip(b).all(|(x, y)| (i16::from(*x) - i16::from(y)).abs() <= 2)
}

#[test]
fn paints_background_and_scaled_rect() {
    let s = scene(
        r##"{"version":"1","viewport":{"width":100,"height":100},"duration_secs":1,
            "background":"#ff0000",
            "elements":[{"type":"rect","x":0,"y":0,"width":50,"height":100,"fill":"#ffffff"}]}"##,
    );
    let f = CpuEngine::new()
        .render_frame(&s, &params(), FrameIndex(0))
        .unwrap();
    assert_eq!((f.width, f.height), (4, 4));
    assert!(f.premultiplied);
    assert_eq!(f.data.len(), 64);
    assert!(close(f.pixel(0, 0).unwrap(), [255, 255, 255, 255]));
    assert!(close(f.pixel(3, 3).unwrap(), [255, 0, 0, 255]));
}

#[test]
fn group_opacity_composes_onto_children() {
    let s = scene(
        r##"{"version":"1","viewport":{"width":4,"height":4},"duration_secs":1,
            "background":"#000000",
            "elements":[{"type":"group","opacity":0.5,"children":[
                {"type":"rect","x":0,"y":0,"width":4,"height":4,"fill":"#ffffff"}]}]}"##,
    );
    let f = CpuEngine::new()
        .render_frame(&s, &params(), FrameIndex(0))
        .unwrap();
    assert!(close(f.pixel(1, 1).unwrap(), [128, 128, 128, 255]));
}

#[test]
fn animation_moves_element_between_frames() {
    let s = scene(
        r##"{"version":"1","viewport":{"width":4,"height":4},"duration_secs":1,
            "background":"#000000",
            "elements":[{"type":"rect","x":0,"y":0,"width":2,"height":4,"fill":"#00ff00",
                "animations":[{"property":"translate_x","from":0,"to":2,"start_sec":0,"end_sec":0.5}]}]}"##,
    );
    let engine = CpuEngine::new();
    let first = engine.render_frame(&s, &params(), FrameIndex(0)).unwrap();
    let last = engine.render_frame(&s, &params(), FrameIndex(9)).unwrap();
    assert!(close(first.pixel(0, 0).unwrap(), [0, 255, 0, 255]));
    assert!(close(first.pixel(3, 0).unwrap(), [0, 0, 0, 255]));
    assert!(close(last.pixel(0, 0).unwrap(), [0, 0, 0, 255]));
    assert!(close(last.pixel(3, 0).unwrap(), [0, 255, 0, 255]));
}

#[test]
fn ellipse_and_path_fill_their_interior() {
    let s = scene(
        r##"{"version":"1","viewport":{"width":4,"height":4},"duration_secs":1,
            "background":"#000000",
            "elements":[
                {"type":"ellipse","cx":1,"cy":1,"rx":1,"ry":1,"fill":"#0000ff"},
                {"type":"path","d":"M2 2 L4 2 L4 4 L2 4 Z","fill":"#ffffff"}]}"##,
    );
    let f = CpuEngine::new()
        .render_frame(&s, &params(), FrameIndex(0))
        .unwrap();
    let center = f.pixel(0, 0).unwrap();
    assert!(center[2] > 100, "{center:?}");
    assert!(close(f.pixel(3, 3).unwrap(), [255, 255, 255, 255]));
    assert!(close(f.pixel(3, 0).unwrap(), [0, 0, 0, 255]));
}

#[test]
fn same_frame_renders_identically() {
    let s = scene(
        r##"{"version":"1","viewport":{"width":4,"height":4},"duration_secs":1,
            "elements":[{"type":"rect","x":0.5,"y":0.5,"width":2,"height":2,"corner_radius":0.5,
                "animations":[{"property":"rotation_deg","from":0,"to":90,"start_sec":0,"end_sec":1}]}]}"##,
    );
    let engine = CpuEngine::new();
    let a = engine.render_frame(&s, &params(), FrameIndex(3)).unwrap();
    let b = engine.render_frame(&s, &params(), FrameIndex(3)).unwrap();
    assert_eq!(a.data, b.data);
}

#[test]
fn oversized_resolution_is_an_engine_fault() {
    let s = scene(r#"{"version":"1","viewport":{"width":4,"height":4},"duration_secs":1}"#);
    let p = RenderParams::new(70_000, 2, Fps::new(10, 1).unwrap());
    let err = CpuEngine::new()
        .render_frame(&s, &p, FrameIndex(0))
        .unwrap_err();
    assert!(matches!(err, RenderError::Engine { transient: false, .. }));
}

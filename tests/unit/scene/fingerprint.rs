use super::*;
use crate::foundation::core::{Fps, Resolution};
use crate::scene::canonical::canonicalize;
use crate::scene::model::{Quality, SceneDef};

fn canonical() -> CanonicalForm {
    let def: SceneDef = serde_json::from_str(
        r#"{"version":"1","viewport":{"width":64,"height":36},"duration_secs":1,
            "elements":[{"type":"rect","x":1,"y":2,"width":3,"height":4}]}"#,
    )
    .unwrap();
    canonicalize(&def).unwrap()
}

fn params(num: u32, den: u32) -> RenderParams {
    RenderParams {
        resolution: Resolution {
            width: 64,
            height: 36,
        },
        fps: Fps { num, den },
        quality: Quality::Standard,
    }
}

#[test]
fn equal_frame_rates_share_a_fingerprint() {
    let c = canonical();
    let base = fingerprint_scene(&c, &params(4, 1));
    assert_eq!(fingerprint_scene(&c, &params(8, 2)), base);
    assert_eq!(fingerprint_scene(&c, &params(60, 15)), base);
    assert_ne!(fingerprint_scene(&c, &params(5, 1)), base);
}

#[test]
fn constructors_reduce_frame_rates() {
    assert_eq!(Fps::new(8, 2).unwrap(), Fps::new(4, 1).unwrap());
    assert_eq!(Fps::new(60000, 2002).unwrap(), Fps { num: 30000, den: 1001 });
    let p = RenderParams::new(64, 36, Fps { num: 50, den: 2 });
    assert_eq!(p.fps, Fps { num: 25, den: 1 });
}

#[test]
fn output_parameters_change_the_fingerprint() {
    let c = canonical();
    let base = fingerprint_scene(&c, &params(4, 1));
    let mut wide = params(4, 1);
    wide.resolution.width = 128;
    assert_ne!(fingerprint_scene(&c, &wide), base);
    let high = params(4, 1).with_quality(Quality::High);
    assert_ne!(fingerprint_scene(&c, &high), base);
}

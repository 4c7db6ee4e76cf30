use super::*;

fn rect_element(animations: Vec<Animation>) -> Element {
    Element {
        id: Some("box".to_string()),
        shape: Shape::Rect {
            rect: Rect::new(0.0, 0.0, 10.0, 10.0),
            corner_radius: 0.0,
            fill: Rgba8Premul::black(),
        },
        opacity: 1.0,
        pivot: Point::new(5.0, 5.0),
        animations,
    }
}

fn anim(property: AnimProperty, from: f64, to: f64, start_sec: f64, end_sec: f64) -> Animation {
    Animation {
        property,
        from,
        to,
        start_sec,
        end_sec,
        ease: Ease::Linear,
    }
}

#[test]
fn sample_is_none_before_start_and_holds_after_end() {
    let a = anim(AnimProperty::TranslateX, 0.0, 100.0, 1.0, 2.0);
    assert_eq!(a.sample(0.5), None);
    assert_eq!(a.sample(1.5), Some(50.0));
    assert_eq!(a.sample(5.0), Some(100.0));
}

#[test]
fn zero_length_animation_jumps_to_target() {
    let a = anim(AnimProperty::Scale, 1.0, 3.0, 1.0, 1.0);
    assert_eq!(a.sample(1.0), Some(3.0));
}

#[test]
fn latest_started_animation_wins_per_property() {
    let el = rect_element(vec![
        anim(AnimProperty::TranslateX, 0.0, 10.0, 0.0, 4.0),
        anim(AnimProperty::TranslateX, 100.0, 100.0, 2.0, 3.0),
    ]);
    assert_eq!(el.state_at(1.0).translate.x, 2.5);
    assert_eq!(el.state_at(2.5).translate.x, 100.0);
}

#[test]
fn opacity_animation_is_clamped() {
    let el = rect_element(vec![anim(AnimProperty::Opacity, 1.0, 2.0, 0.0, 1.0)]);
    assert_eq!(el.state_at(1.0).opacity, 1.0);
}

#[test]
fn transform_rotates_about_pivot() {
    let el = rect_element(vec![anim(AnimProperty::RotationDeg, 0.0, 180.0, 0.0, 1.0)]);
    let (tr, opacity) = el.transform_at(1.0);
    assert_eq!(opacity, 1.0);
    let p = tr * Point::new(0.0, 0.0);
    assert!((p.x - 10.0).abs() < 1e-9);
    assert!((p.y - 10.0).abs() < 1e-9);
    let c = tr * Point::new(5.0, 5.0);
    assert!((c.x - 5.0).abs() < 1e-9 && (c.y - 5.0).abs() < 1e-9);
}

#[test]
fn group_bounds_union_children_and_counts_recurse() {
    let child = |x: f64| Element {
        id: None,
        shape: Shape::Ellipse {
            center: Point::new(x, 0.0),
            radii: Vec2::new(1.0, 1.0),
            fill: Rgba8Premul::black(),
        },
        opacity: 1.0,
        pivot: Point::new(x, 0.0),
        animations: Vec::new(),
    };
    let group = Shape::Group {
        children: vec![child(0.0), child(10.0)],
    };
    assert_eq!(group.bounds(), Some(Rect::new(-1.0, -1.0, 11.0, 1.0)));
    assert_eq!(Shape::Group { children: vec![] }.bounds(), None);

    let scene = Scene {
        viewport: Vec2::new(100.0, 100.0),
        duration_secs: 1.0,
        background: Rgba8Premul::black(),
        elements: vec![Element {
            id: None,
            shape: group,
            opacity: 1.0,
            pivot: Point::ZERO,
            animations: Vec::new(),
        }],
    };
    assert_eq!(scene.element_count(), 3);
}

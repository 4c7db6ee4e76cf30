use super::*;
use crate::scene::Quality;

#[test]
fn flatten_premul_alpha_0_returns_bg() {
    let src = vec![0u8, 0, 0, 0];
    let mut dst = vec![0u8; 4];
    flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]);
    assert_eq!(dst, vec![10, 20, 30, 255]);
}

#[test]
fn flatten_premul_alpha_255_is_identity() {
    let src = vec![1u8, 2, 3, 255];
    let mut dst = vec![0u8; 4];
    flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [10, 20, 30, 255]);
    assert_eq!(dst, src);
}

#[test]
fn odd_dimensions_are_rejected_before_spawning() {
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::default(), std::env::temp_dir().join("x.mp4"));
    let err = sink
        .begin(SinkConfig {
            width: 3,
            height: 2,
            fps: Fps { num: 30, den: 1 },
            quality: Quality::Draft,
        })
        .unwrap_err();
    assert!(!err.is_transient());
    assert!(err.to_string().contains("even"));
}

#[test]
fn missing_program_is_a_permanent_encoder_fault() {
    let opts = FfmpegSinkOpts {
        program: PathBuf::from("framecast-no-such-ffmpeg"),
        ..FfmpegSinkOpts::default()
    };
    let mut sink = FfmpegSink::new(opts, std::env::temp_dir().join("framecast-missing.mp4"));
    let err = sink
        .begin(SinkConfig {
            width: 2,
            height: 2,
            fps: Fps { num: 30, den: 1 },
            quality: Quality::Standard,
        })
        .unwrap_err();
    assert!(matches!(err, RenderError::Encoder { transient: false, .. }));
}

#[test]
fn encodes_mp4_when_ffmpeg_available() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let dir = std::env::temp_dir().join(format!("framecast-ffmpeg-{}", std::process::id()));
    let out = dir.join("out.mp4");
    let mut sink = FfmpegSinkFactory::default().create(&out).unwrap();
    sink.begin(SinkConfig {
        width: 16,
        height: 16,
        fps: Fps { num: 10, den: 1 },
        quality: Quality::Draft,
    })
    .unwrap();
    for i in 0..5 {
        let frame = FrameRGBA {
            width: 16,
            height: 16,
            data: vec![(i * 40) as u8; 16 * 16 * 4],
            premultiplied: true,
        };
        sink.push_frame(FrameIndex(i), &frame).unwrap();
    }
    sink.end().unwrap();
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
    let _ = std::fs::remove_dir_all(&dir);
}

use std::{
    io::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use framecast::foundation::core::Rgba8Premul;
use framecast::{
    ByteRange, CpuEngine, Delivery, EvictionPolicy, FfmpegSinkFactory, FfmpegSinkOpts, Fps,
    FrameIndex, JobCoordinator, JobEvent, Quality, RawRgbaSinkFactory, RenderCache, RenderParams,
    SceneEngine, SceneValidator, ServiceConfig, SinkFactory,
};

#[derive(Parser, Debug)]
#[command(name = "framecast", version)]
struct Cli {
    /// Service configuration JSON. Defaults plus `FRAMECAST_*` overrides when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a scene and print its fingerprint.
    Validate(ValidateArgs),
    /// Render a scene through the job coordinator and copy the artifact out.
    Render(RenderArgs),
    /// Render a single frame as a PNG.
    Frame(FrameArgs),
    /// Inspect or trim the render cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Args, Debug, Clone)]
struct OutputArgs {
    /// Output width in pixels.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Output height in pixels.
    #[arg(long, default_value_t = 360)]
    height: u32,

    /// Frame rate, `30` or `30000/1001`.
    #[arg(long, default_value = "30", value_parser = parse_fps)]
    fps: Fps,

    /// Encoder quality preset.
    #[arg(long, value_enum, default_value_t = QualityChoice::Standard)]
    quality: QualityChoice,
}

#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Where to copy the finished artifact.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    output: OutputArgs,

    /// Write raw RGBA frames instead of MP4 (no `ffmpeg` needed).
    #[arg(long)]
    raw: bool,

    /// Copy only this byte range of the artifact, e.g. `bytes=0-1023`.
    #[arg(long, value_parser = parse_range)]
    range: Option<ByteRange>,

    /// Give up waiting after this many seconds.
    #[arg(long, default_value_t = 3600)]
    timeout_secs: u64,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input scene JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Frame index (0-based).
    #[arg(long)]
    frame: u64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    /// List cached artifacts, most recently used first.
    List {
        /// Print one JSON object per line.
        #[arg(long)]
        json: bool,
    },
    /// Evict least recently used artifacts until the cache fits in `--max-bytes`.
    Evict {
        /// Byte budget to trim down to.
        #[arg(long)]
        max_bytes: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QualityChoice {
    Draft,
    Standard,
    High,
}

impl From<QualityChoice> for Quality {
    fn from(q: QualityChoice) -> Self {
        match q {
            QualityChoice::Draft => Quality::Draft,
            QualityChoice::Standard => Quality::Standard,
            QualityChoice::High => Quality::High,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;
    framecast::init_logging(&cfg.logging);
    match cli.cmd {
        Command::Validate(args) => cmd_validate(&cfg, args),
        Command::Render(args) => cmd_render(&cfg, args),
        Command::Frame(args) => cmd_frame(&cfg, args),
        Command::Cache(cmd) => cmd_cache(&cfg, cmd),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ServiceConfig> {
    Ok(match path {
        Some(p) => ServiceConfig::load(p)?,
        None => ServiceConfig::from_env()?,
    })
}

fn parse_fps(s: &str) -> Result<Fps, String> {
    let (num, den) = match s.split_once('/') {
        Some((n, d)) => (n.trim(), d.trim()),
        None => (s.trim(), "1"),
    };
    let num: u32 = num.parse().map_err(|_| format!("invalid fps numerator \"{num}\""))?;
    let den: u32 = den.parse().map_err(|_| format!("invalid fps denominator \"{den}\""))?;
    Fps::new(num, den).map_err(|e| e.to_string())
}

fn parse_range(s: &str) -> Result<ByteRange, String> {
    ByteRange::parse(s).map_err(|e| e.to_string())
}

fn render_params(o: &OutputArgs) -> RenderParams {
    RenderParams::new(o.width, o.height, o.fps).with_quality(o.quality.into())
}

fn read_scene(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read scene '{}'", path.display()))
}

fn cmd_validate(cfg: &ServiceConfig, args: ValidateArgs) -> anyhow::Result<()> {
    let validator = SceneValidator::new(cfg.limits.clone());
    let desc = validator.validate(&read_scene(&args.in_path)?)?;
    let params = render_params(&args.output);
    validator.validate_params(&desc, &params)?;

    println!("fingerprint: {}", desc.fingerprint(&params));
    println!("canonical_bytes: {}", desc.canonical().len());
    println!("elements: {}", desc.scene().element_count());
    println!("frames: {}", desc.frame_count(&params));
    Ok(())
}

fn cmd_render(cfg: &ServiceConfig, args: RenderArgs) -> anyhow::Result<()> {
    let sinks: Arc<dyn SinkFactory> = if args.raw {
        Arc::new(RawRgbaSinkFactory)
    } else {
        if !framecast::encode::is_ffmpeg_on_path() {
            anyhow::bail!("ffmpeg not found on PATH (use --raw for raw RGBA output)");
        }
        Arc::new(FfmpegSinkFactory::new(FfmpegSinkOpts::default()))
    };
    let coordinator = JobCoordinator::new(cfg, Arc::new(CpuEngine::new()), sinks)?;

    let handle = coordinator.submit_raw(&read_scene(&args.in_path)?, render_params(&args.output))?;
    let events = coordinator.subscribe(&handle);
    let logger = std::thread::Builder::new()
        .name("framecast-progress".to_string())
        .spawn(move || {
            for ev in events {
                match &ev {
                    JobEvent::Progress {
                        frames_done,
                        frames_total,
                    } => tracing::info!(frames_done, frames_total, "progress"),
                    JobEvent::Failed { kind, message } => {
                        tracing::error!(kind = %kind, message = %message, "failed")
                    }
                    other => tracing::info!(event = ?other, "job event"),
                }
            }
        })
        .context("spawn progress logger")?;

    let result = coordinator.await_result(&handle, Duration::from_secs(args.timeout_secs));
    if result.is_err() {
        let _ = coordinator.cancel(&handle);
    }
    coordinator.shutdown();
    let _ = logger.join();
    let artifact = result?;

    let mut stream = Delivery::new(coordinator.cache().clone()).deliver(&artifact, args.range)?;
    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    let mut out = std::fs::File::create(&args.out)
        .with_context(|| format!("create '{}'", args.out.display()))?;
    let copied = std::io::copy(&mut stream, &mut out)
        .with_context(|| format!("write '{}'", args.out.display()))?;
    out.flush()?;

    eprintln!(
        "wrote {} ({copied} bytes, {}, sha256 {})",
        args.out.display(),
        stream.content_range(),
        artifact.content_hash
    );
    Ok(())
}

fn cmd_frame(cfg: &ServiceConfig, args: FrameArgs) -> anyhow::Result<()> {
    let validator = SceneValidator::new(cfg.limits.clone());
    let desc = validator.validate(&read_scene(&args.in_path)?)?;
    let params = render_params(&args.output);
    validator.validate_params(&desc, &params)?;
    let total = desc.frame_count(&params);
    if args.frame >= total {
        anyhow::bail!("frame {} is out of range (scene has {total} frames)", args.frame);
    }

    let frame = CpuEngine::new().render_frame(desc.scene(), &params, FrameIndex(args.frame))?;
    let data: Vec<u8> = if frame.premultiplied {
        frame
            .data
            .chunks_exact(4)
            .flat_map(|p| {
                Rgba8Premul {
                    r: p[0],
                    g: p[1],
                    b: p[2],
                    a: p[3],
                }
                .to_straight()
            })
            .collect()
    } else {
        frame.data
    };

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_cache(cfg: &ServiceConfig, cmd: CacheCommand) -> anyhow::Result<()> {
    let cache = RenderCache::open(cfg.cache.clone())?;
    match cmd {
        CacheCommand::List { json } => {
            for a in cache.entries() {
                if json {
                    println!("{}", serde_json::to_string(&*a)?);
                } else {
                    println!(
                        "{}  {:>12}  {:>6} frames  {}",
                        a.fingerprint,
                        a.size_bytes,
                        a.frame_count,
                        a.location.display()
                    );
                }
            }
            let stats = cache.stats();
            eprintln!(
                "{} entries, {} bytes ({} pinned)",
                stats.entries, stats.total_bytes, stats.pinned
            );
        }
        CacheCommand::Evict { max_bytes } => {
            let evicted = cache.evict(EvictionPolicy::ToBytes(max_bytes));
            for fp in &evicted {
                println!("{fp}");
            }
            eprintln!(
                "evicted {} entries, {} bytes remain",
                evicted.len(),
                cache.stats().total_bytes
            );
        }
    }
    Ok(())
}

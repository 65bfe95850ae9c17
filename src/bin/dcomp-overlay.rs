use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use dcomp_overlay::{
    DCompPresenter, HeadlessDevice, HeadlessOpts, OverlayImage, OverlayParams, OverlaySupport,
    PixelRect, PixelSize, Rgba8Premul, SurfaceOpts, SwapResult, TextureFormat, TextureHandle,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dcomp-overlay", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive a frame script through the headless compositor.
    Replay(ReplayArgs),
    /// Validate a frame script without rendering it.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct ReplayArgs {
    /// Input frame script JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Write the last composed frame as PNG.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Override the root surface width.
    #[arg(long)]
    width: Option<u32>,

    /// Override the root surface height.
    #[arg(long)]
    height: Option<u32>,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input frame script JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

/// A solid texture declared up front and referenced by index from overlays.
#[derive(Clone, Debug, serde::Deserialize)]
struct ScriptTexture {
    width: u32,
    height: u32,
    /// Straight RGBA.
    color: [u8; 4],
    #[serde(default)]
    format: TextureFormat,
}

#[derive(Clone, Debug, serde::Deserialize)]
struct ScriptOverlay {
    /// Index into [`FrameScript::textures`]; replaces `image`.
    #[serde(default)]
    texture: Option<usize>,
    #[serde(flatten)]
    params: OverlayParams,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct ScriptFrame {
    #[serde(default)]
    overlays: Vec<ScriptOverlay>,
    #[serde(default)]
    frame_rate: Option<f32>,
    /// Damage for a partial swap; a full swap when absent.
    #[serde(default)]
    damage: Option<PixelRect>,
}

#[derive(Clone, Debug, serde::Deserialize)]
struct FrameScript {
    #[serde(default)]
    opts: SurfaceOpts,
    /// Straight RGBA the root surface is cleared to every frame.
    #[serde(default)]
    root_color: Option<[u8; 4]>,
    #[serde(default)]
    textures: Vec<ScriptTexture>,
    frames: Vec<ScriptFrame>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Replay(args) => cmd_replay(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn read_script(path: &Path) -> anyhow::Result<FrameScript> {
    let f = File::open(path).with_context(|| format!("open frame script '{}'", path.display()))?;
    let r = BufReader::new(f);
    let script: FrameScript =
        serde_json::from_reader(r).with_context(|| "parse frame script JSON")?;
    Ok(script)
}

fn resolve_overlays(
    frame: &ScriptFrame,
    textures: &[TextureHandle],
) -> anyhow::Result<Vec<OverlayParams>> {
    frame
        .overlays
        .iter()
        .map(|o| {
            let mut params = o.params.clone();
            if let Some(index) = o.texture {
                let handle = textures
                    .get(index)
                    .with_context(|| format!("texture index {index} out of range"))?;
                params.image = Some(OverlayImage::Texture(*handle));
            }
            Ok(params)
        })
        .collect()
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let script = read_script(&args.in_path)?;
    let fake_textures: Vec<TextureHandle> = script
        .textures
        .iter()
        .enumerate()
        .map(|(i, t)| TextureHandle {
            id: i as u64 + 1,
            size: PixelSize::new(t.width, t.height),
            format: t.format,
        })
        .collect();
    for (i, frame) in script.frames.iter().enumerate() {
        let overlays = resolve_overlays(frame, &fake_textures)?;
        dcomp_overlay::validate_overlay_list(&overlays, true)
            .with_context(|| format!("frame {i}"))?;
    }
    eprintln!("ok: {} frame(s)", script.frames.len());
    Ok(())
}

fn fill_root(
    presenter: &mut DCompPresenter<HeadlessDevice>,
    color: Rgba8Premul,
) -> anyhow::Result<()> {
    presenter.begin_draw(None)?;
    let root = presenter.root_surface();
    let (surface, swap_chain) = (root.surface(), root.swap_chain());
    let device = presenter
        .device_mut()
        .context("presenter lost its device")?;
    let pixels = match (surface, swap_chain) {
        (Some(id), _) => device.surface_pixels_mut(id),
        (None, Some(id)) => device.swap_chain_back_buffer_mut(id),
        (None, None) => None,
    };
    if let Some(pixels) = pixels {
        for px in pixels.pixels_mut() {
            *px = image::Rgba(color.to_array());
        }
    }
    presenter.end_draw()?;
    Ok(())
}

fn cmd_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let mut script = read_script(&args.in_path)?;
    if let Some(width) = args.width {
        script.opts.root_size.width = width;
    }
    if let Some(height) = args.height {
        script.opts.root_size.height = height;
    }
    let root_size = script.opts.root_size;
    anyhow::ensure!(!root_size.is_empty(), "root surface size must be non-empty");

    let mut device = HeadlessDevice::new(HeadlessOpts::default());
    let textures: Vec<TextureHandle> = script
        .textures
        .iter()
        .map(|t| {
            let [r, g, b, a] = t.color;
            device.import_solid_texture(
                PixelSize::new(t.width, t.height),
                Rgba8Premul::from_straight_rgba(r, g, b, a),
                t.format,
            )
        })
        .collect();
    let counters = device.counters();

    let mut presenter = DCompPresenter::new(script.opts.clone(), OverlaySupport::new());
    presenter.initialize(device)?;
    let root_color = script
        .root_color
        .map(|[r, g, b, a]| Rgba8Premul::from_straight_rgba(r, g, b, a));

    let mut last_frame = None;
    for (i, frame) in script.frames.iter().enumerate() {
        if let Some(rate) = frame.frame_rate {
            presenter.set_frame_rate(rate);
        }
        if let Some(color) = root_color {
            fill_root(&mut presenter, color)?;
        }
        for params in resolve_overlays(frame, &textures)? {
            presenter.schedule_dc_layer(params)?;
        }

        let commits_before = dcomp_overlay::HeadlessCounters::get(&counters.commits);
        let presents_before = dcomp_overlay::HeadlessCounters::get(&counters.presents);
        let result = match frame.damage {
            Some(rect) => presenter.post_sub_buffer(rect),
            None => presenter.swap_buffers(),
        };
        let commits = dcomp_overlay::HeadlessCounters::get(&counters.commits) - commits_before;
        let presents = dcomp_overlay::HeadlessCounters::get(&counters.presents) - presents_before;

        let composed = presenter
            .device()
            .context("presenter lost its device")?
            .compose(root_size);
        let checksum = xxhash_rust::xxh3::xxh3_64(composed.as_raw());
        let status = match result {
            SwapResult::Ack => "ack",
            SwapResult::Failed => "failed",
        };
        println!(
            "frame {i}: {status} commits={commits} presents={presents} checksum={checksum:016x}"
        );
        last_frame = Some(composed);
    }

    if let (Some(out), Some(frame)) = (args.out.as_ref(), last_frame.as_ref()) {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create output dir '{}'", parent.display()))?;
        }
        image::save_buffer_with_format(
            out,
            frame.as_raw(),
            frame.width(),
            frame.height(),
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write png '{}'", out.display()))?;
        eprintln!("wrote {}", out.display());
    }

    presenter.destroy()?;
    Ok(())
}

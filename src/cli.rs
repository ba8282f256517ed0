// ============================================================================
// Picgle CLI — decompose images into layers, or blend images together
// ============================================================================
//
// Usage examples:
//   picgle decompose photo.png --pieces 8
//   picgle decompose photo.png --shape voronoi --seeds 2000 --background white
//   picgle decompose photo.png --pieces 40 --unlock-advanced --seed 7
//   picgle blend base.png overlay.png --mode multiply -o blended.png
//   picgle blend "shots/*.png" --mode screen --background black --global-invert
//
// All processing runs synchronously on the current thread; only PNG
// encoding during export fans out across cores.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::blend::{self, BlendStack, ImageLayer};
use crate::canvas::{Background, BlendMode};
use crate::config::{BackgroundType, DecomposeConfig, Shape};
use crate::error::PicgleError;
use crate::export::{self, DirArtifactWriter, ZipArchiveWriter};
use crate::progress::{ConsoleSink, ProgressReporter};
use crate::session::DecomposeSession;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Picgle image decomposer and blender.
#[derive(Parser, Debug)]
#[command(
    name = "picgle",
    about = "Split images into recombinable layers, or blend images together",
    long_about = "Decompose an image into N layers along a block grid or a Voronoi\n\
                  diagram (the pieces stack back into the original under the right\n\
                  blend mode), or composite several images into one blended PNG.\n\n\
                  Example:\n  \
                  picgle decompose photo.png --shape voronoi --pieces 10\n  \
                  picgle blend a.png b.png --mode multiply -o out.png"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split one image into layers and export them as a zip or directory.
    Decompose(DecomposeArgs),
    /// Stack several images into a single blended PNG.
    Blend(BlendArgs),
}

#[derive(Args, Debug)]
pub struct DecomposeArgs {
    /// Source image (PNG, JPEG, WEBP, BMP, TGA).
    pub input: PathBuf,

    /// Partition strategy: blocks, voronoi.
    #[arg(long, default_value = "blocks", value_name = "SHAPE")]
    pub shape: String,

    /// Number of output layers (5-15, or up to 100 with --unlock-advanced).
    #[arg(short, long, default_value_t = 5, value_name = "N")]
    pub pieces: u32,

    /// Grid cell size in pixels (blocks shape only).
    #[arg(long, default_value_t = 20, value_name = "PX")]
    pub block_size: u32,

    /// Number of Voronoi sites, 500-10000 (voronoi shape only).
    #[arg(long, default_value_t = 1000, value_name = "N")]
    pub seeds: u32,

    /// Layer backdrop: transparent, white, black.
    /// Transparent/white pieces recombine with multiply, black with screen.
    #[arg(long, default_value = "transparent", value_name = "COLOR")]
    pub background: String,

    /// Invert the RGB of every copied pixel.
    #[arg(long)]
    pub invert: bool,

    /// Skip the corner watermark (stamped by default).
    #[arg(long)]
    pub no_watermark: bool,

    /// Raise the piece-count ceiling from 15 to 100.
    #[arg(long)]
    pub unlock_advanced: bool,

    /// Seed for the random owner draws; omit for a fresh partition each run.
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// Write the layers as a zip archive at this path.
    /// Defaults to `{stem}_{shape}_layers.zip` next to the input.
    #[arg(short, long, value_name = "FILE")]
    pub zip: Option<PathBuf>,

    /// Write the layers as loose PNGs into this directory instead of a zip.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BlendArgs {
    /// Input images, top layer last. Glob patterns accepted (e.g. "*.png").
    #[arg(required = true, num_args = 1..)]
    pub inputs: Vec<String>,

    /// Blend mode for the upper layers: normal, multiply, screen, overlay,
    /// darken, lighten, color-dodge, color-burn, hard-light, soft-light,
    /// difference, exclusion. The bottom layer is always drawn plain.
    #[arg(short, long, default_value = "normal", value_name = "MODE")]
    pub mode: String,

    /// Canvas backdrop: gray, white, black.
    #[arg(long, default_value = "gray", value_name = "COLOR")]
    pub background: String,

    /// Invert the finished canvas.
    #[arg(long)]
    pub global_invert: bool,

    /// Stamp the corner watermark onto the result.
    #[arg(long)]
    pub watermark: bool,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = blend::DEFAULT_WIDTH, value_name = "PX")]
    pub width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = blend::DEFAULT_HEIGHT, value_name = "PX")]
    pub height: u32,

    /// Output PNG path. Defaults to `picgle_blended_image_{timestamp}.png`.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the requested subcommand and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    let result = match args.command {
        Command::Decompose(args) => run_decompose(&args),
        Command::Blend(args) => run_blend(&args),
    };
    match result {
        Ok(output) => {
            println!(
                "→ {} ({:.0}ms)",
                output.display(),
                start.elapsed().as_secs_f64() * 1000.0
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log_err!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Subcommand drivers
// ============================================================================

fn run_decompose(args: &DecomposeArgs) -> Result<PathBuf, PicgleError> {
    let shape = Shape::from_name(&args.shape).ok_or_else(|| {
        PicgleError::Validation(format!("unknown shape '{}'", args.shape))
    })?;
    let background = BackgroundType::from_name(&args.background).ok_or_else(|| {
        PicgleError::Validation(format!("unknown background '{}'", args.background))
    })?;
    let cfg = DecomposeConfig {
        shape,
        num_pieces: args.pieces,
        block_size: args.block_size,
        num_seeds: args.seeds,
        background,
        invert_colors: args.invert,
        include_watermark: !args.no_watermark,
    };

    let mut session = DecomposeSession::new();
    session.load_image(&args.input)?;
    if args.unlock_advanced {
        session.unlock_advanced();
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut sink = ConsoleSink::default();
    session.decompose(&cfg, &mut rng, &mut sink)?;

    let mut progress = ProgressReporter::new(&mut sink);
    if let Some(dir) = &args.output_dir {
        let mut writer = DirArtifactWriter::create(dir)?;
        export::export_session(&session, &mut writer, &mut progress)?;
        Ok(dir.clone())
    } else {
        let base = session.name().unwrap_or("image").to_string();
        let folder = export::export_folder_name(&base, shape.name());
        let path = match &args.zip {
            Some(path) => path.clone(),
            None => args
                .input
                .parent()
                .unwrap_or(Path::new("."))
                .join(format!("{}.zip", folder)),
        };
        let mut writer = ZipArchiveWriter::create(&path, &folder)?;
        export::export_session(&session, &mut writer, &mut progress)?;
        Ok(path)
    }
}

fn run_blend(args: &BlendArgs) -> Result<PathBuf, PicgleError> {
    let mode = BlendMode::from_name(&args.mode).ok_or_else(|| {
        PicgleError::Validation(format!("unknown blend mode '{}'", args.mode))
    })?;
    let background = match args.background.to_lowercase().as_str() {
        "gray" | "grey" => Background::PREVIEW_GRAY,
        "white" => Background::WHITE,
        "black" => Background::BLACK,
        other => {
            return Err(PicgleError::Validation(format!(
                "unknown background '{}'",
                other
            )));
        }
    };

    let inputs = resolve_inputs(&args.inputs);
    if inputs.is_empty() {
        return Err(PicgleError::Validation(
            "no input files matched the given pattern(s)".to_string(),
        ));
    }

    let mut stack = BlendStack::new();
    stack.config.mode = mode;
    stack.config.background = background;
    stack.global_invert = args.global_invert;
    stack.include_watermark = args.watermark;

    // Files that fail to decode are skipped, not fatal — a batch glob may
    // sweep up non-image files.
    let mut batch = Vec::new();
    for path in &inputs {
        match image::open(path) {
            Ok(decoded) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "layer".to_string());
                log_info!("Loaded blend layer '{}'", path.display());
                batch.push(ImageLayer::new(name, decoded.into_rgba8()));
            }
            Err(e) => {
                log_warn!("Skipping '{}': {}", path.display(), e);
                eprintln!("warning: skipping '{}': {}", path.display(), e);
            }
        }
    }
    if batch.is_empty() {
        return Err(PicgleError::Validation(
            "none of the input files decoded as images".to_string(),
        ));
    }
    stack.add_images(batch);

    let mut sink = ConsoleSink::default();
    let mut progress = ProgressReporter::new(&mut sink);
    let rendered = stack.render(args.width, args.height, &mut progress)?;
    progress.finish("Blend complete");

    let path = match &args.output {
        Some(path) => path.clone(),
        None => PathBuf::from(format!("picgle_blended_image_{}.png", unix_millis())),
    };
    export::write_png(&rendered, &path)?;
    log_info!("Wrote blended image to '{}'", path.display());
    Ok(path)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

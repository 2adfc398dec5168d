//! flow_tester - render optical flow as images and animations
//!
//! Colors single `.flo` files, turns directories of flow frames into looping
//! GIFs, and draws flow vectors over the matching video frames.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowviz::animation::rgb_to_image;
use flowviz::core_modules::collection::images_to_gray_video;
use flowviz::{ExportPool, FlowAnimation, FlowColorizer, RenderConfig, Video};
use flowviz::{read_flow, read_flow_collection, read_image_collection};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow_tester")]
#[command(about = "Render optical flow fields as color images and animations", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// JSON render configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Draw an arrow every STEP pixels
    #[arg(long, global = true)]
    step: Option<usize>,

    /// Output size relative to the input frames
    #[arg(long, global = true)]
    scale: Option<f64>,

    /// Animation frames per second
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Number of frame export workers
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Color-code a single .flo file
    Color {
        /// Input .flo file
        input: PathBuf,

        /// Output image path
        #[arg(short, long)]
        output: PathBuf,

        /// Fixed normalization radius
        #[arg(long)]
        max_motion: Option<f32>,
    },

    /// Color-code a directory of .flo frames into an animation
    Sequence {
        /// Directory of numbered .flo files
        #[arg(long)]
        flow_dir: PathBuf,

        /// Output GIF path
        #[arg(short, long)]
        output: PathBuf,

        /// Fixed normalization radius
        #[arg(long)]
        max_motion: Option<f32>,

        /// Also write every frame as PNG into this directory
        #[arg(long)]
        frames_dir: Option<PathBuf>,
    },

    /// Draw flow vectors over the source video
    Vector {
        /// Directory of numbered .flo files
        #[arg(long)]
        flow_dir: PathBuf,

        /// Directory of numbered source images
        #[arg(long)]
        image_dir: PathBuf,

        /// Extension of the source images
        #[arg(long, default_value = ".png")]
        image_ext: String,

        /// Output GIF path
        #[arg(short, long)]
        output: PathBuf,

        /// Blend the flow colors over the video
        #[arg(long)]
        color: bool,

        /// Opacity of the flow colors
        #[arg(long)]
        alpha: Option<f32>,

        /// Fixed normalization radius for --color
        #[arg(long)]
        max_motion: Option<f32>,

        /// Also write every frame as PNG into this directory
        #[arg(long)]
        frames_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.debug);
    info!("flow_tester v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Color { input, output, max_motion } => {
            config.color.max_motion = max_motion.or(config.color.max_motion);
            info!("Coloring {} -> {}", input.display(), output.display());
            cmd_color(&input, &output, &config)?;
        }
        Commands::Sequence { flow_dir, output, max_motion, frames_dir } => {
            config.color.max_motion = max_motion.or(config.color.max_motion);
            info!("Coloring sequence {} -> {}", flow_dir.display(), output.display());
            let flows = read_flow_collection(&flow_dir)
                .with_context(|| format!("failed to load flow frames from {}", flow_dir.display()))?;
            let animation = FlowAnimation::from_flow_colors(&flows, config.color.max_motion, &config.animation)?;
            export(&animation, &output, frames_dir.as_deref(), &config).await?;
        }
        Commands::Vector { flow_dir, image_dir, image_ext, output, color, alpha, max_motion, frames_dir } => {
            config.color.max_motion = max_motion.or(config.color.max_motion);
            if let Some(alpha) = alpha {
                config.animation.video2_alpha = alpha;
            }
            config.validate().context("invalid command line options")?;
            info!("Drawing vectors {} over {} -> {}", flow_dir.display(), image_dir.display(), output.display());
            let animation = build_vector_animation(&flow_dir, &image_dir, &image_ext, color, &config)?;
            export(&animation, &output, frames_dir.as_deref(), &config).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, debug: bool) {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Defaults, then the config file, then `FV_*` variables, then flags.
fn load_config(cli: &Cli) -> Result<RenderConfig> {
    let mut config = match &cli.config {
        Some(path) => RenderConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => RenderConfig::default(),
    };
    config.apply_env().context("invalid FV_* environment override")?;

    if let Some(step) = cli.step {
        config.animation.vector_step = step;
    }
    if let Some(scale) = cli.scale {
        config.animation.scale = scale;
    }
    if let Some(fps) = cli.fps {
        config.animation.fps = fps;
    }
    if let Some(workers) = cli.workers {
        config.export.workers = Some(workers);
    }
    config.validate().context("invalid command line options")?;
    Ok(config)
}

fn cmd_color(input: &Path, output: &Path, config: &RenderConfig) -> Result<()> {
    let flow = read_flow(input).with_context(|| format!("failed to read {}", input.display()))?;
    let colors = FlowColorizer::default().colorize_frame(&flow, config.color.max_motion)?;
    rgb_to_image(colors.view())
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    Ok(())
}

fn build_vector_animation(
    flow_dir: &Path,
    image_dir: &Path,
    image_ext: &str,
    color: bool,
    config: &RenderConfig,
) -> Result<FlowAnimation> {
    let flows = read_flow_collection(flow_dir)
        .with_context(|| format!("failed to load flow frames from {}", flow_dir.display()))?;
    let mut images = read_image_collection(image_dir, image_ext)
        .with_context(|| format!("failed to load images from {}", image_dir.display()))?;

    // A video of N + 1 frames yields N flow fields; the trailing frame has no vectors.
    let frame_count = flows.dim().0;
    if images.len() > frame_count {
        warn!(images = images.len(), flows = frame_count, "dropping images without a flow field");
        images.truncate(frame_count);
    }
    let video = images_to_gray_video(&images)?;

    let mut animation = FlowAnimation::new(Video::Gray(video), &config.animation)?;
    if color {
        let colors = FlowColorizer::default().colorize_sequence(&flows, config.color.max_motion)?;
        animation = animation.with_video2(colors)?;
    }
    Ok(animation.with_vectors(flows)?)
}

async fn export(animation: &FlowAnimation, output: &Path, frames_dir: Option<&Path>, config: &RenderConfig) -> Result<()> {
    animation
        .save_gif(output, config.animation.fps)
        .with_context(|| format!("failed to write {}", output.display()))?;

    if let Some(dir) = frames_dir {
        let pool = match config.export.workers {
            Some(workers) => ExportPool::new(workers),
            None => ExportPool::with_default_workers(),
        };
        let paths = animation.save_frames(dir, &config.export.frame_prefix, &pool).await?;
        info!("Wrote {} frames to {}", paths.len(), dir.display());
        pool.shutdown().await;
    }
    Ok(())
}

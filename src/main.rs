use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use image::RgbaImage;
use log::info;
use tiny_skia::Pixmap;

use neon_mosaic::config::{load_config, RenderConfig};
use neon_mosaic::plan::load_plan;
use neon_mosaic::shapes::ShapeLibrary;
use neon_mosaic::{Phase, RenderController, ShapeKind, ShapeSource};

/// Simulated display refresh for energy frames.
const FRAME_MS: u64 = 16;

#[derive(Debug, Parser)]
#[command(name = "neon-mosaic")]
#[command(about = "Render neon text mosaics over a silhouette")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compose the final frame and optional energy frames to PNG.
    Render {
        #[arg(long)]
        plan: PathBuf,
        /// Directory holding `<shape>.png` images.
        #[arg(long)]
        shapes: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Overrides the plan's subscriber count.
        #[arg(long)]
        population: Option<u64>,
        #[arg(long = "energy-frames", default_value_t = 0)]
        energy_frames: u32,
        #[arg(long = "reduced-motion")]
        reduced_motion: bool,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Validate a plan (and optionally config and shapes) without rendering.
    Check {
        #[arg(long)]
        plan: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        shapes: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            plan,
            shapes,
            config,
            population,
            energy_frames,
            reduced_motion,
            output,
        } => run_render(&RenderArgs {
            plan,
            shapes,
            config,
            population,
            energy_frames,
            reduced_motion,
            output,
        }),
        Commands::Check {
            plan,
            config,
            shapes,
        } => run_check(&plan, config.as_deref(), shapes.as_deref()),
    }
}

struct RenderArgs {
    plan: PathBuf,
    shapes: PathBuf,
    config: Option<PathBuf>,
    population: Option<u64>,
    energy_frames: u32,
    reduced_motion: bool,
    output: PathBuf,
}

fn load_render_config(path: Option<&Path>) -> Result<RenderConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(RenderConfig::default()),
    }
}

fn run_check(plan_path: &Path, config_path: Option<&Path>, shapes: Option<&Path>) -> Result<()> {
    let config = load_render_config(config_path)?;
    let plan = load_plan(plan_path)?;

    println!(
        "OK: {} ({}x{}, {} text tiles of {}, {} subscribers)",
        plan_path.display(),
        plan.width,
        plan.height,
        plan.text_tile_count(),
        plan.items.len(),
        plan.subscriber_count
    );
    let energy = plan.subscriber_count >= config.energy.activation_threshold;
    println!(
        "Energy: {} (threshold {})",
        if energy { "on" } else { "off" },
        config.energy.activation_threshold
    );
    if let Some(dir) = shapes {
        let library = ShapeLibrary::load_dir(dir);
        for kind in ShapeKind::ALL {
            let state = match library.get(kind) {
                Some(source) if !source.is_missing() => "ok",
                _ if kind.is_required() => "MISSING",
                _ => "absent (optional)",
            };
            println!("Shape {kind}: {state}");
        }
    }
    Ok(())
}

fn run_render(args: &RenderArgs) -> Result<()> {
    let mut config = load_render_config(args.config.as_deref())?;
    let plan = load_plan(&args.plan)?;
    if args.reduced_motion {
        config.phases.reduced_motion = true;
    }
    config.phases.surface_width = plan.width;
    config.phases.surface_height = plan.height;
    let population = args.population.unwrap_or(plan.subscriber_count);

    let mut controller = RenderController::new(config).context("failed to set up renderer")?;
    for kind in ShapeKind::ALL {
        let path = args.shapes.join(kind.file_name());
        controller.provide_shape(kind, ShapeSource::from_path(&path));
    }
    controller.set_population(population);
    controller.submit_final(plan)?;
    controller.tick(0);

    if controller.phase() == Phase::Failed {
        let reason = controller
            .error()
            .map(ToString::to_string)
            .unwrap_or_else(|| "unknown failure".to_owned());
        bail!("render failed: {reason}");
    }
    let final_frame = controller.final_frame().ok_or_else(|| {
        anyhow!(
            "final frame not composed; pending shapes {:?}",
            controller.shapes().pending()
        )
    })?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create output directory {}", args.output.display()))?;
    let final_path = args.output.join("final.png");
    write_png(final_frame, &final_path)?;
    println!("Wrote {}", final_path.display());

    let mut written = 0u64;
    for index in 0..u64::from(args.energy_frames) {
        if index > 0 {
            controller.tick(index * FRAME_MS);
        }
        if controller.energy_frames_rendered() <= written {
            info!("energy stopped after {written} frames");
            break;
        }
        written = controller.energy_frames_rendered();
        let Some(frame) = controller.displayed_frame() else {
            break;
        };
        let path = args.output.join(format!("energy_{index:04}.png"));
        write_png(frame, &path)?;
    }
    if written > 0 {
        println!("Wrote {written} energy frames");
    }
    Ok(())
}

fn write_png(pixmap: &Pixmap, path: &Path) -> Result<()> {
    let mut rgba = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let color = px.demultiply();
        rgba.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    let (width, height) = (pixmap.width(), pixmap.height());
    let image = RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| anyhow!("frame buffer does not match {width}x{height}"))?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

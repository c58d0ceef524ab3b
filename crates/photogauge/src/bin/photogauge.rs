//! photogauge CLI: ruler-calibrated height measurement from a scene file.

use clap::{Args, Parser, Subcommand};
use log::info;
use photogauge::core::{Orientation, Point2, Region};
use photogauge::ruler::BaseLine;
use photogauge::{
    measure_scene, CalibrationSession, DetectionStatus, DetectionSummary, MeasureConfig,
    MeasurementReport, Scene,
};
use std::path::{Path, PathBuf};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "photogauge")]
#[command(about = "Measure object heights in a photograph calibrated by a ruler")]
#[command(version)]
struct Cli {
    /// Log per-stage diagnostics.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit JSON logs (requires the `tracing` feature).
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate and measure one scene.
    Measure(MeasureArgs),

    /// Write the default configuration as JSON.
    DefaultConfig {
        /// Destination path.
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct MeasureArgs {
    /// Scene JSON with external lines, contours and/or an external analysis.
    #[arg(long)]
    scene: PathBuf,

    /// Grayscale source image backing the ruler tick profile.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Measurement configuration (JSON); defaults when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to write the measurement report (JSON).
    #[arg(long)]
    output: Option<PathBuf>,
}

fn init_logging(verbose: bool, json: bool) {
    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init();
        photogauge::core::init_tracing(json, verbose);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let level = if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        let _ = photogauge::core::init_with_level(level);
        if json {
            log::warn!("--json-log needs the `tracing` feature; using plain logs");
        }
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_log);

    match cli.command {
        Commands::Measure(args) => run_measure(&args),
        Commands::DefaultConfig { out } => {
            MeasureConfig::default().write_json(&out)?;
            println!("wrote default config to {}", out.display());
            Ok(())
        }
    }
}

#[cfg(feature = "image")]
fn measure_image(
    session: &mut CalibrationSession,
    scene: &Scene,
    config: &MeasureConfig,
    path: &Path,
    base_region: Option<Region>,
) -> CliResult<DetectionSummary> {
    info!("loading image {}", path.display());
    let image = photogauge::load_gray(path)?;
    let view = photogauge::gray_view(&image);
    let sampler = photogauge::core::GrayStripSampler::new(view, config.strip_half_width);
    let region = base_region.unwrap_or_else(|| {
        let (w, h) = (view.width as f64, view.height as f64);
        Region::new(0.0, 0.5 * h, w, h)
    });
    Ok(measure_scene(
        session,
        &scene.lines,
        &scene.contours,
        &sampler,
        Some(region),
        &config.lines,
    )?)
}

#[cfg(not(feature = "image"))]
fn measure_image(
    _session: &mut CalibrationSession,
    _scene: &Scene,
    _config: &MeasureConfig,
    path: &Path,
    _base_region: Option<Region>,
) -> CliResult<DetectionSummary> {
    Err(format!("cannot read {}: built without the `image` feature", path.display()).into())
}

fn run_measure(args: &MeasureArgs) -> CliResult<()> {
    let config = match &args.config {
        Some(path) => MeasureConfig::load_json(path)?,
        None => MeasureConfig::default(),
    };
    let scene = Scene::load_json(&args.scene)?;
    let mut session = CalibrationSession::new(&config);

    for payload in &scene.calibration {
        session.apply_calibration(payload.resolve(&config.lines.ticks)?)?;
    }
    if let Some(reference) = &scene.planar_reference {
        session.set_planar_reference(reference)?;
    }
    if let Some(pixel_y) = scene.base_line_px {
        session.set_base_line(BaseLine::new(pixel_y))?;
    }

    let base_region = scene.base_region().or(config.base_region);
    let summary = if let Some(analysis) = &scene.analysis {
        session.ingest(analysis)?
    } else if let Some(path) = &args.image {
        measure_image(&mut session, &scene, &config, path, base_region)?
    } else {
        // Without pixels every tick search fails and rulers fall back to
        // their endpoints.
        let blind = |_: Point2<f64>, _: Orientation| -> Option<f64> { None };
        measure_scene(&mut session, &scene.lines, &scene.contours, &blind, base_region, &config.lines)?
    };

    let report = MeasurementReport::from_session(&session, scene.image_scale);
    print_summary(&report, summary.status);
    if let Some(out) = &args.output {
        report.write_json(out)?;
        info!("report written to {}", out.display());
    }
    Ok(())
}

fn print_summary(report: &MeasurementReport, status: DetectionStatus) {
    for r in &report.rulers {
        println!(
            "ruler {:?}: {:.4} px/mm, {} ticks ({:?}{})",
            r.axis,
            r.scale_px_per_mm,
            r.tick_count,
            r.source,
            if r.fallback { ", fallback" } else { "" }
        );
    }
    if let Some(y) = report.base_line_px {
        println!("base line: y = {y:.1} px");
    }
    match status {
        DetectionStatus::NoObjectsFound => println!("no objects found"),
        DetectionStatus::Found(n) => {
            println!("{n} object(s):");
            for o in &report.objects {
                let corrected = o
                    .corrected_height_mm
                    .map(|c| format!(", corrected {c:.1} mm"))
                    .unwrap_or_default();
                println!(
                    "  object {}: {:.1} mm ({}){}",
                    o.id, o.height_mm, o.category, corrected
                );
            }
        }
    }
}

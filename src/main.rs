mod capture;
mod output;

use anyhow::{Context, Result};
use backdrop_fx::{
    BackgroundImage, BackgroundMode, Color, Config, Frame, OutputFormat, PipelineController,
    Quality,
};
use capture::{CaptureSource, StillImageCapture};
use clap::Parser;
use image::DynamicImage;
use output::{OutputSink, PngSequenceOutput};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Replay a still image instead of opening a webcam
    #[arg(long)]
    input_image: Option<PathBuf>,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Write numbered PNG frames to this directory instead of a loopback device
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Path to Robust Video Matting model (ONNX file)
    /// If not provided, runs in passthrough mode without segmentation
    #[cfg(feature = "onnx")]
    #[arg(long)]
    model: Option<PathBuf>,

    /// Segmentation quality: fast, balanced or accurate
    #[arg(long, default_value = "balanced")]
    quality: Quality,

    /// Background: blur, color, transparent or image
    #[arg(long, default_value = "blur")]
    background: BackgroundMode,

    /// Blur radius in pixels
    #[arg(long)]
    blur_radius: Option<f32>,

    /// Background color as #rrggbb or #rrggbbaa
    #[arg(long)]
    color: Option<Color>,

    /// Background image for `--background image`
    #[arg(long)]
    image: Option<PathBuf>,

    /// Foreground probability threshold
    #[arg(long)]
    threshold: Option<f32>,

    /// Edge softness, 0 for hard edges
    #[arg(long)]
    edge_smoothing: Option<f32>,

    /// Weight of the previous alpha when blending
    #[arg(long)]
    temporal_factor: Option<f32>,

    /// Disable blending with the previous frame's alpha
    #[arg(long)]
    no_temporal: bool,

    /// Disable edge feathering
    #[arg(long)]
    no_edge_refinement: bool,

    /// Show mask visualization (grayscale silhouette) instead of the composite
    #[arg(long)]
    show_mask: bool,

    /// Log pipeline timings every 30 frames
    #[arg(long)]
    performance_info: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("backdrop-fx starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!("Output: {}x{}", args.output_width, args.output_height);
    tracing::info!("Target FPS: {}", args.fps);

    let mut capture = open_capture(&args).context("Failed to initialize capture")?;
    let mut output = open_output(&args).context("Failed to initialize output")?;

    let format = if output.supports_alpha() {
        OutputFormat::Rgba8
    } else {
        OutputFormat::Rgb8
    };
    let config = build_config(&args, format);

    let pipeline = load_pipeline(&args, config)?;

    run_pipeline(
        capture.as_mut(),
        output.as_mut(),
        pipeline,
        args.fps,
        args.frames,
    )
}

fn open_capture(args: &Args) -> Result<Box<dyn CaptureSource>> {
    if let Some(path) = &args.input_image {
        let capture = StillImageCapture::new(path, args.capture_width, args.capture_height)?;
        return Ok(Box::new(capture));
    }

    #[cfg(feature = "camera")]
    {
        let capture = capture::WebcamCapture::new(
            args.input_device,
            args.capture_width,
            args.capture_height,
            args.fps,
        )?;
        Ok(Box::new(capture))
    }

    #[cfg(not(feature = "camera"))]
    {
        anyhow::bail!(
            "built without the `camera` feature; use --input-image (device {} ignored)",
            args.input_device
        )
    }
}

fn open_output(args: &Args) -> Result<Box<dyn OutputSink>> {
    if let Some(dir) = &args.output_dir {
        let output = PngSequenceOutput::new(dir, args.output_width, args.output_height)?;
        return Ok(Box::new(output));
    }

    #[cfg(feature = "camera")]
    {
        let output =
            output::V4L2Output::new(&args.output_device, args.output_width, args.output_height)?;
        Ok(Box::new(output))
    }

    #[cfg(not(feature = "camera"))]
    {
        anyhow::bail!(
            "built without the `camera` feature; use --output-dir ({} ignored)",
            args.output_device
        )
    }
}

fn build_config(args: &Args, output_format: OutputFormat) -> Config {
    let defaults = Config::with_quality(args.quality);

    Config {
        background_mode: args.background,
        blur_radius: args.blur_radius.unwrap_or(defaults.blur_radius),
        edge_smoothing: args.edge_smoothing.unwrap_or(defaults.edge_smoothing),
        mask_threshold: args.threshold.unwrap_or(defaults.mask_threshold),
        temporal_smoothing: !args.no_temporal,
        temporal_factor: args.temporal_factor.unwrap_or(defaults.temporal_factor),
        edge_refinement: !args.no_edge_refinement,
        background_color: args.color.unwrap_or(defaults.background_color),
        background_image: args.image.clone().map(BackgroundImage::File),
        show_mask: args.show_mask,
        performance_info: args.performance_info,
        output_format,
        ..defaults
    }
}

#[cfg(feature = "onnx")]
fn load_pipeline(args: &Args, config: Config) -> Result<Option<PipelineController>> {
    let Some(model_path) = &args.model else {
        tracing::info!("Running in passthrough mode (no segmentation)");
        return Ok(None);
    };

    tracing::info!("Loading segmentation model from {}", model_path.display());
    let model = backdrop_fx::segmentation::create_default_model(model_path, config.quality)
        .context("Failed to load segmentation model")?;
    tracing::info!("Segmentation model loaded successfully");

    let mut pipeline = PipelineController::new(model);
    pipeline
        .apply_config(config)
        .context("Invalid pipeline configuration")?;
    Ok(Some(pipeline))
}

#[cfg(not(feature = "onnx"))]
fn load_pipeline(_args: &Args, config: Config) -> Result<Option<PipelineController>> {
    config.validate().context("Invalid pipeline configuration")?;
    tracing::info!("Built without the `onnx` feature; running in passthrough mode");
    Ok(None)
}

fn run_pipeline(
    capture: &mut dyn CaptureSource,
    output: &mut dyn OutputSink,
    mut pipeline: Option<PipelineController>,
    target_fps: u32,
    frame_limit: Option<u64>,
) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut frame_count = 0u64;
    let mut total_capture_time = Duration::ZERO;
    let mut total_process_time = Duration::ZERO;
    let mut total_output_time = Duration::ZERO;

    tracing::info!("Starting main pipeline loop");
    if let Some(config) = pipeline.as_ref().and_then(PipelineController::config) {
        tracing::info!(
            "Segmentation enabled: quality={:?}, background={:?}, show_mask={}",
            config.quality,
            config.effective_background_mode(),
            config.show_mask
        );
    }
    tracing::info!("Press Ctrl+C to stop");

    while frame_limit.map_or(true, |limit| frame_count < limit) {
        let loop_start = Instant::now();

        // Capture frame
        let capture_start = Instant::now();
        let frame = capture
            .capture_frame()
            .context("Failed to capture frame")?;
        total_capture_time += capture_start.elapsed();

        let process_start = Instant::now();
        let image = match pipeline.as_mut() {
            Some(pipeline) => process_frame(pipeline, &frame)?,
            None => frame.image().clone(),
        };
        total_process_time += process_start.elapsed();

        // Output frame
        let output_start = Instant::now();
        output
            .write_frame(&image)
            .context("Failed to write frame")?;
        total_output_time += output_start.elapsed();

        frame_count += 1;

        // Log stats every 30 frames
        if frame_count % 30 == 0 {
            let per_frame_ms = |total: Duration| total.as_secs_f64() * 1000.0 / frame_count as f64;
            let avg_capture_ms = per_frame_ms(total_capture_time);
            let avg_process_ms = per_frame_ms(total_process_time);
            let avg_output_ms = per_frame_ms(total_output_time);
            let total_ms = avg_capture_ms + avg_process_ms + avg_output_ms;

            tracing::info!(
                "Frame {}: capture={:.1}ms, process={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
                frame_count,
                avg_capture_ms,
                avg_process_ms,
                avg_output_ms,
                total_ms,
                1000.0 / total_ms
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }

    if let Some(mut pipeline) = pipeline {
        let stats = pipeline.stats();
        tracing::info!(
            "Processed {} frames, average {:.1}ms",
            stats.frame_count,
            stats.average.as_secs_f64() * 1000.0
        );
        pipeline.invalidate();
    }
    Ok(())
}

fn process_frame(pipeline: &mut PipelineController, frame: &Frame) -> Result<DynamicImage> {
    let processed = pipeline
        .process(frame)
        .context("Failed to process frame")?;
    for warning in &processed.warnings {
        tracing::debug!("Frame at {:?}: {:?}", processed.timestamp, warning);
    }
    Ok(processed.image)
}

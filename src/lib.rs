//! # backdrop-fx
//!
//! Real-time background replacement for live video.
//!
//! Each frame goes through the same sequence of stages:
//!
//! - **Mask source**: a segmentation capability ([`MaskSource`]) produces a
//!   per-pixel foreground probability map
//! - **Stabilizer**: soft thresholding, edge feathering and temporal
//!   blending turn the raw mask into a stable alpha matte
//! - **Background**: blurred frame, solid color, still image, or nothing
//!   (transparent output)
//! - **Compositor**: `alpha * frame + (1 - alpha) * background`
//!
//! A [`PipelineController`] owns one video source's cross-frame state and
//! drives the stages; a [`PerformanceTracker`] keeps rolling timings.
//!
//! ```no_run
//! use backdrop_fx::{BackgroundMode, Color, Config, Frame, PipelineController};
//! # use backdrop_fx::{MaskSource, Quality, RawMask, PipelineResult};
//! # struct Model;
//! # impl MaskSource for Model {
//! #     fn classify(&mut self, frame: &Frame, _: Quality) -> PipelineResult<RawMask> {
//! #         let (w, h) = frame.dimensions();
//! #         Ok(RawMask::filled(w, h, 1.0))
//! #     }
//! # }
//! # fn example(frame: Frame) -> Result<(), Box<dyn std::error::Error>> {
//! let mut pipeline = PipelineController::new(Box::new(Model));
//! pipeline.apply_config(Config {
//!     background_mode: BackgroundMode::Color,
//!     background_color: Color::rgb(0, 177, 64),
//!     ..Config::default()
//! })?;
//!
//! let output = pipeline.process(&frame)?;
//! for warning in &output.warnings {
//!     eprintln!("{warning:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `onnx`: Robust Video Matting mask source on ONNX Runtime
//! - `camera`: webcam capture and v4l2loopback output for the binary

pub mod background;
pub mod compositor;
pub mod config;
mod error;
pub mod frame;
pub mod metrics;
pub mod pipeline;
pub mod segmentation;
pub mod stabilizer;

#[cfg(test)]
mod test_utils;

pub use background::{Background, BackgroundSynthesizer, DEFAULT_FALLBACK_COLOR};
pub use config::{
    BackgroundImage, BackgroundMode, Color, Config, OutputFormat, Quality, TransparentFallback,
};
pub use error::{PipelineError, PipelineResult};
pub use frame::{Frame, FrameWarning, PixelFormat, ProcessedFrame};
pub use metrics::{PerformanceSample, PerformanceStats, PerformanceTracker};
pub use pipeline::{PipelineController, PipelineState};
pub use segmentation::{AlphaMatte, MaskSource, RawMask};

//! Per-source pipeline controller.
//!
//! One [`PipelineController`] serves one video source. It exclusively owns
//! the cross-frame state (stabilized alpha, background cache, timing
//! history) and runs the stages strictly in sequence:
//!
//! ```text
//! frame -> mask source -> stabilizer -> background -> compositor -> output
//! ```
//!
//! Every mutating operation takes `&mut self`, so a frame can never be
//! processed concurrently with another frame or with `invalidate` on the
//! same instance.

use std::borrow::Cow;
use std::time::Instant;

use image::RgbaImage;

use crate::background::{Background, BackgroundSynthesizer};
use crate::compositor;
use crate::config::{Config, Quality};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, FrameWarning, ProcessedFrame};
use crate::metrics::{PerformanceStats, PerformanceTracker, DEFAULT_HISTORY};
use crate::segmentation::{AlphaMatte, MaskSource};
use crate::stabilizer;

/// Frames between performance log lines when `performance_info` is set.
const PERFORMANCE_LOG_INTERVAL: u64 = 30;

/// Lifecycle of a controller.
///
/// ```text
/// Uninitialized -> Ready <-> Processing
///        \           \
///         `-----------`--> Invalidated (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Processing,
    Invalidated,
}

pub struct PipelineController {
    state: PipelineState,
    config: Option<Config>,
    mask_source: Option<Box<dyn MaskSource>>,
    alpha: Option<AlphaMatte>,
    background: BackgroundSynthesizer,
    tracker: PerformanceTracker,
}

impl PipelineController {
    /// Wrap a mask source. The controller starts `Uninitialized` and
    /// rejects frames until [`initialize`](Self::initialize) or
    /// [`apply_config`](Self::apply_config) supplies a configuration.
    pub fn new(mask_source: Box<dyn MaskSource>) -> Self {
        Self {
            state: PipelineState::Uninitialized,
            config: None,
            mask_source: Some(mask_source),
            alpha: None,
            background: BackgroundSynthesizer::new(),
            tracker: PerformanceTracker::new(DEFAULT_HISTORY),
        }
    }

    /// Construct and initialize with the default configuration at `quality`.
    pub fn with_quality(mask_source: Box<dyn MaskSource>, quality: Quality) -> Self {
        let mut controller = Self::new(mask_source);
        controller.enter_ready(quality);
        controller
    }

    /// Use a timing window of `capacity` frames instead of the default.
    pub fn with_history(mut self, capacity: usize) -> Self {
        self.tracker = PerformanceTracker::new(capacity);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    pub fn stats(&self) -> PerformanceStats {
        self.tracker.stats()
    }

    /// Move from `Uninitialized` to `Ready` with the default configuration,
    /// optionally at a specific quality.
    pub fn initialize(&mut self, quality: Option<Quality>) -> PipelineResult<()> {
        match self.state {
            PipelineState::Uninitialized => {
                self.enter_ready(quality.unwrap_or_default());
                Ok(())
            }
            PipelineState::Invalidated => Err(PipelineError::InstanceInvalidated),
            state => Err(PipelineError::InvalidTransition {
                operation: "initialize",
                state,
            }),
        }
    }

    /// The only `Uninitialized -> Ready` transition with a default configuration.
    fn enter_ready(&mut self, quality: Quality) {
        self.config = Some(Config::with_quality(quality));
        self.state = PipelineState::Ready;
        tracing::info!("Pipeline initialized at {:?} quality", quality);
    }

    /// Replace the configuration between frames.
    ///
    /// An invalid configuration is rejected and the previous one stays in
    /// effect. Applying a configuration to an `Uninitialized` controller
    /// makes it `Ready`.
    pub fn apply_config(&mut self, config: Config) -> PipelineResult<()> {
        if self.state == PipelineState::Invalidated {
            return Err(PipelineError::InstanceInvalidated);
        }
        if let Err(err) = config.validate() {
            tracing::warn!("Rejected configuration: {err}");
            return Err(err);
        }

        if let Some(previous) = &self.config {
            if previous.quality != config.quality {
                tracing::info!("Quality {:?} -> {:?}", previous.quality, config.quality);
            }
            if previous.background_mode != config.background_mode {
                tracing::info!(
                    "Background mode {:?} -> {:?}",
                    previous.background_mode,
                    config.background_mode
                );
            }
        }
        if config.background_mode != config.effective_background_mode() {
            tracing::warn!(
                "Output format {:?} has no alpha channel; transparent background falls back to color {}",
                config.output_format,
                config.background_color
            );
        }

        self.config = Some(config);
        if self.state == PipelineState::Uninitialized {
            self.state = PipelineState::Ready;
        }
        Ok(())
    }

    /// Segment and recomposite one frame.
    ///
    /// Segmentation and background asset failures are recovered from and
    /// reported in [`ProcessedFrame::warnings`]. Errors returned from here
    /// are fatal for the instance.
    pub fn process(&mut self, frame: &Frame) -> PipelineResult<ProcessedFrame> {
        self.run(frame, None)
    }

    /// Like [`process`](Self::process), but composite over a caller-supplied
    /// background instead of the synthesized one. The background must
    /// match the frame's dimensions.
    pub fn process_with_background(
        &mut self,
        frame: &Frame,
        background: &Frame,
    ) -> PipelineResult<ProcessedFrame> {
        self.run(frame, Some(background))
    }

    fn run(&mut self, frame: &Frame, supplied: Option<&Frame>) -> PipelineResult<ProcessedFrame> {
        let config = match (self.state, &self.config) {
            (PipelineState::Ready, Some(config)) => config.clone(),
            (PipelineState::Uninitialized | PipelineState::Invalidated, _) => {
                return Err(PipelineError::InstanceInvalidated)
            }
            (state, _) => {
                return Err(PipelineError::InvalidTransition {
                    operation: "process",
                    state,
                })
            }
        };

        if let Some(background) = supplied {
            PipelineError::check_dimensions(
                "Supplied background",
                frame.dimensions(),
                background.dimensions(),
            )?;
        }

        if !config.enabled {
            let image = frame.image().to_rgba8();
            return Ok(ProcessedFrame::new(image, config.output_format, frame.timestamp()));
        }

        self.state = PipelineState::Processing;
        let started = Instant::now();
        let result = self.process_enabled(frame, supplied, &config);
        self.state = PipelineState::Ready;

        let output = result?;
        self.tracker.record_sample(started.elapsed());

        if config.performance_info && self.tracker.frame_count() % PERFORMANCE_LOG_INTERVAL == 0 {
            let stats = self.tracker.stats();
            tracing::info!(
                "Frame {}: last={:.1}ms, avg={:.1}ms, fps={:.1}",
                stats.frame_count,
                stats.last.as_secs_f64() * 1000.0,
                stats.average.as_secs_f64() * 1000.0,
                stats.sustainable_fps()
            );
        }
        Ok(output)
    }

    /// Computes the frame without committing anything until it succeeds.
    fn process_enabled(
        &mut self,
        frame: &Frame,
        supplied: Option<&Frame>,
        config: &Config,
    ) -> PipelineResult<ProcessedFrame> {
        let (width, height) = frame.dimensions();
        let mut warnings = Vec::new();

        // An opaque stand-in with no real predecessor is never committed.
        let (alpha, commit) = match self.segment(frame, config) {
            Ok(alpha) => (alpha, true),
            Err(err) if err.is_recoverable() => {
                let previous = self
                    .alpha
                    .clone()
                    .filter(|alpha| alpha.dimensions() == (width, height));
                let fallback = match previous {
                    Some(previous) => {
                        tracing::warn!("{err}; reusing previous alpha");
                        (previous, true)
                    }
                    None => {
                        tracing::warn!("{err}; passing the frame through");
                        (AlphaMatte::opaque(width, height), false)
                    }
                };
                warnings.extend(FrameWarning::from_error(err));
                fallback
            }
            Err(err) => return Err(err),
        };

        let image = if config.show_mask {
            alpha.to_grayscale()
        } else {
            let source = frame.image().to_rgba8();
            let supplied_layer: Option<RgbaImage> = supplied.map(|bg| bg.image().to_rgba8());
            let (background, warning) = match &supplied_layer {
                Some(layer) => (Background::Layer(Cow::Borrowed(layer)), None),
                None => self.background.synthesize(&source, config),
            };
            if let Some(err) = warning {
                warnings.extend(FrameWarning::from_error(err));
            }
            compositor::composite(&source, &alpha, &background)?
        };

        if commit {
            self.alpha = Some(alpha);
        }
        let mut output = ProcessedFrame::new(image, config.output_format, frame.timestamp());
        output.warnings = warnings;
        Ok(output)
    }

    fn segment(&mut self, frame: &Frame, config: &Config) -> PipelineResult<AlphaMatte> {
        let source = self
            .mask_source
            .as_mut()
            .ok_or(PipelineError::InstanceInvalidated)?;

        let raw = {
            let _span = tracing::debug_span!("segment").entered();
            source.classify(frame, config.quality)?
        };
        let (width, height) = frame.dimensions();
        let raw = raw.fit_to(width, height);

        Ok(stabilizer::stabilize(&raw, self.alpha.as_ref(), config))
    }

    /// Forget temporal and timing state, keeping the configuration.
    ///
    /// The next frame is processed exactly as the first frame of a fresh
    /// instance would be.
    pub fn reset(&mut self) -> PipelineResult<()> {
        match self.state {
            PipelineState::Ready => {
                tracing::info!("Resetting pipeline state");
                self.alpha = None;
                self.background.clear();
                self.tracker.reset();
                if let Some(source) = self.mask_source.as_mut() {
                    source.reset_state();
                }
                Ok(())
            }
            PipelineState::Invalidated => Err(PipelineError::InstanceInvalidated),
            state => Err(PipelineError::InvalidTransition {
                operation: "reset",
                state,
            }),
        }
    }

    /// Release the mask source and all frame state. Terminal: every later
    /// `process` fails with `InstanceInvalidated`. Invalidating twice is a
    /// no-op.
    pub fn invalidate(&mut self) {
        if self.state == PipelineState::Invalidated {
            return;
        }
        tracing::info!("Invalidating pipeline");
        self.state = PipelineState::Invalidated;
        self.mask_source = None;
        self.alpha = None;
        self.background.clear();
        self.tracker.reset();
    }
}

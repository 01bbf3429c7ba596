//! Pipeline configuration.
//!
//! A [`Config`] is an immutable snapshot applied between frames. The
//! settings surface of a host speaks in integer codes and strings, so the
//! enumerated options convert from both.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use image::{Rgba, RgbaImage};

use crate::error::{PipelineError, PipelineResult};

/// Largest accepted blur radius in pixels.
pub const MAX_BLUR_RADIUS: f32 = 100.0;

/// Segmentation quality / latency trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    /// Highest throughput, softer edges.
    Fast,
    #[default]
    Balanced,
    /// Best edge fidelity, highest latency.
    Accurate,
}

impl TryFrom<i64> for Quality {
    type Error = PipelineError;

    fn try_from(code: i64) -> PipelineResult<Self> {
        match code {
            0 => Ok(Self::Fast),
            1 => Ok(Self::Balanced),
            2 => Ok(Self::Accurate),
            other => Err(PipelineError::invalid_config(format!(
                "unknown quality code {other}"
            ))),
        }
    }
}

impl FromStr for Quality {
    type Err = PipelineError;

    fn from_str(s: &str) -> PipelineResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "balanced" => Ok(Self::Balanced),
            "accurate" => Ok(Self::Accurate),
            other => Err(PipelineError::invalid_config(format!(
                "unknown quality '{other}' (expected fast, balanced or accurate)"
            ))),
        }
    }
}

/// What replaces the background behind the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackgroundMode {
    #[default]
    Blur,
    Color,
    Transparent,
    Image,
}

impl TryFrom<i64> for BackgroundMode {
    type Error = PipelineError;

    fn try_from(code: i64) -> PipelineResult<Self> {
        match code {
            0 => Ok(Self::Blur),
            1 => Ok(Self::Color),
            2 => Ok(Self::Transparent),
            3 => Ok(Self::Image),
            other => Err(PipelineError::invalid_config(format!(
                "unknown background mode code {other}"
            ))),
        }
    }
}

impl FromStr for BackgroundMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> PipelineResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "blur" => Ok(Self::Blur),
            "color" | "colour" => Ok(Self::Color),
            "transparent" => Ok(Self::Transparent),
            "image" => Ok(Self::Image),
            other => Err(PipelineError::invalid_config(format!(
                "unknown background mode '{other}' (expected blur, color, transparent or image)"
            ))),
        }
    }
}

/// Pixel layout the consumer of processed frames accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Rgb8,
    Rgba8,
}

impl OutputFormat {
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8)
    }
}

/// What happens when `Transparent` is requested for an output without alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransparentFallback {
    /// Degrade to `Color` mode using the configured background color.
    #[default]
    Color,
    /// Refuse the configuration.
    Reject,
}

/// RGBA color with 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const CHROMA_GREEN: Self = Self::rgb(0, 177, 64);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_pixel(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }
}

/// Parses `#RRGGBB` or `#RRGGBBAA` (the leading `#` is optional).
impl FromStr for Color {
    type Err = PipelineError;

    fn from_str(s: &str) -> PipelineResult<Self> {
        let hex = s.trim().trim_start_matches('#');
        let invalid = || PipelineError::invalid_config(format!("invalid color '{s}'"));

        if !(hex.len() == 6 || hex.len() == 8) || !hex.is_ascii() {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());

        let a = if hex.len() == 8 { channel(6)? } else { 255 };
        Ok(Self::rgba(channel(0)?, channel(2)?, channel(4)?, a))
    }
}

/// Reference to the still image used in `Image` mode.
#[derive(Debug, Clone)]
pub enum BackgroundImage {
    /// Image file decoded on first use.
    File(PathBuf),
    /// Encoded image bytes (PNG, JPEG, ...) decoded on first use.
    Encoded(Arc<[u8]>),
    /// Already decoded pixels.
    Decoded(Arc<RgbaImage>),
}

impl BackgroundImage {
    /// Whether two references name the same asset, without comparing pixels.
    pub fn same_source(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::File(a), Self::File(b)) => a == b,
            (Self::Encoded(a), Self::Encoded(b)) => Arc::ptr_eq(a, b),
            (Self::Decoded(a), Self::Decoded(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// When false frames pass through untouched.
    pub enabled: bool,
    pub quality: Quality,
    pub background_mode: BackgroundMode,
    /// Blur radius in pixels; 0 disables the blur.
    pub blur_radius: f32,
    /// Width of the threshold transition band and strength of edge feathering, in [0, 1].
    pub edge_smoothing: f32,
    /// Foreground probability at which a pixel flips to foreground, in [0, 1].
    pub mask_threshold: f32,
    pub temporal_smoothing: bool,
    /// Weight of the previous alpha in the temporal blend, in [0, 1].
    pub temporal_factor: f32,
    pub edge_refinement: bool,
    pub background_color: Color,
    pub background_image: Option<BackgroundImage>,
    /// Output the stabilized alpha as grayscale instead of the composite.
    pub show_mask: bool,
    /// Log rolling timing statistics periodically.
    pub performance_info: bool,
    pub output_format: OutputFormat,
    pub transparent_fallback: TransparentFallback,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: Quality::Balanced,
            background_mode: BackgroundMode::Blur,
            blur_radius: 12.0,
            edge_smoothing: 0.5,
            mask_threshold: 0.5,
            temporal_smoothing: true,
            temporal_factor: 0.6,
            edge_refinement: true,
            background_color: Color::CHROMA_GREEN,
            background_image: None,
            show_mask: false,
            performance_info: false,
            output_format: OutputFormat::Rgb8,
            transparent_fallback: TransparentFallback::Color,
        }
    }
}

impl Config {
    /// Default configuration at the given quality.
    pub fn with_quality(quality: Quality) -> Self {
        Self {
            quality,
            ..Self::default()
        }
    }

    /// Checks numeric ranges and the mode/format combination.
    pub fn validate(&self) -> PipelineResult<()> {
        if !self.blur_radius.is_finite() || !(0.0..=MAX_BLUR_RADIUS).contains(&self.blur_radius) {
            return Err(PipelineError::invalid_config(format!(
                "blur_radius must be within [0, {MAX_BLUR_RADIUS}], got {}",
                self.blur_radius
            )));
        }

        for (name, value) in [
            ("edge_smoothing", self.edge_smoothing),
            ("mask_threshold", self.mask_threshold),
            ("temporal_factor", self.temporal_factor),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::invalid_config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if self.background_mode == BackgroundMode::Transparent
            && !self.output_format.has_alpha()
            && self.transparent_fallback == TransparentFallback::Reject
        {
            return Err(PipelineError::invalid_config(
                "transparent background requires an output format with alpha",
            ));
        }

        Ok(())
    }

    /// The background mode actually used for a frame.
    pub fn effective_background_mode(&self) -> BackgroundMode {
        match self.background_mode {
            BackgroundMode::Transparent if !self.output_format.has_alpha() => BackgroundMode::Color,
            mode => mode,
        }
    }
}

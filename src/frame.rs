//! Input frames and processed output.

use std::time::Duration;

use image::{ColorType, DynamicImage, RgbImage, RgbaImage};

use crate::config::OutputFormat;
use crate::error::PipelineError;

/// Pixel layout of an input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Luma8,
    LumaA8,
    /// Anything wider than 8 bits per channel.
    Other(ColorType),
}

impl From<ColorType> for PixelFormat {
    fn from(color: ColorType) -> Self {
        match color {
            ColorType::Rgb8 => Self::Rgb8,
            ColorType::Rgba8 => Self::Rgba8,
            ColorType::L8 => Self::Luma8,
            ColorType::La8 => Self::LumaA8,
            other => Self::Other(other),
        }
    }
}

/// One captured video frame.
///
/// Borrowed by the pipeline for the duration of a single `process` call.
#[derive(Debug, Clone)]
pub struct Frame {
    image: DynamicImage,
    timestamp: Duration,
}

impl Frame {
    pub fn new(image: DynamicImage, timestamp: Duration) -> Self {
        Self { image, timestamp }
    }

    pub fn from_rgb(image: RgbImage, timestamp: Duration) -> Self {
        Self::new(DynamicImage::ImageRgb8(image), timestamp)
    }

    pub fn from_rgba(image: RgbaImage, timestamp: Duration) -> Self {
        Self::new(DynamicImage::ImageRgba8(image), timestamp)
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Capture time relative to the start of the stream.
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.image.color().into()
    }
}

/// Non-fatal condition encountered while producing a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameWarning {
    /// The mask source failed; the previous alpha (or full opacity) was used.
    SegmentationUnavailable(String),
    /// The background image could not be used; a solid color was used instead.
    BackgroundAssetInvalid(String),
}

impl FrameWarning {
    /// Converts a recoverable error into a warning; fatal errors yield `None`.
    pub fn from_error(err: PipelineError) -> Option<Self> {
        match err {
            PipelineError::SegmentationUnavailable(msg) => Some(Self::SegmentationUnavailable(msg)),
            PipelineError::BackgroundAssetInvalid(msg) => Some(Self::BackgroundAssetInvalid(msg)),
            _ => None,
        }
    }
}

/// Result of one `process` call. Owned by the caller.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub image: DynamicImage,
    pub timestamp: Duration,
    pub warnings: Vec<FrameWarning>,
}

impl ProcessedFrame {
    pub(crate) fn new(image: RgbaImage, format: OutputFormat, timestamp: Duration) -> Self {
        let image = match format {
            OutputFormat::Rgba8 => DynamicImage::ImageRgba8(image),
            OutputFormat::Rgb8 => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(image).into_rgb8()),
        };
        Self {
            image,
            timestamp,
            warnings: Vec::new(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

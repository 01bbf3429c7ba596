#[cfg(feature = "camera")]
mod loopback;
mod png_sequence;

#[cfg(feature = "camera")]
pub use loopback::V4L2Output;
pub use png_sequence::PngSequenceOutput;

use anyhow::Result;
use image::{imageops, DynamicImage};
use std::borrow::Cow;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a composited frame to the output
    fn write_frame(&mut self, frame: &DynamicImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);

    /// Whether the sink keeps an alpha channel; decides the pipeline output format
    fn supports_alpha(&self) -> bool;
}

/// Resize `frame` to the sink resolution if it differs.
fn fit_to_sink(frame: &DynamicImage, (width, height): (u32, u32)) -> Cow<'_, DynamicImage> {
    if (frame.width(), frame.height()) == (width, height) {
        Cow::Borrowed(frame)
    } else {
        Cow::Owned(frame.resize_exact(width, height, imageops::FilterType::Lanczos3))
    }
}

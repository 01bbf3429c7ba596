mod still;
#[cfg(feature = "camera")]
mod v4l_capture;

pub use still::StillImageCapture;
#[cfg(feature = "camera")]
pub use v4l_capture::WebcamCapture;

use anyhow::Result;
use backdrop_fx::Frame;

/// Trait for frame sources feeding the pipeline
pub trait CaptureSource {
    /// Capture a single frame, stamped relative to the start of the stream
    fn capture_frame(&mut self) -> Result<Frame>;

    /// Get the resolution of captured frames
    fn resolution(&self) -> (u32, u32);
}

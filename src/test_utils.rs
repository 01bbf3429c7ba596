//! Deterministic mask sources for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};
use std::time::Duration;

use crate::config::Quality;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::segmentation::{MaskSource, RawMask};

/// Replays a script of per-frame results, then repeats the last mask.
///
/// `Ok(p)` yields a frame-sized mask filled with probability `p`;
/// `Err(msg)` fails the frame with `SegmentationUnavailable`.
pub struct ScriptedMaskSource {
    script: VecDeque<Result<f32, &'static str>>,
    last: f32,
    pub resets: Arc<AtomicUsize>,
    pub qualities: Arc<Mutex<Vec<Quality>>>,
}

impl ScriptedMaskSource {
    pub fn new(script: impl IntoIterator<Item = Result<f32, &'static str>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: 1.0,
            resets: Arc::new(AtomicUsize::new(0)),
            qualities: Arc::default(),
        }
    }

    pub fn constant(probability: f32) -> Self {
        Self::new([Ok(probability)])
    }
}

impl MaskSource for ScriptedMaskSource {
    fn classify(&mut self, frame: &Frame, quality: Quality) -> PipelineResult<RawMask> {
        if let Ok(mut qualities) = self.qualities.lock() {
            qualities.push(quality);
        }
        let (width, height) = frame.dimensions();
        match self.script.pop_front() {
            Some(Ok(p)) => {
                self.last = p;
                Ok(RawMask::filled(width, height, p))
            }
            Some(Err(msg)) => Err(PipelineError::segmentation_unavailable(msg)),
            None => Ok(RawMask::filled(width, height, self.last)),
        }
    }

    fn reset_state(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Mask whose left half is foreground, at a quarter of the frame resolution.
pub struct LeftHalfMaskSource;

impl MaskSource for LeftHalfMaskSource {
    fn classify(&mut self, frame: &Frame, _quality: Quality) -> PipelineResult<RawMask> {
        let (width, height) = frame.dimensions();
        let (w, h) = ((width / 4).max(1), (height / 4).max(1));
        Ok(RawMask::from_fn(w, h, |x, _| if x < w / 2 { 1.0 } else { 0.0 }))
    }
}

/// Frame with a horizontal gradient in red and constant green/blue.
pub fn gradient_frame(width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, _| {
        Rgb([(x * 255 / width.max(1)) as u8, 40, 200])
    });
    Frame::from_rgb(image, Duration::ZERO)
}

use super::CaptureSource;
use anyhow::{Context, Result};
use backdrop_fx::Frame;
use image::{imageops, DynamicImage};
use std::path::Path;
use std::time::Instant;

/// Replays one still image as a video stream.
///
/// Useful for tuning stabilizer and background settings without a camera.
pub struct StillImageCapture {
    image: DynamicImage,
    started: Instant,
}

impl StillImageCapture {
    /// Load `path`, resized to `width`x`height` if it differs.
    pub fn new<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Using still image {} as input", path.display());

        let image = image::open(path)
            .with_context(|| format!("Failed to open input image {}", path.display()))?;

        let image = if (image.width(), image.height()) != (width, height) {
            image.resize_exact(width, height, imageops::FilterType::Triangle)
        } else {
            image
        };

        Ok(Self {
            image,
            started: Instant::now(),
        })
    }
}

impl CaptureSource for StillImageCapture {
    fn capture_frame(&mut self) -> Result<Frame> {
        Ok(Frame::new(self.image.clone(), self.started.elapsed()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn still_capture_resizes_and_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.png");
        RgbImage::from_pixel(20, 10, Rgb([10, 20, 30])).save(&path).unwrap();

        let mut capture = StillImageCapture::new(&path, 8, 6).unwrap();
        assert_eq!(capture.resolution(), (8, 6));

        let first = capture.capture_frame().unwrap();
        let second = capture.capture_frame().unwrap();
        assert_eq!(first.dimensions(), (8, 6));
        assert!(second.timestamp() >= first.timestamp());
        assert_eq!(first.image().to_rgb8().get_pixel(3, 3).0, [10, 20, 30]);
    }

    #[test]
    fn missing_input_is_an_error() {
        assert!(StillImageCapture::new("/nonexistent/input.png", 8, 6).is_err());
    }
}

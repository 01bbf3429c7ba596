use super::CaptureSource;
use anyhow::{Context, Result};
use backdrop_fx::Frame;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::time::Instant;

pub struct WebcamCapture {
    camera: Camera,
    started: Instant,
    width: u32,
    height: u32,
}

impl WebcamCapture {
    /// Open `device_index` at the format closest to `width`x`height` @ `fps`.
    pub fn new(device_index: u32, width: u32, height: u32, fps: u32) -> Result<Self> {
        tracing::info!(
            "Initializing webcam {} at {}x{} @ {}fps",
            device_index,
            width,
            height,
            fps
        );

        let index = CameraIndex::Index(device_index);
        let wanted = CameraFormat::new(Resolution::new(width, height), FrameFormat::MJPEG, fps);
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));

        let mut camera = Camera::new(index, requested).context("Failed to open camera")?;

        camera
            .open_stream()
            .context("Failed to open camera stream")?;

        let actual = camera.resolution();
        if (actual.width(), actual.height()) != (width, height) {
            tracing::warn!(
                "Camera negotiated {}x{} instead of {}x{}",
                actual.width(),
                actual.height(),
                width,
                height
            );
        }
        tracing::info!("Webcam initialized successfully");

        Ok(Self {
            camera,
            started: Instant::now(),
            width: actual.width(),
            height: actual.height(),
        })
    }
}

impl CaptureSource for WebcamCapture {
    fn capture_frame(&mut self) -> Result<Frame> {
        let buffer = self.camera.frame().context("Failed to capture frame")?;
        let timestamp = self.started.elapsed();

        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("Failed to decode frame")?;

        Ok(Frame::from_rgb(decoded, timestamp))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

use super::{fit_to_sink, OutputSink};
use anyhow::{Context, Result};
use image::{DynamicImage, RgbImage};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// v4l2loopback sink. Frames are written as packed YUYV, so alpha is dropped.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    yuyv: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path)
            .with_context(|| format!("Failed to open v4l2 device at {}", path.display()))?;
        let requested = Format::new(width, height, FourCC::new(b"YUYV"));
        let negotiated = Output::set_format(&device, &requested)
            .context("Failed to set YUYV output format")?;
        if (negotiated.width, negotiated.height) != (width, height) {
            tracing::warn!(
                "Loopback device accepted {}x{} instead of {}x{}",
                negotiated.width,
                negotiated.height,
                width,
                height
            );
        }

        // v4l2loopback takes raw frames written to the device node
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
            yuyv: Vec::with_capacity(width as usize * height as usize * 2),
        })
    }
}

/// Pack RGB into YUYV, sharing chroma between horizontal pixel pairs.
fn rgb_to_yuyv(rgb: &RgbImage, out: &mut Vec<u8>) {
    out.clear();
    for row in rgb.rows() {
        let row: Vec<_> = row.collect();
        for pair in row.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).copied().unwrap_or(left);

            let (y0, u0, v0) = rgb_to_yuv(left.0);
            let (y1, u1, v1) = rgb_to_yuv(right.0);
            let u = ((u16::from(u0) + u16::from(u1)) / 2) as u8;
            let v = ((u16::from(v0) + u16::from(v1)) / 2) as u8;

            out.extend_from_slice(&[y0, u, y1, v]);
        }
    }
}

/// BT.601
fn rgb_to_yuv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));

    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.147 * r - 0.289 * g + 0.436 * b + 128.0;
    let v = 0.615 * r - 0.515 * g - 0.100 * b + 128.0;

    let to_u8 = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    (to_u8(y), to_u8(u), to_u8(v))
}

impl OutputSink for V4L2Output {
    fn write_frame(&mut self, frame: &DynamicImage) -> Result<()> {
        let frame = fit_to_sink(frame, (self.width, self.height));
        rgb_to_yuyv(&frame.to_rgb8(), &mut self.yuyv);

        self.file
            .write_all(&self.yuyv)
            .context("Failed to write frame to v4l2loopback device")?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn supports_alpha(&self) -> bool {
        false
    }
}

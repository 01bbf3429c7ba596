use super::{fit_to_sink, OutputSink};
use anyhow::{Context, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Writes numbered PNG files, keeping the alpha channel of transparent output.
pub struct PngSequenceOutput {
    dir: PathBuf,
    width: u32,
    height: u32,
    next_index: u64,
}

impl PngSequenceOutput {
    pub fn new<P: AsRef<Path>>(dir: P, width: u32, height: u32) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        tracing::info!(
            "Writing PNG frames to {} ({}x{})",
            dir.display(),
            width,
            height
        );

        Ok(Self {
            dir,
            width,
            height,
            next_index: 0,
        })
    }

    fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl OutputSink for PngSequenceOutput {
    fn write_frame(&mut self, frame: &DynamicImage) -> Result<()> {
        let frame = fit_to_sink(frame, (self.width, self.height));
        let path = self.frame_path(self.next_index);

        frame
            .save_with_format(&path, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        self.next_index += 1;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn supports_alpha(&self) -> bool {
        true
    }
}

use image::{imageops, RgbImage};
use ndarray::Array4;

use crate::config::Quality;

/// Model input geometry for one quality level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    /// Resolution factor RVM uses for its coarse pass and recurrent states.
    pub downsample_ratio: f32,
}

impl ModelInput {
    pub fn for_quality(quality: Quality) -> Self {
        let (side, downsample_ratio) = match quality {
            Quality::Fast => (256, 0.5),
            Quality::Balanced => (512, 0.25),
            Quality::Accurate => (768, 0.4),
        };
        Self {
            width: side,
            height: side,
            downsample_ratio,
        }
    }
}

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    input: ModelInput,
}

impl Preprocessor {
    pub fn new(input: ModelInput) -> Self {
        Self { input }
    }

    pub fn input(&self) -> ModelInput {
        self.input
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to model input dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let (width, height) = (self.input.width, self.input.height);
        let resized;
        let source = if image.dimensions() == (width, height) {
            image
        } else {
            resized = imageops::resize(image, width, height, imageops::FilterType::Triangle);
            &resized
        };

        Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
            f32::from(source.get_pixel(x as u32, y as u32)[c]) / 255.0
        })
    }
}

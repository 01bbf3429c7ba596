use image::{imageops, ImageBuffer, Luma, Rgba, RgbaImage};

use crate::config::Quality;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

type MaskBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel foreground probability straight from a mask source.
///
/// Values are nominally 0.0 = background, 1.0 = foreground, but nothing is
/// guaranteed. The stabilizer treats NaN as 0.0 (background) and clamps
/// other out-of-range values into [0, 1], so 7.0 counts as fully
/// foreground and -3.0 as background. Flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMask {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl RawMask {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> PipelineResult<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(PipelineError::segmentation_unavailable(format!(
                "mask has {} values, expected {expected} for {width}x{height}",
                values.len()
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        let values = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            values,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Resample onto a `width`x`height` grid.
    ///
    /// Models usually run below capture resolution, so this is normally an
    /// upsample. Non-finite values are zeroed first so they cannot bleed
    /// into their neighbours.
    pub fn fit_to(self, width: u32, height: u32) -> Self {
        if (self.width, self.height) == (width, height) {
            return self;
        }
        let _span = tracing::debug_span!("fit_mask").entered();

        let (src_w, src_h) = (self.width, self.height);
        if src_w == 0 || src_h == 0 {
            return Self::filled(width, height, 0.0);
        }
        let values = self
            .values
            .into_iter()
            .map(|v| if v.is_finite() { v } else { 0.0 })
            .collect();
        let Some(buffer) = MaskBuffer::from_raw(src_w, src_h, values) else {
            return Self::filled(width, height, 0.0);
        };

        let resized = imageops::resize(&buffer, width, height, imageops::FilterType::Triangle);
        Self {
            width,
            height,
            values: resized.into_raw(),
        }
    }
}

/// Stabilized per-pixel opacity in [0, 1], same size as the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMatte {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl AlphaMatte {
    /// Builds a matte, clamping every value into [0, 1] and zeroing NaN.
    pub fn from_values(width: u32, height: u32, values: Vec<f32>) -> PipelineResult<Self> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(PipelineError::DimensionMismatch {
                context: "AlphaMatte",
                expected: (width, height),
                actual: (values.len() as u32, 1),
            });
        }
        let values = values.into_iter().map(clamp_unit).collect();
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            values: vec![clamp_unit(value); width as usize * height as usize],
        }
    }

    /// Fully opaque matte, used when no mask has ever been produced.
    pub fn opaque(width: u32, height: u32) -> Self {
        Self::filled(width, height, 1.0)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    /// Visualize as an opaque grayscale image.
    pub fn to_grayscale(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| {
            let value = unit_to_u8(self.get(x, y));
            Rgba([value, value, value, 255])
        })
    }
}

pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

pub(crate) fn unit_to_u8(value: f32) -> u8 {
    (value * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Trait for segmentation capabilities
/// Allows swapping between different backends (RVM, a test fake, ...)
///
/// Implementations must be `Send` so that one pipeline per video source can
/// live on its own thread.
pub trait MaskSource: Send {
    /// Produce a foreground probability map for one frame.
    ///
    /// The mask should be aligned to the frame's pixel grid; the pipeline
    /// resamples it if it is not.
    ///
    /// # Errors
    /// * `SegmentationUnavailable` - the frame cannot be segmented (for
    ///   example an unsupported pixel format or an inference failure)
    fn classify(&mut self, frame: &Frame, quality: Quality) -> PipelineResult<RawMask>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Called when the pipeline is reset.
    fn reset_state(&mut self) {
        // Default implementation: no-op for stateless models
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_mask_rejects_wrong_length() {
        let err = RawMask::new(2, 2, vec![0.0; 3]).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn fit_to_same_size_is_identity() {
        let mask = RawMask::from_fn(3, 2, |x, y| (x + y) as f32 / 4.0);
        assert_eq!(mask.clone().fit_to(3, 2), mask);
    }

    #[test]
    fn fit_to_upsamples_uniform_mask() {
        let mask = RawMask::filled(4, 4, 1.0).fit_to(16, 12);
        assert_eq!(mask.dimensions(), (16, 12));
        assert_eq!(mask.values().len(), 16 * 12);
        assert!(mask.values().iter().all(|v| (v - 1.0).abs() < 1e-5));
    }

    #[test]
    fn fit_to_zeroes_nan_before_resampling() {
        let mask = RawMask::new(2, 1, vec![f32::NAN, f32::NAN]).unwrap().fit_to(4, 2);
        assert!(mask.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn alpha_matte_clamps_values() {
        let matte = AlphaMatte::from_values(2, 2, vec![-0.5, 0.25, 1.5, f32::NAN]).unwrap();
        assert_eq!(matte.values(), &[0.0, 0.25, 1.0, 0.0]);
    }

    #[test]
    fn get_reads_row_major() {
        let matte = AlphaMatte::from_values(3, 2, vec![0.0, 0.1, 0.2, 0.3, 0.4, 0.5]).unwrap();
        assert_eq!(matte.get(0, 1), 0.3);
        assert_eq!(matte.get(2, 1), 0.5);
        assert_eq!(matte.get(2, 0), 0.2);
    }

    #[test]
    fn stabilized_out_of_range_values_clamp() {
        let raw = RawMask::new(2, 1, vec![7.0, -3.0]).unwrap();
        let alpha = crate::stabilizer::stabilize(
            &raw,
            None,
            &crate::config::Config {
                edge_refinement: false,
                temporal_smoothing: false,
                ..Default::default()
            },
        );
        assert_eq!(alpha.values(), &[1.0, 0.0]);
    }

    #[test]
    fn grayscale_view_maps_alpha_to_luma() {
        let matte = AlphaMatte::from_values(2, 1, vec![0.0, 1.0]).unwrap();
        let gray = matte.to_grayscale();
        assert_eq!(gray.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(gray.get_pixel(1, 0).0, [255, 255, 255, 255]);
    }
}

//! Alpha compositing of the frame over its background.
//!
//! ```text
//! out = alpha * frame + (1 - alpha) * background     (every channel)
//! ```
//!
//! In transparent mode there is no background layer: the frame's color is
//! kept and alpha is written straight into the output alpha channel.

use image::{Rgba, RgbaImage};

use crate::background::Background;
use crate::error::{PipelineError, PipelineResult};
use crate::segmentation::types::unit_to_u8;
use crate::segmentation::AlphaMatte;

/// Blend `frame` over `background` using `alpha`.
///
/// # Errors
///
/// * `DimensionMismatch` - when the frame, alpha or background sizes differ
pub fn composite(
    frame: &RgbaImage,
    alpha: &AlphaMatte,
    background: &Background<'_>,
) -> PipelineResult<RgbaImage> {
    let _span = tracing::debug_span!("composite").entered();
    let size = frame.dimensions();
    PipelineError::check_dimensions("Compositor alpha", size, alpha.dimensions())?;

    let output = match background {
        Background::Layer(layer) => {
            PipelineError::check_dimensions("Compositor background", size, layer.dimensions())?;
            let pixels = frame
                .pixels()
                .zip(layer.pixels())
                .zip(alpha.values())
                .flat_map(|((fg, bg), &a)| blend(fg, bg, a).0);
            RgbaImage::from_vec(size.0, size.1, pixels.collect())
        }
        Background::Transparent => {
            let pixels = frame.pixels().zip(alpha.values()).flat_map(|(fg, &a)| {
                let Rgba([r, g, b, _]) = *fg;
                [r, g, b, unit_to_u8(a)]
            });
            RgbaImage::from_vec(size.0, size.1, pixels.collect())
        }
    };

    // from_vec only fails if the pixel count is wrong, which the checks above exclude
    output.ok_or(PipelineError::DimensionMismatch {
        context: "Compositor output",
        expected: size,
        actual: (0, 0),
    })
}

#[inline]
fn blend(fg: &Rgba<u8>, bg: &Rgba<u8>, alpha: f32) -> Rgba<u8> {
    let inv = 1.0 - alpha;
    let mix = |f: u8, b: u8| (alpha * f32::from(f) + inv * f32::from(b)).round().clamp(0.0, 255.0) as u8;
    Rgba([
        mix(fg[0], bg[0]),
        mix(fg[1], bg[1]),
        mix(fg[2], bg[2]),
        mix(fg[3], bg[3]),
    ])
}

//! Mask stabilization: soft thresholding, edge feathering and temporal
//! blending of raw masks into an alpha matte.
//!
//! The stabilizer itself is stateless. The previous frame's alpha is owned
//! by the pipeline controller and passed in explicitly.

use image::{imageops, ImageBuffer, Luma};

use crate::config::Config;
use crate::segmentation::types::clamp_unit;
use crate::segmentation::{AlphaMatte, RawMask};

/// Width of the threshold transition band at `edge_smoothing = 1`.
pub const MAX_TRANSITION_BAND: f32 = 0.2;

/// Gaussian sigma, in pixels, of the edge feather at `edge_smoothing = 1`.
pub const MAX_FEATHER_SIGMA: f32 = 3.0;

/// Sigmas below this leave the mask visibly unchanged.
const MIN_FEATHER_SIGMA: f32 = 0.1;

/// Map a foreground probability to opacity.
///
/// Below `threshold - band/2` the result is 0, above `threshold + band/2`
/// it is 1, with a smoothstep in between. A zero band is a hard step at
/// `threshold`. NaN counts as background; other values are clamped first.
pub fn soft_threshold(probability: f32, threshold: f32, band: f32) -> f32 {
    let p = clamp_unit(probability);
    let half = band * 0.5;
    if half <= f32::EPSILON {
        return if p >= threshold { 1.0 } else { 0.0 };
    }
    let t = ((p - (threshold - half)) / band).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Apply [`soft_threshold`] to every value of the mask.
pub fn threshold_mask(raw: &RawMask, threshold: f32, edge_smoothing: f32) -> Vec<f32> {
    let band = edge_smoothing.clamp(0.0, 1.0) * MAX_TRANSITION_BAND;
    raw.values()
        .iter()
        .map(|&p| soft_threshold(p, threshold, band))
        .collect()
}

/// Feather the mask boundary with a Gaussian whose sigma scales with
/// `edge_smoothing`. Uniform regions are left as they are.
pub fn refine_edges(values: Vec<f32>, width: u32, height: u32, edge_smoothing: f32) -> Vec<f32> {
    let sigma = edge_smoothing.clamp(0.0, 1.0) * MAX_FEATHER_SIGMA;
    if sigma < MIN_FEATHER_SIGMA || width == 0 || height == 0 {
        return values;
    }
    let _span = tracing::debug_span!("refine_edges", sigma).entered();

    match ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(width, height, values) {
        Some(buffer) => imageops::blur(&buffer, sigma).into_raw(),
        // from_raw only fails on a length mismatch, which callers rule out
        None => vec![0.0; width as usize * height as usize],
    }
}

/// Exponential blend towards the previous alpha:
/// `current = factor * previous + (1 - factor) * current`.
pub fn blend_temporal(current: &mut [f32], previous: &[f32], factor: f32) {
    let keep = factor.clamp(0.0, 1.0);
    let take = 1.0 - keep;
    for (c, &p) in current.iter_mut().zip(previous) {
        *c = keep * p + take * *c;
    }
}

/// Turn a raw mask into the next stabilized alpha.
///
/// `previous` is the last stabilized alpha, or `None` at the start of a
/// session; temporal blending is skipped when it is absent or has a
/// different size. The result is always clamped to [0, 1].
pub fn stabilize(raw: &RawMask, previous: Option<&AlphaMatte>, config: &Config) -> AlphaMatte {
    let _span = tracing::debug_span!("stabilize").entered();
    let (width, height) = raw.dimensions();

    let mut values = threshold_mask(raw, config.mask_threshold, config.edge_smoothing);

    if config.edge_refinement {
        values = refine_edges(values, width, height, config.edge_smoothing);
    }

    if config.temporal_smoothing {
        if let Some(previous) = previous.filter(|p| p.dimensions() == (width, height)) {
            blend_temporal(&mut values, previous.values(), config.temporal_factor);
        }
    }

    AlphaMatte::from_values(width, height, values)
        .unwrap_or_else(|_| AlphaMatte::filled(width, height, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn plain_config() -> Config {
        Config {
            edge_smoothing: 0.0,
            edge_refinement: false,
            temporal_smoothing: false,
            ..Config::default()
        }
    }

    #[test]
    fn hard_threshold_without_smoothing() {
        assert_eq!(soft_threshold(0.49, 0.5, 0.0), 0.0);
        assert_eq!(soft_threshold(0.5, 0.5, 0.0), 1.0);
        assert_eq!(soft_threshold(0.9, 0.5, 0.0), 1.0);
    }

    #[test]
    fn soft_threshold_has_transition_band() {
        let band = 0.2;
        assert_eq!(soft_threshold(0.39, 0.5, band), 0.0);
        assert_eq!(soft_threshold(0.61, 0.5, band), 1.0);
        assert!((soft_threshold(0.5, 0.5, band) - 0.5).abs() < 1e-6);

        let lower = soft_threshold(0.45, 0.5, band);
        let upper = soft_threshold(0.55, 0.5, band);
        assert!(0.0 < lower && lower < 0.5 && 0.5 < upper && upper < 1.0);
    }

    #[test]
    fn malformed_probabilities_are_sanitized() {
        assert_eq!(soft_threshold(f32::NAN, 0.5, 0.1), 0.0);
        assert_eq!(soft_threshold(-3.0, 0.5, 0.1), 0.0);
        assert_eq!(soft_threshold(7.0, 0.5, 0.1), 1.0);
    }

    #[test]
    fn refine_edges_keeps_uniform_regions() {
        let refined = refine_edges(vec![1.0; 64], 8, 8, 1.0);
        assert!(refined.iter().all(|v| (v - 1.0).abs() < 1e-4));
    }

    #[test]
    fn refine_edges_softens_a_step() {
        let (w, h) = (16, 4);
        let step: Vec<f32> = (0..h)
            .flat_map(|_| (0..w).map(|x| if x < w / 2 { 1.0 } else { 0.0 }))
            .collect();
        let refined = refine_edges(step.clone(), w, h, 1.0);

        let row = &refined[..w as usize];
        assert!(row[0] > 0.99 && row[w as usize - 1] < 0.01);
        assert!(row[(w / 2 - 1) as usize] < 1.0 && row[(w / 2) as usize] > 0.0);
    }

    #[test]
    fn refine_edges_with_zero_strength_is_identity() {
        let values = vec![0.0, 1.0, 0.0, 1.0];
        assert_eq!(refine_edges(values.clone(), 2, 2, 0.0), values);
    }

    #[test]
    fn temporal_factor_one_keeps_previous() {
        let raw = RawMask::filled(4, 4, 0.0);
        let previous = AlphaMatte::from_values(4, 4, (0..16).map(|i| i as f32 / 15.0).collect()).unwrap();
        let config = Config {
            temporal_smoothing: true,
            temporal_factor: 1.0,
            ..plain_config()
        };
        assert_eq!(stabilize(&raw, Some(&previous), &config), previous);
    }

    #[test]
    fn temporal_factor_zero_has_no_memory() {
        let raw = RawMask::from_fn(4, 4, |x, _| if x < 2 { 0.9 } else { 0.1 });
        let previous = AlphaMatte::filled(4, 4, 0.5);
        let config = Config {
            temporal_smoothing: true,
            temporal_factor: 0.0,
            ..plain_config()
        };
        let expected = stabilize(&raw, None, &plain_config());
        assert_eq!(stabilize(&raw, Some(&previous), &config), expected);
    }

    #[test]
    fn temporal_blend_lags_behind_sudden_change() {
        let config = Config {
            temporal_smoothing: true,
            temporal_factor: 0.8,
            ..plain_config()
        };
        let first = stabilize(&RawMask::filled(8, 8, 1.0), None, &config);
        assert!(first.values().iter().all(|&v| v == 1.0));

        let second = stabilize(&RawMask::filled(8, 8, 0.0), Some(&first), &config);
        assert!(second.values().iter().all(|v| (v - 0.8).abs() < 1e-6));
    }

    #[test]
    fn previous_of_other_size_is_ignored() {
        let config = Config {
            temporal_smoothing: true,
            temporal_factor: 1.0,
            ..plain_config()
        };
        let previous = AlphaMatte::filled(2, 2, 1.0);
        let alpha = stabilize(&RawMask::filled(4, 4, 0.0), Some(&previous), &config);
        assert!(alpha.values().iter().all(|&v| v == 0.0));
    }

    proptest! {
        #[test]
        fn stabilized_alpha_stays_in_unit_range(
            values in prop::collection::vec(prop::num::f32::ANY, 36),
            previous in prop::collection::vec(0.0f32..=1.0, 36),
            threshold in 0.0f32..=1.0,
            smoothing in 0.0f32..=1.0,
            factor in 0.0f32..=1.0,
            refine in any::<bool>(),
            temporal in any::<bool>(),
        ) {
            let raw = RawMask::new(6, 6, values).unwrap();
            let previous = AlphaMatte::from_values(6, 6, previous).unwrap();
            let config = Config {
                mask_threshold: threshold,
                edge_smoothing: smoothing,
                temporal_factor: factor,
                edge_refinement: refine,
                temporal_smoothing: temporal,
                ..Config::default()
            };
            let alpha = stabilize(&raw, Some(&previous), &config);
            prop_assert!(alpha.values().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }
}

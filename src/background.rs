//! Background synthesis for each background mode.
//!
//! Color and Image backgrounds only depend on the configuration and the
//! frame size, so they are built once and cached until either changes.
//! Blur backgrounds depend on the live frame and are rebuilt every call.

use std::borrow::Cow;

use image::{imageops, DynamicImage, RgbaImage};

use crate::config::{BackgroundImage, BackgroundMode, Color, Config};
use crate::error::{PipelineError, PipelineResult};

/// Color used when the configured background image cannot be used.
pub const DEFAULT_FALLBACK_COLOR: Color = Color::BLACK;

/// Radii above this are blurred at reduced resolution.
const FULL_RESOLUTION_BLUR_LIMIT: f32 = 8.0;

/// Background layer for one frame.
#[derive(Debug)]
pub enum Background<'a> {
    Layer(Cow<'a, RgbaImage>),
    /// No layer: the compositor writes alpha into the output instead.
    Transparent,
}

#[derive(Debug, Clone)]
enum CacheKey {
    Color {
        size: (u32, u32),
        color: Color,
    },
    Image {
        size: (u32, u32),
        source: Option<BackgroundImage>,
    },
}

impl CacheKey {
    fn matches(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Color { size, color },
                Self::Color {
                    size: other_size,
                    color: other_color,
                },
            ) => size == other_size && color == other_color,
            (
                Self::Image { size, source },
                Self::Image {
                    size: other_size,
                    source: other_source,
                },
            ) => {
                size == other_size
                    && match (source, other_source) {
                        (Some(a), Some(b)) => a.same_source(b),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

#[derive(Debug)]
struct CachedBackground {
    key: CacheKey,
    image: RgbaImage,
    /// Why the requested image was replaced by a solid color.
    warning: Option<String>,
}

/// Produces the replacement background for each frame.
#[derive(Debug, Default)]
pub struct BackgroundSynthesizer {
    cache: Option<CachedBackground>,
    builds: usize,
}

impl BackgroundSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any cached background.
    pub fn clear(&mut self) {
        self.cache = None;
    }

    /// Number of times a cacheable background has been (re)built.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// Background for `frame` under `config`.
    ///
    /// A failed background image is not an error: the returned layer is a
    /// solid [`DEFAULT_FALLBACK_COLOR`] and the second element carries the
    /// `BackgroundAssetInvalid` condition for the caller to report.
    pub fn synthesize<'a>(
        &'a mut self,
        frame: &'a RgbaImage,
        config: &Config,
    ) -> (Background<'a>, Option<PipelineError>) {
        let _span = tracing::debug_span!("background").entered();
        let size = frame.dimensions();

        match config.effective_background_mode() {
            BackgroundMode::Transparent => (Background::Transparent, None),
            BackgroundMode::Blur => (
                Background::Layer(blur_background(frame, config.blur_radius)),
                None,
            ),
            BackgroundMode::Color => {
                let color = config.background_color;
                let cached = self.cached(CacheKey::Color { size, color }, |key| CachedBackground {
                    key,
                    image: solid(size, color),
                    warning: None,
                });
                (Background::Layer(Cow::Borrowed(&cached.image)), None)
            }
            BackgroundMode::Image => {
                let key = CacheKey::Image {
                    size,
                    source: config.background_image.clone(),
                };
                let cached = self.cached(key, |key| {
                    let source = match &key {
                        CacheKey::Image { source, .. } => source.as_ref(),
                        CacheKey::Color { .. } => None,
                    };
                    match load_image(source).map(|image| aspect_fill(image, size.0, size.1)) {
                        Ok(image) => CachedBackground {
                            key,
                            image,
                            warning: None,
                        },
                        Err(err) => {
                            tracing::warn!("{err}; using solid {DEFAULT_FALLBACK_COLOR} background");
                            CachedBackground {
                                key,
                                image: solid(size, DEFAULT_FALLBACK_COLOR),
                                warning: Some(match err {
                                    PipelineError::BackgroundAssetInvalid(msg) => msg,
                                    other => other.to_string(),
                                }),
                            }
                        }
                    }
                });
                let warning = cached
                    .warning
                    .clone()
                    .map(PipelineError::background_asset_invalid);
                (Background::Layer(Cow::Borrowed(&cached.image)), warning)
            }
        }
    }

    fn cached(
        &mut self,
        key: CacheKey,
        build: impl FnOnce(CacheKey) -> CachedBackground,
    ) -> &CachedBackground {
        let hit = self.cache.as_ref().is_some_and(|cached| cached.key.matches(&key));
        if !hit {
            self.builds += 1;
            tracing::debug!("Building background ({} builds so far)", self.builds);
            self.cache = None;
        }
        self.cache.get_or_insert_with(|| build(key))
    }
}

fn solid((width, height): (u32, u32), color: Color) -> RgbaImage {
    RgbaImage::from_pixel(width, height, color.to_pixel())
}

/// Gaussian blur with sigma `radius / 2`; radius 0 returns the frame itself.
pub fn blur_background(frame: &RgbaImage, radius: f32) -> Cow<'_, RgbaImage> {
    if radius <= 0.0 || frame.width() == 0 || frame.height() == 0 {
        return Cow::Borrowed(frame);
    }
    let sigma = radius / 2.0;
    if radius <= FULL_RESOLUTION_BLUR_LIMIT {
        return Cow::Owned(imageops::blur(frame, sigma));
    }

    let factor = radius / FULL_RESOLUTION_BLUR_LIMIT;
    let (width, height) = frame.dimensions();
    let small_width = ((width as f32 / factor).round() as u32).max(1);
    let small_height = ((height as f32 / factor).round() as u32).max(1);

    let small = imageops::resize(frame, small_width, small_height, imageops::FilterType::Triangle);
    let blurred = imageops::blur(&small, sigma / factor);
    Cow::Owned(imageops::resize(
        &blurred,
        width,
        height,
        imageops::FilterType::Triangle,
    ))
}

fn load_image(source: Option<&BackgroundImage>) -> PipelineResult<DynamicImage> {
    let source = source
        .ok_or_else(|| PipelineError::background_asset_invalid("no background image configured"))?;

    let image = match source {
        BackgroundImage::File(path) => image::open(path).map_err(|err| {
            PipelineError::background_asset_invalid(format!("{}: {err}", path.display()))
        })?,
        BackgroundImage::Encoded(bytes) => image::load_from_memory(bytes)
            .map_err(|err| PipelineError::background_asset_invalid(err.to_string()))?,
        BackgroundImage::Decoded(pixels) => DynamicImage::ImageRgba8(pixels.as_ref().clone()),
    };

    if image.width() == 0 || image.height() == 0 {
        return Err(PipelineError::background_asset_invalid(
            "background image is empty",
        ));
    }
    Ok(image)
}

/// Scale to cover `width`x`height`, then center-crop the excess.
pub fn aspect_fill(image: DynamicImage, width: u32, height: u32) -> RgbaImage {
    if image.width() == width && image.height() == height {
        return image.into_rgba8();
    }
    image
        .resize_to_fill(width, height, imageops::FilterType::Triangle)
        .into_rgba8()
}

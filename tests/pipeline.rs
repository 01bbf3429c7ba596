//! End-to-end behaviour through the public API.

use std::borrow::Cow;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use backdrop_fx::compositor::composite;
use backdrop_fx::{
    AlphaMatte, Background, BackgroundImage, BackgroundMode, Color, Config, Frame, FrameWarning,
    MaskSource, OutputFormat, PipelineController, PipelineError, PipelineResult, Quality, RawMask,
};
use image::{Rgb, RgbImage, Rgba, RgbaImage};

/// Mask source driven by a closure of (width, height, call index).
struct FnMask<F> {
    calls: usize,
    mask: F,
}

impl<F> FnMask<F>
where
    F: FnMut(u32, u32, usize) -> RawMask + Send + 'static,
{
    fn boxed(mask: F) -> Box<dyn MaskSource> {
        Box::new(Self { calls: 0, mask })
    }
}

impl<F> MaskSource for FnMask<F>
where
    F: FnMut(u32, u32, usize) -> RawMask + Send,
{
    fn classify(&mut self, frame: &Frame, _quality: Quality) -> PipelineResult<RawMask> {
        let (width, height) = frame.dimensions();
        let mask = (self.mask)(width, height, self.calls);
        self.calls += 1;
        Ok(mask)
    }

    fn reset_state(&mut self) {
        self.calls = 0;
    }
}

fn textured_frame(width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 200) as u8 + 20, (y % 200) as u8 + 20, 90])
    });
    Frame::from_rgb(image, Duration::from_millis(33))
}

fn color_config(color: Color) -> Config {
    Config {
        background_mode: BackgroundMode::Color,
        background_color: color,
        mask_threshold: 0.5,
        temporal_smoothing: false,
        edge_refinement: false,
        ..Config::default()
    }
}

fn controller(source: Box<dyn MaskSource>, config: Config) -> PipelineController {
    let mut pipeline = PipelineController::new(source);
    pipeline.apply_config(config).unwrap();
    pipeline
}

#[test]
fn color_mode_keeps_foreground_and_paints_background() {
    let (width, height) = (640, 480);
    // left of x=320 is clearly foreground, right is clearly background
    let source = FnMask::boxed(|w, h, _| {
        RawMask::from_fn(w, h, |x, _| if x < w / 2 { 0.9 } else { 0.1 })
    });
    let mut pipeline = controller(source, color_config(Color::rgb(255, 0, 0)));

    let frame = textured_frame(width, height);
    let output = pipeline.process(&frame).unwrap();
    assert!(output.warnings.is_empty());
    assert_eq!(output.dimensions(), (width, height));

    let input = frame.image().to_rgb8();
    let result = output.image.to_rgb8();
    for (x, y) in [(0, 0), (100, 240), (319, 479), (320, 0), (500, 200), (639, 479)] {
        let expected = if x < width / 2 {
            *input.get_pixel(x, y)
        } else {
            Rgb([255, 0, 0])
        };
        assert_eq!(*result.get_pixel(x, y), expected, "pixel ({x}, {y})");
    }
}

#[test]
fn temporal_smoothing_lags_behind_a_vanishing_subject() {
    let source = FnMask::boxed(|w, h, call| RawMask::filled(w, h, if call == 0 { 1.0 } else { 0.0 }));
    let config = Config {
        temporal_smoothing: true,
        temporal_factor: 0.8,
        show_mask: true,
        ..color_config(Color::BLACK)
    };
    let mut pipeline = controller(source, config);
    let frame = textured_frame(16, 8);

    let first = pipeline.process(&frame).unwrap().image.to_rgb8();
    assert!(first.pixels().all(|p| p.0 == [255, 255, 255]));

    let second = pipeline.process(&frame).unwrap().image.to_rgb8();
    // 0.8 * 255
    assert!(second.pixels().all(|p| p.0[0].abs_diff(204) <= 1));
}

#[test]
fn reset_matches_a_fresh_instance() {
    let mask = |w: u32, h: u32, call: usize| {
        RawMask::from_fn(w, h, move |x, y| ((x + y) as usize + call * 7) as f32 % 11.0 / 10.0)
    };
    let config = Config {
        temporal_smoothing: true,
        edge_refinement: true,
        ..color_config(Color::rgb(0, 0, 255))
    };
    let frame = textured_frame(32, 24);

    let mut used = controller(FnMask::boxed(mask), config.clone());
    for _ in 0..4 {
        used.process(&frame).unwrap();
    }
    used.reset().unwrap();
    assert_eq!(used.stats().frame_count, 0);

    let mut fresh = controller(FnMask::boxed(mask), config);
    assert_eq!(
        used.process(&frame).unwrap().image,
        fresh.process(&frame).unwrap().image
    );
}

#[test]
fn invalidated_instance_produces_no_output() {
    let mut pipeline = controller(
        FnMask::boxed(|w, h, _| RawMask::filled(w, h, 1.0)),
        Config::default(),
    );
    let frame = textured_frame(8, 8);
    pipeline.process(&frame).unwrap();

    pipeline.invalidate();
    assert!(matches!(
        pipeline.process(&frame),
        Err(PipelineError::InstanceInvalidated)
    ));
    assert!(matches!(
        pipeline.apply_config(Config::default()),
        Err(PipelineError::InstanceInvalidated)
    ));
}

#[test]
fn compositor_identities() {
    let frame = RgbaImage::from_fn(5, 4, |x, y| Rgba([x as u8 * 40, y as u8 * 50, 7, 255]));
    let layer = RgbaImage::from_pixel(5, 4, Rgba([0, 255, 0, 255]));
    let background = Background::Layer(Cow::Borrowed(&layer));

    let opaque = composite(&frame, &AlphaMatte::filled(5, 4, 1.0), &background).unwrap();
    assert_eq!(opaque, frame);

    let clear = composite(&frame, &AlphaMatte::filled(5, 4, 0.0), &background).unwrap();
    assert_eq!(clear, layer);
}

#[test]
fn transparent_output_carries_the_alpha() {
    let source = FnMask::boxed(|w, h, _| RawMask::from_fn(w, h, |x, _| if x == 0 { 1.0 } else { 0.0 }));
    let config = Config {
        background_mode: BackgroundMode::Transparent,
        output_format: OutputFormat::Rgba8,
        ..color_config(Color::BLACK)
    };
    let mut pipeline = controller(source, config);

    let output = pipeline.process(&textured_frame(4, 2)).unwrap().image.to_rgba8();
    assert_eq!(output.get_pixel(0, 1).0[3], 255);
    assert_eq!(output.get_pixel(3, 1).0[3], 0);
}

#[test]
fn missing_background_image_falls_back_with_a_warning() {
    let config = Config {
        background_mode: BackgroundMode::Image,
        background_image: Some(BackgroundImage::File(PathBuf::from(
            "/nonexistent/backdrop.png",
        ))),
        ..color_config(Color::rgb(255, 0, 0))
    };
    let mut pipeline = controller(FnMask::boxed(|w, h, _| RawMask::filled(w, h, 0.0)), config);

    let output = pipeline.process(&textured_frame(6, 6)).unwrap();
    assert!(matches!(
        output.warnings.as_slice(),
        [FrameWarning::BackgroundAssetInvalid(_)]
    ));
    assert!(output.image.to_rgb8().pixels().all(|p| p.0 == [0, 0, 0]));
}

#[test]
fn controllers_run_independently_on_threads() {
    let handles: Vec<_> = [Color::rgb(255, 0, 0), Color::rgb(0, 0, 255)]
        .into_iter()
        .map(|color| {
            thread::spawn(move || {
                let mut pipeline = controller(
                    FnMask::boxed(|w, h, _| RawMask::filled(w, h, 0.0)),
                    Config {
                        temporal_smoothing: true,
                        ..color_config(color)
                    },
                );
                let frame = textured_frame(20, 10);
                let mut last = None;
                for _ in 0..5 {
                    last = Some(pipeline.process(&frame).unwrap());
                }
                (color, pipeline.stats().frame_count, last.unwrap())
            })
        })
        .collect();

    for handle in handles {
        let (color, frames, output) = handle.join().unwrap();
        assert_eq!(frames, 5);
        let expected = [color.r, color.g, color.b];
        assert!(output.image.to_rgb8().pixels().all(|p| p.0 == expected));
    }
}

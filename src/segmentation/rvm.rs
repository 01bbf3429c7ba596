use super::preprocess::{ModelInput, Preprocessor};
use super::types::{MaskSource, RawMask};
use crate::config::Quality;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::{Frame, PixelFormat};
use anyhow::{Context, Result};
use ndarray::{Array1, Array4, Ix4};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{DynValue, TensorRef};
use std::path::Path;

/// Recurrent hidden states carried between frames.
struct RecurrentState {
    r1: Array4<f32>,
    r2: Array4<f32>,
    r3: Array4<f32>,
    r4: Array4<f32>,
}

impl RecurrentState {
    /// RVM accepts 1x1x1x1 zero tensors as the initial state and
    /// broadcasts them to the right shape internally.
    fn zeros() -> Self {
        Self {
            r1: Array4::zeros((1, 1, 1, 1)),
            r2: Array4::zeros((1, 1, 1, 1)),
            r3: Array4::zeros((1, 1, 1, 1)),
            r4: Array4::zeros((1, 1, 1, 1)),
        }
    }
}

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames and cleared whenever
/// the quality level (and therefore the input geometry) changes.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    quality: Quality,
    state: Option<RecurrentState>,
}

impl RobustVideoMatting {
    /// Create a new RVM model from an ONNX file
    ///
    /// CUDA is registered when available; ONNX Runtime falls back to the
    /// CPU provider otherwise.
    pub fn new<P: AsRef<Path>>(model_path: P, quality: Quality) -> PipelineResult<Self> {
        let path = model_path.as_ref();
        tracing::info!("Loading RVM model from {}", path.display());

        let session = Self::load_session(path)
            .map_err(|err| PipelineError::model_init(format!("{err:#}")))?;

        tracing::info!("RVM model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(ModelInput::for_quality(quality)),
            quality,
            state: None,
        })
    }

    fn load_session(path: &Path) -> Result<Session> {
        let session = Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().build()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;
        Ok(session)
    }

    fn set_quality(&mut self, quality: Quality) {
        if quality == self.quality {
            return;
        }
        tracing::info!("RVM quality {:?} -> {:?}", self.quality, quality);
        self.quality = quality;
        self.preprocessor = Preprocessor::new(ModelInput::for_quality(quality));
        self.state = None;
    }

    fn infer(&mut self, frame: &Frame) -> Result<RawMask> {
        let rgb = frame.image().to_rgb8();
        let src = self.preprocessor.preprocess(&rgb);
        let ratio = Array1::from_elem(1, self.preprocessor.input().downsample_ratio);
        let state = self.state.take().unwrap_or_else(RecurrentState::zeros);

        let _infer_span = tracing::debug_span!("inference").entered();
        let (pha, next_state) = {
            let outputs = self
                .session
                .run(ort::inputs![
                    "src" => TensorRef::from_array_view(&src)?,
                    "r1i" => TensorRef::from_array_view(&state.r1)?,
                    "r2i" => TensorRef::from_array_view(&state.r2)?,
                    "r3i" => TensorRef::from_array_view(&state.r3)?,
                    "r4i" => TensorRef::from_array_view(&state.r4)?,
                    "downsample_ratio" => TensorRef::from_array_view(&ratio)?,
                ])
                .context("Failed to run inference")?;

            let pha = extract(&outputs["pha"], "pha")?;
            let next_state = RecurrentState {
                r1: extract(&outputs["r1o"], "r1o")?,
                r2: extract(&outputs["r2o"], "r2o")?,
                r3: extract(&outputs["r3o"], "r3o")?,
                r4: extract(&outputs["r4o"], "r4o")?,
            };
            (pha, next_state)
        };
        drop(_infer_span);
        self.state = Some(next_state);

        // pha shape: [1, 1, H, W]
        let (matte_height, matte_width) = (pha.shape()[2] as u32, pha.shape()[3] as u32);
        let values: Vec<f32> = pha.iter().copied().collect();
        let mask = RawMask::new(matte_width, matte_height, values)?;

        let (frame_width, frame_height) = frame.dimensions();
        Ok(mask.fit_to(frame_width, frame_height))
    }
}

fn extract(value: &DynValue, name: &str) -> Result<Array4<f32>> {
    let array = value
        .try_extract_array::<f32>()
        .with_context(|| format!("Output {name} is not an f32 tensor"))?
        .into_dimensionality::<Ix4>()
        .with_context(|| format!("Output {name} is not rank 4"))?
        .to_owned();
    Ok(array)
}

impl MaskSource for RobustVideoMatting {
    fn classify(&mut self, frame: &Frame, quality: Quality) -> PipelineResult<RawMask> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        match frame.pixel_format() {
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => {}
            other => {
                return Err(PipelineError::segmentation_unavailable(format!(
                    "unsupported pixel format {other:?}"
                )))
            }
        }

        self.set_quality(quality);
        self.infer(frame)
            .map_err(|err| PipelineError::segmentation_unavailable(format!("{err:#}")))
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.state = None;
    }
}

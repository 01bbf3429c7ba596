#[cfg(feature = "onnx")]
mod preprocess;
#[cfg(feature = "onnx")]
mod rvm;
pub mod types;

#[cfg(feature = "onnx")]
pub use preprocess::{ModelInput, Preprocessor};
#[cfg(feature = "onnx")]
pub use rvm::RobustVideoMatting;
pub use types::{AlphaMatte, MaskSource, RawMask};

/// Create the default mask source (RVM)
#[cfg(feature = "onnx")]
pub fn create_default_model(
    model_path: impl AsRef<std::path::Path>,
    quality: crate::config::Quality,
) -> crate::error::PipelineResult<Box<dyn MaskSource>> {
    let model = RobustVideoMatting::new(model_path, quality)?;
    Ok(Box::new(model))
}

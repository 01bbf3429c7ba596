//! Error types for the background replacement pipeline.

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while configuring or running the pipeline.
///
/// The variants fall into three groups:
/// - per-frame recoverable (`SegmentationUnavailable`, `BackgroundAssetInvalid`):
///   handled inside the controller, never returned from `process`
/// - configuration (`InvalidConfig`): rejected when a config is applied
/// - fatal (everything else): the caller should tear the instance down
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Segmentation unavailable: {0}")]
    SegmentationUnavailable(String),

    #[error("Background asset invalid: {0}")]
    BackgroundAssetInvalid(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{context}: dimensions must match, expected {}x{} but got {}x{}", .expected.0, .expected.1, .actual.0, .actual.1)]
    DimensionMismatch {
        context: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Pipeline instance has been invalidated")]
    InstanceInvalidated,

    #[error("Cannot {operation} while pipeline is {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: PipelineState,
    },

    #[error("Failed to initialize segmentation model: {0}")]
    ModelInit(String),
}

impl PipelineError {
    /// Create a segmentation failure error.
    pub fn segmentation_unavailable(message: impl Into<String>) -> Self {
        Self::SegmentationUnavailable(message.into())
    }

    /// Create a background asset error.
    pub fn background_asset_invalid(message: impl Into<String>) -> Self {
        Self::BackgroundAssetInvalid(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a model initialization error.
    pub fn model_init(message: impl Into<String>) -> Self {
        Self::ModelInit(message.into())
    }

    /// Fails with `DimensionMismatch` unless both sizes are identical.
    pub fn check_dimensions(
        context: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> PipelineResult<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                context,
                expected,
                actual,
            })
        }
    }

    /// Per-frame conditions the controller substitutes a fallback for.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SegmentationUnavailable(_) | Self::BackgroundAssetInvalid(_)
        )
    }

    /// Conditions after which the instance should be recreated.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DimensionMismatch { .. }
                | Self::InstanceInvalidated
                | Self::InvalidTransition { .. }
                | Self::ModelInit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_dimensions_accepts_equal_sizes() {
        PipelineError::check_dimensions("test", (4, 3), (4, 3)).unwrap();
    }

    #[test]
    fn check_dimensions_reports_both_sizes() {
        let err = PipelineError::check_dimensions("Compositor", (640, 480), (320, 240)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Compositor: dimensions must match, expected 640x480 but got 320x240"
        );
    }

    #[test]
    fn classification_is_disjoint() {
        let errors = [
            PipelineError::segmentation_unavailable("no model"),
            PipelineError::background_asset_invalid("bad png"),
            PipelineError::invalid_config("threshold"),
            PipelineError::InstanceInvalidated,
            PipelineError::model_init("missing file"),
        ];
        for err in &errors {
            assert!(!(err.is_fatal() && err.is_recoverable()), "{err}");
        }
        assert!(errors[0].is_recoverable());
        assert!(errors[1].is_recoverable());
        assert!(!errors[2].is_recoverable() && !errors[2].is_fatal());
        assert!(errors[3].is_fatal());
    }
}

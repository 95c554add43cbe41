use super::SinkError;
use crate::compose::CompositeError;
use crate::correction::CorrectionError;
use crate::difference::{DifferenceError, GridError};
use crate::frame::{FrameError, SourceError};
use crate::upscale::DispatchError;
use thiserror::Error;

/// Errors that stop the pipeline.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Difference(#[from] DifferenceError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Correction(#[from] CorrectionError),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("frame {actual} arrived out of order, expected {expected}")]
    OutOfOrder { expected: u64, actual: u64 },
    #[error("frame {index} arrived without the previous frame state")]
    MissingState { index: u64 },
    #[error("pipeline halted at frame {index}")]
    Halted { index: u64 },
    #[error("pipeline already finished")]
    Finished,
    #[error("frame {index} failed: {source}")]
    FrameFailed {
        index: u64,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Index of the frame that failed, for run-level errors.
    pub fn frame_index(&self) -> Option<u64> {
        match self {
            PipelineError::FrameFailed { index, .. } | PipelineError::Halted { index } => {
                Some(*index)
            }
            _ => None,
        }
    }
}

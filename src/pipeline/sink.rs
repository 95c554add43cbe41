//! Downstream consumers of reconstructed frames.

use super::{PipelineStats, StepReport};
use crate::frame::Frame;
use crate::workspace::WorkspaceError;
use thiserror::Error;

/// Errors a sink can report for an emitted frame.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error("frame {index} rejected: {reason}")]
    Rejected { index: u64, reason: String },
}

/// Receives reconstructed frames in strictly increasing index order.
///
/// A frame is emitted only once every one of its regions came back and
/// was composited; nothing partial ever reaches a sink.
pub trait FrameSink {
    /// Accepts one reconstructed frame and the report describing it.
    fn emit(&mut self, report: &StepReport, frame: &Frame) -> Result<(), SinkError>;

    /// Called after every emitted frame with the driver's running totals,
    /// dispatcher counters included.
    fn progress(&mut self, _stats: &PipelineStats) {}

    /// Called once after the last frame.
    fn finish(&mut self, _stats: &PipelineStats) -> Result<(), SinkError> {
        Ok(())
    }

    /// Called once when the run halts on a failed frame; `finish` is not
    /// called afterwards.
    fn abort(&mut self, _stats: &PipelineStats) {}
}

/// Keeps everything it is given. Used by tests and small in-memory runs.
#[derive(Debug, Default)]
pub struct CollectingSink {
    /// Emitted reports, in order.
    pub reports: Vec<StepReport>,
    /// Emitted frames, in order.
    pub frames: Vec<Frame>,
    /// Totals passed with the most recent `progress` call.
    pub latest: Option<PipelineStats>,
    /// Stats passed to `finish`, if it was called.
    pub finished: Option<PipelineStats>,
    /// Stats passed to `abort`, if the run halted.
    pub aborted: Option<PipelineStats>,
}

impl CollectingSink {
    /// An empty sink.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for CollectingSink {
    fn emit(&mut self, report: &StepReport, frame: &Frame) -> Result<(), SinkError> {
        self.reports.push(report.clone());
        self.frames.push(frame.clone());
        Ok(())
    }

    fn progress(&mut self, stats: &PipelineStats) {
        self.latest = Some(stats.clone());
    }

    fn finish(&mut self, stats: &PipelineStats) -> Result<(), SinkError> {
        self.finished = Some(stats.clone());
        Ok(())
    }

    fn abort(&mut self, stats: &PipelineStats) {
        self.aborted = Some(stats.clone());
    }
}

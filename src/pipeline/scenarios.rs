//! End-to-end scenarios for the driver.

use super::*;
use crate::config::{CorrectionConfig, PipelineConfig};
use crate::difference::{Block, DifferenceError, GridError};
use crate::frame::{Frame, FrameSource, Rect, SyntheticSource, VecSource};
use crate::upscale::{
    DispatchError, Dispatcher, NearestUpscaler, Purpose, UpscaleError, UpscaleRequest, Upscaler,
};
use std::sync::Arc;

fn config() -> PipelineConfig {
    PipelineConfig {
        block_size: 8,
        bleed: 2,
        scale_factor: 2,
        correction_block_size: 2,
        max_dispatch_retries: 1,
        ..Default::default()
    }
}

fn driver_with(config: &PipelineConfig, upscaler: Arc<dyn Upscaler>) -> PipelineDriver {
    let dispatcher = Dispatcher::new(
        upscaler,
        config.max_dispatch_retries,
        config.max_concurrent_dispatches,
    );
    let correction = CorrectionConfig {
        sweep_blocks: 4,
        ..Default::default()
    };
    PipelineDriver::new(config, &correction, dispatcher)
}

fn driver(config: &PipelineConfig) -> PipelineDriver {
    driver_with(config, Arc::new(NearestUpscaler::new(config.scale_factor)))
}

fn gradient(width: u32, height: u32, index: u64) -> Frame {
    let pixels = (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x * 13 + y * 7) % 200) as u8 + 20))
        .collect();
    Frame::new(pixels, width, height, 1, index)
}

fn with_block(frame: &Frame, value: u8, index: u64) -> Frame {
    let mut changed = frame.clone();
    changed.set_index(index);
    changed
        .paste(&Frame::filled(8, 8, frame.channels(), value, index), 0, 0)
        .unwrap();
    changed
}

#[test]
fn identical_frames_issue_no_work() {
    let config = config();
    let mut driver = driver(&config);

    let first = driver.step(None, gradient(16, 16, 0)).unwrap();
    assert_eq!(first.report.kind, FrameKind::Keyframe);
    let calls = driver.dispatcher().stats().calls;

    let second = driver.step(Some(first.state), gradient(16, 16, 1)).unwrap();

    assert!(second.report.difference.as_ref().unwrap().is_empty());
    assert!(second.report.regions.is_empty());
    assert_eq!(second.report.kind, FrameKind::PFrame);
    assert_eq!(driver.dispatcher().stats().calls, calls);
}

#[test]
fn single_block_change_dispatches_one_padded_region() {
    let config = config();
    let mut driver = driver(&config);
    let frame0 = gradient(16, 16, 0);
    let frame1 = with_block(&frame0, 255, 1);

    let first = driver.step(None, frame0).unwrap();
    let calls = driver.dispatcher().stats().calls;
    let second = driver.step(Some(first.state), frame1.clone()).unwrap();

    let map = second.report.difference.as_ref().unwrap();
    assert_eq!(map.changed().iter().copied().collect::<Vec<_>>(), vec![Block::new(0, 0, 8)]);
    assert_eq!(second.report.regions, vec![Rect::new(0, 0, 10, 10)]);
    assert_eq!(driver.dispatcher().stats().calls, calls + 1);

    let expected = NearestUpscaler::new(2).upscale_frame(&frame1);
    assert_eq!(second.state.reconstructed.pixels(), expected.pixels());
    assert_eq!(second.state.reconstructed.index(), 1);
}

/// Honest upscaler except for one verification request, whose output is
/// inverted to simulate drift.
struct DriftAt {
    inner: NearestUpscaler,
    frame: u64,
    region: Rect,
}

impl Upscaler for DriftAt {
    fn scale_factor(&self) -> u32 {
        self.inner.scale_factor()
    }

    fn upscale(&self, request: &UpscaleRequest<'_>) -> Result<Frame, UpscaleError> {
        let mut image = self.inner.upscale(request)?;
        if request.purpose == Purpose::Verification
            && request.frame_index == self.frame
            && request.region == self.region
        {
            image.pixels_mut().iter_mut().for_each(|p| *p = 255 - *p);
        }
        Ok(image)
    }
}

#[test]
fn drift_forces_block_into_next_frame() {
    let config = config();
    let upscaler = DriftAt {
        inner: NearestUpscaler::new(2),
        frame: 4,
        region: Rect::new(0, 0, 8, 8),
    };
    let mut driver = driver_with(&config, Arc::new(upscaler));
    let frames = (0..10).map(|i| gradient(16, 16, i)).collect();
    let mut sink = CollectingSink::new();

    let stats = driver.run(&mut VecSource::new(frames), &mut sink).unwrap();

    let kinds: Vec<FrameKind> = sink.reports.iter().map(|r| r.kind).collect();
    assert_eq!(kinds[0], FrameKind::Keyframe);
    assert_eq!(kinds[2], FrameKind::CorrectionFrame);
    assert_eq!(kinds[3], FrameKind::PFrame);
    assert_eq!(kinds[4], FrameKind::CorrectionFrame);

    let outcome = sink.reports[4].correction.as_ref().unwrap();
    assert!(outcome.dirty.contains(&Block::new(0, 0, 8)));
    assert_eq!(outcome.diverged(), 1);

    let next = sink.reports[5].difference.as_ref().unwrap();
    assert!(next.changed().is_empty());
    assert!(next.forced().contains(&Block::new(0, 0, 8)));
    assert_eq!(sink.reports[5].forced, 1);
    assert_eq!(sink.reports[5].regions, vec![Rect::new(0, 0, 10, 10)]);

    // The forced block was consumed; nothing carries over to frame 6.
    assert!(sink.reports[6].difference.as_ref().unwrap().forced().is_empty());
    assert_eq!(stats.dirty_blocks, 1);
    assert_eq!(stats.frames, 10);
}

#[test]
fn global_change_is_one_full_frame_dispatch() {
    let config = config();
    let mut driver = driver(&config);
    let frame0 = Frame::filled(160, 8, 1, 50, 0);
    let mut frame1 = Frame::filled(160, 8, 1, 50, 1);
    frame1
        .paste(&Frame::filled(152, 8, 1, 80, 1), 0, 0)
        .unwrap();

    let first = driver.step(None, frame0).unwrap();
    let calls = driver.dispatcher().stats().calls;
    let second = driver.step(Some(first.state), frame1.clone()).unwrap();

    assert_eq!(second.report.kind, FrameKind::FadeFrame);
    assert!(second.report.fade.as_ref().unwrap().is_fade());
    assert_eq!(second.report.regions, vec![Rect::new(0, 0, 160, 8)]);
    assert_eq!(driver.dispatcher().stats().calls, calls + 1);

    let expected = NearestUpscaler::new(2).upscale_frame(&frame1);
    assert_eq!(second.state.reconstructed.pixels(), expected.pixels());
}

#[test]
fn synthetic_clip_matches_full_upscale() {
    let config = config();
    let mut driver = driver(&config);
    let mut source = SyntheticSource::new(32, 32, 8, 8).unwrap();
    let mut sink = CollectingSink::new();

    let stats = driver.run(&mut source, &mut sink).unwrap();

    let mut reference = SyntheticSource::new(32, 32, 8, 8).unwrap();
    let upscaler = NearestUpscaler::new(2);
    for frame in &sink.frames {
        let raw = reference.next_frame(None).unwrap().unwrap();
        assert_eq!(frame.index(), raw.index());
        assert_eq!(frame.pixels(), upscaler.upscale_frame(&raw).pixels());
    }
    assert_eq!(stats.frames, 8);
    assert_eq!(stats.dirty_blocks, 0);
    assert_eq!(driver.state(), DriverState::Done);
    assert_eq!(sink.finished.as_ref().map(|s| s.frames), Some(8));
}

struct FailingAt(u64);

impl Upscaler for FailingAt {
    fn scale_factor(&self) -> u32 {
        2
    }

    fn upscale(&self, request: &UpscaleRequest<'_>) -> Result<Frame, UpscaleError> {
        if request.frame_index == self.0 {
            return Err(UpscaleError::Unavailable("tool crashed".into()));
        }
        NearestUpscaler::new(2).upscale(request)
    }
}

#[test]
fn dispatch_failure_halts_emission() {
    let config = config();
    let mut driver = driver_with(&config, Arc::new(FailingAt(2)));
    let base = gradient(16, 16, 0);
    let frames = (0..5u64)
        .map(|i| with_block(&base, 40 * i as u8, i))
        .collect();
    let mut sink = CollectingSink::new();

    let error = driver.run(&mut VecSource::new(frames), &mut sink).unwrap_err();

    assert_eq!(error.frame_index(), Some(2));
    match error {
        PipelineError::FrameFailed { index, source } => {
            assert_eq!(index, 2);
            assert!(matches!(
                *source,
                PipelineError::Dispatch(DispatchError::Exhausted { attempts: 2, .. })
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sink.frames.len(), 2);
    assert!(sink.finished.is_none());
    assert_eq!(driver.state(), DriverState::Failed { index: 2 });
    assert_eq!(driver.stats().failed_frame, Some(2));
    assert_eq!(sink.aborted.as_ref().and_then(|s| s.failed_frame), Some(2));
    assert!(matches!(
        driver.step(None, gradient(16, 16, 3)),
        Err(PipelineError::Halted { index: 2 })
    ));
}

#[test]
fn misaligned_stream_is_refused() {
    let config = config();
    let mut driver = driver(&config);
    let mut sink = CollectingSink::new();

    let error = driver
        .run(&mut VecSource::new(vec![gradient(20, 16, 0)]), &mut sink)
        .unwrap_err();

    match error {
        PipelineError::FrameFailed { index: 0, source } => match *source {
            PipelineError::Grid(GridError::Misaligned {
                aligned_width,
                aligned_height,
                ..
            }) => assert_eq!((aligned_width, aligned_height), (16, 16)),
            other => panic!("unexpected error: {other}"),
        },
        other => panic!("unexpected error: {other}"),
    }
    assert!(sink.frames.is_empty());
}

#[test]
fn resolution_change_mid_stream_is_fatal() {
    let config = config();
    let mut driver = driver(&config);
    let frames = vec![gradient(16, 16, 0), gradient(24, 16, 1)];
    let mut sink = CollectingSink::new();

    let error = driver.run(&mut VecSource::new(frames), &mut sink).unwrap_err();

    match error {
        PipelineError::FrameFailed { index: 1, source } => assert!(matches!(
            *source,
            PipelineError::Difference(DifferenceError::ResolutionMismatch { .. })
        )),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sink.frames.len(), 1);
}

#[test]
fn out_of_order_frame_is_rejected() {
    let config = config();
    let mut driver = driver(&config);
    let first = driver.step(None, gradient(16, 16, 0)).unwrap();

    let result = driver.step(Some(first.state), gradient(16, 16, 2));
    assert!(matches!(
        result,
        Err(PipelineError::OutOfOrder {
            expected: 1,
            actual: 2
        })
    ));
}

struct RejectAt(u64);

impl FrameSink for RejectAt {
    fn emit(&mut self, report: &StepReport, _frame: &Frame) -> Result<(), SinkError> {
        if report.index == self.0 {
            return Err(SinkError::Rejected {
                index: report.index,
                reason: "disk full".into(),
            });
        }
        Ok(())
    }
}

#[test]
fn sink_failure_stops_the_run() {
    let config = config();
    let mut driver = driver(&config);
    let frames = (0..4).map(|i| gradient(16, 16, i)).collect();

    let error = driver
        .run(&mut VecSource::new(frames), &mut RejectAt(1))
        .unwrap_err();

    assert_eq!(error.frame_index(), Some(1));
    assert_eq!(driver.stats().failed_frame, Some(1));
}

#[test]
fn cancellation_before_start_fails_first_frame() {
    let config = config();
    let mut driver = driver(&config);
    driver.dispatcher().cancel_flag().cancel();
    let mut sink = CollectingSink::new();

    let error = driver
        .run(&mut VecSource::new(vec![gradient(16, 16, 0)]), &mut sink)
        .unwrap_err();

    match error {
        PipelineError::FrameFailed { index: 0, source } => assert!(matches!(
            *source,
            PipelineError::Dispatch(DispatchError::Cancelled { frame_index: 0 })
        )),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn buffers_are_recycled() {
    let config = config();
    let mut driver = driver(&config);
    let mut source = SyntheticSource::new(16, 16, 8, 5).unwrap();
    let mut sink = CollectingSink::new();

    driver.run(&mut source, &mut sink).unwrap();

    assert_eq!(sink.frames.len(), 5);
    assert!(driver.pool().reused() >= 3);
}

#[test]
fn sink_receives_dispatch_totals_up_to_the_failure() {
    let config = config();
    let mut driver = driver_with(&config, Arc::new(FailingAt(2)));
    let base = gradient(16, 16, 0);
    let frames = (0..4u64)
        .map(|i| with_block(&base, 40 * i as u8, i))
        .collect();
    let mut sink = CollectingSink::new();

    driver.run(&mut VecSource::new(frames), &mut sink).unwrap_err();

    let latest = sink.latest.as_ref().unwrap();
    assert_eq!(latest.frames, 2);
    assert_eq!(latest.upscale_calls, 2);
    assert_eq!(latest.dispatch_retries, 0);

    let aborted = sink.aborted.as_ref().unwrap();
    assert_eq!(aborted.failed_frame, Some(2));
    assert_eq!(aborted.upscale_calls, 4);
    assert_eq!(aborted.dispatch_retries, 1);
    assert!(sink.finished.is_none());

    let registry = crate::metrics::MetricsRegistry::new().unwrap();
    registry.update(&crate::metrics::MetricsSnapshot::from_stats(aborted));
    let output = registry.encode().unwrap();
    assert!(output.contains("patchscale_failed 1"));
    assert!(output.contains("patchscale_upscale_calls_total 4"));
}

#[test]
fn progress_totals_match_the_finished_run() {
    let config = config();
    let mut driver = driver(&config);
    let mut source = SyntheticSource::new(16, 16, 8, 4).unwrap();
    let mut sink = CollectingSink::new();

    let stats = driver.run(&mut source, &mut sink).unwrap();

    let latest = sink.latest.as_ref().unwrap();
    assert_eq!(latest.frames, 4);
    assert_eq!(latest.upscale_calls, stats.upscale_calls);
    assert!(stats.upscale_calls > 0);
    assert!(sink.aborted.is_none());
}

#[test]
fn fade_on_correction_frame_discards_pending_blocks() {
    let config = PipelineConfig {
        correction_block_size: 1,
        ..config()
    };
    let upscaler = DriftAt {
        inner: NearestUpscaler::new(2),
        frame: 3,
        region: Rect::new(0, 0, 8, 8),
    };
    let mut driver = driver_with(&config, Arc::new(upscaler));

    let mut state = None;
    let mut kinds = Vec::new();
    for i in 0..4 {
        let step = driver.step(state.take(), Frame::filled(16, 16, 1, 50, i)).unwrap();
        kinds.push(step.report.kind);
        state = Some(step.state);
    }
    assert!(driver.correction().pending().contains(&Block::new(0, 0, 8)));

    let fade = driver.step(state, Frame::filled(16, 16, 1, 80, 4)).unwrap();
    kinds.push(fade.report.kind);

    assert_eq!(
        kinds,
        vec![
            FrameKind::Keyframe,
            FrameKind::CorrectionFrame,
            FrameKind::CorrectionFrame,
            FrameKind::CorrectionFrame,
            FrameKind::FadeFrame,
        ]
    );
    assert!(fade.report.correction.is_none());
    assert_eq!(fade.report.forced, 0);
    assert!(driver.correction().pending().is_empty());

    let expected = NearestUpscaler::new(2).upscale_frame(&Frame::filled(16, 16, 1, 80, 4));
    assert_eq!(fade.state.reconstructed.pixels(), expected.pixels());

    let next = driver.step(Some(fade.state), Frame::filled(16, 16, 1, 80, 5)).unwrap();
    assert!(next.report.difference.as_ref().unwrap().forced().is_empty());
}

/// Serves patches but refuses every verification request.
struct VerificationDown(NearestUpscaler);

impl Upscaler for VerificationDown {
    fn scale_factor(&self) -> u32 {
        self.0.scale_factor()
    }

    fn upscale(&self, request: &UpscaleRequest<'_>) -> Result<Frame, UpscaleError> {
        if request.purpose == Purpose::Verification {
            return Err(UpscaleError::Unavailable("verifier offline".into()));
        }
        self.0.upscale(request)
    }
}

#[test]
fn failed_verification_skips_the_pass_and_keeps_streaming() {
    let config = config();
    let mut driver = driver_with(&config, Arc::new(VerificationDown(NearestUpscaler::new(2))));
    let base = gradient(16, 16, 0);
    let frames = (0..3u64)
        .map(|i| with_block(&base, 30 * i as u8, i))
        .collect();
    let mut sink = CollectingSink::new();

    let stats = driver.run(&mut VecSource::new(frames), &mut sink).unwrap();

    let kinds: Vec<FrameKind> = sink.reports.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![FrameKind::Keyframe, FrameKind::PFrame, FrameKind::PFrame]);

    let outcome = sink.reports[2].correction.as_ref().unwrap();
    assert!(outcome.skipped);
    assert!(outcome.dirty.is_empty());
    assert_eq!(stats.corrections_run, 0);
    assert_eq!(stats.correction_frames, 0);
    assert_eq!(driver.correction().passes(), 0);
    assert!(driver.correction().pending().is_empty());
    assert!(stats.dispatch_retries > 0);

    let expected = NearestUpscaler::new(2).upscale_frame(&with_block(&base, 60, 2));
    assert_eq!(sink.frames[2].pixels(), expected.pixels());
}

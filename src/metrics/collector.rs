//! Metrics collection and registry.

use crate::pipeline::{FrameKind, PipelineStats};
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

const KINDS: [FrameKind; 4] = [
    FrameKind::Keyframe,
    FrameKind::PFrame,
    FrameKind::CorrectionFrame,
    FrameKind::FadeFrame,
];

/// A snapshot of run state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Frames emitted per kind, in [`FrameKind`] declaration order.
    pub frames_by_kind: [u64; 4],
    /// Regions sent to the upscaler.
    pub regions_dispatched: u64,
    /// Raw pixels covered by those regions.
    pub pixels_dispatched: u64,
    /// Upscaler invocations, retries included.
    pub upscale_calls: u64,
    /// Invocations that were retries.
    pub dispatch_retries: u64,
    /// Correction passes that ran to completion.
    pub corrections_run: u64,
    /// Blocks found diverged.
    pub dirty_blocks: u64,
    /// Blocks forced into a difference map.
    pub forced_blocks: u64,
    /// Changed-block ratio of the last frame.
    pub changed_ratio: f64,
    /// Index of the last emitted frame, if any.
    pub last_frame_index: Option<u64>,
    /// Whether the run halted on a failed frame.
    pub failed: bool,
}

impl MetricsSnapshot {
    /// Creates a snapshot from pipeline totals.
    pub fn from_stats(stats: &PipelineStats) -> Self {
        Self {
            frames_by_kind: KINDS.map(|kind| stats.count(kind)),
            regions_dispatched: stats.regions_dispatched,
            pixels_dispatched: stats.pixels_dispatched,
            upscale_calls: stats.upscale_calls,
            dispatch_retries: stats.dispatch_retries,
            corrections_run: stats.corrections_run,
            dirty_blocks: stats.dirty_blocks,
            forced_blocks: stats.forced_blocks,
            changed_ratio: stats.last_changed_ratio,
            last_frame_index: stats.last_frame_index,
            failed: stats.failed_frame.is_some(),
        }
    }
}

/// Prometheus metrics registry for pipeline monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    // Frames
    frames_total: IntCounterVec,
    last_frame_index: IntGauge,
    failed: IntGauge,

    // Dispatch
    regions_dispatched: IntCounter,
    pixels_dispatched: IntCounter,
    upscale_calls: IntCounter,
    dispatch_retries: IntCounter,

    // Differencing and correction
    changed_ratio: Gauge,
    corrections: IntCounter,
    dirty_blocks: IntCounter,
    forced_blocks: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new registry with every pipeline metric registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_total = IntCounterVec::new(
            Opts::new("patchscale_frames_total", "Frames emitted, by frame kind"),
            &["kind"],
        )?;
        let last_frame_index = IntGauge::new(
            "patchscale_last_frame_index",
            "Index of the last emitted frame",
        )?;
        let failed = IntGauge::new(
            "patchscale_failed",
            "Whether the run halted on a failed frame (1=failed)",
        )?;

        let regions_dispatched = IntCounter::new(
            "patchscale_regions_dispatched_total",
            "Patch regions sent to the upscaler",
        )?;
        let pixels_dispatched = IntCounter::new(
            "patchscale_pixels_dispatched_total",
            "Raw pixels covered by dispatched regions",
        )?;
        let upscale_calls = IntCounter::new(
            "patchscale_upscale_calls_total",
            "Upscaler invocations including retries",
        )?;
        let dispatch_retries = IntCounter::new(
            "patchscale_dispatch_retries_total",
            "Upscaler invocations that were retries",
        )?;

        let changed_ratio = Gauge::new(
            "patchscale_changed_ratio",
            "Changed-block fraction of the last transition",
        )?;
        let corrections = IntCounter::new(
            "patchscale_corrections_total",
            "Correction passes run",
        )?;
        let dirty_blocks = IntCounter::new(
            "patchscale_dirty_blocks_total",
            "Blocks found drifted by correction",
        )?;
        let forced_blocks = IntCounter::new(
            "patchscale_forced_blocks_total",
            "Blocks forced into a difference map by correction",
        )?;

        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(last_frame_index.clone()))?;
        registry.register(Box::new(failed.clone()))?;
        registry.register(Box::new(regions_dispatched.clone()))?;
        registry.register(Box::new(pixels_dispatched.clone()))?;
        registry.register(Box::new(upscale_calls.clone()))?;
        registry.register(Box::new(dispatch_retries.clone()))?;
        registry.register(Box::new(changed_ratio.clone()))?;
        registry.register(Box::new(corrections.clone()))?;
        registry.register(Box::new(dirty_blocks.clone()))?;
        registry.register(Box::new(forced_blocks.clone()))?;

        for kind in KINDS {
            frames_total.with_label_values(&[kind.as_str()]);
        }

        Ok(Self {
            registry,
            frames_total,
            last_frame_index,
            failed,
            regions_dispatched,
            pixels_dispatched,
            upscale_calls,
            dispatch_retries,
            changed_ratio,
            corrections,
            dirty_blocks,
            forced_blocks,
        })
    }

    /// Updates all metrics from a snapshot.
    ///
    /// Counters only move forward: each is raised to the snapshot's total.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        for (kind, &total) in KINDS.iter().zip(&snapshot.frames_by_kind) {
            advance(&self.frames_total.with_label_values(&[kind.as_str()]), total);
        }
        if let Some(index) = snapshot.last_frame_index {
            self.last_frame_index.set(index as i64);
        }
        self.failed.set(i64::from(snapshot.failed));

        advance(&self.regions_dispatched, snapshot.regions_dispatched);
        advance(&self.pixels_dispatched, snapshot.pixels_dispatched);
        advance(&self.upscale_calls, snapshot.upscale_calls);
        advance(&self.dispatch_retries, snapshot.dispatch_retries);

        self.changed_ratio.set(snapshot.changed_ratio);
        advance(&self.corrections, snapshot.corrections_run);
        advance(&self.dirty_blocks, snapshot.dirty_blocks);
        advance(&self.forced_blocks, snapshot.forced_blocks);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

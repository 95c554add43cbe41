//! Parallel, retrying dispatch of regions to an [`Upscaler`].

use super::{Purpose, UpscaleError, UpscaleRequest, Upscaler};
use crate::frame::{Frame, Rect};
use crate::regions::ExtractedRegion;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors that end a dispatch.
#[allow(missing_docs)]
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("frame {frame_index}: region {region} failed after {attempts} attempts: {source}")]
    Exhausted {
        frame_index: u64,
        region: Rect,
        purpose: Purpose,
        attempts: u32,
        #[source]
        source: UpscaleError,
    },
    #[error("frame {frame_index}: dispatch cancelled")]
    Cancelled { frame_index: u64 },
}

/// Shared cooperative cancellation switch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not yet raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of outstanding and future dispatches.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// An upscaled region at target resolution.
#[derive(Debug, Clone)]
pub struct UpscaledRegion {
    /// Location in raw-frame coordinates.
    pub region: Rect,
    /// Pixels at `region` size times the scale factor.
    pub image: Frame,
}

/// Counters since the dispatcher was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Upscaler invocations, retries included.
    pub calls: u64,
    /// Invocations that were retries.
    pub retries: u64,
    /// Regions that exhausted their retries.
    pub failures: u64,
    /// Raw pixels successfully upscaled.
    pub pixels: u64,
}

#[derive(Debug, Default)]
struct Counters {
    calls: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    pixels: AtomicU64,
}

/// Sends regions to the upscaler, at most `max_concurrent` at a time.
///
/// Regions of one frame are independent, so they run in parallel; results
/// come back in input order. A region is retried up to `max_retries`
/// times; if it still fails, the whole dispatch fails and no partial result
/// is returned.
pub struct Dispatcher {
    upscaler: Arc<dyn Upscaler>,
    max_retries: u32,
    max_concurrent: usize,
    cancel: CancelFlag,
    counters: Counters,
}

impl Dispatcher {
    /// Dispatcher over `upscaler`, retrying each region up to `max_retries`
    /// times and running at most `max_concurrent` requests at once.
    pub fn new(upscaler: Arc<dyn Upscaler>, max_retries: u32, max_concurrent: usize) -> Self {
        Self {
            upscaler,
            max_retries,
            max_concurrent: max_concurrent.max(1),
            cancel: CancelFlag::new(),
            counters: Counters::default(),
        }
    }

    /// Shares an externally owned cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// The upscaler's magnification.
    pub fn scale_factor(&self) -> u32 {
        self.upscaler.scale_factor()
    }

    /// A handle to this dispatcher's cancellation flag.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            calls: self.counters.calls.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            pixels: self.counters.pixels.load(Ordering::Relaxed),
        }
    }

    /// Upscales every extracted region of one frame.
    pub fn dispatch(
        &self,
        frame_index: u64,
        pieces: &[ExtractedRegion],
        purpose: Purpose,
    ) -> Result<Vec<UpscaledRegion>, DispatchError> {
        let mut results = Vec::with_capacity(pieces.len());
        for chunk in pieces.chunks(self.max_concurrent) {
            if self.cancel.is_cancelled() {
                return Err(DispatchError::Cancelled { frame_index });
            }
            let upscaled: Result<Vec<_>, _> = chunk
                .par_iter()
                .map(|piece| self.upscale_one(frame_index, piece, purpose))
                .collect();
            results.extend(upscaled?);
        }

        tracing::debug!(
            frame = frame_index,
            regions = results.len(),
            ?purpose,
            "Dispatch complete"
        );
        Ok(results)
    }

    fn upscale_one(
        &self,
        frame_index: u64,
        piece: &ExtractedRegion,
        purpose: Purpose,
    ) -> Result<UpscaledRegion, DispatchError> {
        let s = self.upscaler.scale_factor();
        let expected = (piece.image.width() * s, piece.image.height() * s, piece.image.channels());
        let request = UpscaleRequest {
            frame_index,
            region: piece.region,
            purpose,
            image: &piece.image,
        };

        let mut attempts = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(DispatchError::Cancelled { frame_index });
            }
            attempts += 1;
            self.counters.calls.fetch_add(1, Ordering::Relaxed);

            let outcome = self.upscaler.upscale(&request).and_then(|image| {
                let actual = (image.width(), image.height(), image.channels());
                if actual != expected {
                    return Err(UpscaleError::UnexpectedShape { expected, actual });
                }
                if !image.is_valid() {
                    return Err(UpscaleError::CorruptOutput(format!(
                        "{} bytes for {}x{}",
                        image.pixels().len(),
                        image.width(),
                        image.height()
                    )));
                }
                Ok(image)
            });

            match outcome {
                Ok(mut image) => {
                    image.set_index(frame_index);
                    self.counters
                        .pixels
                        .fetch_add(piece.region.area(), Ordering::Relaxed);
                    tracing::trace!(frame = frame_index, region = %piece.region, attempts, "Region upscaled");
                    return Ok(UpscaledRegion {
                        region: piece.region,
                        image,
                    });
                }
                Err(error) if attempts <= self.max_retries => {
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        frame = frame_index,
                        region = %piece.region,
                        attempt = attempts,
                        error = %error,
                        "Upscale failed, retrying"
                    );
                }
                Err(source) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(DispatchError::Exhausted {
                        frame_index,
                        region: piece.region,
                        purpose,
                        attempts,
                        source,
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("scale_factor", &self.upscaler.scale_factor())
            .field("max_retries", &self.max_retries)
            .field("max_concurrent", &self.max_concurrent)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upscale::NearestUpscaler;
    use std::sync::atomic::AtomicU32;

    /// Fails the first `failures` calls, then behaves like nearest.
    struct Flaky {
        inner: NearestUpscaler,
        failures: u32,
        seen: AtomicU32,
    }

    impl Upscaler for Flaky {
        fn scale_factor(&self) -> u32 {
            self.inner.scale_factor()
        }

        fn upscale(&self, request: &UpscaleRequest<'_>) -> Result<Frame, UpscaleError> {
            if self.seen.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(UpscaleError::Unavailable("warming up".into()));
            }
            self.inner.upscale(request)
        }
    }

    /// Claims factor 2 but returns the input untouched.
    struct Shrinking;

    impl Upscaler for Shrinking {
        fn scale_factor(&self) -> u32 {
            2
        }

        fn upscale(&self, request: &UpscaleRequest<'_>) -> Result<Frame, UpscaleError> {
            Ok(request.image.clone())
        }
    }

    fn pieces(n: u32) -> Vec<ExtractedRegion> {
        (0..n)
            .map(|i| ExtractedRegion {
                region: Rect::new(i * 4, 0, 4, 4),
                image: Frame::filled(4, 4, 1, i as u8, 7),
            })
            .collect()
    }

    fn flaky(failures: u32) -> Arc<dyn Upscaler> {
        Arc::new(Flaky {
            inner: NearestUpscaler::new(2),
            failures,
            seen: AtomicU32::new(0),
        })
    }

    #[test]
    fn test_results_keep_input_order() {
        let dispatcher = Dispatcher::new(Arc::new(NearestUpscaler::new(2)), 0, 3);
        let out = dispatcher.dispatch(7, &pieces(8), Purpose::Patch).unwrap();

        assert_eq!(out.len(), 8);
        for (i, region) in out.iter().enumerate() {
            assert_eq!(region.region.x, i as u32 * 4);
            assert_eq!(region.image.dimensions(), (8, 8));
            assert_eq!(region.image.pixels()[0], i as u8);
        }
        assert_eq!(dispatcher.stats().calls, 8);
        assert_eq!(dispatcher.stats().pixels, 8 * 16);
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let dispatcher = Dispatcher::new(flaky(1), 2, 1);
        let out = dispatcher.dispatch(0, &pieces(1), Purpose::Patch).unwrap();

        assert_eq!(out.len(), 1);
        let stats = dispatcher.stats();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.failures, 0);
    }

    #[test]
    fn test_exhausted_retries_fail_the_dispatch() {
        let dispatcher = Dispatcher::new(flaky(10), 2, 1);
        let err = dispatcher.dispatch(3, &pieces(1), Purpose::Patch).unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Exhausted {
                frame_index: 3,
                attempts: 3,
                source: UpscaleError::Unavailable(_),
                ..
            }
        ));
        assert_eq!(dispatcher.stats().failures, 1);
    }

    #[test]
    fn test_wrong_output_shape_is_rejected() {
        let dispatcher = Dispatcher::new(Arc::new(Shrinking), 0, 1);
        let err = dispatcher.dispatch(0, &pieces(1), Purpose::Patch).unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Exhausted {
                source: UpscaleError::UnexpectedShape { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_cancelled_dispatch_issues_no_calls() {
        let dispatcher = Dispatcher::new(Arc::new(NearestUpscaler::new(2)), 0, 2);
        dispatcher.cancel_flag().cancel();

        assert!(matches!(
            dispatcher.dispatch(9, &pieces(4), Purpose::Patch),
            Err(DispatchError::Cancelled { frame_index: 9 })
        ));
        assert_eq!(dispatcher.stats().calls, 0);
    }

    #[test]
    fn test_empty_dispatch_is_free() {
        let dispatcher = Dispatcher::new(Arc::new(NearestUpscaler::new(2)), 0, 2);
        assert!(dispatcher.dispatch(1, &[], Purpose::Patch).unwrap().is_empty());
        assert_eq!(dispatcher.stats(), DispatchStats::default());
    }
}

//! Per-frame split, process and present pipeline.
//!
//! The streaming thread calls [`FramePipeline::on_frame`] once per captured
//! frame. Each call allocates a left and a right buffer, splits the YUYV
//! payload into them, hands both to the [`FrameProcessor`] and then to the
//! [`FramePresenter`]. Both buffers go back to the allocator before the call
//! returns, whichever step fails.
//!
//! Calls are serialized on an internal lock around the processing stages, so
//! a device layer that overlaps deliveries is safe but gains no parallelism.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::FRAME_FORMAT;
use crate::convert::{yuyv_to_chroma, yuyv_to_luma, FrameAllocator, GrayBuffer, GrayView, HeapAllocator};
use crate::error::{ApplicationError, ErrorValue};
use crate::traits::{frame_sink, FrameSink, RawFrame};

/// Application stage receiving the left and right images of every frame.
///
/// The views may be annotated in place but cannot outlive the call.
pub trait FrameProcessor: Send {
    /// Analyse one stereo pair.
    fn process(
        &mut self,
        left: &mut GrayView<'_>,
        right: &mut GrayView<'_>,
    ) -> Result<(), ApplicationError>;
}

impl<F> FrameProcessor for F
where
    F: FnMut(&mut GrayView<'_>, &mut GrayView<'_>) -> Result<(), ApplicationError> + Send,
{
    fn process(
        &mut self,
        left: &mut GrayView<'_>,
        right: &mut GrayView<'_>,
    ) -> Result<(), ApplicationError> {
        self(left, right)
    }
}

/// Best-effort display of a processed stereo pair.
pub trait FramePresenter: Send {
    /// Show one stereo pair.
    fn show(&mut self, left: &GrayView<'_>, right: &GrayView<'_>);
}

/// Presenter that discards frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPresenter;

impl FramePresenter for NullPresenter {
    fn show(&mut self, _left: &GrayView<'_>, _right: &GrayView<'_>) {}
}

/// Presenter that traces the mean intensity of both images.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracePresenter;

impl FramePresenter for TracePresenter {
    fn show(&mut self, left: &GrayView<'_>, right: &GrayView<'_>) {
        trace!(
            width = left.width(),
            height = left.height(),
            left_mean = left.mean(),
            right_mean = right.mean(),
            "stereo pair"
        );
    }
}

/// Counters of frames seen by the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames delivered by the device.
    pub received: u64,
    /// Frames that went through every stage.
    pub processed: u64,
    /// Frames dropped at some stage.
    pub failed: u64,
}

struct Stages {
    processor: Box<dyn FrameProcessor>,
    presenter: Box<dyn FramePresenter>,
}

/// Converts raw frames into stereo pairs and dispatches them.
pub struct FramePipeline {
    allocator: Box<dyn FrameAllocator>,
    stages: Mutex<Stages>,
    received: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<ErrorValue>,
}

impl FramePipeline {
    /// Create a pipeline over heap-allocated buffers.
    pub fn new<P, S>(processor: P, presenter: S) -> Self
    where
        P: FrameProcessor + 'static,
        S: FramePresenter + 'static,
    {
        Self {
            allocator: Box::new(HeapAllocator),
            stages: Mutex::new(Stages {
                processor: Box::new(processor),
                presenter: Box::new(presenter),
            }),
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_error: Mutex::new(ErrorValue::default()),
        }
    }

    /// Draw conversion buffers from `allocator` instead of the heap.
    #[must_use]
    pub fn with_allocator<A: FrameAllocator + 'static>(mut self, allocator: A) -> Self {
        self.allocator = Box::new(allocator);
        self
    }

    /// Sink that feeds this pipeline, for handing to the device layer.
    pub fn sink(self: &Arc<Self>) -> FrameSink {
        let pipeline = Arc::clone(self);
        frame_sink(move |frame| {
            if let Err(err) = pipeline.on_frame(frame) {
                warn!(sequence = frame.sequence, %err, "frame dropped");
            }
        })
    }

    /// Split, process and present one raw frame.
    ///
    /// A failure drops this frame only; the next call starts clean.
    pub fn on_frame(&self, raw: &RawFrame<'_>) -> Result<(), ErrorValue> {
        self.received.fetch_add(1, Ordering::Relaxed);
        let result = self.dispatch(raw);
        match result {
            Ok(()) => {
                self.processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock() = err;
            }
        }
        result
    }

    /// Frame counters so far.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Error of the most recent dropped frame.
    pub fn last_error(&self) -> ErrorValue {
        *self.last_error.lock()
    }

    fn dispatch(&self, raw: &RawFrame<'_>) -> Result<(), ErrorValue> {
        let mut error = ErrorValue::default();
        let frame = raw.reinterpret(FRAME_FORMAT);
        let allocator = self.allocator.as_ref();

        let Some(mut left) = GrayBuffer::allocate(allocator, frame.width, frame.height) else {
            return error.set(ApplicationError::AllocationFailed);
        };
        let Some(mut right) = GrayBuffer::allocate(allocator, frame.width, frame.height) else {
            return error.set(ApplicationError::AllocationFailed);
        };

        let left_split = yuyv_to_luma(&frame, left.as_mut_slice());
        let right_split = yuyv_to_chroma(&frame, right.as_mut_slice());
        if let Err(code) = left_split.and(right_split) {
            debug!(sequence = frame.sequence, ?code, "plane split failed");
            return error.set(ApplicationError::ConversionFailed);
        }

        let mut stages = self.stages.lock();
        let mut left_view = left.view_mut();
        let mut right_view = right.view_mut();
        error.check(stages.processor.process(&mut left_view, &mut right_view))?;
        stages.presenter.show(&left_view, &right_view);
        trace!(sequence = frame.sequence, "frame processed");
        Ok(())
    }
}

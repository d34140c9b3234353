//! The frame-processing pipeline.
//!
//! A [`FrameProcessor`] runs the full per-frame logic: resize the camera frame, run the landmark
//! model, extract the [`FrameResult`], apply the [`decision`](crate::decision) logic and post the
//! resulting [`UiState`] to the UI thread.
//!
//! The processor is meant to live on its own thread ([`FrameProcessor::spawn`]), fed by
//! [`run_camera`]. Frames that arrive while the worker is still busy are dropped, and so are UI
//! updates that arrive while the UI is still busy. A processing error is not recovered from: it
//! ends [`run_camera`] with that error.

use std::{io, time::Instant};

use crossbeam::channel::{self, Receiver};
use image::RgbImage;

use crate::{
    decision::{decide, DecisionParams, DetectionState, UiState},
    hand::FrameResult,
    nn::{LandmarkModel, ModelSlot},
    resize::{resize, ResizeOptions},
    resolution::Resolution,
    timer::{FpsCounter, Timer},
    ui::{Posted, UiSender},
    video::{Frame, FrameSource},
    worker::Worker,
};

/// Callback invoked once per presence episode when the dwell duration is exceeded.
pub type DwellCallback = Box<dyn FnMut(&FrameResult) + Send>;

/// Per-frame processing state and configuration.
pub struct FrameProcessor<M> {
    model: ModelSlot<M>,
    resize: ResizeOptions,
    params: DecisionParams,
    display: Resolution,
    state: DetectionState,
    ui: UiSender,
    on_dwell: Option<DwellCallback>,
    skipped: u64,
    t_resize: Timer,
    t_infer: Timer,
    t_decide: Timer,
}

impl<M: LandmarkModel> FrameProcessor<M> {
    /// Creates a processor that uses the model in `model` (once loaded) and posts UI updates to
    /// `ui`, scaled to the `display` resolution.
    pub fn new(model: ModelSlot<M>, ui: UiSender, display: Resolution) -> Self {
        Self {
            model,
            resize: ResizeOptions::default(),
            params: DecisionParams::default(),
            display,
            state: DetectionState::new(),
            ui,
            on_dwell: None,
            skipped: 0,
            t_resize: Timer::new("resize"),
            t_infer: Timer::new("infer"),
            t_decide: Timer::new("decide"),
        }
    }

    /// Sets the options used to turn camera frames into model input.
    pub fn resize_options(mut self, resize: ResizeOptions) -> Self {
        self.resize = resize;
        self
    }

    pub fn decision_params(mut self, params: DecisionParams) -> Self {
        self.params = params;
        self
    }

    /// Registers a callback to run when a hand has been visible for longer than the dwell
    /// duration.
    pub fn on_dwell<F: FnMut(&FrameResult) + Send + 'static>(mut self, callback: F) -> Self {
        self.on_dwell = Some(Box::new(callback));
        self
    }

    /// Returns the dwell timer state.
    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Returns the number of frames skipped because the model wasn't loaded yet.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Returns profiling timers for the processing stages.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_resize, &self.t_infer, &self.t_decide].into_iter()
    }

    /// Processes a single camera frame captured at `now`.
    ///
    /// Returns `Ok(None)` without touching any state if the model has not been loaded yet.
    /// Otherwise, the new [`UiState`] is posted to the UI thread and also returned.
    ///
    /// Inference errors are returned as-is; the dwell state is left untouched in that case.
    pub fn process(&mut self, frame: &RgbImage, now: Instant) -> anyhow::Result<Option<UiState>> {
        let Some(model) = self.model.get() else {
            self.skipped += 1;
            log::trace!("model not loaded yet, skipping frame #{}", self.skipped);
            return Ok(None);
        };

        let input = self.t_resize.time(|| resize(frame, &self.resize));
        let outputs = self.t_infer.time(|| model.infer(&input))?;
        log::trace!("inference result: {:?}", outputs);

        let outcome = self.t_decide.time(|| {
            let result = FrameResult::from_outputs(&outputs);
            let outcome = decide(&result, now, &mut self.state, &self.params, self.display);
            if outcome.dwell_triggered {
                log::info!(
                    "{} hand present for more than {:?}",
                    outcome.ui.label,
                    self.params.dwell
                );
                if let Some(callback) = &mut self.on_dwell {
                    callback(&result);
                }
            }
            outcome
        });

        if self.ui.post(outcome.ui.clone()) == Posted::Disconnected {
            log::debug!("UI receiver is gone, discarding update");
        }
        Ok(Some(outcome.ui))
    }
}

impl<M: LandmarkModel> FrameProcessor<M> {
    /// Moves the processor onto a dedicated worker thread.
    ///
    /// The worker processes one [`Frame`] at a time. The first processing error stops it: later
    /// frames are ignored and the error is reported through [`FrameWorker`].
    pub fn spawn(mut self) -> io::Result<FrameWorker> {
        let (error_tx, errors) = channel::bounded(1);
        let mut failed = false;
        let mut fps = FpsCounter::new("frame processor");
        let worker = Worker::builder()
            .name("frame processor")
            .spawn(move |frame: Frame| {
                if failed {
                    return;
                }
                match self.process(frame.image(), frame.captured_at()) {
                    Ok(Some(_)) => fps.tick_with(self.timers()),
                    Ok(None) => {}
                    Err(e) => {
                        log::error!("failed to process frame: {e:#}");
                        failed = true;
                        error_tx.try_send(e).ok();
                    }
                }
            })?;
        Ok(FrameWorker { worker, errors })
    }
}

/// Handle to a [`FrameProcessor`] running on its own thread.
///
/// Dropping the handle stops and joins the thread.
pub struct FrameWorker {
    worker: Worker<Frame>,
    errors: Receiver<anyhow::Error>,
}

impl FrameWorker {
    /// Hands `frame` to the processor if it is idle, or returns it if it is busy.
    pub fn try_submit(&mut self, frame: Frame) -> Result<(), Frame> {
        self.worker.try_send(frame)
    }

    /// Returns the processing error, if one has happened so far.
    pub fn check(&self) -> anyhow::Result<()> {
        match self.errors.try_recv() {
            Ok(e) => Err(e),
            Err(_) => Ok(()),
        }
    }

    /// Waits for the processor to finish its current frame and stops it.
    ///
    /// Returns the processing error, if any frame failed.
    pub fn finish(self) -> anyhow::Result<()> {
        let Self { worker, errors } = self;
        drop(worker);
        match errors.try_recv() {
            Ok(e) => Err(e),
            Err(_) => Ok(()),
        }
    }
}

/// Statistics returned by [`run_camera`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraStats {
    /// Frames handed to the processor.
    pub submitted: u64,
    /// Frames dropped because the processor was still busy.
    pub dropped: u64,
}

/// Reads frames from `source` and hands them to `processor` until the source ends.
///
/// Frames are dropped instead of queued while the processor is busy, so the processor always works
/// on a recent frame. Read errors and processing errors end the loop and are returned. The
/// processor is stopped before this returns.
pub fn run_camera<S: FrameSource + ?Sized>(
    source: &mut S,
    mut processor: FrameWorker,
) -> anyhow::Result<CameraStats> {
    let mut stats = CameraStats::default();
    let mut fps = FpsCounter::new("camera");
    while let Some(frame) = source.read()? {
        processor.check()?;
        match processor.try_submit(frame) {
            Ok(()) => stats.submitted += 1,
            Err(_) => {
                stats.dropped += 1;
                log::trace!("frame processor busy, dropping frame");
            }
        }
        fps.tick_with(source.timers());
    }
    processor.finish()?;
    log::debug!(
        "camera stream ended: {} frames processed, {} dropped",
        stats.submitted,
        stats.dropped
    );
    Ok(stats)
}

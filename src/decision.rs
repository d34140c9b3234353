//! Per-frame decision logic.
//!
//! Every inference result is turned into a fresh [`UiState`]: when the presence score is below
//! the threshold, the UI shows [`NO_HAND_LABEL`] and no points; otherwise it shows the handedness
//! and the landmark positions scaled to the display.
//!
//! A hand that stays in view for longer than the dwell duration triggers a one-time event (see
//! [`FrameOutcome::dwell_triggered`]). Losing the hand for a single frame starts a new episode.

use std::time::{Duration, Instant};

use crate::hand::{FrameResult, Handedness};
use crate::resolution::Resolution;

/// Label shown while no hand is detected.
pub const NO_HAND_LABEL: &str = "no hand";

/// Tunable constants of the decision logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionParams {
    /// Minimum presence score for a hand to count as visible.
    pub presence_threshold: f32,
    /// How long a hand has to stay visible before the dwell event fires.
    pub dwell: Duration,
    /// Handedness scores above this are classified as a right hand.
    pub handedness_threshold: f32,
    /// Resolution of the network input that landmark coordinates refer to.
    pub reference: Resolution,
}

impl DecisionParams {
    pub const DEFAULT_PRESENCE_THRESHOLD: f32 = 0.2;
    pub const DEFAULT_DWELL: Duration = Duration::from_millis(1000);
    pub const DEFAULT_REFERENCE: Resolution = Resolution::new(224, 224);
}

impl Default for DecisionParams {
    fn default() -> Self {
        Self {
            presence_threshold: Self::DEFAULT_PRESENCE_THRESHOLD,
            dwell: Self::DEFAULT_DWELL,
            handedness_threshold: Handedness::DEFAULT_THRESHOLD,
            reference: Self::DEFAULT_REFERENCE,
        }
    }
}

/// A point in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// State observed by the UI. Rewritten wholesale every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    pub label: String,
    pub points: Vec<Point>,
}

impl UiState {
    /// The state shown while no hand is detected.
    pub fn no_hand() -> Self {
        Self {
            label: NO_HAND_LABEL.to_string(),
            points: Vec::new(),
        }
    }

    /// Returns whether this state displays a detected hand.
    pub fn has_hand(&self) -> bool {
        self.label != NO_HAND_LABEL
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::no_hand()
    }
}

/// Dwell timer state, carried from frame to frame.
///
/// Only ever touched by the frame-processing thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionState {
    present_since: Option<Instant>,
    logged: bool,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the time at which the current presence episode started, if a hand is present.
    pub fn present_since(&self) -> Option<Instant> {
        self.present_since
    }

    /// Returns whether the dwell event has already fired during the current episode.
    pub fn is_logged(&self) -> bool {
        self.logged
    }

    /// Ends the current presence episode.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Records a frame with a visible hand at `now`.
    ///
    /// Returns `true` exactly once per episode: on the first frame where the hand has been visible
    /// for strictly longer than `dwell`.
    fn observe(&mut self, now: Instant, dwell: Duration) -> bool {
        let since = *self.present_since.get_or_insert(now);
        if !self.logged && now.saturating_duration_since(since) > dwell {
            self.logged = true;
            true
        } else {
            false
        }
    }
}

/// The outcome of [`decide`] for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub ui: UiState,
    /// `true` on the one frame per presence episode where the dwell duration is exceeded.
    pub dwell_triggered: bool,
}

/// Runs the per-frame decision logic on an inference result.
///
/// - If `result`'s presence is at least [`DecisionParams::presence_threshold`], the dwell timer
///   in `state` is started or continued, the label is set from the handedness score and the
///   landmarks are flattened into display-space points.
/// - Otherwise, `state` is reset and [`UiState::no_hand`] is returned.
pub fn decide(
    result: &FrameResult,
    now: Instant,
    state: &mut DetectionState,
    params: &DecisionParams,
    display: Resolution,
) -> FrameOutcome {
    // NaN presence counts as absent.
    if !(result.presence() >= params.presence_threshold) {
        state.reset();
        return FrameOutcome {
            ui: UiState::no_hand(),
            dwell_triggered: false,
        };
    }

    let dwell_triggered = state.observe(now, params.dwell);
    let handedness = Handedness::from_score(result.raw_handedness(), params.handedness_threshold);

    FrameOutcome {
        ui: UiState {
            label: handedness.to_string(),
            points: flatten_points(result.landmarks(), params.reference, display),
        },
        dwell_triggered,
    }
}

/// Flattens `(x, y, z)` triples into 2D points, scaling from `reference` to `display`
/// coordinates.
///
/// The `z` coordinate is discarded. If `coords` isn't made up of whole triples, it is considered
/// malformed and no points are returned.
pub fn flatten_points(coords: &[f32], reference: Resolution, display: Resolution) -> Vec<Point> {
    if coords.len() % 3 != 0 {
        return Vec::new();
    }

    let (sx, sy) = reference.scale_to(display);
    coords
        .chunks_exact(3)
        .map(|xyz| Point::new(xyz[0] * sx, xyz[1] * sy))
        .collect()
}

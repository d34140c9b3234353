//! Hand landmark network results.
//!
//! The MediaPipe hand landmark network produces (at least) three outputs per inference:
//!
//! 1. `[1, 63]`: 21 landmark positions as `(x, y, z)` triples in input image coordinates.
//! 2. `[1, 1]`: the hand presence score in range 0.0 to 1.0.
//! 3. `[1, 1]`: the handedness score in range 0.0 to 1.0, where values above 0.5 indicate a right
//!    hand.
//!
//! Some exports of the network also emit world landmarks as a 4th output, which is ignored.

use std::fmt;

use crate::nn::Outputs;

/// Number of landmarks predicted for each hand.
pub const NUM_LANDMARKS: usize = 21;

/// Number of coordinates in the landmark output (`x`, `y` and `z` for every landmark).
pub const NUM_COORDINATES: usize = NUM_LANDMARKS * 3;

const OUTPUT_LANDMARKS: usize = 0;
const OUTPUT_PRESENCE: usize = 1;
const OUTPUT_HANDEDNESS: usize = 2;

/// The three outputs of a single hand landmark inference pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameResult {
    /// Flat list of `(x, y, z)` coordinates, either [`NUM_COORDINATES`] long or empty.
    landmarks: Vec<f32>,
    presence: f32,
    handedness: f32,
}

impl FrameResult {
    /// Creates a [`FrameResult`] from raw values.
    ///
    /// `landmarks` that don't consist of exactly [`NUM_COORDINATES`] values are treated as
    /// malformed and discarded.
    pub fn new(landmarks: Vec<f32>, presence: f32, handedness: f32) -> Self {
        let landmarks = if landmarks.len() == NUM_COORDINATES {
            landmarks
        } else {
            if !landmarks.is_empty() {
                log::trace!(
                    "discarding malformed landmark output with {} values",
                    landmarks.len()
                );
            }
            Vec::new()
        };
        Self {
            landmarks,
            presence,
            handedness,
        }
    }

    /// Extracts the landmarks, presence and handedness from network outputs.
    ///
    /// Missing outputs and empty scalar tensors default to 0. A landmark tensor that doesn't hold
    /// exactly [`NUM_COORDINATES`] values results in an empty landmark list.
    pub fn from_outputs(outputs: &Outputs) -> Self {
        let scalar = |index| {
            outputs
                .get(index)
                .and_then(|tensor| tensor.first())
                .unwrap_or(0.0)
        };
        let landmarks = outputs
            .get(OUTPUT_LANDMARKS)
            .map(|tensor| tensor.as_raw_data().to_vec())
            .unwrap_or_default();

        Self::new(
            landmarks,
            scalar(OUTPUT_PRESENCE),
            scalar(OUTPUT_HANDEDNESS),
        )
    }

    /// Returns the raw landmark coordinates as a flat `[x0, y0, z0, x1, y1, z1, ...]` list.
    ///
    /// This is empty if the network output was malformed.
    pub fn landmarks(&self) -> &[f32] {
        &self.landmarks
    }

    /// Returns an iterator over the `(x, y, z)` positions of all landmarks.
    pub fn landmark_positions(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.landmarks
            .chunks_exact(3)
            .map(|chunk| [chunk[0], chunk[1], chunk[2]])
    }

    /// Returns the position of a single landmark, if landmarks are available.
    pub fn landmark_position(&self, idx: LandmarkIdx) -> Option<[f32; 3]> {
        self.landmark_positions().nth(idx as usize)
    }

    /// Returns the confidence that a hand is visible in the image.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the raw handedness score.
    pub fn raw_handedness(&self) -> f32 {
        self.handedness
    }

    /// Returns the estimated handedness of the hand in the image.
    ///
    /// This assumes that the camera image is passed in as-is, and the returned value should only be
    /// relied on when the `presence` is over some threshold.
    pub fn handedness(&self) -> Handedness {
        Handedness::from_score(self.handedness, Handedness::DEFAULT_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Scores above this value are classified as [`Handedness::Right`].
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    /// Classifies a raw handedness score.
    ///
    /// Scores strictly greater than `threshold` are [`Handedness::Right`], everything else
    /// (including the threshold itself and NaN) is [`Handedness::Left`].
    pub fn from_score(score: f32, threshold: f32) -> Self {
        if score > threshold {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Pairs of landmarks connected by a bone, used for drawing the hand skeleton.
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Palm outline:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

//! Real-time hand landmark detection on a camera feed.
//!
//! Frames from a [`video::FrameSource`] are converted into model input tensors by [`resize`],
//! passed through a [`nn::LandmarkModel`], and turned into a [`decision::UiState`] (a handedness
//! label and a list of screen-space landmark points) by the per-frame logic in [`decision`]. The
//! [`pipeline::FrameProcessor`] glues these together on a dedicated worker thread and hands the
//! result to the UI thread through the lossy channel in [`ui`].
//!
//! # Coordinates
//!
//! The hand landmark network outputs 21 `(x, y, z)` triples in the coordinate system of its
//! 224x224 input image: X points to the right, Y points *down*. The decision logic drops Z and
//! scales X and Y to the display resolution.
//!
//! # Environment Variables
//!
//! The demo binary is configured entirely through environment variables, see [`config::Config`].
//! `HANDMARK_WEBCAM_NAME` is also honored by [`video::webcam::Webcam`] when no device name is
//! passed explicitly.

pub mod config;
pub mod decision;
pub mod filter;
pub mod hand;
pub mod nn;
pub mod overlay;
pub mod pipeline;
pub mod resize;
pub mod resolution;
pub mod timer;
pub mod ui;
pub mod video;
pub mod worker;

use log::LevelFilter;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = if cfg!(debug_assertions) {
        LevelFilter::Trace
    } else {
        LevelFilter::Debug
    };
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("tract_onnx"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// If `cfg!(debug_assertions)` is enabled, the calling crate and handmark will log at *trace*
/// level. Otherwise, they will log at *debug* level. `RUST_LOG` is applied on top.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}

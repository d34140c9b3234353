//! Camera frame sources.
//!
//! A [`FrameSource`] yields [`Frame`]s one at a time. [`webcam::Webcam`] reads a live V4L2 camera,
//! [`still::StillImages`] plays back image files at a fixed rate (useful for demos and tests).

pub mod still;
pub mod webcam;

use std::{io, time::Instant};

use image::RgbImage;

use crate::{resolution::Resolution, timer::Timer};

/// A single captured camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    captured_at: Instant,
}

impl Frame {
    /// Creates a frame that was captured at `captured_at`.
    pub fn new(image: RgbImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    /// Creates a frame that was captured just now.
    pub fn now(image: RgbImage) -> Self {
        Self::new(image, Instant::now())
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Returns the time at which the frame was captured.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }
}

/// Trait for camera-like producers of [`Frame`]s.
pub trait FrameSource {
    /// Reads the next frame.
    ///
    /// This blocks until a frame is available. Returns `Ok(None)` when the source has no more
    /// frames to deliver.
    fn read(&mut self) -> anyhow::Result<Option<Frame>>;

    /// Returns profiling timers to log alongside the capture frame rate.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        (**self).read()
    }

    fn timers(&self) -> Vec<&Timer> {
        (**self).timers()
    }
}

/// Whether the current process may access a camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// At least one video device can be opened.
    Granted,
    /// Video devices exist, but none of them can be opened by this user.
    Denied,
    /// There is no video device to ask for.
    NoDevice,
}

/// Checks whether any V4L2 video device is accessible.
///
/// On Linux, camera access is governed by the permissions on the `/dev/video*` nodes (typically
/// membership in the `video` group), so this is the moral equivalent of a permission prompt.
pub fn permission() -> Permission {
    let devices = match linuxvideo::list() {
        Ok(devices) => devices,
        Err(e) => {
            log::warn!("failed to enumerate video devices: {e}");
            return Permission::NoDevice;
        }
    };
    classify(devices.map(|res| res.map(drop)))
}

fn classify(results: impl IntoIterator<Item = io::Result<()>>) -> Permission {
    let mut denied = false;
    for res in results {
        match res {
            Ok(()) => return Permission::Granted,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                log::debug!("video device not accessible: {e}");
                denied = true;
            }
            Err(e) => log::warn!("{e}"),
        }
    }

    if denied {
        Permission::Denied
    } else {
        Permission::NoDevice
    }
}

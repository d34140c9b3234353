//! Plays back still images as if they were a camera.

use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use image::RgbImage;

use crate::video::{Frame, FrameSource};

/// A [`FrameSource`] that yields a fixed list of images at a fixed frame rate.
pub struct StillImages {
    images: Vec<RgbImage>,
    next: usize,
    interval: Duration,
    looping: bool,
    next_due: Option<Instant>,
}

impl StillImages {
    /// Default playback rate.
    pub const DEFAULT_FPS: u32 = 30;

    /// Creates a source that plays `images` in order.
    pub fn new(images: Vec<RgbImage>) -> Self {
        Self {
            images,
            next: 0,
            interval: Duration::from_secs(1) / Self::DEFAULT_FPS,
            looping: false,
            next_due: None,
        }
    }

    /// Loads the images at `paths`.
    ///
    /// Any format supported by the [`image`] crate's enabled features can be used.
    pub fn open<P: AsRef<Path>>(paths: impl IntoIterator<Item = P>) -> anyhow::Result<Self> {
        let images = paths
            .into_iter()
            .map(|path| {
                let path = path.as_ref();
                let image = image::open(path)
                    .with_context(|| format!("failed to load {}", path.display()))?;
                Ok(image.into_rgb8())
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        if images.is_empty() {
            bail!("no images to play back");
        }
        log::debug!("loaded {} still images", images.len());
        Ok(Self::new(images))
    }

    /// Sets the playback rate. A rate of 0 delivers frames as fast as they're read.
    pub fn fps(mut self, fps: u32) -> Self {
        self.interval = match fps {
            0 => Duration::ZERO,
            fps => Duration::from_secs(1) / fps,
        };
        self
    }

    /// Sets whether to start over after the last image instead of ending the stream.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

impl FrameSource for StillImages {
    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        if self.next >= self.images.len() {
            if !self.looping || self.images.is_empty() {
                return Ok(None);
            }
            self.next = 0;
        }

        if let Some(due) = self.next_due {
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
        }
        let frame = Frame::now(self.images[self.next].clone());
        self.next_due = Some(frame.captured_at() + self.interval);
        self.next += 1;
        Ok(Some(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn images() -> Vec<RgbImage> {
        vec![RgbImage::new(1, 1), RgbImage::new(2, 2)]
    }

    #[test]
    fn plays_once() {
        let mut source = StillImages::new(images()).fps(0);
        assert_eq!(source.read().unwrap().unwrap().image().width(), 1);
        assert_eq!(source.read().unwrap().unwrap().image().width(), 2);
        assert!(source.read().unwrap().is_none());
        assert!(source.read().unwrap().is_none());
    }

    #[test]
    fn loops() {
        let mut source = StillImages::new(images()).fps(0).looping(true);
        let widths = (0..5)
            .map(|_| source.read().unwrap().unwrap().image().width())
            .collect::<Vec<_>>();
        assert_eq!(widths, [1, 2, 1, 2, 1]);

        let mut empty = StillImages::new(Vec::new()).looping(true);
        assert!(empty.read().unwrap().is_none());
    }

    #[test]
    fn paces_frames() {
        let mut source = StillImages::new(images()).fps(100);
        let a = source.read().unwrap().unwrap().captured_at();
        let b = source.read().unwrap().unwrap().captured_at();
        assert!(b - a >= Duration::from_millis(10));
    }

    #[test]
    fn open_errors() {
        assert!(StillImages::open(Vec::<&str>::new()).is_err());
        let err = StillImages::open(["/nonexistent/hand.png"]).err().unwrap();
        assert!(format!("{err:#}").contains("/nonexistent/hand.png"));
    }
}

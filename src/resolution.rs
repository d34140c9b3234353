//! Types for representing image and display resolutions.

use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail};

/// Resolution (`width x height`) of an image, window, camera, or display.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// 720p resolution: `1280x720`
    pub const RES_720P: Self = Self {
        width: 1280,
        height: 720,
    };

    /// Creates a new [`Resolution`] of `width x height`.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn num_pixels(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Returns the factors that map coordinates in `self` to coordinates in `target`.
    ///
    /// If `self` has a width or height of 0, the corresponding factor is 0.
    pub fn scale_to(&self, target: Resolution) -> (f32, f32) {
        let factor = |from: u32, to: u32| {
            if from == 0 {
                0.0
            } else {
                to as f32 / from as f32
            }
        };
        (
            factor(self.width, target.width),
            factor(self.height, target.height),
        )
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses resolutions written as `WIDTHxHEIGHT`, eg. `1280x720`.
impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("expected `WIDTHxHEIGHT`, got '{s}'"))?;
        let (w, h): (u32, u32) = (w.trim().parse()?, h.trim().parse()?);
        if w == 0 || h == 0 {
            bail!("resolution must not be empty, got '{s}'");
        }
        Ok(Self::new(w, h))
    }
}

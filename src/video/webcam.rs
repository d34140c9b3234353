//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::{env, str::FromStr};

use anyhow::bail;
use image::{ImageFormat, RgbImage};
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, Pixelformat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::resolution::Resolution;
use crate::timer::Timer;
use crate::video::{Frame, FrameSource};

/// Environment variable that selects the webcam by name when [`WebcamOptions::name`] isn't used.
pub const ENV_VAR_WEBCAM_NAME: &str = "HANDMARK_WEBCAM_NAME";

/// Indicates whether to prefer a higher resolution or frame rate.
///
/// By default, [`ParamPreference::Framerate`] is used: hand tracking benefits more from a steady
/// frame rate than from pixels the network downsamples to 224x224 anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ParamPreference {
    /// Prefer increased resolution over higher frame rates.
    Resolution,
    /// Prefer higher frame rate over higher image resolution.
    #[default]
    Framerate,
}

/// Parses `resolution` or `framerate` (also `fps`), ignoring case.
impl FromStr for ParamPreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resolution" => Ok(Self::Resolution),
            "framerate" | "fps" => Ok(Self::Framerate),
            _ => bail!("expected `resolution` or `framerate`, got '{s}'"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
    pref: ParamPreference,
}

/// Format negotiation options.
#[derive(Default)]
pub struct WebcamOptions {
    name: Option<String>,
    frame: FramePrefs,
}

impl WebcamOptions {
    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.frame.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver it.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.frame.fps = Some(fps);
        self
    }

    /// Selects whether to prefer a higher resolution or frame rate.
    #[inline]
    pub fn prefer(mut self, pref: ParamPreference) -> Self {
        self.frame.pref = pref;
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> f32 {
        (1.0 / self.frame_interval.as_f32()).round()
    }
}

fn negotiate_format(device: &Device, prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixelformat() == Pixelformat::JPEG || format.pixelformat() == Pixelformat::MJPG {
            pixel_format = Some(format.pixelformat());
            break;
        }
    }

    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let mut formats = Vec::new();
    match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => {
            for size in sizes {
                let intervals =
                    match device.frame_intervals(pixel_format, size.width(), size.height())? {
                        FrameIntervals::Discrete(intervals) => intervals,
                        FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                            bail!("stepwise or continuous frame rates are not supported")
                        }
                    };
                for rate in intervals {
                    formats.push(FrameFormat {
                        resolution: Resolution::new(size.width(), size.height()),
                        frame_interval: *rate.fract(),
                    });
                }
            }
        }
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    }

    let Some(fmt) = negotiate(&formats, prefs) else {
        bail!("failed to negotiate a webcam format")
    };
    Ok((
        PixFormat::new(
            fmt.resolution.width(),
            fmt.resolution.height(),
            pixel_format,
        ),
        fmt.frame_interval,
    ))
}

/// Picks a format, relaxing the less preferred constraint first when nothing matches.
fn negotiate(formats: &[FrameFormat], mut prefs: FramePrefs) -> Option<FrameFormat> {
    loop {
        if let Some(fmt) = negotiate_step(formats, prefs) {
            return Some(fmt);
        }

        log::debug!("failed to negotiate format with prefs {:?}", prefs);
        let relaxed = match prefs.pref {
            ParamPreference::Resolution => {
                prefs.fps.take().is_some() || prefs.resolution.take().is_some()
            }
            ParamPreference::Framerate => {
                prefs.resolution.take().is_some() || prefs.fps.take().is_some()
            }
        };
        if !relaxed {
            return None;
        }
        log::debug!("retrying with new prefs {:?}", prefs);
    }
}

fn negotiate_step(formats: &[FrameFormat], prefs: FramePrefs) -> Option<FrameFormat> {
    let mut eligible = formats
        .iter()
        .filter(|fmt| {
            prefs.resolution.map_or(true, |res| {
                fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
            }) && prefs.fps.map_or(true, |fps| fmt.fps() >= fps as f32)
        })
        .copied()
        .collect::<Vec<_>>();
    match prefs.pref {
        ParamPreference::Resolution => {
            eligible.sort_by_key(|fmt| (fmt.resolution.num_pixels(), fmt.fps() as u32))
        }
        ParamPreference::Framerate => {
            eligible.sort_by_key(|fmt| (fmt.fps() as u32, fmt.resolution.num_pixels()))
        }
    }
    eligible.last().copied()
}

/// A webcam yielding a stream of [`Frame`]s.
pub struct Webcam {
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        if let Ok(name) = env::var(ENV_VAR_WEBCAM_NAME) {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name,
            );
        }
        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_impl(dev, &options) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!("{}", e);
                    }
                },
                Err(e) => {
                    log::warn!("{}", e);
                }
            }
        }

        bail!("no supported webcam device found")
    }

    fn open_impl(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        let cam_name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = &options.name.as_deref().or(cam_name_from_env.as_deref()) {
            if caps.card() != *name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );

        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, fract) = negotiate_format(&dev, options.frame)?;

        let capture = dev.video_capture(pixfmt)?;

        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());

        let actual = capture.set_frame_interval(fract)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        let stream = capture.into_stream(2)?;

        Ok(Some(Self {
            stream,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Returns the negotiated frame resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is.
    pub fn read_frame(&mut self) -> anyhow::Result<Frame> {
        let dequeue_guard = self.t_dequeue.start();
        let resolution = self.resolution;
        let t_decode = &self.t_decode;
        let image = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            Ok(t_decode.time(|| decode_or_blank(&buf, resolution)))
        })?;
        Ok(Frame::now(image))
    }
}

impl FrameSource for Webcam {
    fn read(&mut self) -> anyhow::Result<Option<Frame>> {
        self.read_frame().map(Some)
    }

    /// Returns profiling timers for webcam access and decoding.
    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

/// Decodes a JPEG frame, substituting a black frame if the data is corrupted.
///
/// Even good webcams occasionally deliver broken MJPG frames. Skipping them would cause a latency
/// spike, and a blank frame simply reads as "no hand" for one frame.
fn decode_or_blank(data: &[u8], resolution: Resolution) -> RgbImage {
    match image::load_from_memory_with_format(data, ImageFormat::Jpeg) {
        Ok(image) => image.into_rgb8(),
        Err(e) => {
            log::error!("webcam decode error: {}", e);
            RgbImage::new(resolution.width(), resolution.height())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn summary(fmt: Option<FrameFormat>) -> Option<(Resolution, f32)> {
        fmt.map(|fmt| (fmt.resolution, fmt.fps()))
    }

    fn fmt(w: u32, h: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(w, h),
            frame_interval: Fract::new(1, fps),
        }
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            fmt(640, 480, 30),
            fmt(640, 480, 60),
            fmt(1280, 720, 30),
            fmt(1920, 1080, 15),
        ]
    }

    #[test]
    fn parse_preference() {
        assert_eq!("fps".parse::<ParamPreference>().unwrap(), ParamPreference::Framerate);
        assert_eq!(
            " Resolution".parse::<ParamPreference>().unwrap(),
            ParamPreference::Resolution
        );
        assert!("pixels".parse::<ParamPreference>().is_err());
    }

    #[test]
    fn prefers_framerate() {
        let prefs = FramePrefs {
            fps: Some(30),
            ..Default::default()
        };
        assert_eq!(
            summary(negotiate(&formats(), prefs)),
            Some((Resolution::new(640, 480), 60.0))
        );
    }

    #[test]
    fn prefers_resolution() {
        let prefs = FramePrefs {
            fps: Some(30),
            pref: ParamPreference::Resolution,
            ..Default::default()
        };
        assert_eq!(
            summary(negotiate(&formats(), prefs)),
            Some((Resolution::new(1280, 720), 30.0))
        );
    }

    #[test]
    fn relaxes_constraints() {
        // Nothing delivers 1080p at 60 FPS. Preferring frame rate drops the resolution constraint.
        let prefs = FramePrefs {
            resolution: Some(Resolution::new(1920, 1080)),
            fps: Some(60),
            pref: ParamPreference::Framerate,
        };
        assert_eq!(
            summary(negotiate(&formats(), prefs)),
            Some((Resolution::new(640, 480), 60.0))
        );

        // Preferring resolution drops the frame rate constraint instead.
        let prefs = FramePrefs {
            pref: ParamPreference::Resolution,
            ..prefs
        };
        assert_eq!(
            summary(negotiate(&formats(), prefs)),
            Some((Resolution::new(1920, 1080), 15.0))
        );

        assert!(negotiate(&[], prefs).is_none());
    }

    #[test]
    fn corrupted_frame_is_blank() {
        let image = decode_or_blank(b"\xFF\xD8 not really a jpeg", Resolution::new(8, 6));
        assert_eq!(image.dimensions(), (8, 6));
        assert!(image.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn decodes_jpeg() {
        let mut data = Vec::new();
        RgbImage::from_pixel(16, 8, image::Rgb([200, 200, 200]))
            .write_to(&mut Cursor::new(&mut data), ImageFormat::Jpeg)
            .unwrap();
        let image = decode_or_blank(&data, Resolution::new(1, 1));
        assert_eq!(image.dimensions(), (16, 8));
    }
}

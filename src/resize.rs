//! Conversion of camera frames into network input tensors.
//!
//! The conversion is configured by [`ResizeOptions`]: the frame is rotated, scaled to the target
//! size, its channels are reordered to the requested [`PixelFormat`], and the values are converted
//! to the requested [`DataType`]. The resulting [`Tensor`] has a batch dimension of 1.

use image::{imageops, imageops::FilterType, RgbImage};

use crate::{nn::tensor::Tensor, resolution::Resolution};

/// Channel order of the produced tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Rgb,
    Bgr,
    /// RGB with an opaque alpha channel appended.
    Rgba,
    /// RGB with an opaque alpha channel prepended.
    Argb,
}

impl PixelFormat {
    /// Returns the number of channels per pixel.
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Argb => 4,
        }
    }

    /// Reorders an RGB pixel into this format. Alpha is always fully opaque.
    fn arrange(&self, [r, g, b]: [u8; 3], out: &mut [u8; 4]) -> usize {
        match self {
            PixelFormat::Rgb => *out = [r, g, b, 0],
            PixelFormat::Bgr => *out = [b, g, r, 0],
            PixelFormat::Rgba => *out = [r, g, b, 255],
            PixelFormat::Argb => *out = [255, r, g, b],
        }
        self.channels()
    }
}

/// Element type expected by the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    /// Raw 8-bit channel values (0 to 255).
    Uint8,
    /// Channel values normalized to 0.0 to 1.0.
    #[default]
    Float32,
}

impl DataType {
    fn convert(&self, value: u8) -> f32 {
        match self {
            DataType::Uint8 => f32::from(value),
            DataType::Float32 => f32::from(value) / 255.0,
        }
    }
}

/// Clockwise rotation applied to the camera frame before scaling.
///
/// Camera sensors are often mounted rotated relative to the display; this undoes that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

/// Describes in what order the network expects its input data.
///
/// - `N` is the number of images, always 1 here.
/// - `C` is the number of color channels.
/// - `H` and `W` are the height and width of the input, respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// Shape is `[N, H, W, C]`.
    #[default]
    Nhwc,
    /// Shape is `[N, C, H, W]`.
    Nchw,
}

/// Frame conversion options.
///
/// The defaults match the MediaPipe hand landmark network: 224x224 RGB pixels normalized to
/// 0.0 to 1.0, channels last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    resolution: Resolution,
    pixel_format: PixelFormat,
    data_type: DataType,
    rotation: Rotation,
    layout: Layout,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(224, 224),
            pixel_format: PixelFormat::default(),
            data_type: DataType::default(),
            rotation: Rotation::default(),
            layout: Layout::default(),
        }
    }
}

impl ResizeOptions {
    /// Sets the target width and height.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    #[inline]
    pub fn pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    #[inline]
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    #[inline]
    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    #[inline]
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Returns the target resolution.
    pub fn target(&self) -> Resolution {
        self.resolution
    }

    /// Returns the shape of the tensors produced with these options.
    pub fn tensor_shape(&self) -> [usize; 4] {
        let (w, h) = (
            self.resolution.width() as usize,
            self.resolution.height() as usize,
        );
        let c = self.pixel_format.channels();
        match self.layout {
            Layout::Nhwc => [1, h, w, c],
            Layout::Nchw => [1, c, h, w],
        }
    }
}

/// Converts `frame` into a network input tensor as described by `options`.
///
/// # Panics
///
/// Panics if the target resolution is empty.
pub fn resize(frame: &RgbImage, options: &ResizeOptions) -> Tensor {
    let target = options.resolution;
    assert!(target.num_pixels() > 0, "cannot resize to {target}");

    let rotated;
    let frame = match options.rotation {
        Rotation::Deg0 => frame,
        Rotation::Deg90 => {
            rotated = imageops::rotate90(frame);
            &rotated
        }
        Rotation::Deg180 => {
            rotated = imageops::rotate180(frame);
            &rotated
        }
        Rotation::Deg270 => {
            rotated = imageops::rotate270(frame);
            &rotated
        }
    };

    let scaled;
    let frame = if frame.dimensions() == (target.width(), target.height()) {
        frame
    } else {
        scaled = imageops::resize(frame, target.width(), target.height(), FilterType::Triangle);
        &scaled
    };

    let channels = options.pixel_format.channels();
    let (w, h) = (target.width() as usize, target.height() as usize);
    let mut data = vec![0.0; w * h * channels];
    let mut px = [0; 4];
    for (x, y, pixel) in frame.enumerate_pixels() {
        let n = options.pixel_format.arrange(pixel.0, &mut px);
        let (x, y) = (x as usize, y as usize);
        for (c, &value) in px[..n].iter().enumerate() {
            let index = match options.layout {
                Layout::Nhwc => (y * w + x) * channels + c,
                Layout::Nchw => (c * h + y) * w + x,
            };
            data[index] = options.data_type.convert(value);
        }
    }

    Tensor::from_vec(&options.tensor_shape(), data)
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    /// 2x1 image: red on the left, blue on the right.
    fn red_blue() -> RgbImage {
        RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })
    }

    #[test]
    fn default_shape() {
        let frame = RgbImage::new(640, 480);
        let tensor = resize(&frame, &ResizeOptions::default());
        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert!(tensor.as_raw_data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn nchw_shape() {
        let frame = RgbImage::new(30, 20);
        let opts = ResizeOptions::default()
            .resolution(Resolution::new(8, 4))
            .pixel_format(PixelFormat::Argb)
            .layout(Layout::Nchw);
        assert_eq!(resize(&frame, &opts).shape(), [1, 4, 4, 8]);
    }

    #[test]
    fn channel_order_and_data_type() {
        let opts = ResizeOptions::default().resolution(Resolution::new(2, 1));

        let rgb = resize(&red_blue(), &opts);
        assert_eq!(rgb.as_raw_data(), [1.0, 0.0, 0.0, 0.0, 0.0, 1.0]);

        let bgr = resize(&red_blue(), &opts.pixel_format(PixelFormat::Bgr));
        assert_eq!(bgr.as_raw_data(), [0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);

        let rgba = resize(
            &red_blue(),
            &opts
                .pixel_format(PixelFormat::Rgba)
                .data_type(DataType::Uint8),
        );
        assert_eq!(
            rgba.as_raw_data(),
            [255.0, 0.0, 0.0, 255.0, 0.0, 0.0, 255.0, 255.0]
        );

        let argb = resize(
            &red_blue(),
            &opts
                .pixel_format(PixelFormat::Argb)
                .data_type(DataType::Uint8),
        );
        assert_eq!(
            argb.as_raw_data(),
            [255.0, 255.0, 0.0, 0.0, 255.0, 0.0, 0.0, 255.0]
        );
    }

    #[test]
    fn planar_layout() {
        let opts = ResizeOptions::default()
            .resolution(Resolution::new(2, 1))
            .layout(Layout::Nchw)
            .data_type(DataType::Uint8);
        let tensor = resize(&red_blue(), &opts);
        assert_eq!(tensor.shape(), [1, 3, 1, 2]);
        // R plane, G plane, B plane
        assert_eq!(
            tensor.as_raw_data(),
            [255.0, 0.0, 0.0, 0.0, 0.0, 255.0]
        );
    }

    #[test]
    fn rotation() {
        let opts = ResizeOptions::default()
            .resolution(Resolution::new(1, 2))
            .data_type(DataType::Uint8);

        // Rotating clockwise puts the left pixel (red) at the top.
        let cw = resize(&red_blue(), &opts.rotation(Rotation::Deg90));
        assert_eq!(cw.shape(), [1, 2, 1, 3]);
        assert_eq!(cw.as_raw_data(), [255.0, 0.0, 0.0, 0.0, 0.0, 255.0]);

        let ccw = resize(&red_blue(), &opts.rotation(Rotation::Deg270));
        assert_eq!(ccw.as_raw_data(), [0.0, 0.0, 255.0, 255.0, 0.0, 0.0]);

        let flipped = resize(
            &red_blue(),
            &opts
                .resolution(Resolution::new(2, 1))
                .rotation(Rotation::Deg180),
        );
        assert_eq!(flipped.as_raw_data(), [0.0, 0.0, 255.0, 255.0, 0.0, 0.0]);
    }

    #[test]
    #[should_panic = "cannot resize"]
    fn empty_target() {
        resize(
            &red_blue(),
            &ResizeOptions::default().resolution(Resolution::new(0, 10)),
        );
    }
}

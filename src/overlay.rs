//! Renders a [`UiState`] on top of a camera image.
//!
//! The drawing functions return guards that draw on drop and allow customization before that:
//!
//! ```
//! # use image::RgbImage;
//! # use embedded_graphics::pixelcolor::RgbColor;
//! # use handmark::overlay::{draw_marker, Color};
//! let mut image = RgbImage::new(32, 32);
//! draw_marker(&mut image, 16, 16).color(Color::GREEN).size(7);
//! assert_eq!(image.get_pixel(16, 16).0, [0, 255, 0]);
//! ```

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle},
    text::{self, Text, TextStyleBuilder},
};
use image::{Rgb, RgbImage};

use crate::{
    decision::UiState,
    hand::{CONNECTIVITY, NUM_LANDMARKS},
};

/// Colors used by the overlay.
pub type Color = Rgb888;

const LABEL_MARGIN: i32 = 4;

/// Draws `ui` onto `image`.
///
/// If `ui` has one point per hand landmark, the hand skeleton is drawn first. Then every point gets
/// a marker and the label is written in the top-left corner.
pub fn draw(image: &mut RgbImage, ui: &UiState) {
    let pos = |i: usize| {
        let p = ui.points[i];
        (p.x.round() as i32, p.y.round() as i32)
    };

    if ui.points.len() == NUM_LANDMARKS {
        for (a, b) in CONNECTIVITY {
            let (start, end) = (pos(*a as usize), pos(*b as usize));
            draw_line(image, start.0, start.1, end.0, end.1).color(Color::BLUE);
        }
    }
    for i in 0..ui.points.len() {
        let (x, y) = pos(i);
        draw_marker(image, x, y);
    }

    let color = if ui.has_hand() {
        Color::GREEN
    } else {
        Color::YELLOW
    };
    draw_text(image, LABEL_MARGIN, LABEL_MARGIN, &ui.label).color(color);
}

/// Guard returned by [`draw_marker`]; draws the marker when dropped and allows customization.
pub struct DrawMarker<'a> {
    image: &'a mut RgbImage,
    x: i32,
    y: i32,
    color: Color,
    size: u32,
}

impl DrawMarker<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the width and height of the marker.
    ///
    /// The default size is 5. The size must be *uneven* and *non-zero*. A size of 1 will result in
    /// a single pixel getting drawn.
    pub fn size(&mut self, size: u32) -> &mut Self {
        assert!(size != 0, "marker size must be greater than zero");
        assert!(size % 2 == 1, "marker size must be an uneven number");
        self.size = size;
        self
    }
}

impl Drop for DrawMarker<'_> {
    fn drop(&mut self) {
        let (x, y, color) = (self.x, self.y, self.color);
        let offset = ((self.size - 1) / 2) as i32;
        let pixels = (-offset..=offset)
            .zip(-offset..=offset)
            .chain((-offset..=offset).rev().zip(-offset..=offset))
            .map(|(xoff, yoff)| Pixel(Point::new(x + xoff, y + yoff), color));
        match Target(&mut *self.image).draw_iter(pixels) {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`draw_line`]; draws the line when dropped and allows customization.
pub struct DrawLine<'a> {
    image: &'a mut RgbImage,
    start: Point,
    end: Point,
    color: Color,
    stroke_width: u32,
}

impl DrawLine<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }

    /// Sets the line's stroke width.
    ///
    /// By default, a stroke width of 1 is used.
    pub fn stroke_width(&mut self, width: u32) -> &mut Self {
        self.stroke_width = width;
        self
    }
}

impl Drop for DrawLine<'_> {
    fn drop(&mut self) {
        match Line::new(self.start, self.end)
            .into_styled(PrimitiveStyle::with_stroke(self.color, self.stroke_width))
            .draw(&mut Target(&mut *self.image))
        {
            Ok(()) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Guard returned by [`draw_text`]; draws the text when dropped and allows customization.
pub struct DrawText<'a> {
    image: &'a mut RgbImage,
    position: Point,
    text: &'a str,
    color: Color,
}

impl DrawText<'_> {
    pub fn color(&mut self, color: Color) -> &mut Self {
        self.color = color;
        self
    }
}

impl Drop for DrawText<'_> {
    fn drop(&mut self) {
        let character_style = MonoTextStyle::new(&FONT_6X10, self.color);
        let text_style = TextStyleBuilder::new()
            .alignment(text::Alignment::Left)
            .baseline(text::Baseline::Top)
            .build();
        match Text::with_text_style(self.text, self.position, character_style, text_style)
            .draw(&mut Target(&mut *self.image))
        {
            Ok(_) => {}
            Err(infallible) => match infallible {},
        }
    }
}

/// Draws a marker (a small X) centered on `x`, `y`.
pub fn draw_marker(image: &mut RgbImage, x: i32, y: i32) -> DrawMarker<'_> {
    DrawMarker {
        image,
        x,
        y,
        color: Color::RED,
        size: 5,
    }
}

/// Draws a line from `start_x`, `start_y` to `end_x`, `end_y`.
pub fn draw_line(
    image: &mut RgbImage,
    start_x: i32,
    start_y: i32,
    end_x: i32,
    end_y: i32,
) -> DrawLine<'_> {
    DrawLine {
        image,
        start: Point::new(start_x, start_y),
        end: Point::new(end_x, end_y),
        color: Color::BLUE,
        stroke_width: 1,
    }
}

/// Draws `text` with its top-left corner at `x`, `y`.
pub fn draw_text<'a>(image: &'a mut RgbImage, x: i32, y: i32, text: &'a str) -> DrawText<'a> {
    DrawText {
        image,
        position: Point::new(x, y),
        text,
        color: Color::RED,
    }
}

struct Target<'a>(&'a mut RgbImage);

impl Dimensions for Target<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.0.width(), self.0.height()))
    }
}

impl DrawTarget for Target<'_> {
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(pos, color) in pixels {
            if pos.x >= 0
                && (pos.x as u32) < self.0.width()
                && pos.y >= 0
                && (pos.y as u32) < self.0.height()
            {
                self.0
                    .put_pixel(pos.x as u32, pos.y as u32, Rgb([color.r(), color.g(), color.b()]));
            }
        }

        Ok(())
    }
}

//! In-memory 2D raster surface.
//!
//! Paths are built from `move_to` / `line_to` / `quadratic_curve_to` /
//! `close_path` calls and filled with the even-odd rule. Rasterization is done
//! by `tiny-skia` without anti-aliasing, so each pixel is either covered or not.

use crate::models::Color;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use tiny_skia::{FillRule, Mask, PathBuilder, Transform};

/// A raster canvas with path construction, fills, image blits and PNG export.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbaImage,
    path: PathBuilder,
}

impl Canvas {
    /// Create a `width × height` canvas filled with `fill`.
    pub fn new(width: u32, height: u32, fill: Color) -> Self {
        Self {
            image: RgbaImage::from_pixel(width, height, fill.to_rgba()),
            path: PathBuilder::new(),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            image,
            path: PathBuilder::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Pixel at `(x, y)`, or `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.image.get_pixel_checked(x, y).copied()
    }

    /// Fill an axis-aligned rectangle; parts outside the canvas are clipped.
    pub fn fill_rect(&mut self, x: i64, y: i64, width: u32, height: u32, color: Color) {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + width as i64).min(self.width() as i64);
        let y1 = (y + height as i64).min(self.height() as i64);

        for py in y0..y1 {
            for px in x0..x1 {
                self.blend_pixel(px as u32, py as u32, color);
            }
        }
    }

    // ===== Path construction =====

    /// Discard the current path.
    pub fn begin_path(&mut self) {
        self.path.clear();
    }

    pub fn move_to(&mut self, x: f32, y: f32) {
        self.path.move_to(x, y);
    }

    /// Straight segment from the current point. Starts a subpath if none is open.
    pub fn line_to(&mut self, x: f32, y: f32) {
        if self.path.is_empty() {
            self.path.move_to(x, y);
        } else {
            self.path.line_to(x, y);
        }
    }

    /// Quadratic Bézier from the current point through control `(cx, cy)` to `(x, y)`.
    pub fn quadratic_curve_to(&mut self, cx: f32, cy: f32, x: f32, y: f32) {
        if self.path.is_empty() {
            self.path.move_to(cx, cy);
            self.path.line_to(x, y);
        } else {
            self.path.quad_to(cx, cy, x, y);
        }
    }

    /// Close the current subpath back to its first point.
    pub fn close_path(&mut self) {
        self.path.close();
    }

    /// Trace a rounded rectangle as a new path.
    ///
    /// Corners are quadratic curves with the rectangle corner as control point.
    pub fn rounded_rect(&mut self, x: f32, y: f32, width: f32, height: f32, radius: f32) {
        let r = radius.min(width / 2.0).min(height / 2.0).max(0.0);

        self.begin_path();
        self.move_to(x + r, y);
        self.line_to(x + width - r, y);
        self.quadratic_curve_to(x + width, y, x + width, y + r);
        self.line_to(x + width, y + height - r);
        self.quadratic_curve_to(x + width, y + height, x + width - r, y + height);
        self.line_to(x + r, y + height);
        self.quadratic_curve_to(x, y + height, x, y + height - r);
        self.line_to(x, y + r);
        self.quadratic_curve_to(x, y, x + r, y);
        self.close_path();
    }

    /// Fill the current path (even-odd rule). Subpaths are implicitly closed.
    pub fn fill(&mut self, color: Color) {
        let Some(path) = self.path.clone().finish() else {
            return;
        };
        let Some(mut mask) = Mask::new(self.width(), self.height()) else {
            return;
        };
        mask.fill_path(&path, FillRule::EvenOdd, false, Transform::identity());

        let width = self.width() as usize;
        let covered: Vec<usize> = mask
            .data()
            .iter()
            .enumerate()
            .filter(|(_, coverage)| **coverage > 0)
            .map(|(index, _)| index)
            .collect();

        for index in covered {
            self.blend_pixel((index % width) as u32, (index / width) as u32, color);
        }
    }

    // ===== Images =====

    /// Draw `source` scaled to `width × height` with its top-left at `(x, y)`,
    /// blending by the source alpha.
    pub fn draw_image(&mut self, source: &RgbaImage, x: i64, y: i64, width: u32, height: u32) {
        if width == 0 || height == 0 || source.width() == 0 || source.height() == 0 {
            return;
        }

        if source.dimensions() == (width, height) {
            imageops::overlay(&mut self.image, source, x, y);
        } else {
            let scaled = imageops::resize(source, width, height, FilterType::Triangle);
            imageops::overlay(&mut self.image, &scaled, x, y);
        }
    }

    /// Encode the canvas as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        encode_png(&self.image)
    }

    /// Source-over blend of `color` onto one pixel.
    fn blend_pixel(&mut self, x: u32, y: u32, color: Color) {
        let Some(dst) = self.image.get_pixel_mut_checked(x, y) else {
            return;
        };

        match color.a {
            255 => *dst = color.to_rgba(),
            0 => {}
            alpha => {
                let sa = alpha as f32 / 255.0;
                let da = dst[3] as f32 / 255.0;
                let out_a = sa + da * (1.0 - sa);
                let mix = |s: u8, d: u8| {
                    ((s as f32 * sa + d as f32 * da * (1.0 - sa)) / out_a).round() as u8
                };
                *dst = Rgba([
                    mix(color.r, dst[0]),
                    mix(color.g, dst[1]),
                    mix(color.b, dst[2]),
                    (out_a * 255.0).round() as u8,
                ]);
            }
        }
    }
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Color = Color::rgb(255, 0, 0);

    #[test]
    fn test_new_canvas_is_filled() {
        let canvas = Canvas::new(4, 3, Color::WHITE);
        assert_eq!(canvas.width(), 4);
        assert_eq!(canvas.height(), 3);
        assert_eq!(canvas.pixel(3, 2), Some(Rgba([255, 255, 255, 255])));
        assert_eq!(canvas.pixel(4, 0), None);
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut canvas = Canvas::new(10, 10, Color::WHITE);
        canvas.fill_rect(-5, 8, 8, 10, RED);

        assert_eq!(canvas.pixel(0, 8), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(2, 9), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(3, 9), Some(Color::WHITE.to_rgba()));
        assert_eq!(canvas.pixel(0, 7), Some(Color::WHITE.to_rgba()));
    }

    #[test]
    fn test_fill_axis_aligned_path_matches_rect() {
        let mut path_canvas = Canvas::new(20, 20, Color::WHITE);
        path_canvas.begin_path();
        path_canvas.move_to(2.0, 3.0);
        path_canvas.line_to(12.0, 3.0);
        path_canvas.line_to(12.0, 9.0);
        path_canvas.line_to(2.0, 9.0);
        path_canvas.close_path();
        path_canvas.fill(RED);

        let mut rect_canvas = Canvas::new(20, 20, Color::WHITE);
        rect_canvas.fill_rect(2, 3, 10, 6, RED);

        assert_eq!(path_canvas.image(), rect_canvas.image());
    }

    #[test]
    fn test_rounded_rect_leaves_corners() {
        let mut canvas = Canvas::new(100, 100, Color::WHITE);
        canvas.rounded_rect(10.0, 10.0, 80.0, 80.0, 16.0);
        canvas.fill(RED);

        // Edge midpoints and center are inside
        assert_eq!(canvas.pixel(10, 50), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(89, 50), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(50, 10), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(50, 50), Some(RED.to_rgba()));

        // Extreme corner pixels are cut away
        assert_eq!(canvas.pixel(10, 10), Some(Color::WHITE.to_rgba()));
        assert_eq!(canvas.pixel(89, 89), Some(Color::WHITE.to_rgba()));

        // Outside the rectangle is untouched
        assert_eq!(canvas.pixel(9, 50), Some(Color::WHITE.to_rgba()));
        assert_eq!(canvas.pixel(90, 50), Some(Color::WHITE.to_rgba()));
    }

    #[test]
    fn test_even_odd_fill_leaves_hole() {
        let mut canvas = Canvas::new(30, 30, Color::WHITE);
        canvas.begin_path();
        for (min, max) in [(0.0, 30.0), (10.0, 20.0)] {
            canvas.move_to(min, min);
            canvas.line_to(max, min);
            canvas.line_to(max, max);
            canvas.line_to(min, max);
            canvas.close_path();
        }
        canvas.fill(RED);

        assert_eq!(canvas.pixel(5, 5), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(15, 15), Some(Color::WHITE.to_rgba()));
        assert_eq!(canvas.pixel(25, 15), Some(RED.to_rgba()));
    }

    #[test]
    fn test_fill_keeps_path_until_begin_path() {
        let mut canvas = Canvas::new(10, 10, Color::WHITE);
        canvas.rounded_rect(0.0, 0.0, 10.0, 10.0, 0.0);
        canvas.fill(Color::rgba(0, 0, 0, 128));
        let once = canvas.pixel(5, 5).unwrap();
        canvas.fill(Color::rgba(0, 0, 0, 128));
        assert!(canvas.pixel(5, 5).unwrap()[0] < once[0]);

        canvas.begin_path();
        let before = canvas.image().clone();
        canvas.fill(RED);
        assert_eq!(canvas.image(), &before);
    }

    #[test]
    fn test_translucent_fill_blends() {
        let mut canvas = Canvas::new(2, 2, Color::WHITE);
        canvas.fill_rect(0, 0, 1, 1, Color::rgba(0, 0, 0, 128));

        let px = canvas.pixel(0, 0).unwrap();
        assert!(px[0] > 100 && px[0] < 150, "got {:?}", px);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_draw_image_scales() {
        let mut canvas = Canvas::new(20, 20, Color::WHITE);
        let source = RgbaImage::from_pixel(2, 2, RED.to_rgba());

        canvas.draw_image(&source, 5, 5, 10, 10);

        assert_eq!(canvas.pixel(5, 5), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(14, 14), Some(RED.to_rgba()));
        assert_eq!(canvas.pixel(4, 5), Some(Color::WHITE.to_rgba()));
        assert_eq!(canvas.pixel(15, 14), Some(Color::WHITE.to_rgba()));
    }

    #[test]
    fn test_png_export_decodes() {
        let canvas = Canvas::new(8, 8, RED);
        let png = canvas.to_png().unwrap();

        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.get_pixel(3, 3), &RED.to_rgba());
    }
}

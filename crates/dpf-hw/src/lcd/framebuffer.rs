//! RGB565 framebuffer for the LCD panel.
//!
//! A [`Framebuffer`] is a window (`rect`) into rows of big-endian RGB565
//! pixels. The pixel at `(x, y)` starts at byte
//! `(y - rect.min_y) * stride + (x - rect.min_x) * 2` of the backing storage.
//!
//! The owning form (`Framebuffer<Vec<u8>>`) is the arena. Sub-views borrow
//! that arena (`Framebuffer<&[u8]>` or `Framebuffer<&mut [u8]>`) and keep the
//! parent's stride, so writes through a mutable view land in the parent. The
//! borrow checker guarantees the arena outlives every view derived from it.

use std::borrow::Cow;

use crate::color::{Color, Rgb565, Rgba64};

/// Rectangle with exclusive maximum bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub min_x: i32,
    pub min_y: i32,
    pub max_x: i32,
    pub max_y: i32,
}

impl Rect {
    /// Creates a rectangle, swapping coordinates so that min <= max.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Rectangle anchored at the origin.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    pub fn width(&self) -> u32 {
        (self.max_x - self.min_x).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.max_y - self.min_y).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.min_x >= self.max_x || self.min_y >= self.max_y
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.min_x <= x && x < self.max_x && self.min_y <= y && y < self.max_y
    }

    /// Largest rectangle contained in both. Empty intersections collapse to
    /// the zero rectangle.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect {
            min_x: self.min_x.max(other.min_x),
            min_y: self.min_y.max(other.min_y),
            max_x: self.max_x.min(other.max_x),
            max_y: self.max_y.min(other.max_y),
        };
        if r.is_empty() {
            Rect::default()
        } else {
            r
        }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    /// Splits the rectangle into row-major tiles of at most `width` x `height`.
    /// Tiles on the right and bottom edges are clipped.
    pub fn tiles(self, width: u32, height: u32) -> impl Iterator<Item = Rect> {
        let tw = i32::try_from(width).unwrap_or(i32::MAX).max(1);
        let th = i32::try_from(height).unwrap_or(i32::MAX).max(1);
        (self.min_y..self.max_y)
            .step_by(th as usize)
            .flat_map(move |y| {
                (self.min_x..self.max_x).step_by(tw as usize).map(move |x| Rect {
                    min_x: x,
                    min_y: y,
                    max_x: x.saturating_add(tw).min(self.max_x),
                    max_y: y.saturating_add(th).min(self.max_y),
                })
            })
    }
}

/// A decoded image the framebuffer can convert from.
pub trait Bitmap {
    /// Coordinate window of the image.
    fn bounds(&self) -> Rect;

    /// Color at `(x, y)`; only called for coordinates inside `bounds()`.
    fn color_at(&self, x: i32, y: i32) -> Color;
}

impl Bitmap for image::RgbaImage {
    fn bounds(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }

    fn color_at(&self, x: i32, y: i32) -> Color {
        (*self.get_pixel(x as u32, y as u32)).into()
    }
}

impl Bitmap for image::ImageBuffer<image::Rgba<u16>, Vec<u16>> {
    fn bounds(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }

    fn color_at(&self, x: i32, y: i32) -> Color {
        (*self.get_pixel(x as u32, y as u32)).into()
    }
}

impl Bitmap for image::DynamicImage {
    fn bounds(&self) -> Rect {
        Rect::from_size(self.width(), self.height())
    }

    fn color_at(&self, x: i32, y: i32) -> Color {
        use image::GenericImageView;
        self.get_pixel(x as u32, y as u32).into()
    }
}

impl<B: AsRef<[u8]>> Bitmap for Framebuffer<B> {
    fn bounds(&self) -> Rect {
        self.rect
    }

    fn color_at(&self, x: i32, y: i32) -> Color {
        Color::Native(self.get(x, y))
    }
}

/// RGB565 pixel buffer over a byte container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer<B = Vec<u8>> {
    /// Big-endian RGB565 pixel bytes.
    pix: B,
    /// Bytes between vertically adjacent pixels.
    stride: usize,
    /// Valid coordinate window.
    rect: Rect,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new(Rect::default())
    }
}

impl Framebuffer {
    /// Allocates a zero-filled (black) framebuffer covering `rect`.
    pub fn new(rect: Rect) -> Self {
        let stride = rect.width() as usize * 2;
        Self {
            pix: vec![0; stride * rect.height() as usize],
            stride,
            rect,
        }
    }

    /// Allocates a framebuffer anchored at the origin.
    pub fn with_dimensions(width: u16, height: u16) -> Self {
        Self::new(Rect::from_size(width as u32, height as u32))
    }

    /// Converts a decoded image into a framebuffer with the same bounds.
    pub fn convert_from<I: Bitmap + ?Sized>(src: &I) -> Self {
        let r = src.bounds();
        let mut dst = Self::new(r);
        for y in r.min_y..r.max_y {
            for x in r.min_x..r.max_x {
                dst.set_generic(x, y, src.color_at(x, y));
            }
        }
        dst
    }
}

impl<B: AsRef<[u8]>> Framebuffer<B> {
    /// Returns the coordinate window of the framebuffer.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    /// Returns the byte distance between vertically adjacent pixels.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the width of the framebuffer.
    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    /// Returns the height of the framebuffer.
    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    /// Returns true when the framebuffer covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.rect.is_empty()
    }

    /// Raw backing bytes, starting at the pixel at `rect.min`.
    pub fn as_bytes(&self) -> &[u8] {
        self.pix.as_ref()
    }

    /// Byte index of the pixel at `(x, y)`, if it lies inside the buffer.
    pub fn pix_offset(&self, x: i32, y: i32) -> Option<usize> {
        if !self.rect.contains(x, y) {
            return None;
        }
        let i = (y - self.rect.min_y) as usize * self.stride + (x - self.rect.min_x) as usize * 2;
        (i + 2 <= self.pix.as_ref().len()).then_some(i)
    }

    /// Native color at `(x, y)`, black outside the rectangle.
    pub fn get(&self, x: i32, y: i32) -> Rgb565 {
        match self.pix_offset(x, y) {
            Some(i) => {
                let pix = self.pix.as_ref();
                Rgb565::from_be_bytes([pix[i], pix[i + 1]])
            }
            None => Rgb565::default(),
        }
    }

    /// Generic color at `(x, y)`, opaque black outside the rectangle.
    pub fn get_generic(&self, x: i32, y: i32) -> Rgba64 {
        self.get(x, y).to_generic()
    }

    /// Read-only view of the part of this buffer inside `r`.
    pub fn sub_view(&self, r: Rect) -> Framebuffer<&[u8]> {
        let r = r.intersect(&self.rect);
        // An empty intersection may lie outside both rectangles; indexing
        // the backing bytes with it would be out of range.
        if r.is_empty() {
            return Framebuffer {
                pix: &[],
                stride: 0,
                rect: Rect::default(),
            };
        }
        let i = self.view_start(&r);
        Framebuffer {
            pix: &self.pix.as_ref()[i..],
            stride: self.stride,
            rect: r,
        }
    }

    /// True when the rows of the rectangle are adjacent in memory.
    pub fn is_contiguous(&self) -> bool {
        self.height() <= 1 || self.stride == self.width() as usize * 2
    }

    /// Row-major pixel bytes covering exactly the rectangle.
    ///
    /// Borrows the backing bytes when rows are contiguous and gathers each
    /// row into a new buffer when the stride is wider than the rectangle.
    pub fn export_bytes(&self) -> Cow<'_, [u8]> {
        let row = self.width() as usize * 2;
        let rows = self.height() as usize;
        let pix = self.pix.as_ref();
        if row == 0 || rows == 0 {
            return Cow::Borrowed(&[][..]);
        }
        if self.is_contiguous() {
            return Cow::Borrowed(&pix[..row * rows]);
        }
        let mut out = Vec::with_capacity(row * rows);
        for y in 0..rows {
            let start = y * self.stride;
            out.extend_from_slice(&pix[start..start + row]);
        }
        Cow::Owned(out)
    }

    /// Converts the framebuffer to an RGBA8 image for PNG encoding.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let r = self.rect;
        image::RgbaImage::from_fn(r.width(), r.height(), |x, y| {
            self.get(r.min_x + x as i32, r.min_y + y as i32).into()
        })
    }

    fn view_start(&self, r: &Rect) -> usize {
        (r.min_y - self.rect.min_y) as usize * self.stride
            + (r.min_x - self.rect.min_x) as usize * 2
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Framebuffer<B> {
    /// Sets the native color at `(x, y)`; ignored outside the rectangle.
    pub fn set(&mut self, x: i32, y: i32, color: Rgb565) {
        if let Some(i) = self.pix_offset(x, y) {
            self.pix.as_mut()[i..i + 2].copy_from_slice(&color.to_be_bytes());
        }
    }

    /// Converts and sets a color at `(x, y)`; ignored outside the rectangle.
    pub fn set_generic(&mut self, x: i32, y: i32, color: impl Into<Color>) {
        self.set(x, y, Rgb565::from_generic(color));
    }

    /// Fills the whole rectangle with a solid color.
    pub fn fill(&mut self, color: Rgb565) {
        let r = self.rect;
        self.fill_rect(r, color);
    }

    /// Fills the part of `r` inside the buffer with a solid color.
    pub fn fill_rect(&mut self, r: Rect, color: Rgb565) {
        let r = r.intersect(&self.rect);
        for y in r.min_y..r.max_y {
            for x in r.min_x..r.max_x {
                self.set(x, y, color);
            }
        }
    }

    /// Mutable view of the part of this buffer inside `r`. Writes through the
    /// view are visible in this buffer once the view is dropped.
    pub fn sub_view_mut(&mut self, r: Rect) -> Framebuffer<&mut [u8]> {
        let r = r.intersect(&self.rect);
        if r.is_empty() {
            return Framebuffer {
                pix: Default::default(),
                stride: 0,
                rect: Rect::default(),
            };
        }
        let i = self.view_start(&r);
        let stride = self.stride;
        Framebuffer {
            pix: &mut self.pix.as_mut()[i..],
            stride,
            rect: r,
        }
    }
}

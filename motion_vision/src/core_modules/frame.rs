// THEORY:
// `Frame` and `Plane` are the "dumb" data containers of the engine. Every other
// module reads from or writes into one of them.
//
// Key architectural principles:
// 1.  **Value Semantics**: A `Frame` owns its bytes. The capture stage hands each
//     frame to the input queue by move, so no two workers ever alias the same
//     buffer.
// 2.  **Validated Construction**: A `Frame` can only be built with a non-zero size,
//     one or three channels and a buffer of exactly `width * height * channels`
//     bytes. Downstream code never has to re-check those facts.
// 3.  **One Channel for Everything Else**: Gray images, masks, the opened mask,
//     scratch buffers and the background model are all `Plane`s. A plane is
//     always single-channel and row-major with no padding.
// 4.  **BGR Byte Order**: Color frames store bytes as B, G, R. The `image` crate
//     speaks RGB, so the conversions below swap channels on the way in and out.

use crate::core_modules::bbox::BBox;
use crate::error::{Result, VisionError};
use image::{GrayImage, RgbImage};

/// Number of interleaved channels in a color frame (B, G, R).
pub const COLOR_CHANNELS: u8 = 3;
/// Number of channels in a grayscale frame.
pub const GRAY_CHANNELS: u8 = 1;

/// A dense, owned 8-bit image with one or three interleaved channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VisionError::invalid_frame(format!(
                "frame size must be non-zero, got {width}x{height}"
            )));
        }
        if channels != GRAY_CHANNELS && channels != COLOR_CHANNELS {
            return Err(VisionError::invalid_frame(format!(
                "expected 1 or 3 channels, got {channels}"
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(VisionError::invalid_frame(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Wraps a single-channel plane as a grayscale frame.
    pub fn from_plane(plane: Plane) -> Self {
        Self {
            width: plane.width,
            height: plane.height,
            channels: GRAY_CHANNELS,
            data: plane.data,
        }
    }

    /// Builds a BGR frame from an RGB image.
    pub fn from_rgb_image(image: &RgbImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        let mut data = Vec::with_capacity(image.as_raw().len());
        for px in image.pixels() {
            let [r, g, b] = px.0;
            data.extend_from_slice(&[b, g, r]);
        }
        Self::new(width, height, COLOR_CHANNELS, data)
    }

    pub fn from_gray_image(image: &GrayImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, GRAY_CHANNELS, image.as_raw().clone())
    }

    /// Converts to an RGB image. Gray frames are replicated into all three channels.
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        match self.channels {
            COLOR_CHANNELS => {
                for px in self.data.chunks_exact(3) {
                    rgb.extend_from_slice(&[px[2], px[1], px[0]]);
                }
            }
            _ => {
                for &v in &self.data {
                    rgb.extend_from_slice(&[v, v, v]);
                }
            }
        }
        RgbImage::from_raw(self.width, self.height, rgb)
            .ok_or_else(|| VisionError::ImageConversion("rgb buffer size mismatch".into()))
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Draws the outline of `bbox` (inclusive corners) with the given BGR color.
    /// The stroke grows inward and is clipped to the frame. Gray frames use the
    /// brightest component of `color`.
    pub fn draw_rect(&mut self, bbox: &BBox, color: [u8; 3], thickness: u32) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let max_x = self.width - 1;
        let max_y = self.height - 1;
        if bbox.x1 > max_x || bbox.y1 > max_y {
            return;
        }
        let x2 = bbox.x2.min(max_x);
        let y2 = bbox.y2.min(max_y);

        for inset in 0..thickness.max(1) {
            let left = bbox.x1 + inset;
            let top = bbox.y1 + inset;
            let (Some(right), Some(bottom)) = (x2.checked_sub(inset), y2.checked_sub(inset)) else {
                break;
            };
            if left > right || top > bottom {
                break;
            }
            for x in left..=right {
                self.put(x, top, color);
                self.put(x, bottom, color);
            }
            for y in top..=bottom {
                self.put(left, y, color);
                self.put(right, y, color);
            }
        }
    }

    #[inline]
    fn put(&mut self, x: u32, y: u32, color: [u8; 3]) {
        let idx = y as usize * self.width as usize + x as usize;
        match self.channels {
            COLOR_CHANNELS => self.data[idx * 3..idx * 3 + 3].copy_from_slice(&color),
            _ => self.data[idx] = color.into_iter().max().unwrap_or(0),
        }
    }
}

/// A single-channel 8-bit buffer, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Plane {
    /// A zero-filled plane.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_vec(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(VisionError::invalid_frame(format!(
                "plane buffer holds {} bytes, {width}x{height} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) {
        let w = self.width as usize;
        self.data[y as usize * w + x as usize] = value;
    }

    pub fn row(&self, y: usize) -> &[u8] {
        let w = self.width as usize;
        &self.data[y * w..(y + 1) * w]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        let w = self.width as usize;
        &mut self.data[y * w..(y + 1) * w]
    }

    pub fn fill(&mut self, value: u8) {
        self.data.fill(value);
    }

    /// Fills the axis-aligned rectangle `[x, x + w) x [y, y + h)`, clipped.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, value: u8) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for row in y.min(y_end)..y_end {
            let start = x.min(x_end) as usize;
            self.row_mut(row as usize)[start..x_end as usize].fill(value);
        }
    }

    pub fn to_gray_image(&self) -> Result<GrayImage> {
        GrayImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| VisionError::ImageConversion("gray buffer size mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_buffers() {
        assert!(Frame::new(0, 4, 3, vec![]).is_err());
        assert!(Frame::new(2, 2, 2, vec![0; 8]).is_err());
        assert!(Frame::new(2, 2, 3, vec![0; 11]).is_err());
        assert!(Frame::new(2, 2, 3, vec![0; 12]).is_ok());
        assert!(Plane::from_vec(3, 3, vec![0; 8]).is_err());
    }

    #[test]
    fn rgb_round_trip_swaps_to_bgr() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgb([10, 20, 30]));
        let frame = Frame::from_rgb_image(&img).expect("valid image");
        assert_eq!(&frame.as_bytes()[..3], &[30, 20, 10]);
        let back = frame.to_rgb_image().expect("convertible");
        assert_eq!(back.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn draw_rect_outlines_and_clips() {
        let mut frame = Frame::new(8, 8, 3, vec![0; 8 * 8 * 3]).expect("valid frame");
        let bbox = BBox::new(2, 2, 20, 5);
        frame.draw_rect(&bbox, [0, 0, 255], 1);

        let at = |f: &Frame, x: usize, y: usize| {
            let i = (y * 8 + x) * 3;
            [f.as_bytes()[i], f.as_bytes()[i + 1], f.as_bytes()[i + 2]]
        };
        assert_eq!(at(&frame, 2, 2), [0, 0, 255]);
        assert_eq!(at(&frame, 7, 5), [0, 0, 255]);
        assert_eq!(at(&frame, 7, 3), [0, 0, 255]);
        // interior untouched
        assert_eq!(at(&frame, 4, 3), [0, 0, 0]);
    }

    #[test]
    fn thick_rect_on_gray_frame() {
        let mut frame = Frame::new(10, 10, 1, vec![0; 100]).expect("valid frame");
        frame.draw_rect(&BBox::new(0, 0, 9, 9), [0, 0, 255], 2);
        let bytes = frame.as_bytes();
        assert_eq!(bytes[0], 255);
        assert_eq!(bytes[11], 255);
        assert_eq!(bytes[22], 0);
    }

    #[test]
    fn fill_rect_is_clipped() {
        let mut plane = Plane::new(4, 4);
        plane.fill_rect(2, 2, 10, 10, 255);
        assert_eq!(plane.as_slice().iter().filter(|&&v| v == 255).count(), 4);
        assert_eq!(plane.get(3, 3), 255);
        assert_eq!(plane.get(1, 1), 0);
    }
}

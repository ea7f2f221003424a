// THEORY:
// The `pixel_ops` module holds the point-wise and small-neighbourhood stages of the
// per-frame analysis. Each stage reads one or two planes and writes another, with
// no state of its own; the caller owns every buffer.
//
// Key architectural principles:
// 1.  **8-bit In, 8-bit Out**: Every stage produces values in [0, 255]. Anything that
//     could overflow (the weighted gray sum, the 3-tap blur sum) is computed in a
//     wider type and narrowed exactly once.
// 2.  **Binary Until Blurred**: Thresholding and edge thinning only ever write 0 or
//     255. The box blur is the first stage allowed to produce intermediate values.
// 3.  **Fixed Borders**: The blur does not extrapolate. Boundary columns (horizontal
//     pass) and boundary rows (vertical pass) are forced to zero.

pub mod pixel_ops {
    use crate::core_modules::frame::{COLOR_CHANNELS, Frame, Plane};

    /// Value written for foreground pixels.
    pub const FOREGROUND: u8 = 255;
    /// Value written for background pixels.
    pub const BACKGROUND: u8 = 0;

    const BLUE_WEIGHT: f32 = 0.114;
    const GREEN_WEIGHT: f32 = 0.587;
    const RED_WEIGHT: f32 = 0.299;

    /// Rec. 601 luma of one BGR pixel, rounded to the nearest integer.
    #[inline]
    pub fn luma(b: u8, g: u8, r: u8) -> u8 {
        let y = BLUE_WEIGHT * b as f32 + GREEN_WEIGHT * g as f32 + RED_WEIGHT * r as f32;
        y.round().clamp(0.0, 255.0) as u8
    }

    /// Reduces a frame to one luma plane. Gray frames are copied through.
    ///
    /// # Panics
    /// If `gray` does not have the frame's dimensions.
    pub fn grayscale(frame: &Frame, gray: &mut Plane) {
        assert_eq!(frame.dimensions(), gray.dimensions(), "gray plane size");
        let src = frame.as_bytes();
        let dst = gray.as_mut_slice();
        if frame.channels() == COLOR_CHANNELS {
            for (out, px) in dst.iter_mut().zip(src.chunks_exact(3)) {
                *out = luma(px[0], px[1], px[2]);
            }
        } else {
            dst.copy_from_slice(src);
        }
    }

    /// `mask = 255` where the absolute gray/background difference exceeds `threshold`.
    pub fn diff_threshold(gray: &Plane, background: &Plane, mask: &mut Plane, threshold: u8) {
        assert_eq!(gray.dimensions(), background.dimensions(), "background size");
        assert_eq!(gray.dimensions(), mask.dimensions(), "mask size");
        for ((m, &c), &b) in mask
            .as_mut_slice()
            .iter_mut()
            .zip(gray.as_slice())
            .zip(background.as_slice())
        {
            *m = if c.abs_diff(b) > threshold {
                FOREGROUND
            } else {
                BACKGROUND
            };
        }
    }

    /// Keeps the pixels that are set in `mask` but cleared in `opened`, in place.
    pub fn thin_edges(mask: &mut Plane, opened: &Plane) {
        assert_eq!(mask.dimensions(), opened.dimensions(), "opened size");
        for (m, &o) in mask.as_mut_slice().iter_mut().zip(opened.as_slice()) {
            *m = if *m > o { FOREGROUND } else { BACKGROUND };
        }
    }

    /// Three-tap horizontal mean with integer division; first and last column are zero.
    pub fn blur_horizontal(src: &Plane, dst: &mut Plane) {
        assert_eq!(src.dimensions(), dst.dimensions(), "blur buffer size");
        let width = src.width() as usize;
        for y in 0..src.height() as usize {
            let s = src.row(y);
            let d = dst.row_mut(y);
            d[0] = 0;
            d[width - 1] = 0;
            for x in 1..width.saturating_sub(1) {
                let sum = s[x - 1] as u16 + s[x] as u16 + s[x + 1] as u16;
                d[x] = (sum / 3) as u8;
            }
        }
    }

    /// Three-tap vertical mean with integer division; first and last row are zero.
    pub fn blur_vertical(src: &Plane, dst: &mut Plane) {
        assert_eq!(src.dimensions(), dst.dimensions(), "blur buffer size");
        let height = src.height() as usize;
        for y in 1..height.saturating_sub(1) {
            let (s0, s1, s2) = (src.row(y - 1), src.row(y), src.row(y + 1));
            for (x, d) in dst.row_mut(y).iter_mut().enumerate() {
                let sum = s0[x] as u16 + s1[x] as u16 + s2[x] as u16;
                *d = (sum / 3) as u8;
            }
        }
        dst.row_mut(0).fill(0);
        dst.row_mut(height - 1).fill(0);
    }
}

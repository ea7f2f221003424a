// THEORY:
// Square-window grey morphology used to denoise the foreground mask.
//
// Erosion takes the window minimum and dilation the window maximum over a
// `(2K + 1) x (2K + 1)` square. Neither operator extrapolates past the image edge:
// the band of width `K` along every border is not computed and is written with a
// fixed value instead, 255 for erosion and 0 for dilation. An opening (erode, then
// dilate with the same window) therefore wipes out any blob smaller than the
// window while the interior of larger blobs comes back intact.

use crate::core_modules::frame::Plane;

/// Fixed value of the uncomputed border band after erosion.
pub const ERODE_BORDER: u8 = 255;
/// Fixed value of the uncomputed border band after dilation.
pub const DILATE_BORDER: u8 = 0;

#[derive(Clone, Copy)]
enum Extremum {
    Min,
    Max,
}

/// Window minimum with half-width `radius`. `dst` is fully overwritten.
pub fn erode(src: &Plane, dst: &mut Plane, radius: usize) {
    apply(src, dst, radius, Extremum::Min, ERODE_BORDER);
}

/// Window maximum with half-width `radius`. `dst` is fully overwritten.
pub fn dilate(src: &Plane, dst: &mut Plane, radius: usize) {
    apply(src, dst, radius, Extremum::Max, DILATE_BORDER);
}

/// Erosion followed by dilation. `scratch` receives the eroded mask and `dst` the
/// opened one.
pub fn open(src: &Plane, scratch: &mut Plane, dst: &mut Plane, radius: usize) {
    erode(src, scratch, radius);
    dilate(scratch, dst, radius);
}

fn apply(src: &Plane, dst: &mut Plane, radius: usize, op: Extremum, border: u8) {
    assert_eq!(src.dimensions(), dst.dimensions(), "morphology buffer size");
    dst.fill(border);

    let width = src.width() as usize;
    let height = src.height() as usize;
    if width <= 2 * radius || height <= 2 * radius {
        return;
    }

    let (start, fold): (u8, fn(u8, u8) -> u8) = match op {
        Extremum::Min => (u8::MAX, u8::min as fn(u8, u8) -> u8),
        Extremum::Max => (u8::MIN, u8::max as fn(u8, u8) -> u8),
    };

    for y in radius..height - radius {
        let out = dst.row_mut(y);
        for x in radius..width - radius {
            let mut acc = start;
            for wy in y - radius..=y + radius {
                let window = &src.row(wy)[x - radius..=x + radius];
                acc = window.iter().copied().fold(acc, fold);
            }
            out[x] = acc;
        }
    }
}

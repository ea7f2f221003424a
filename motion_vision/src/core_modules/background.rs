// THEORY:
// The `BackgroundModel` is the only piece of long-lived learned state in the
// per-frame analysis. It is a running estimate of the static scene, one 8-bit value
// per pixel, updated by blending each new gray frame in at a small fixed rate
// (an exponential moving average with smoothing factor alpha).
//
// Key architectural principles:
// 1.  **Exclusive Ownership**: One model belongs to exactly one worker for that
//     worker's whole life. It is never locked and never shared; each worker learns
//     only from the frames it happens to process.
// 2.  **Cold Start at Zero**: A fresh model is all zeros, so the first frame a
//     worker sees is compared against black.
// 3.  **Rounded Blend**: `bg = round(alpha * gray + (1 - alpha) * bg)`, so a static
//     scene is approached to within a few levels rather than stalling early.

use crate::core_modules::frame::Plane;

/// Per-pixel exponential moving average of the gray scene.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    estimate: Plane,
    alpha: f32,
    frames_seen: u64,
}

impl BackgroundModel {
    pub fn new(width: u32, height: u32, alpha: f32) -> Self {
        Self {
            estimate: Plane::new(width, height),
            alpha,
            frames_seen: 0,
        }
    }

    /// Blends `gray` into the estimate in place.
    pub fn update(&mut self, gray: &Plane) {
        assert_eq!(gray.dimensions(), self.estimate.dimensions(), "background size");
        let alpha = self.alpha;
        let keep = 1.0 - alpha;
        for (bg, &cur) in self.estimate.as_mut_slice().iter_mut().zip(gray.as_slice()) {
            let blended = alpha * cur as f32 + keep * *bg as f32;
            *bg = blended.round().clamp(0.0, 255.0) as u8;
        }
        self.frames_seen += 1;
    }

    pub fn estimate(&self) -> &Plane {
        &self.estimate
    }

    /// Number of updates applied so far.
    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_black_and_moves_toward_the_scene() {
        let mut model = BackgroundModel::new(2, 1, 0.05);
        assert_eq!(model.estimate().as_slice(), &[0, 0]);

        let scene = Plane::from_vec(2, 1, vec![100, 0]).expect("plane");
        model.update(&scene);
        assert_eq!(model.estimate().as_slice(), &[5, 0]);
        model.update(&scene);
        // 0.05 * 100 + 0.95 * 5 = 9.75
        assert_eq!(model.estimate().as_slice(), &[10, 0]);
        assert_eq!(model.frames_seen(), 2);
    }

    #[test]
    fn converges_on_a_static_bright_scene() {
        let mut model = BackgroundModel::new(1, 1, 0.05);
        let scene = Plane::filled(1, 1, 255);
        for _ in 0..400 {
            model.update(&scene);
        }
        // rounding lets the estimate settle within a few levels of the scene
        assert!(model.estimate().get(0, 0) >= 245);
    }
}

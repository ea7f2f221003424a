// THEORY:
// `BBox` is the spatial currency of the detection layer. A tile produced by the
// grid scan and a merged object box are the same type; only their provenance
// differs. Coordinates are inclusive pixel positions with `x1 <= x2, y1 <= y2`.

/// An axis-aligned box in pixel coordinates, corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        debug_assert!(x1 <= x2 && y1 <= y2, "inverted box {x1},{y1},{x2},{y2}");
        Self { x1, y1, x2, y2 }
    }

    /// Extent along x, as `x2 - x1`.
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    /// Extent along y, as `y2 - y1`.
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// `(x2 - x1) * (y2 - y1)`; a one-pixel-wide box has zero area.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// The smallest box containing both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// True when the boxes overlap or each lies within `gap` pixels of the other
    /// on both axes (8-neighbourhood proximity).
    pub fn is_near(&self, other: &BBox, gap: u32) -> bool {
        let reach = |edge: u32| edge.saturating_add(gap);
        !(reach(self.x2) < other.x1
            || reach(other.x2) < self.x1
            || reach(self.y2) < other.y1
            || reach(other.y2) < self.y1)
    }

    pub fn contains(&self, other: &BBox) -> bool {
        self.x1 <= other.x1 && self.y1 <= other.y1 && self.x2 >= other.x2 && self.y2 >= other.y2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proximity_is_inclusive_of_the_gap() {
        let a = BBox::new(0, 0, 10, 10);
        assert!(a.is_near(&BBox::new(26, 0, 36, 10), 16));
        assert!(!a.is_near(&BBox::new(27, 0, 37, 10), 16));
        // near on x but far on y
        assert!(!a.is_near(&BBox::new(0, 40, 10, 50), 16));
        // symmetric
        assert!(BBox::new(26, 0, 36, 10).is_near(&a, 16));
    }

    #[test]
    fn area_and_union() {
        let a = BBox::new(0, 0, 10, 20);
        assert_eq!(a.area(), 200);
        let u = a.union(&BBox::new(5, 30, 12, 31));
        assert_eq!(u, BBox::new(0, 0, 12, 31));
        assert!(u.contains(&a));
    }
}

// THEORY:
// The `TileGrid` turns a mask into a list of candidate boxes, one per grid cell.
//
// Key architectural principles:
// 1.  **Fixed Spatial Pooling**: The mask is cut into square cells of `tile_size`
//     pixels anchored at (0, 0). Cells along the right and bottom edge may be
//     partial. The grid is sized once per frame geometry and reused.
// 2.  **Tight Extent per Cell**: For every cell holding at least one non-zero pixel,
//     the min/max x and y of those pixels form a tile. A tile must have strictly
//     positive width and height; a cell whose foreground is a single row or
//     column yields nothing.
// 3.  **Area Gate**: Tiles whose `(x2 - x1) * (y2 - y1)` falls below the minimum area
//     are treated as noise and dropped before merging.
// 4.  **Row-Major Output**: Tiles are emitted in grid-scan order, which is the order
//     the merger depends on.

use crate::core_modules::bbox::BBox;
use crate::core_modules::frame::Plane;

/// A fixed partition of a `width x height` image into square cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    /// The width of the full image in pixels.
    width: u32,
    /// The height of the full image in pixels.
    height: u32,
    /// Side of one cell in pixels.
    tile_size: u32,
    /// Cells per row, counting a trailing partial cell.
    columns: u32,
    /// Cells per column, counting a trailing partial cell.
    rows: u32,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        let tile_size = tile_size.max(1);
        Self {
            width,
            height,
            tile_size,
            columns: width.div_ceil(tile_size),
            rows: height.div_ceil(tile_size),
        }
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Pixel bounds `[x0, x1) x [y0, y1)` of the cell at grid position `(col, row)`.
    pub fn cell_bounds(&self, col: u32, row: u32) -> (u32, u32, u32, u32) {
        let x0 = col * self.tile_size;
        let y0 = row * self.tile_size;
        (
            x0,
            y0,
            (x0 + self.tile_size).min(self.width),
            (y0 + self.tile_size).min(self.height),
        )
    }

    /// Scans every cell of `mask` and returns the tight box of its foreground pixels.
    pub fn extract(&self, mask: &Plane) -> Vec<BBox> {
        assert_eq!(mask.dimensions(), (self.width, self.height), "mask size");
        let mut tiles = Vec::new();

        for row in 0..self.rows {
            for col in 0..self.columns {
                let (x0, y0, x_end, y_end) = self.cell_bounds(col, row);
                if let Some(tile) = Self::cell_extent(mask, x0, y0, x_end, y_end) {
                    tiles.push(tile);
                }
            }
        }

        tiles
    }

    fn cell_extent(mask: &Plane, x0: u32, y0: u32, x_end: u32, y_end: u32) -> Option<BBox> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut found = false;

        for y in y0..y_end {
            let span = &mask.row(y as usize)[x0 as usize..x_end as usize];
            let Some(first) = span.iter().position(|&v| v != 0) else {
                continue;
            };
            // `rposition` cannot miss once `position` has hit
            let last = span.iter().rposition(|&v| v != 0).unwrap_or(first);
            min_x = min_x.min(x0 + first as u32);
            max_x = max_x.max(x0 + last as u32);
            min_y = min_y.min(y);
            max_y = y;
            found = true;
        }

        (found && max_x > min_x && max_y > min_y).then(|| BBox::new(min_x, min_y, max_x, max_y))
    }
}

/// Keeps tiles whose area is at least `min_area`, preserving order.
pub fn filter_by_area(tiles: Vec<BBox>, min_area: u64) -> Vec<BBox> {
    tiles.into_iter().filter(|t| t.area() >= min_area).collect()
}

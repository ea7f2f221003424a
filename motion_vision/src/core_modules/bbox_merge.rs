// THEORY:
// The `bbox_merge` module is the spatial grouping layer. It clusters the per-cell
// tiles into object-level boxes.
//
// Key architectural principles & algorithm steps:
// 1.  **Greedy Single Pass**: Tiles are visited in grid-scan order. Each tile is
//     compared against the groups built so far, in creation order. The FIRST group
//     it touches (overlap, or within `gap` pixels on both axes) absorbs it, and the
//     group's box grows to the union. A tile touching nothing starts a new group.
// 2.  **No Re-merging**: Groups are never compared with each other. When a union
//     makes two existing groups touch, they stay separate, so the result only
//     approximates connected-component labelling.
// 3.  **Optional Convergence**: The `Converge` strategy repeats the greedy pass over
//     its own output until a pass merges nothing, which guarantees that no two
//     output boxes are within `gap` of each other.
// 4.  **Stateless Utility**: Like the tile extractor, merging has no memory of
//     earlier frames.

use crate::core_modules::bbox::BBox;

/// How tiles are clustered into object boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// One first-match pass; adjacent groups may survive side by side.
    #[default]
    Greedy,
    /// Greedy passes repeated until a fixed point.
    Converge,
}

pub mod bbox_merge {
    use super::*; // Make BBox and MergeStrategy available.

    /// Clusters `tiles` into object boxes.
    pub fn merge_tiles(tiles: &[BBox], gap: u32, strategy: MergeStrategy) -> Vec<BBox> {
        let mut merged = greedy_pass(tiles, gap);
        if strategy == MergeStrategy::Converge {
            loop {
                let next = greedy_pass(&merged, gap);
                if next.len() == merged.len() {
                    break;
                }
                merged = next;
            }
        }
        merged
    }

    /// One first-match pass over `boxes` in order.
    pub fn greedy_pass(boxes: &[BBox], gap: u32) -> Vec<BBox> {
        let mut groups: Vec<BBox> = Vec::new();
        for tile in boxes {
            match groups.iter_mut().find(|group| group.is_near(tile, gap)) {
                Some(group) => *group = group.union(tile),
                None => groups.push(*tile),
            }
        }
        groups
    }
}

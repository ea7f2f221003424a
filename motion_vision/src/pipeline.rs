// THEORY:
// The `pipeline` module is the single-threaded heart of the engine. A
// `FrameAnalyzer` takes one frame at a time through the full analysis stack and
// hands back a mask and a list of object boxes. The threaded orchestration in
// `parallel_pipeline` gives every worker its own `FrameAnalyzer`; nothing in here
// knows about threads or queues.
//
// Stage order (each stage reads the previous stage's buffer):
// 1.  Grayscale reduction of the color frame.
// 2.  Background differencing against the analyzer's private background model,
//     thresholded to a binary mask.
// 3.  Opening (erode, then dilate) of the mask.
// 4.  Edge thinning: keep what the raw mask has and the opened mask lost.
// 5.  Separable 3x3 box blur of the thinned mask.
// 6.  Background model update from the gray frame.
// 7.  Tile extraction on the blurred mask, area filter, and merge into objects.
//
// Buffers are sized on the first frame and reused. A later frame with different
// dimensions is rejected with `VisionError::DimensionMismatch`; the analyzer's
// state is left untouched so the caller can simply skip that frame.

use crate::core_modules::background::BackgroundModel;
use crate::core_modules::bbox_merge::bbox_merge;
use crate::core_modules::frame::{Frame, Plane};
use crate::core_modules::morphology;
use crate::core_modules::pixel_ops::pixel_ops;
use crate::core_modules::tile_grid::{self, TileGrid};
use crate::error::{Result, VisionError};
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::bbox::BBox;
pub use crate::core_modules::bbox_merge::MergeStrategy;

/// Tunables of the per-frame analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Half-width K of the square morphology window, which is `(2K + 1)` wide.
    pub morph_radius: usize,
    /// Side of one grid cell for tile extraction, in pixels.
    pub tile_size: u32,
    /// A pixel is foreground when `|gray - background|` is strictly above this.
    pub diff_threshold: u8,
    /// Background smoothing factor alpha in `(0, 1]`.
    pub background_alpha: f32,
    /// Tiles with `(x2 - x1) * (y2 - y1)` below this are noise.
    pub min_tile_area: u64,
    /// Boxes closer than this many pixels on both axes belong to one object.
    pub merge_gap: u32,
    pub merge_strategy: MergeStrategy,
    /// BGR color of the drawn object boxes.
    pub box_color: [u8; 3],
    pub box_thickness: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let tile_size = 32;
        Self {
            morph_radius: 2,
            tile_size,
            diff_threshold: 30,
            background_alpha: 0.05,
            min_tile_area: 200,
            merge_gap: tile_size / 2,
            merge_strategy: MergeStrategy::Greedy,
            box_color: [0, 0, 255],
            box_thickness: 2,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(VisionError::config("tile_size must be at least 1"));
        }
        if !(self.background_alpha > 0.0 && self.background_alpha <= 1.0) {
            return Err(VisionError::config(format!(
                "background_alpha must be in (0, 1], got {}",
                self.background_alpha
            )));
        }
        Ok(())
    }
}

/// What one analysis pass produced.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    /// The blurred edge mask the tiles were extracted from.
    pub mask: Plane,
    /// Tiles that passed the area filter.
    pub tile_count: usize,
    /// Merged object boxes, in creation order.
    pub objects: Vec<BBox>,
}

/// Buffers sized for one frame geometry.
struct Workspace {
    grid: TileGrid,
    background: BackgroundModel,
    gray: Plane,
    mask: Plane,
    eroded: Plane,
    opened: Plane,
    blurred: Plane,
}

impl Workspace {
    fn new(width: u32, height: u32, config: &AnalysisConfig) -> Self {
        debug!(width, height, "sizing analysis buffers");
        Self {
            grid: TileGrid::new(width, height, config.tile_size),
            background: BackgroundModel::new(width, height, config.background_alpha),
            gray: Plane::new(width, height),
            mask: Plane::new(width, height),
            eroded: Plane::new(width, height),
            opened: Plane::new(width, height),
            blurred: Plane::new(width, height),
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }
}

/// Stateful per-worker analyzer. Owns one background model.
pub struct FrameAnalyzer {
    config: AnalysisConfig,
    workspace: Option<Workspace>,
}

impl FrameAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            workspace: None,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// The private background model, once the first frame has sized it.
    pub fn background(&self) -> Option<&BackgroundModel> {
        self.workspace.as_ref().map(|ws| &ws.background)
    }

    /// Runs every stage on `frame` and updates the background model.
    pub fn analyze(&mut self, frame: &Frame) -> Result<FrameAnalysis> {
        let actual = frame.dimensions();
        let ws = self
            .workspace
            .get_or_insert_with(|| Workspace::new(actual.0, actual.1, &self.config));
        if ws.dimensions() != actual {
            return Err(VisionError::DimensionMismatch {
                expected: ws.dimensions(),
                actual,
            });
        }

        // --- 1-2. Grayscale and background difference ---
        pixel_ops::grayscale(frame, &mut ws.gray);
        pixel_ops::diff_threshold(
            &ws.gray,
            ws.background.estimate(),
            &mut ws.mask,
            self.config.diff_threshold,
        );

        // --- 3-4. Opening, then keep only what the opening removed ---
        morphology::open(
            &ws.mask,
            &mut ws.eroded,
            &mut ws.opened,
            self.config.morph_radius,
        );
        pixel_ops::thin_edges(&mut ws.mask, &ws.opened);

        // --- 5. Smoothing; the horizontal pass goes through `blurred` and back ---
        pixel_ops::blur_horizontal(&ws.mask, &mut ws.blurred);
        pixel_ops::blur_vertical(&ws.blurred, &mut ws.mask);

        // --- 6. Background update ---
        ws.background.update(&ws.gray);

        // --- 7. Tiles and objects ---
        let tiles =
            tile_grid::filter_by_area(ws.grid.extract(&ws.mask), self.config.min_tile_area);
        let objects =
            bbox_merge::merge_tiles(&tiles, self.config.merge_gap, self.config.merge_strategy);

        Ok(FrameAnalysis {
            mask: ws.mask.clone(),
            tile_count: tiles.len(),
            objects,
        })
    }

    /// Draws `objects` onto `frame` with the configured color and thickness.
    pub fn annotate(&self, frame: &mut Frame, objects: &[BBox]) {
        for bbox in objects {
            frame.draw_rect(bbox, self.config.box_color, self.config.box_thickness);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(plane: Plane) -> Frame {
        Frame::from_plane(plane)
    }

    #[test]
    fn moving_square_yields_one_box_inside_its_footprint() {
        let mut analyzer = FrameAnalyzer::new(AnalysisConfig::default());

        let empty = analyzer
            .analyze(&gray_frame(Plane::new(64, 64)))
            .expect("first frame");
        assert!(empty.objects.is_empty());
        assert!(empty.mask.as_slice().iter().all(|&v| v == 0));

        let mut square = Plane::new(64, 64);
        square.fill_rect(0, 0, 40, 40, 255);
        let moved = gray_frame(square);
        let result = analyzer.analyze(&moved).expect("second frame");

        assert_eq!(result.objects.len(), 1, "{:?}", result.objects);
        let bbox = result.objects[0];
        assert!(bbox.x2 > bbox.x1 && bbox.y2 > bbox.y1);
        assert!(bbox.x2 < 40 && bbox.y2 < 40, "{bbox:?} leaves the square");
        // only the edge band left of the erosion border survives thinning,
        // which blurs into the top-left tile
        assert_eq!(bbox, BBox::new(1, 1, 31, 31));
        assert_eq!(result.tile_count, 1);
    }

    #[test]
    fn static_scene_produces_nothing_after_warmup() {
        let mut config = AnalysisConfig::default();
        config.background_alpha = 1.0;
        let mut analyzer = FrameAnalyzer::new(config);
        let mut scene = Plane::new(64, 64);
        scene.fill_rect(10, 10, 30, 30, 200);

        let warmup = gray_frame(scene.clone());
        analyzer.analyze(&warmup).expect("warmup");
        let steady = analyzer.analyze(&gray_frame(scene)).expect("steady");
        assert!(steady.objects.is_empty());
        assert!(steady.mask.as_slice().iter().all(|&v| v == 0));
        let bg = analyzer.background().expect("sized");
        assert_eq!(bg.frames_seen(), 2);
        assert_eq!(bg.estimate().get(20, 20), 200);
    }

    #[test]
    fn dimension_change_is_rejected_without_touching_state() {
        let mut analyzer = FrameAnalyzer::new(AnalysisConfig::default());
        analyzer
            .analyze(&gray_frame(Plane::new(64, 64)))
            .expect("first frame");
        let err = analyzer
            .analyze(&gray_frame(Plane::new(32, 32)))
            .expect_err("size change");
        assert!(matches!(
            err,
            VisionError::DimensionMismatch {
                expected: (64, 64),
                actual: (32, 32)
            }
        ));
        assert_eq!(analyzer.background().map(|bg| bg.frames_seen()), Some(1));
    }

    #[test]
    fn annotate_draws_in_the_configured_color() {
        let analyzer = FrameAnalyzer::new(AnalysisConfig::default());
        let mut frame = Frame::new(8, 8, 3, vec![0; 8 * 8 * 3]).expect("frame");
        analyzer.annotate(&mut frame, &[BBox::new(1, 1, 6, 6)]);
        let i = (8 + 1) * 3;
        assert_eq!(&frame.as_bytes()[i..i + 3], &[0, 0, 255]);
    }

    #[test]
    fn config_validation() {
        assert!(AnalysisConfig::default().validate().is_ok());
        let bad = AnalysisConfig {
            background_alpha: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(bad.validate().is_err());
        let bad = AnalysisConfig {
            tile_size: 0,
            ..AnalysisConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}

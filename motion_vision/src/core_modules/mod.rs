pub mod background;
pub mod bbox;
pub mod bbox_merge;
pub mod frame;
pub mod morphology;
pub mod pixel_ops;
pub mod tile_grid;
pub mod work_queue;

// THEORY:
// This file is the main entry point for the `motion_vision` library crate. It
// defines the public API handed to consumers such as the `motion_tester` runner.
//
// Two levels are exported:
// - `FrameAnalyzer` (in `pipeline`) analyzes one frame at a time on the caller's
//   thread and is what every worker runs internally.
// - `ParallelPipeline` (in `parallel_pipeline`) runs capture, a pool of analysis
//   workers, and hand-off queues on OS threads, and delivers `AnalyzedFrame`s in
//   completion order. `ReorderBuffer` puts them back into capture order.
//
// The image-processing building blocks live in `core_modules` and stay usable on
// their own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod reorder;

pub use core_modules::frame::{Frame, Plane};
pub use core_modules::work_queue::{Capacity, OverflowPolicy, StopToken, WorkQueue};
pub use error::{Result, VisionError};
pub use parallel_pipeline::{
    AnalyzedFrame, Dispatch, FrameSource, ParallelPipeline, PipelineConfig, PipelineHandle,
    PipelineReport, Stopper, WorkerStats,
};
pub use pipeline::{AnalysisConfig, BBox, FrameAnalysis, FrameAnalyzer, MergeStrategy};
pub use reorder::{ReorderBuffer, Sequenced};

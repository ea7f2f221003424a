// THEORY:
// The `parallel_pipeline` wires a frame source, a pool of analysis workers and a
// consumer together with `WorkQueue`s. Every stage is an OS thread:
//
//   capture thread --(input queue(s), bounded)--> N workers --(output queue)--> caller
//
// Key architectural principles:
// 1.  **Backpressure from the Workers**: The input queue is bounded and blocks, so
//     capture never runs further ahead of the workers than the queue allows.
// 2.  **Per-Worker Background**: Every worker owns a `FrameAnalyzer` and therefore
//     its own background model. Workers never share learned state.
// 3.  **Two Dispatch Modes**: `Dispatch::Shared` lets idle workers pull from one
//     common queue. `Dispatch::RoundRobin` gives each worker a private queue and
//     capture deals frame `i` to worker `i % N`, so every worker sees a fixed,
//     evenly spaced slice of the stream.
// 4.  **Ordered Shutdown**: Capture marks the input queue(s) finished when the
//     source runs dry. The output queue is marked finished only when the LAST
//     worker exits, so the consumer drains every analyzed frame and then sees the
//     end of the stream. A round-robin worker also finishes its private queue on
//     the way out, so a worker that died early makes capture stop instead of
//     blocking forever on a lane nobody drains.
// 5.  **Cooperative Stop**: A shared `StopToken` aborts everything. Raising it
//     through `PipelineHandle::stop` (or a `Stopper`) also wakes every queue so no
//     thread stays parked.
// 6.  **Completion Order**: Results leave the output queue in the order workers
//     finish them. Each carries its capture index so a `ReorderBuffer` can restore
//     stream order when the consumer needs it.

use crate::core_modules::frame::{Frame, Plane};
use crate::core_modules::work_queue::{
    Capacity, OverflowPolicy, PushOutcome, StopToken, WorkQueue,
};
use crate::error::{Result, VisionError};
use crate::pipeline::{AnalysisConfig, BBox, FrameAnalyzer};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

pub const DEFAULT_WORKERS: usize = 6;
pub const DEFAULT_INPUT_CAPACITY: usize = 5;

/// Anything that can hand out frames until it runs dry.
pub trait FrameSource: Send {
    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<I> FrameSource for I
where
    I: Iterator<Item = Frame> + Send,
{
    fn next_frame(&mut self) -> Option<Frame> {
        self.next()
    }
}

/// How captured frames reach the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// One queue shared by all workers; whichever is idle takes the next frame.
    #[default]
    Shared,
    /// One queue per worker; frame `i` goes to worker `i % N`.
    RoundRobin,
}

/// Configuration for the threaded pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Settings each worker's `FrameAnalyzer` is built from.
    pub analysis: AnalysisConfig,
    /// Number of analysis workers. `0` means one per logical CPU.
    pub workers: usize,
    /// Total number of frames waiting between capture and the workers. Under
    /// round-robin dispatch it is split evenly across the per-worker queues.
    pub input_capacity: usize,
    /// Bound on analyzed frames waiting for the consumer.
    pub output_capacity: Capacity,
    /// What a worker does when a bounded output queue is full.
    pub output_overflow: OverflowPolicy,
    pub dispatch: Dispatch,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            workers: DEFAULT_WORKERS,
            input_capacity: DEFAULT_INPUT_CAPACITY,
            output_capacity: Capacity::Unbounded,
            output_overflow: OverflowPolicy::Block,
            dispatch: Dispatch::Shared,
        }
    }
}

impl PipelineConfig {
    /// The number of workers that will actually be spawned.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        if self.input_capacity == 0 {
            return Err(VisionError::config("input_capacity must be at least 1"));
        }
        if self.output_capacity == Capacity::Bounded(0) {
            return Err(VisionError::config(
                "a bounded output queue needs room for one frame",
            ));
        }
        Ok(())
    }

    fn per_queue_capacity(&self, workers: usize) -> usize {
        match self.dispatch {
            Dispatch::Shared => self.input_capacity,
            Dispatch::RoundRobin => self.input_capacity.div_ceil(workers).max(1),
        }
    }
}

/// A captured frame tagged with its position in the stream.
struct FrameTask {
    index: u64,
    frame: Frame,
}

/// One frame after analysis, as delivered to the consumer.
#[derive(Debug, Clone)]
pub struct AnalyzedFrame {
    /// Zero-based capture index.
    pub index: u64,
    /// Id of the worker that analyzed the frame.
    pub worker: usize,
    /// The input frame with object boxes drawn on it.
    pub frame: Frame,
    pub mask: Plane,
    pub tile_count: usize,
    pub objects: Vec<BBox>,
}

/// Per-worker counters, returned when the worker exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub worker: usize,
    /// Frames analyzed and handed to the output queue.
    pub processed: u64,
    /// Frames rejected by the analyzer.
    pub skipped: u64,
    /// Analyzed frames lost to the output overflow policy.
    pub dropped: u64,
}

/// Summary of a finished pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Frames taken from the source and queued for analysis.
    pub frames_captured: u64,
    pub workers: Vec<WorkerStats>,
}

impl PipelineReport {
    pub fn processed(&self) -> u64 {
        self.workers.iter().map(|w| w.processed).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.workers.iter().map(|w| w.skipped).sum()
    }

    pub fn dropped(&self) -> u64 {
        self.workers.iter().map(|w| w.dropped).sum()
    }
}

/// A queue that can be woken without knowing its item type.
trait Wake: Send + Sync {
    fn wake(&self);
}

impl<T: Send> Wake for WorkQueue<T> {
    fn wake(&self) {
        self.wake_all();
    }
}

/// Cloneable handle that aborts a running pipeline from any thread.
#[derive(Clone)]
pub struct Stopper {
    token: StopToken,
    queues: Vec<Arc<dyn Wake>>,
}

impl Stopper {
    /// Raises the stop token and wakes every blocked stage.
    pub fn stop(&self) {
        if !self.token.is_stopped() {
            info!("pipeline stop requested");
        }
        self.token.stop();
        for queue in &self.queues {
            queue.wake();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_stopped()
    }
}

/// Marks the wrapped queues finished when dropped, including during a panic.
struct FinishOnDrop<T>(Vec<Arc<WorkQueue<T>>>);

impl<T> Drop for FinishOnDrop<T> {
    fn drop(&mut self) {
        for queue in &self.0 {
            queue.signal_finished();
        }
    }
}

/// Counts down the live workers; the last one out finishes the output queue.
/// Under round-robin dispatch it also finishes the worker's private lane.
struct WorkerExit {
    live: Arc<AtomicUsize>,
    output: Arc<WorkQueue<AnalyzedFrame>>,
    lane: Option<Arc<WorkQueue<FrameTask>>>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if let Some(lane) = &self.lane {
            lane.signal_finished();
        }
        if self.live.fetch_sub(1, Ordering::AcqRel) == 1 {
            debug!("last worker exited, closing output");
            self.output.signal_finished();
        }
    }
}

struct WorkerContext {
    id: usize,
    input: Arc<WorkQueue<FrameTask>>,
    output: Arc<WorkQueue<AnalyzedFrame>>,
    analyzer: FrameAnalyzer,
    _exit: WorkerExit,
}

/// Builds and launches pipeline runs.
pub struct ParallelPipeline {
    config: PipelineConfig,
}

impl ParallelPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawns the capture thread and the workers, then returns immediately.
    pub fn start<S>(&self, source: S) -> Result<PipelineHandle>
    where
        S: FrameSource + 'static,
    {
        let workers = self.config.worker_count();
        let per_queue = self.config.per_queue_capacity(workers);
        let stop = StopToken::new();

        let input_count = match self.config.dispatch {
            Dispatch::Shared => 1,
            Dispatch::RoundRobin => workers,
        };
        let inputs: Vec<Arc<WorkQueue<FrameTask>>> = (0..input_count)
            .map(|_| Arc::new(WorkQueue::bounded(per_queue, stop.clone())))
            .collect();
        let output = Arc::new(WorkQueue::new(
            self.config.output_capacity,
            self.config.output_overflow,
            stop.clone(),
        ));

        let mut queues: Vec<Arc<dyn Wake>> = Vec::with_capacity(input_count + 1);
        queues.extend(inputs.iter().map(|q| Arc::clone(q) as Arc<dyn Wake>));
        queues.push(Arc::clone(&output) as Arc<dyn Wake>);

        let mut handle = PipelineHandle {
            output: Arc::clone(&output),
            stopper: Stopper {
                token: stop.clone(),
                queues,
            },
            capture: None,
            workers: Vec::with_capacity(workers),
        };

        info!(
            workers,
            dispatch = ?self.config.dispatch,
            input_capacity = per_queue,
            output_capacity = ?self.config.output_capacity,
            "starting pipeline"
        );

        let live = Arc::new(AtomicUsize::new(workers));
        for id in 0..workers {
            let input = Arc::clone(&inputs[id % input_count]);
            let lane = match self.config.dispatch {
                Dispatch::Shared => None,
                Dispatch::RoundRobin => Some(Arc::clone(&input)),
            };
            let ctx = WorkerContext {
                id,
                input,
                output: Arc::clone(&output),
                analyzer: FrameAnalyzer::new(self.config.analysis.clone()),
                _exit: WorkerExit {
                    live: Arc::clone(&live),
                    output: Arc::clone(&output),
                    lane,
                },
            };
            let spawned = thread::Builder::new()
                .name(format!("motion-worker-{id}"))
                .spawn(move || run_worker(ctx));
            match spawned {
                Ok(worker) => handle.workers.push(worker),
                Err(err) => {
                    error!(worker = id, %err, "failed to spawn worker");
                    handle.shutdown();
                    return Err(err.into());
                }
            }
        }

        let capture_inputs = inputs;
        let capture_stop = stop;
        let spawned = thread::Builder::new()
            .name("motion-capture".to_string())
            .spawn(move || run_capture(source, capture_inputs, capture_stop));
        match spawned {
            Ok(capture) => handle.capture = Some(capture),
            Err(err) => {
                error!(%err, "failed to spawn capture thread");
                handle.shutdown();
                return Err(err.into());
            }
        }

        Ok(handle)
    }

    /// Runs the pipeline to completion on the calling thread, feeding every
    /// analyzed frame to `sink` in completion order. Returning `false` from the
    /// sink stops the pipeline.
    pub fn run<S, F>(&self, source: S, mut sink: F) -> Result<PipelineReport>
    where
        S: FrameSource + 'static,
        F: FnMut(AnalyzedFrame) -> bool,
    {
        let handle = self.start(source)?;
        while let Some(analyzed) = handle.recv() {
            if !sink(analyzed) {
                handle.stop();
                break;
            }
        }
        handle.join()
    }
}

fn run_capture<S: FrameSource>(
    mut source: S,
    inputs: Vec<Arc<WorkQueue<FrameTask>>>,
    stop: StopToken,
) -> u64 {
    let inputs = FinishOnDrop(inputs);
    let lanes = inputs.0.len() as u64;
    let mut index = 0u64;

    while !stop.is_stopped() {
        let Some(frame) = source.next_frame() else {
            debug!("frame source exhausted");
            break;
        };
        let lane = (index % lanes) as usize;
        let task = FrameTask { index, frame };
        if let PushOutcome::Closed(_) = inputs.0[lane].push(task) {
            if !stop.is_stopped() {
                warn!(lane, frame = index, "worker lane closed, ending capture");
            }
            break;
        }
        index += 1;
    }

    info!(frames = index, stopped = stop.is_stopped(), "capture finished");
    index
}

fn run_worker(mut ctx: WorkerContext) -> WorkerStats {
    let mut stats = WorkerStats {
        worker: ctx.id,
        ..WorkerStats::default()
    };
    debug!(worker = ctx.id, "worker started");

    while let Some(FrameTask { index, mut frame }) = ctx.input.pop() {
        let analysis = match ctx.analyzer.analyze(&frame) {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!(worker = ctx.id, frame = index, %err, "skipping frame");
                stats.skipped += 1;
                continue;
            }
        };
        ctx.analyzer.annotate(&mut frame, &analysis.objects);
        stats.processed += 1;
        debug!(
            worker = ctx.id,
            frame = index,
            tiles = analysis.tile_count,
            objects = analysis.objects.len(),
            "frame analyzed"
        );

        let result = AnalyzedFrame {
            index,
            worker: ctx.id,
            frame,
            mask: analysis.mask,
            tile_count: analysis.tile_count,
            objects: analysis.objects,
        };
        match ctx.output.push(result) {
            PushOutcome::Enqueued => {}
            PushOutcome::Displaced(evicted) => {
                stats.dropped += 1;
                warn!(
                    worker = ctx.id,
                    frame = evicted.index,
                    "output full, dropped oldest frame"
                );
            }
            PushOutcome::Dropped(refused) => {
                stats.dropped += 1;
                warn!(
                    worker = ctx.id,
                    frame = refused.index,
                    "output full, dropped newest frame"
                );
            }
            PushOutcome::Closed(_) => break,
        }
    }

    debug!(
        worker = ctx.id,
        processed = stats.processed,
        skipped = stats.skipped,
        dropped = stats.dropped,
        "worker exiting"
    );
    stats
}

/// A running pipeline. Dropping it stops and joins every thread.
pub struct PipelineHandle {
    output: Arc<WorkQueue<AnalyzedFrame>>,
    stopper: Stopper,
    capture: Option<JoinHandle<u64>>,
    workers: Vec<JoinHandle<WorkerStats>>,
}

impl PipelineHandle {
    /// Blocks for the next analyzed frame. `None` means every worker has exited
    /// and the output is drained, or the pipeline was stopped.
    pub fn recv(&self) -> Option<AnalyzedFrame> {
        self.output.pop()
    }

    pub fn try_recv(&self) -> Option<AnalyzedFrame> {
        self.output.try_pop()
    }

    /// Blocking iterator over analyzed frames in completion order.
    pub fn iter(&self) -> impl Iterator<Item = AnalyzedFrame> + '_ {
        std::iter::from_fn(move || self.recv())
    }

    /// Analyzed frames currently waiting in the output queue.
    pub fn pending(&self) -> usize {
        self.output.len()
    }

    pub fn stop(&self) {
        self.stopper.stop();
    }

    pub fn stopper(&self) -> Stopper {
        self.stopper.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopper.is_stopped()
    }

    /// Waits for every thread and collects their counters.
    ///
    /// With a bounded, blocking output queue the workers can only finish if the
    /// output is drained (or the pipeline stopped) first; call `recv` until it
    /// returns `None` before joining.
    pub fn join(mut self) -> Result<PipelineReport> {
        let mut panicked: Option<String> = None;

        let frames_captured = match self.capture.take().map(JoinHandle::join) {
            Some(Ok(frames)) => frames,
            Some(Err(payload)) => {
                panicked.get_or_insert_with(|| describe_panic("capture", payload));
                0
            }
            None => 0,
        };

        let mut workers = Vec::with_capacity(self.workers.len());
        for (id, worker) in self.workers.drain(..).enumerate() {
            match worker.join() {
                Ok(stats) => workers.push(stats),
                Err(payload) => {
                    let message = describe_panic(&format!("worker {id}"), payload);
                    panicked.get_or_insert(message);
                }
            }
        }

        if let Some(message) = panicked {
            error!(%message, "pipeline thread panicked");
            return Err(VisionError::ThreadPanicked(message));
        }

        let report = PipelineReport {
            frames_captured,
            workers,
        };
        info!(
            captured = report.frames_captured,
            processed = report.processed(),
            skipped = report.skipped(),
            dropped = report.dropped(),
            "pipeline finished"
        );
        Ok(report)
    }

    fn shutdown(&mut self) {
        self.stopper.stop();
        if let Some(capture) = self.capture.take() {
            let _ = capture.join();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.capture.is_some() || !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn describe_panic(thread: &str, payload: Box<dyn Any + Send>) -> String {
    let reason = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("{thread}: {reason}")
}

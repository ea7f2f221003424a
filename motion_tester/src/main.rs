mod sink;
mod source;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use motion_vision::{
    AnalysisConfig, Capacity, Dispatch, MergeStrategy, OverflowPolicy, ParallelPipeline,
    PipelineConfig, ReorderBuffer,
};
use sink::FrameSink;
use source::ImageDirSource;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DispatchArg {
    Shared,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MergeArg {
    Greedy,
    Converge,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverflowArg {
    Block,
    DropOldest,
    DropNewest,
}

#[derive(Parser, Debug)]
#[command(
    name = "motion_tester",
    version,
    about = "Runs the threaded motion detector over a directory of frames"
)]
struct Cli {
    /// Directory of input frames, processed in file-name order
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for annotated frames (frame_NNNNNN.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also write the edge masks (mask_NNNNNN.png) to the output directory
    #[arg(long)]
    masks: bool,

    /// Analysis workers; 0 uses one per CPU
    #[arg(short, long, default_value_t = 6)]
    workers: usize,

    /// Frames allowed to wait between capture and the workers
    #[arg(long, default_value_t = 5)]
    queue_size: usize,

    #[arg(long, value_enum, default_value_t = DispatchArg::Shared)]
    dispatch: DispatchArg,

    /// Bound on analyzed frames waiting for this process; unbounded when omitted
    #[arg(long)]
    output_capacity: Option<usize>,

    #[arg(long, value_enum, default_value_t = OverflowArg::Block)]
    overflow: OverflowArg,

    #[arg(long, value_enum, default_value_t = MergeArg::Greedy)]
    merge: MergeArg,

    /// Foreground threshold on |gray - background|
    #[arg(long, default_value_t = 30)]
    threshold: u8,

    /// Background learning rate
    #[arg(long, default_value_t = 0.05)]
    alpha: f32,

    /// Deliver frames in capture order instead of completion order
    #[arg(long)]
    ordered: bool,

    /// With --ordered, results parked behind a missing frame before that frame
    /// is given up; a frame arriving after that is discarded
    #[arg(long)]
    reorder_window: Option<usize>,

    /// Stop the whole pipeline after this many delivered frames
    #[arg(long)]
    max_frames: Option<u64>,
}

impl Cli {
    fn pipeline_config(&self) -> PipelineConfig {
        let analysis = AnalysisConfig {
            diff_threshold: self.threshold,
            background_alpha: self.alpha,
            merge_strategy: match self.merge {
                MergeArg::Greedy => MergeStrategy::Greedy,
                MergeArg::Converge => MergeStrategy::Converge,
            },
            ..AnalysisConfig::default()
        };
        PipelineConfig {
            analysis,
            workers: self.workers,
            input_capacity: self.queue_size,
            output_capacity: self
                .output_capacity
                .map_or(Capacity::Unbounded, Capacity::Bounded),
            output_overflow: match self.overflow {
                OverflowArg::Block => OverflowPolicy::Block,
                OverflowArg::DropOldest => OverflowPolicy::DropOldest,
                OverflowArg::DropNewest => OverflowPolicy::DropNewest,
            },
            dispatch: match self.dispatch {
                DispatchArg::Shared => Dispatch::Shared,
                DispatchArg::RoundRobin => Dispatch::RoundRobin,
            },
        }
    }

    /// The reorder window: the explicit flag, or several rounds of in-flight
    /// frames with a floor of `MIN_REORDER_WINDOW`.
    fn reorder_window(&self, config: &PipelineConfig) -> usize {
        self.reorder_window.unwrap_or_else(|| {
            let in_flight = config.worker_count() + config.input_capacity;
            (4 * in_flight).max(MIN_REORDER_WINDOW)
        })
    }
}

const MIN_REORDER_WINDOW: usize = 64;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();

    // --- 1. Pipeline Setup ---
    let config = cli.pipeline_config();
    let pipeline = ParallelPipeline::new(config)?;
    let source = ImageDirSource::open(&cli.input)?;
    let mut sink = FrameSink::new(cli.output.clone(), cli.masks, cli.max_frames)?;
    let mut reorder = cli.ordered.then(|| {
        let window = cli.reorder_window(pipeline.config());
        info!(window, "delivering in capture order");
        ReorderBuffer::new(window)
    });

    // --- 2. Main Consumer Loop ---
    let handle = pipeline.start(source)?;
    let mut limit_reached = false;
    'consume: while let Some(analyzed) = handle.recv() {
        let ready = match reorder.as_mut() {
            Some(buffer) => match buffer.push(analyzed) {
                Ok(ready) => ready,
                Err(late) => {
                    warn!(
                        frame = late.index,
                        "discarding frame that arrived after its slot"
                    );
                    continue;
                }
            },
            None => vec![analyzed],
        };
        for frame in &ready {
            if !sink.deliver(frame)? {
                limit_reached = true;
                handle.stop();
                break 'consume;
            }
        }
    }

    // --- 3. Drain Whatever Is Still Parked ---
    if !limit_reached {
        if let Some(buffer) = reorder.as_mut() {
            for frame in buffer.flush() {
                if !sink.deliver(&frame)? {
                    break;
                }
            }
        }
    }

    // --- 4. Report ---
    let report = handle.join()?;
    info!(
        delivered = sink.delivered(),
        objects = sink.objects_seen(),
        last_fps = format_args!("{:.1}", sink.last_fps()),
        "run complete"
    );
    if let Some(buffer) = &reorder {
        if buffer.skipped() > 0 {
            warn!(missing = buffer.skipped(), "frames never arrived in order");
        }
    }
    println!(
        "captured {} | processed {} | skipped {} | dropped {}",
        report.frames_captured,
        report.processed(),
        report.skipped(),
        report.dropped()
    );
    for worker in &report.workers {
        println!(
            "  worker {:>2}: processed {:>6} skipped {:>4} dropped {:>4}",
            worker.worker, worker.processed, worker.skipped, worker.dropped
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let argv = ["motion_tester", "--input", "frames"].iter().chain(args);
        Cli::try_parse_from(argv).expect("valid arguments")
    }

    #[test]
    fn reorder_window_covers_several_rounds_of_in_flight_frames() {
        let cli = parse(&["--workers", "6", "--queue-size", "5"]);
        assert_eq!(cli.reorder_window(&cli.pipeline_config()), 64);

        let cli = parse(&["--workers", "16", "--queue-size", "8"]);
        assert_eq!(cli.reorder_window(&cli.pipeline_config()), 96);

        let cli = parse(&["--ordered", "--reorder-window", "7"]);
        assert_eq!(cli.reorder_window(&cli.pipeline_config()), 7);
    }

    #[test]
    fn flags_map_onto_the_pipeline_config() {
        let cli = parse(&[
            "--dispatch",
            "round-robin",
            "--output-capacity",
            "3",
            "--overflow",
            "drop-oldest",
            "--threshold",
            "12",
        ]);
        let config = cli.pipeline_config();
        assert_eq!(config.dispatch, Dispatch::RoundRobin);
        assert_eq!(config.output_capacity, Capacity::Bounded(3));
        assert_eq!(config.output_overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.analysis.diff_threshold, 12);
        assert_eq!(config.workers, 6);
    }
}

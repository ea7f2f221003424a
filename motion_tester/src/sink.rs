use anyhow::{Context, Result};
use motion_vision::AnalyzedFrame;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Frames-per-second over one-second windows.
pub struct FpsMeter {
    window_start: Instant,
    frames_in_window: u32,
    last_fps: f64,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames_in_window: 0,
            last_fps: 0.0,
        }
    }

    /// Counts one frame. Returns the new rate whenever a window closes.
    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames_in_window += 1;
        let elapsed = now.duration_since(self.window_start);
        if elapsed < Duration::from_secs(1) {
            return None;
        }
        self.last_fps = self.frames_in_window as f64 / elapsed.as_secs_f64();
        self.frames_in_window = 0;
        self.window_start = now;
        Some(self.last_fps)
    }

    pub fn last(&self) -> f64 {
        self.last_fps
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer end of the runner: FPS logging, optional PNG output and the frame limit.
pub struct FrameSink {
    fps: FpsMeter,
    output_dir: Option<PathBuf>,
    write_masks: bool,
    max_frames: Option<u64>,
    delivered: u64,
    objects_seen: u64,
}

impl FrameSink {
    pub fn new(
        output_dir: Option<PathBuf>,
        write_masks: bool,
        max_frames: Option<u64>,
    ) -> Result<Self> {
        if let Some(dir) = &output_dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating output directory {}", dir.display()))?;
        }
        Ok(Self {
            fps: FpsMeter::new(),
            output_dir,
            write_masks,
            max_frames,
            delivered: 0,
            objects_seen: 0,
        })
    }

    /// Handles one frame. Returns `false` once the frame limit is reached.
    pub fn deliver(&mut self, analyzed: &AnalyzedFrame) -> Result<bool> {
        self.delivered += 1;
        self.objects_seen += analyzed.objects.len() as u64;
        debug!(
            frame = analyzed.index,
            worker = analyzed.worker,
            objects = analyzed.objects.len(),
            "frame delivered"
        );

        if let Some(dir) = &self.output_dir {
            let frame_path = dir.join(format!("frame_{:06}.png", analyzed.index));
            analyzed
                .frame
                .to_rgb_image()?
                .save(&frame_path)
                .with_context(|| format!("writing {}", frame_path.display()))?;
            if self.write_masks {
                let mask_path = dir.join(format!("mask_{:06}.png", analyzed.index));
                analyzed
                    .mask
                    .to_gray_image()?
                    .save(&mask_path)
                    .with_context(|| format!("writing {}", mask_path.display()))?;
            }
        }

        if let Some(fps) = self.fps.tick() {
            info!(
                fps = format_args!("{fps:.1}"),
                delivered = self.delivered,
                "throughput"
            );
        }

        Ok(self.max_frames.is_none_or(|limit| self.delivered < limit))
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn objects_seen(&self) -> u64 {
        self.objects_seen
    }

    pub fn last_fps(&self) -> f64 {
        self.fps.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_vision::{BBox, Frame, Plane};

    fn analyzed(index: u64) -> AnalyzedFrame {
        AnalyzedFrame {
            index,
            worker: 0,
            frame: Frame::from_plane(Plane::new(4, 4)),
            mask: Plane::new(4, 4),
            tile_count: 1,
            objects: vec![BBox::new(0, 0, 3, 3)],
        }
    }

    #[test]
    fn fps_reports_once_per_window() {
        let mut meter = FpsMeter::new();
        let start = meter.window_start;
        assert_eq!(meter.tick_at(start + Duration::from_millis(200)), None);
        assert_eq!(meter.tick_at(start + Duration::from_millis(600)), None);
        let fps = meter
            .tick_at(start + Duration::from_secs(2))
            .expect("window closed");
        assert!((fps - 1.5).abs() < 1e-9);
        assert_eq!(meter.last(), fps);
    }

    #[test]
    fn limit_stops_after_the_nth_frame() {
        let mut sink = FrameSink::new(None, false, Some(2)).expect("sink");
        assert!(sink.deliver(&analyzed(0)).expect("deliver"));
        assert!(!sink.deliver(&analyzed(1)).expect("deliver"));
        assert_eq!(sink.delivered(), 2);
        assert_eq!(sink.objects_seen(), 2);
    }

    #[test]
    fn writes_numbered_pngs() {
        let name = format!("motion_tester_sink_{}", std::process::id());
        let dir = std::env::temp_dir().join(name);
        let mut sink = FrameSink::new(Some(dir.clone()), true, None).expect("sink");
        assert!(sink.deliver(&analyzed(7)).expect("deliver"));
        assert!(dir.join("frame_000007.png").is_file());
        assert!(dir.join("mask_000007.png").is_file());
        fs::remove_dir_all(&dir).ok();
    }
}

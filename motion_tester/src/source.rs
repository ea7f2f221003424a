use anyhow::{Context, Result};
use motion_vision::{Frame, FrameSource};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Still images from one directory, decoded lazily in file-name order.
pub struct ImageDirSource {
    paths: VecDeque<PathBuf>,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("reading frame directory {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        info!(dir = %dir.display(), files = paths.len(), "frame source ready");
        Ok(Self {
            paths: paths.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageDirSource {
    fn next_frame(&mut self) -> Option<Frame> {
        while let Some(path) = self.paths.pop_front() {
            let decoded = image::open(&path)
                .map_err(anyhow::Error::from)
                .and_then(|img| Frame::from_rgb_image(&img.to_rgb8()).map_err(Into::into));
            match decoded {
                Ok(frame) => return Some(frame),
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable file"),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn decodes_in_name_order_and_skips_junk() {
        let name = format!("motion_tester_src_{}", std::process::id());
        let dir = std::env::temp_dir().join(name);
        fs::create_dir_all(&dir).expect("temp dir");
        RgbImage::from_pixel(4, 2, Rgb([10, 20, 30]))
            .save(dir.join("b.png"))
            .expect("write b");
        RgbImage::from_pixel(4, 2, Rgb([1, 2, 3]))
            .save(dir.join("a.png"))
            .expect("write a");
        fs::write(dir.join("c.png"), b"not an image").expect("write c");

        let mut source = ImageDirSource::open(&dir).expect("open");
        assert_eq!(source.remaining(), 3);
        let first = source.next_frame().expect("a.png");
        // stored as BGR
        assert_eq!(&first.as_bytes()[..3], &[3, 2, 1]);
        let second = source.next_frame().expect("b.png");
        assert_eq!(second.dimensions(), (4, 2));
        assert!(source.next_frame().is_none());

        fs::remove_dir_all(&dir).ok();
    }
}

//! Frame-source collaborator.
//!
//! The pipeline pulls frames through [`FrameSource`] and never touches
//! device discovery or USB plumbing. [`ReplaySource`] feeds recorded frames
//! from a CSV index (timestamp, path per row), which is also how sessions
//! are reproduced offline.

use std::path::{Path, PathBuf};

use opencv::core::Mat;
use opencv::imgcodecs;
use opencv::prelude::*;

/// One raw frame with its acquisition timestamp in seconds.
#[derive(Debug, Default)]
pub struct Frame {
    pub timestamp: f64,
    pub mat: Mat,
}

/// Blocking frame supplier. `grab` returning `Ok(None)` is a transient
/// acquisition failure for that tick; liveness is reported separately.
pub trait FrameSource {
    fn connect(&mut self) -> anyhow::Result<()>;
    fn grab(&mut self) -> anyhow::Result<Option<Frame>>;
    fn is_live(&self) -> bool;
    fn stop(&mut self);
}

/// Frame source replaying an on-disk recording.
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: Vec<(f64, PathBuf)>,
    cursor: usize,
    connected: bool,
}

impl ReplaySource {
    /// Read a frame index CSV: one `timestamp,path` record per frame,
    /// paths relative to the index file.
    pub fn from_index(index_path: &Path) -> anyhow::Result<Self> {
        let base = index_path.parent().unwrap_or_else(|| Path::new("."));
        let mut reader = csv::Reader::from_path(index_path)?;
        let mut frames = vec![];
        for record in reader.records() {
            let record = record?;
            let timestamp = record[0].parse::<f64>()?;
            frames.push((timestamp, base.join(&record[1])));
        }
        log::info!("replay index {:?}: {} frames", index_path, frames.len());
        Ok(Self { frames, cursor: 0, connected: false })
    }
}

impl FrameSource for ReplaySource {
    fn connect(&mut self) -> anyhow::Result<()> {
        self.connected = true;
        Ok(())
    }

    fn grab(&mut self) -> anyhow::Result<Option<Frame>> {
        if !self.connected || self.cursor >= self.frames.len() {
            return Ok(None);
        }
        let (timestamp, path) = self.frames[self.cursor].clone();
        self.cursor += 1;
        match imgcodecs::imread(
            path.to_str().unwrap_or_default(),
            imgcodecs::IMREAD_COLOR,
        ) {
            Ok(mat) if !mat.empty() => Ok(Some(Frame { timestamp, mat })),
            Ok(_) => {
                log::warn!("empty frame at {:?}, skipping", path);
                Ok(None)
            }
            Err(e) => {
                log::warn!("failed to read {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    fn is_live(&self) -> bool {
        self.connected && self.cursor < self.frames.len()
    }

    fn stop(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_index_csv() {
        let dir = std::env::temp_dir().join("geltrack_replay_test");
        std::fs::create_dir_all(&dir).unwrap();
        let index = dir.join("index.csv");
        std::fs::write(&index, "timestamp,path\n0.0,f0.png\n0.04,f1.png\n").unwrap();

        let source = ReplaySource::from_index(&index).unwrap();
        assert_eq!(source.frames.len(), 2);
        assert_eq!(source.frames[1].0, 0.04);
        assert!(source.frames[0].1.ends_with("f0.png"));
    }

    #[test]
    fn exhausted_source_is_not_live() {
        let mut source = ReplaySource::default();
        assert!(!source.is_live());
        source.connect().unwrap();
        // no frames: still not live, and grab yields nothing
        assert!(!source.is_live());
        assert!(source.grab().unwrap().is_none());
        source.stop();
        assert!(!source.is_live());
    }
}

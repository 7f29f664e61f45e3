/// opencv
/// https://docs.rs/opencv/latest/opencv/all.html
///
/// ndarray
/// https://docs.rs/ndarray/latest/ndarray/all.html
extern crate opencv;

mod calibrate;
mod camera;
mod config;
mod flow;
mod force;
mod gel;
mod normalize;
mod phase;
mod pipeline;
mod save;
mod tracker;

use std::path::Path;
use std::sync::atomic::AtomicBool;

use crate::calibrate::LatticeSpec;
use crate::camera::ReplaySource;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::tracker::{LatticeTracker, ThresholdDetector};

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .init();

    let mut args = std::env::args().skip(1);
    let index = args.next().ok_or_else(|| {
        anyhow::anyhow!("usage: geltrack-rs <frame-index.csv> [config.json] [out.csv]")
    })?;
    let config = match args.next() {
        Some(path) => Config::from_json_file(&path)?,
        None => Config::default(),
    };
    let out_path = args.next();

    log::info!("replaying {:?} at {}x{}", index, config.imgw, config.imgh);
    let mut source = ReplaySource::from_index(Path::new(&index))?;
    let mut pipeline = Pipeline::new(config, ThresholdDetector::default(), |l: &LatticeSpec| {
        LatticeTracker::new(l)
    });

    // embedders wire this to their interrupt signal; the replay binary
    // just runs the stream out
    let cancel = AtomicBool::new(false);
    pipeline.run(&mut source, &cancel)?;

    if let Some(out_path) = out_path {
        save::write_csv(Path::new(&out_path), pipeline.measurements())?;
    }
    log::info!(
        "session ended in {:?} with {} measurements",
        pipeline.state(),
        pipeline.measurements().len()
    );
    Ok(())
}

//! Streaming control loop.
//!
//! Single-threaded pull pipeline: one frame is fully processed before the
//! next is requested, so calibration-before-tracking ordering and monotone
//! measurement order hold by construction. The only blocking point is the
//! frame grab; cancellation is cooperative and checked at iteration
//! boundaries, and the source is stopped on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

use opencv::core::Mat;

use crate::calibrate::{self, LatticeSpec};
use crate::camera::{Frame, FrameSource};
use crate::config::Config;
use crate::flow;
use crate::force;
use crate::gel::{self, GelStats};
use crate::normalize;
use crate::phase;
use crate::tracker::{MarkerDetector, MarkerTracker};

/// Loop states. `Stopped` is terminal; no state is re-entered after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Discarding initial frames while camera exposure settles.
    Warmup,
    /// Next frame is the designated stable calibration frame.
    Calibrating,
    /// Steady state: normalize, detect, track, estimate, emit.
    Tracking,
    Stopped,
}

/// One output record per tracking tick, in frame arrival order.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub frame_no: u64,
    pub timestamp: f64,
    /// Mean displacement phase over matched markers, radians in (-pi, pi].
    pub mean_phase_rad: f64,
    pub displacement_mm: (f64, f64),
    pub shear_n: (f64, f64),
    /// Twist torque for the x component, y component, and combined flow
    /// magnitude.
    pub twist_nm: (f64, f64, f64),
    pub gel: GelStats,
}

pub struct Pipeline<D, T, F>
where
    D: MarkerDetector,
    T: MarkerTracker,
    F: FnMut(&LatticeSpec) -> T,
{
    config: Config,
    detector: D,
    make_tracker: F,

    state: LoopState,
    lattice: Option<LatticeSpec>,
    tracker: Option<T>,
    prev_gray: Option<Mat>,
    warmup_seen: u32,
    grab_failures: u32,
    frame_no: u64,
    measurements: Vec<Measurement>,
}

impl<D, T, F> Pipeline<D, T, F>
where
    D: MarkerDetector,
    T: MarkerTracker,
    F: FnMut(&LatticeSpec) -> T,
{
    pub fn new(config: Config, detector: D, make_tracker: F) -> Self {
        Self {
            config,
            detector,
            make_tracker,
            state: LoopState::Warmup,
            lattice: None,
            tracker: None,
            prev_gray: None,
            warmup_seen: 0,
            grab_failures: 0,
            frame_no: 0,
            measurements: Vec::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Lattice derived by the one-shot calibration, once it has run.
    pub fn lattice(&self) -> Option<&LatticeSpec> {
        self.lattice.as_ref()
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Drive the loop until stream exhaustion, persistent acquisition
    /// failure, cancellation, or a fatal calibration error.
    ///
    /// The source is connected on entry and stopped on every exit path.
    pub fn run(&mut self, source: &mut dyn FrameSource, cancel: &AtomicBool) -> anyhow::Result<()> {
        source.connect()?;
        let result = self.run_inner(source, cancel);
        source.stop();
        self.state = LoopState::Stopped;
        result
    }

    fn run_inner(
        &mut self,
        source: &mut dyn FrameSource,
        cancel: &AtomicBool,
    ) -> anyhow::Result<()> {
        if self.config.warmup_frames == 0 {
            self.state = LoopState::Calibrating;
        }
        loop {
            if cancel.load(Ordering::Relaxed) {
                log::info!("cancellation requested, stopping");
                return Ok(());
            }
            if !source.is_live() {
                log::info!("frame stream ended after {} measurements", self.measurements.len());
                return Ok(());
            }
            match source.grab()? {
                Some(frame) => {
                    self.grab_failures = 0;
                    self.tick(frame)?;
                }
                None => {
                    self.grab_failures += 1;
                    log::warn!("frame grab failed ({} consecutive)", self.grab_failures);
                    if self.grab_failures >= self.config.max_grab_failures {
                        log::error!("acquisition failure persists, stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn tick(&mut self, frame: Frame) -> anyhow::Result<()> {
        match self.state {
            LoopState::Warmup => {
                self.warmup_seen += 1;
                if self.warmup_seen >= self.config.warmup_frames {
                    self.state = LoopState::Calibrating;
                }
                Ok(())
            }
            LoopState::Calibrating => self.calibrate_once(&frame),
            LoopState::Tracking => self.track(&frame),
            // run() never dispatches ticks after the terminal transition
            LoopState::Stopped => Ok(()),
        }
    }

    /// One-shot calibration on the designated stable frame. Failure here is
    /// fatal: the session cannot proceed to tracking on a guessed lattice.
    fn calibrate_once(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let canonical = normalize::normalize_frame(&frame.mat, &self.config)?;
        let observation = self.detector.detect(&canonical)?;
        let lattice = calibrate::calibrate(&observation.centers, &self.config)?;

        self.tracker = Some((self.make_tracker)(&lattice));
        self.lattice = Some(lattice);
        self.prev_gray = Some(normalize::to_gray(&canonical)?);
        self.state = LoopState::Tracking;
        Ok(())
    }

    fn track(&mut self, frame: &Frame) -> anyhow::Result<()> {
        let canonical = normalize::normalize_frame(&frame.mat, &self.config)?;
        let gray = normalize::to_gray(&canonical)?;

        // marker path: correspondence field and contact statistics
        let observation = self.detector.detect(&canonical)?;
        let gel = gel::contact_stats_from_mask(&observation.mask, &self.config)?;
        let tracker = self
            .tracker
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("tracking state without a tracker"))?;
        tracker.init(&observation.centers);
        tracker.run()?;
        let field = tracker.flow();

        let mean_phase_rad = match phase::mean_phase(field) {
            Some(p) => p,
            None => {
                log::debug!("no markers matched this tick, phase defaults to 0");
                0.0
            }
        };

        // dense path: displacement and force estimates
        let prev_gray = self
            .prev_gray
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("tracking state without a previous frame"))?;
        let planes = flow::farneback(prev_gray, &gray)?;
        let (px_x, px_y) = (planes.mean_x(), planes.mean_y());
        let (mm_x, mm_y) = force::displacement_mm(px_x, px_y, &self.config);

        let measurement = Measurement {
            frame_no: self.frame_no,
            timestamp: frame.timestamp,
            mean_phase_rad,
            displacement_mm: (mm_x, mm_y),
            shear_n: (
                force::shear_force(mm_x, &self.config),
                force::shear_force(mm_y, &self.config),
            ),
            twist_nm: (
                force::twist_force(px_x, &self.config),
                force::twist_force(px_y, &self.config),
                force::twist_force(planes.mean_magnitude(), &self.config),
            ),
            gel,
        };
        log::info!(
            "frame {}: phase={:.4} rad, displacement mm h={:.5} v={:.5}, shear N x={:.5e} y={:.5e}, twist Nm={:.5e}, contact r={:.3} mm cov={:.1}%",
            measurement.frame_no,
            measurement.mean_phase_rad,
            measurement.displacement_mm.0,
            measurement.displacement_mm.1,
            measurement.shear_n.0,
            measurement.shear_n.1,
            measurement.twist_nm.2,
            measurement.gel.radius_mm,
            measurement.gel.coverage_percent,
        );
        self.measurements.push(measurement);

        self.prev_gray = Some(gray);
        self.frame_no += 1;
        Ok(())
    }
}

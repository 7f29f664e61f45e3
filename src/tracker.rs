//! Marker correspondence collaborators and the flow field they produce.
//!
//! Segmentation and point matching are external concerns; the pipeline only
//! depends on the [`MarkerDetector`] and [`MarkerTracker`] contracts, so it
//! can run against hardware-backed implementations or the scripted fakes
//! used in tests. [`LatticeTracker`] is a minimal nearest-detection matcher
//! seeded by the calibrated lattice, enough to drive the binary end to end.

use nalgebra::Point2;
use opencv::core::Mat;
use opencv::prelude::*;

use crate::calibrate::LatticeSpec;

/// Output of the marker detector for one frame: a binary mask plus the
/// extracted marker centers in pixel coordinates. An empty observation is a
/// valid degenerate case, not an error.
#[derive(Debug, Default)]
pub struct MarkerObservation {
    pub mask: Mat,
    pub centers: Vec<Point2<f64>>,
}

/// Frame -> marker observation. Pure per-frame; no state across calls.
pub trait MarkerDetector {
    fn detect(&self, frame: &Mat) -> anyhow::Result<MarkerObservation>;
}

/// Point-correspondence tracker fed with per-frame marker centers.
pub trait MarkerTracker {
    /// Supply this tick's detected centers.
    fn init(&mut self, centers: &[Point2<f64>]);
    /// Run the matching step for the supplied centers.
    fn run(&mut self) -> anyhow::Result<()>;
    /// Correspondence field after the last [`run`](Self::run).
    fn flow(&self) -> &FlowField;
}

/// Parallel origin/current marker positions with an occupancy flag per
/// marker. Unmatched markers keep their stale positions but are excluded
/// from every aggregate through [`iter_occupied`](Self::iter_occupied).
#[derive(Debug, Clone, Default)]
pub struct FlowField {
    ox: Vec<f64>,
    oy: Vec<f64>,
    cx: Vec<f64>,
    cy: Vec<f64>,
    occupied: Vec<bool>,
}

impl FlowField {
    /// Build a flow field, rejecting mismatched sequence lengths.
    pub fn from_parts(
        ox: Vec<f64>,
        oy: Vec<f64>,
        cx: Vec<f64>,
        cy: Vec<f64>,
        occupied: Vec<bool>,
    ) -> anyhow::Result<Self> {
        let n = ox.len();
        if oy.len() != n || cx.len() != n || cy.len() != n || occupied.len() != n {
            anyhow::bail!(
                "flow field sequences disagree in length: {}/{}/{}/{}/{}",
                n,
                oy.len(),
                cx.len(),
                cy.len(),
                occupied.len()
            );
        }
        Ok(Self { ox, oy, cx, cy, occupied })
    }

    pub fn len(&self) -> usize {
        self.ox.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ox.is_empty()
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.iter().filter(|o| **o).count()
    }

    /// (origin, current) pairs of the matched markers only.
    pub fn iter_occupied(&self) -> impl Iterator<Item = (Point2<f64>, Point2<f64>)> + '_ {
        (0..self.len()).filter(|i| self.occupied[*i]).map(|i| {
            (Point2::new(self.ox[i], self.oy[i]), Point2::new(self.cx[i], self.cy[i]))
        })
    }

    /// Mean pixel displacement over the matched markers.
    pub fn mean_displacement(&self) -> Option<(f64, f64)> {
        let n = self.occupied_count();
        if n == 0 {
            return None;
        }
        let (sx, sy) = self
            .iter_occupied()
            .fold((0.0, 0.0), |(sx, sy), (o, c)| (sx + c.x - o.x, sy + c.y - o.y));
        Some((sx / n as f64, sy / n as f64))
    }
}

/// Intensity-threshold marker segmentation: markers are the dark dots on
/// the lighter gel surface. A stand-in for device-tuned segmentation, kept
/// behind the [`MarkerDetector`] seam like the matcher.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdDetector {
    /// Gray levels at or below this count as marker pixels.
    pub threshold: f64,
    /// Components smaller than this many pixels are noise.
    pub min_area: i32,
}

impl Default for ThresholdDetector {
    fn default() -> Self {
        Self { threshold: 70.0, min_area: 4 }
    }
}

impl MarkerDetector for ThresholdDetector {
    fn detect(&self, frame: &Mat) -> anyhow::Result<MarkerObservation> {
        let gray = crate::normalize::to_gray(frame)?;
        let mut mask = Mat::default();
        opencv::imgproc::threshold(
            &gray,
            &mut mask,
            self.threshold,
            255.0,
            opencv::imgproc::THRESH_BINARY_INV,
        )?;

        let mut labels = Mat::default();
        let mut stats = Mat::default();
        let mut centroids = Mat::default();
        let n_labels = opencv::imgproc::connected_components_with_stats(
            &mask,
            &mut labels,
            &mut stats,
            &mut centroids,
            8,
            opencv::core::CV_32S,
        )?;

        let mut centers = vec![];
        // label 0 is the background
        for label in 1..n_labels {
            let area = *stats.at_2d::<i32>(label, opencv::imgproc::CC_STAT_AREA)?;
            if area < self.min_area {
                continue;
            }
            let cx = *centroids.at_2d::<f64>(label, 0)?;
            let cy = *centroids.at_2d::<f64>(label, 1)?;
            centers.push(Point2::new(cx, cy));
        }
        Ok(MarkerObservation { mask, centers })
    }
}

fn distance(a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    (dx * dx + dy * dy).sqrt()
}

/// Nearest-detection assignment against the calibrated reference lattice.
///
/// Each lattice position claims the closest detection within half the
/// lattice pitch; positions with no detection in range go unoccupied and
/// keep their previous current position.
#[derive(Debug)]
pub struct LatticeTracker {
    origins: Vec<Point2<f64>>,
    current: Vec<Point2<f64>>,
    occupied: Vec<bool>,
    detections: Vec<Point2<f64>>,
    match_radius: f64,
    field: FlowField,
}

impl LatticeTracker {
    pub fn new(lattice: &LatticeSpec) -> Self {
        let mut origins = Vec::with_capacity(lattice.rows * lattice.cols);
        for r in 0..lattice.rows {
            for c in 0..lattice.cols {
                origins.push(lattice.reference(r, c));
            }
        }
        let current = origins.clone();
        let occupied = vec![false; origins.len()];
        Self {
            origins,
            current,
            occupied,
            detections: vec![],
            match_radius: lattice.dx.min(lattice.dy) / 2.0,
            field: FlowField::default(),
        }
    }
}

impl MarkerTracker for LatticeTracker {
    fn init(&mut self, centers: &[Point2<f64>]) {
        self.detections = centers.to_vec();
    }

    fn run(&mut self) -> anyhow::Result<()> {
        let mut claimed = vec![false; self.detections.len()];
        for i in 0..self.origins.len() {
            let mut best: Option<(usize, f64)> = None;
            for (j, det) in self.detections.iter().enumerate() {
                if claimed[j] {
                    continue;
                }
                let d = distance(&self.current[i], det);
                if d <= self.match_radius && best.map_or(true, |(_, bd)| d < bd) {
                    best = Some((j, d));
                }
            }
            match best {
                Some((j, _)) => {
                    claimed[j] = true;
                    self.current[i] = self.detections[j];
                    self.occupied[i] = true;
                }
                None => self.occupied[i] = false,
            }
        }

        self.field = FlowField::from_parts(
            self.origins.iter().map(|p| p.x).collect(),
            self.origins.iter().map(|p| p.y).collect(),
            self.current.iter().map(|p| p.x).collect(),
            self.current.iter().map(|p| p.y).collect(),
            self.occupied.clone(),
        )?;
        Ok(())
    }

    fn flow(&self) -> &FlowField {
        &self.field
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lattice_2x2() -> LatticeSpec {
        LatticeSpec { rows: 2, cols: 2, x0: 10.0, y0: 10.0, dx: 30.0, dy: 30.0 }
    }

    #[test]
    fn from_parts_rejects_length_mismatch() {
        let r = FlowField::from_parts(vec![1.0], vec![1.0], vec![1.0], vec![], vec![true]);
        assert!(r.is_err());
    }

    #[test]
    fn unoccupied_markers_are_excluded() {
        let field = FlowField::from_parts(
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            vec![2.0, 100.0],
            vec![0.0, 100.0],
            vec![true, false],
        )
        .unwrap();
        assert_eq!(field.occupied_count(), 1);
        assert_eq!(field.mean_displacement(), Some((2.0, 0.0)));
    }

    #[test]
    fn mean_displacement_of_empty_field_is_none() {
        let field = FlowField::default();
        assert_eq!(field.mean_displacement(), None);
    }

    #[test]
    fn tracker_matches_displaced_markers() {
        let mut tracker = LatticeTracker::new(&lattice_2x2());
        // every marker shifted 3 px right, one marker missing
        let detections = vec![
            Point2::new(13.0, 10.0),
            Point2::new(43.0, 10.0),
            Point2::new(13.0, 40.0),
        ];
        tracker.init(&detections);
        tracker.run().unwrap();
        let flow = tracker.flow();
        assert_eq!(flow.len(), 4);
        assert_eq!(flow.occupied_count(), 3);
        let (mx, my) = flow.mean_displacement().unwrap();
        assert!((mx - 3.0).abs() < 1e-9);
        assert!(my.abs() < 1e-9);
    }

    #[test]
    fn threshold_detector_finds_dark_dots() {
        use opencv::core::{Point, Scalar, CV_8UC1};
        use opencv::prelude::*;

        let mut frame =
            Mat::new_rows_cols_with_default(240, 320, CV_8UC1, Scalar::all(200.0)).unwrap();
        for (x, y) in [(50, 60), (110, 60), (50, 120)] {
            opencv::imgproc::circle(
                &mut frame,
                Point::new(x, y),
                5,
                Scalar::all(10.0),
                -1,
                opencv::imgproc::LINE_8,
                0,
            )
            .unwrap();
        }

        let observation = ThresholdDetector::default().detect(&frame).unwrap();
        assert_eq!(observation.centers.len(), 3);
        assert!(observation
            .centers
            .iter()
            .any(|p| (p.x - 50.0).abs() < 1.0 && (p.y - 60.0).abs() < 1.0));
        assert!(opencv::core::count_non_zero(&observation.mask).unwrap() > 0);
    }

    #[test]
    fn tracker_with_no_detections_reports_all_unoccupied() {
        let mut tracker = LatticeTracker::new(&lattice_2x2());
        tracker.init(&[]);
        tracker.run().unwrap();
        assert_eq!(tracker.flow().occupied_count(), 0);
    }
}

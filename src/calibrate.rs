//! Marker grid calibration.
//!
//! Turns the unordered marker centers of the first stable frame into a
//! labeled N x M lattice: origin at the top-left marker, spacing derived
//! from the left-most column and top-most row. The procedure assumes an
//! axis-aligned grid with distinct coordinates; exact ties are rejected as
//! [`CalibrationError::AmbiguousOrdering`], but near-ties under sensor
//! noise can still swap adjacent rank order and are a known sensitivity.

use nalgebra::Point2;

use crate::config::Config;

/// Lattice geometry derived once per session and held immutable thereafter.
/// Re-calibration is a new session, not a mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticeSpec {
    pub rows: usize,
    pub cols: usize,
    /// Origin x, rounded to the nearest integer pixel.
    pub x0: f64,
    /// Origin y, rounded to the nearest integer pixel.
    pub y0: f64,
    /// Column spacing in pixels.
    pub dx: f64,
    /// Row spacing in pixels.
    pub dy: f64,
}

impl LatticeSpec {
    /// Reference (undeformed) position of the marker at (row, col).
    pub fn reference(&self, row: usize, col: usize) -> Point2<f64> {
        Point2::new(self.x0 + col as f64 * self.dx, self.y0 + row as f64 * self.dy)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Fewer markers detected than the lattice needs to derive geometry.
    InsufficientMarkers { found: usize, needed: usize },
    /// Lattice dimensions below 2x2 admit no spacing.
    InvalidLattice { rows: usize, cols: usize },
    /// Exact coordinate tie inside a selected row/column subset; rank
    /// order would depend on sort stability.
    AmbiguousOrdering { axis: char, coord: f64 },
    /// Derived spacing is not strictly positive.
    DegenerateSpacing { dx: f64, dy: f64 },
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientMarkers { found, needed } => {
                write!(f, "insufficient markers: found {}, need at least {}", found, needed)
            }
            Self::InvalidLattice { rows, cols } => {
                write!(f, "lattice must be at least 2x2, got {}x{}", rows, cols)
            }
            Self::AmbiguousOrdering { axis, coord } => {
                write!(f, "ambiguous marker ordering: duplicate {}-coordinate {}", axis, coord)
            }
            Self::DegenerateSpacing { dx, dy } => {
                write!(f, "degenerate lattice spacing: dx={} dy={}", dx, dy)
            }
        }
    }
}

impl std::error::Error for CalibrationError {}

/// Derive the lattice origin and spacing from unordered marker centers.
///
/// The left-most `rows` markers, re-sorted by y, give the first column in
/// top-to-bottom order; its head is the origin and its first gap is the row
/// spacing. The top-most `cols` markers, re-sorted by x, give the first row
/// and the column spacing.
pub fn calibrate(markers: &[Point2<f64>], config: &Config) -> Result<LatticeSpec, CalibrationError> {
    let (rows, cols) = (config.rows, config.cols);
    if rows < 2 || cols < 2 {
        return Err(CalibrationError::InvalidLattice { rows, cols });
    }
    let needed = rows.max(cols);
    if markers.len() < needed {
        return Err(CalibrationError::InsufficientMarkers { found: markers.len(), needed });
    }
    if markers.len() < config.num_markers() {
        log::warn!(
            "calibrating from {} markers, expected {}",
            markers.len(),
            config.num_markers()
        );
    }

    // Left-most column: sort by x, take `rows`, order top to bottom.
    let mut by_x = markers.to_vec();
    by_x.sort_by(|a, b| a.x.total_cmp(&b.x));
    let mut col = by_x[..rows].to_vec();
    col.sort_by(|a, b| a.y.total_cmp(&b.y));
    check_distinct(&col, |p| p.y, 'y')?;

    // Top-most row: sort by y, take `cols`, order left to right.
    let mut by_y = markers.to_vec();
    by_y.sort_by(|a, b| a.y.total_cmp(&b.y));
    let mut row = by_y[..cols].to_vec();
    row.sort_by(|a, b| a.x.total_cmp(&b.x));
    check_distinct(&row, |p| p.x, 'x')?;

    let dx = row[1].x - row[0].x;
    let dy = col[1].y - col[0].y;
    if dx <= 0.0 || dy <= 0.0 {
        return Err(CalibrationError::DegenerateSpacing { dx, dy });
    }

    let spec = LatticeSpec {
        rows,
        cols,
        x0: col[0].x.round(),
        y0: col[0].y.round(),
        dx,
        dy,
    };
    log::info!(
        "lattice calibrated: x0={} y0={} dx={:.3} dy={:.3}",
        spec.x0,
        spec.y0,
        spec.dx,
        spec.dy
    );
    Ok(spec)
}

fn check_distinct(
    subset: &[Point2<f64>],
    key: impl Fn(&Point2<f64>) -> f64,
    axis: char,
) -> Result<(), CalibrationError> {
    for pair in subset.windows(2) {
        if key(&pair[0]) == key(&pair[1]) {
            return Err(CalibrationError::AmbiguousOrdering { axis, coord: key(&pair[0]) });
        }
    }
    Ok(())
}

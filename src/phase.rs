//! Mean angular phase of the marker displacement field.
//!
//! The aggregate is an arithmetic mean of per-marker `atan2` phases, which
//! is only meaningful while the phase distribution stays unimodal and away
//! from the +-pi wrap. A circular mean (average the unit vectors, then take
//! the angle) would remove that caveat; the arithmetic form is kept to
//! match the established measurement semantics.

use crate::tracker::FlowField;

/// Mean of the per-marker displacement phases over the occupied subset.
///
/// Each phase is `atan2(dy, dx)` in `(-pi, pi]`. Returns `None` when no
/// marker is occupied this tick.
pub fn mean_phase(flow: &FlowField) -> Option<f64> {
    let n = flow.occupied_count();
    if n == 0 {
        return None;
    }
    let sum: f64 = flow
        .iter_occupied()
        .map(|(origin, current)| (current.y - origin.y).atan2(current.x - origin.x))
        .sum();
    Some(sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn single_marker(dx: f64, dy: f64) -> FlowField {
        FlowField::from_parts(vec![10.0], vec![10.0], vec![10.0 + dx], vec![10.0 + dy], vec![true])
            .unwrap()
    }

    #[test]
    fn axis_aligned_displacements() {
        assert_eq!(mean_phase(&single_marker(5.0, 0.0)), Some(0.0));
        let up = mean_phase(&single_marker(0.0, 5.0)).unwrap();
        assert!((up - FRAC_PI_2).abs() < 1e-12);
        let left = mean_phase(&single_marker(-5.0, 0.0)).unwrap();
        assert!((left.abs() - PI).abs() < 1e-12);
    }

    #[test]
    fn zero_displacement_is_zero_phase() {
        // atan2(0, 0) is 0; a still field reports phase 0 rather than NaN
        let phase = mean_phase(&single_marker(0.0, 0.0)).unwrap();
        assert_eq!(phase, 0.0);
    }

    #[test]
    fn empty_field_has_no_phase() {
        assert_eq!(mean_phase(&FlowField::default()), None);
    }

    #[test]
    fn unoccupied_markers_do_not_contribute() {
        let flow = FlowField::from_parts(
            vec![0.0, 0.0],
            vec![0.0, 0.0],
            vec![4.0, 0.0],
            vec![0.0, -9.0],
            vec![true, false],
        )
        .unwrap();
        assert_eq!(mean_phase(&flow), Some(0.0));
    }
}

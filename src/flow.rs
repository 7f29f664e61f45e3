//! Dense optical-flow consumption.
//!
//! Farneback flow between consecutive grayscale frames is the second
//! displacement source next to the marker tracker. Only the output shape is
//! consumed here: two planes of per-pixel horizontal and vertical
//! displacement in pixels.

use ndarray::Array2;
use opencv::core::{Mat, Vector};
use opencv::prelude::*;

/// Per-pixel displacement planes of one flow step.
#[derive(Debug, Clone)]
pub struct FlowPlanes {
    fx: Array2<f32>,
    fy: Array2<f32>,
}

impl FlowPlanes {
    pub fn from_planes(fx: Array2<f32>, fy: Array2<f32>) -> anyhow::Result<Self> {
        if fx.dim() != fy.dim() {
            anyhow::bail!("flow planes disagree in shape: {:?} vs {:?}", fx.dim(), fy.dim());
        }
        Ok(Self { fx, fy })
    }

    /// Split a two-channel flow Mat (CV_32FC2) into planes.
    pub fn from_mat(flow: &Mat) -> anyhow::Result<Self> {
        let mut planes = Vector::<Mat>::new();
        opencv::core::split(flow, &mut planes)?;
        if planes.len() != 2 {
            anyhow::bail!("expected 2 flow channels, got {}", planes.len());
        }
        let shape = (flow.rows() as usize, flow.cols() as usize);
        let fx = Array2::from_shape_vec(shape, planes.get(0)?.data_typed::<f32>()?.to_vec())?;
        let fy = Array2::from_shape_vec(shape, planes.get(1)?.data_typed::<f32>()?.to_vec())?;
        Self::from_planes(fx, fy)
    }

    /// Mean horizontal displacement in pixels.
    pub fn mean_x(&self) -> f64 {
        self.fx.mean().unwrap_or(0.0) as f64
    }

    /// Mean vertical displacement in pixels.
    pub fn mean_y(&self) -> f64 {
        self.fy.mean().unwrap_or(0.0) as f64
    }

    /// Mean per-pixel displacement magnitude.
    pub fn mean_magnitude(&self) -> f64 {
        let sq = &self.fx * &self.fx + &self.fy * &self.fy;
        sq.mapv(f32::sqrt).mean().unwrap_or(0.0) as f64
    }
}

/// Dense flow between two grayscale frames, Farneback parameters as tuned
/// for the sensor feed.
pub fn farneback(prev_gray: &Mat, cur_gray: &Mat) -> anyhow::Result<FlowPlanes> {
    let mut flow = Mat::default();
    opencv::video::calc_optical_flow_farneback(
        prev_gray,
        cur_gray,
        &mut flow,
        0.5,
        3,
        15,
        3,
        5,
        1.2,
        0,
    )?;
    FlowPlanes::from_mat(&flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn uniform_field_means() {
        let fx = Array2::from_elem((4, 6), 3.0f32);
        let fy = Array2::from_elem((4, 6), -4.0f32);
        let planes = FlowPlanes::from_planes(fx, fy).unwrap();
        assert!((planes.mean_x() - 3.0).abs() < 1e-6);
        assert!((planes.mean_y() + 4.0).abs() < 1e-6);
        assert!((planes.mean_magnitude() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn zero_field_is_all_zero() {
        let planes =
            FlowPlanes::from_planes(Array2::zeros((3, 3)), Array2::zeros((3, 3))).unwrap();
        assert_eq!(planes.mean_x(), 0.0);
        assert_eq!(planes.mean_y(), 0.0);
        assert_eq!(planes.mean_magnitude(), 0.0);
    }

    #[test]
    fn magnitude_averages_per_pixel() {
        // mean of magnitudes, not magnitude of means
        let fx = arr2(&[[1.0f32, -1.0]]);
        let fy = arr2(&[[0.0f32, 0.0]]);
        let planes = FlowPlanes::from_planes(fx, fy).unwrap();
        assert_eq!(planes.mean_x(), 0.0);
        assert!((planes.mean_magnitude() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mismatched_planes_are_rejected() {
        let r = FlowPlanes::from_planes(Array2::zeros((2, 2)), Array2::zeros((3, 2)));
        assert!(r.is_err());
    }
}

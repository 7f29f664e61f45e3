//! Flow-to-force estimation.
//!
//! Pure functions from pixel-domain displacement and the session constants
//! to physical quantities. The gel is modeled as a linear-elastic medium;
//! all constants are expected in SI-consistent units (Pa, m^2, m, m^4) and
//! no unit conversion happens here.

use crate::config::Config;

/// Convert a pixel displacement to mm, per axis.
///
/// The horizontal and vertical scale factors are independent; the sensor
/// field of view need not be square.
pub fn displacement_mm(pixels_x: f64, pixels_y: f64, config: &Config) -> (f64, f64) {
    let mm_per_px_x = config.fov_w_mm / config.imgw as f64;
    let mm_per_px_y = config.fov_h_mm / config.imgh as f64;
    (pixels_x * mm_per_px_x, pixels_y * mm_per_px_y)
}

/// Shear force in Newtons from an in-plane displacement in mm.
pub fn shear_force(displacement_mm: f64, config: &Config) -> f64 {
    let strain = displacement_mm / config.skin_thickness_mm;
    let stress = config.shear_modulus_pa * strain;
    stress * config.contact_area_m2
}

/// Torque in N*m from a scalar pixel displacement, assuming the motion
/// occurred at the edge of a circular contact of the configured radius.
pub fn twist_force(pixels: f64, config: &Config) -> f64 {
    let r = config.torsion_radius_m;
    let theta_deg = pixels * (360.0 / (2.0 * std::f64::consts::PI * r * 1000.0));
    let theta = theta_deg.to_radians();
    let strain = theta / r;
    let stress = config.torsional_modulus_pa * strain;
    stress * config.polar_moment_m4
}

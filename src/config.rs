use serde::{Deserialize, Serialize};

/// Session configuration, fixed for the lifetime of a tracking session.
///
/// Every component takes this by reference; nothing reads device constants
/// from globals. Defaults are the GelSight-Mini constants the pipeline was
/// tuned for (320x240 canonical frame over an 18.6x14.3 mm field of view,
/// a 7x9 marker lattice).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Canonical frame width in pixels.
    pub imgw: i32,
    /// Canonical frame height in pixels.
    pub imgh: i32,
    /// Marker lattice row count (markers per column).
    pub rows: usize,
    /// Marker lattice column count (markers per row).
    pub cols: usize,
    /// Nominal camera frame rate.
    pub fps: f64,
    /// Frames discarded before calibration while exposure settles.
    pub warmup_frames: u32,
    /// Consecutive failed grabs tolerated before the loop stops.
    pub max_grab_failures: u32,

    /// Field of view width in mm.
    pub fov_w_mm: f64,
    /// Field of view height in mm.
    pub fov_h_mm: f64,
    /// Image scale calibration constant.
    pub mm_per_pixel: f64,
    /// Physical marker radius in mm.
    pub true_marker_radius_mm: f64,

    /// Gel skin thickness in mm.
    pub skin_thickness_mm: f64,
    /// Shear modulus of the gel, Pa.
    pub shear_modulus_pa: f64,
    /// Nominal contact area, m^2.
    pub contact_area_m2: f64,
    /// Nominal contact radius for the torsion model, m.
    pub torsion_radius_m: f64,
    /// Torsional modulus of the gel, Pa.
    pub torsional_modulus_pa: f64,
    /// Polar moment of inertia of the nominal contact, m^4.
    pub polar_moment_m4: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            imgw: 320,
            imgh: 240,
            rows: 7,
            cols: 9,
            fps: 25.0,
            warmup_frames: 50,
            max_grab_failures: 5,
            fov_w_mm: 18.6,
            fov_h_mm: 14.3,
            mm_per_pixel: 0.0634,
            true_marker_radius_mm: 0.5,
            skin_thickness_mm: 2.0,
            shear_modulus_pa: 7000.0,
            contact_area_m2: 1e-4,
            torsion_radius_m: 0.01,
            torsional_modulus_pa: 7000.0,
            polar_moment_m4: 1.57e-9,
        }
    }
}

impl Config {
    /// Total marker count in the full lattice.
    pub fn num_markers(&self) -> usize {
        self.rows * self.cols
    }

    pub fn from_json_file(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }
}

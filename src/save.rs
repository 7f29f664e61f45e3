//! Measurement recording.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pipeline::Measurement;

/// Flat per-tick record for CSV output.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub frame_no: u64,
    pub timestamp: f64,
    pub mean_phase_rad: f64,
    pub displacement_mm_x: f64,
    pub displacement_mm_y: f64,
    pub shear_n_x: f64,
    pub shear_n_y: f64,
    pub twist_nm_x: f64,
    pub twist_nm_y: f64,
    pub twist_nm_total: f64,
    pub contact_radius_mm: f64,
    pub coverage_percent: f64,
}

impl From<&Measurement> for MeasurementRecord {
    fn from(m: &Measurement) -> Self {
        Self {
            frame_no: m.frame_no,
            timestamp: m.timestamp,
            mean_phase_rad: m.mean_phase_rad,
            displacement_mm_x: m.displacement_mm.0,
            displacement_mm_y: m.displacement_mm.1,
            shear_n_x: m.shear_n.0,
            shear_n_y: m.shear_n.1,
            twist_nm_x: m.twist_nm.0,
            twist_nm_y: m.twist_nm.1,
            twist_nm_total: m.twist_nm.2,
            contact_radius_mm: m.gel.radius_mm,
            coverage_percent: m.gel.coverage_percent,
        }
    }
}

/// Write the measurement stream of a session to a CSV file.
pub fn write_csv(path: &Path, measurements: &[Measurement]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for m in measurements {
        writer.serialize(MeasurementRecord::from(m))?;
    }
    writer.flush()?;
    log::info!("wrote {} measurements to {:?}", measurements.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gel::GelStats;

    fn measurement(frame_no: u64) -> Measurement {
        Measurement {
            frame_no,
            timestamp: frame_no as f64 * 0.04,
            mean_phase_rad: 0.1,
            displacement_mm: (0.5, -0.25),
            shear_n: (0.2, -0.1),
            twist_nm: (1e-6, 2e-6, 3e-6),
            gel: GelStats { radius_mm: 0.4, coverage_percent: 62.0 },
        }
    }

    #[test]
    fn csv_round_trip() {
        let dir = std::env::temp_dir().join("geltrack_save_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("measurements.csv");

        write_csv(&path, &[measurement(0), measurement(1)]).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<MeasurementRecord> =
            reader.deserialize().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].frame_no, 1);
        assert_eq!(rows[0].displacement_mm_x, 0.5);
        assert_eq!(rows[1].coverage_percent, 62.0);
    }
}

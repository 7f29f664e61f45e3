//! Gel contact statistics from a binary marker/contact mask.

use opencv::core::Mat;

use crate::config::Config;

/// Per-frame contact descriptors. Purely descriptive; nothing downstream
/// feeds back from these into calibration or tracking.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GelStats {
    /// Effective indentation radius, mm.
    pub radius_mm: f64,
    /// Lit area per marker as a percentage of the expected marker area.
    pub coverage_percent: f64,
}

/// Compute contact stats from a lit-pixel count.
///
/// Lit area is averaged over the full lattice, converted to an equivalent
/// circular radius, and normalized against the area a marker of the true
/// physical radius would cover at the configured image scale.
pub fn contact_stats(lit_pixels: usize, config: &Config) -> GelStats {
    let true_radius_px = config.true_marker_radius_mm / config.mm_per_pixel;
    let area_per_marker = lit_pixels as f64 / config.num_markers() as f64;
    let radius_px = (area_per_marker / std::f64::consts::PI).sqrt();
    let coverage = area_per_marker / (std::f64::consts::PI * true_radius_px * true_radius_px);
    GelStats {
        radius_mm: radius_px * config.mm_per_pixel,
        coverage_percent: coverage * 100.0,
    }
}

/// Mask adapter: count "on" pixels of a binary mask, then [`contact_stats`].
pub fn contact_stats_from_mask(mask: &Mat, config: &Config) -> anyhow::Result<GelStats> {
    let lit = opencv::core::count_non_zero(mask)?;
    Ok(contact_stats(lit as usize, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_mask_is_all_zero() {
        let stats = contact_stats(0, &Config::default());
        assert_eq!(stats, GelStats { radius_mm: 0.0, coverage_percent: 0.0 });
    }

    #[test]
    fn monotone_in_lit_pixels() {
        let config = Config::default();
        let mut prev = contact_stats(0, &config);
        for lit in [1usize, 63, 500, 4000, 76800] {
            let cur = contact_stats(lit, &config);
            assert!(cur.radius_mm >= prev.radius_mm);
            assert!(cur.coverage_percent >= prev.coverage_percent);
            prev = cur;
        }
    }

    #[test]
    fn full_marker_disks_give_full_coverage() {
        let config = Config::default();
        let true_radius_px = config.true_marker_radius_mm / config.mm_per_pixel;
        let disk_area = std::f64::consts::PI * true_radius_px * true_radius_px;
        let lit = (disk_area * config.num_markers() as f64).round() as usize;
        let stats = contact_stats(lit, &config);
        assert!((stats.coverage_percent - 100.0).abs() < 0.5);
        assert!((stats.radius_mm - config.true_marker_radius_mm).abs() < 0.01);
    }
}

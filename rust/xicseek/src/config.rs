use crate::errors::{
    DataProcessingError,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use xicquery::models::tolerance::{
    MobilityTolerance,
    MzTolerance,
};
use xicquery::{
    MapGeometry,
    PeakRepresentation,
    Tolerance,
};

/// Knobs of the extraction and scoring engine.
///
/// Passed by reference into every stage; nothing reads process-wide state.
/// Missing JSON fields take the defaults below.
///
/// ```
/// use xicseek::EngineConfig;
///
/// let config: EngineConfig = serde_json::from_str(r#"{"tol_ppm": 10.0}"#).unwrap();
/// assert_eq!(config.tol_ppm, 10.0);
/// assert_eq!(config.map_cycle_dim, 13);
/// assert_eq!(config.map_im_dim(), 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// m/z half-width in ppm.
    pub tol_ppm: f64,
    /// Mobility half-width for trace extraction.
    pub tol_im_xic: f64,
    /// Mobility half-width for 2D maps.
    pub tol_im_map: f64,
    /// Mobility bin width of 2D maps.
    pub map_im_gap: f64,
    /// Cycles extracted around each locus.
    pub map_cycle_dim: usize,
    /// Points of the coelution template. Only 7 is supported.
    pub window_points: usize,
    /// Fragment columns per query row.
    pub fragment_slots: usize,
    /// Query rows processed per batch.
    pub batch_size: usize,
    /// Relative and quantile cut used when screening loci.
    pub locus_top_sa_cut: f32,
    /// Ions scoring below this fraction of the best ion are ignored for measured mobility.
    pub measure_im_good_cut: f32,
    /// Half-width of the locus search in retention time; defaults to a fraction of the run.
    pub rt_tolerance: Option<f32>,
    pub rt_tolerance_ratio: f32,
    /// Also score the half and quarter ppm windows.
    pub multi_tolerance: bool,
    /// Build 2D maps even without a model.
    pub compute_maps: bool,
    pub map_representation: PeakRepresentation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tol_ppm: 20.0,
            tol_im_xic: 0.05,
            tol_im_map: 0.025,
            map_im_gap: 0.001,
            map_cycle_dim: 13,
            window_points: 7,
            fragment_slots: 12,
            batch_size: 5000,
            locus_top_sa_cut: 0.75,
            measure_im_good_cut: 0.5,
            rt_tolerance: None,
            rt_tolerance_ratio: 1.0 / 15.0,
            multi_tolerance: true,
            compute_maps: false,
            map_representation: PeakRepresentation::Profile,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &'static str, context: String| -> Result<()> {
            Err(DataProcessingError::InvalidConfiguration { field, context }.into())
        };
        if self.window_points != crate::coelution::TEMPLATE.len() {
            return invalid(
                "window_points",
                format!("only {} is supported, got {}", crate::coelution::TEMPLATE.len(), self.window_points),
            );
        }
        if self.batch_size == 0 {
            return invalid("batch_size", "has to be positive".to_string());
        }
        if self.map_cycle_dim == 0 {
            return invalid("map_cycle_dim", "has to be positive".to_string());
        }
        if !(self.map_im_gap > 0.0) || !(self.tol_im_map > 0.0) {
            return invalid(
                "map_im_gap",
                format!("gap {} and tolerance {} have to be positive", self.map_im_gap, self.tol_im_map),
            );
        }
        if !(self.tol_ppm > 0.0) || !(self.tol_im_xic > 0.0) {
            return invalid("tol_ppm", "tolerances have to be positive".to_string());
        }
        Ok(())
    }

    /// Number of mobility bins of a 2D map.
    pub fn map_im_dim(&self) -> usize {
        (2.0 * self.tol_im_map / self.map_im_gap) as usize
    }

    pub fn map_geometry(&self) -> MapGeometry {
        MapGeometry {
            bin_width: self.map_im_gap,
            num_bins: self.map_im_dim(),
        }
    }

    pub fn xic_tolerance(&self) -> Tolerance {
        Tolerance {
            ms: MzTolerance::Ppm((self.tol_ppm, self.tol_ppm)),
            mobility: MobilityTolerance::Absolute((self.tol_im_xic, self.tol_im_xic)),
        }
    }

    pub fn map_tolerance(&self) -> Tolerance {
        self.xic_tolerance()
            .with_mobility_tolerance(MobilityTolerance::Absolute((self.tol_im_map, self.tol_im_map)))
    }

    /// Locus search half-width for a run ending at `last_rt`.
    pub fn locus_rt_tolerance(&self, last_rt: f32) -> f32 {
        self.rt_tolerance
            .unwrap_or(last_rt * self.rt_tolerance_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.map_geometry().num_bins, 50);
    }

    #[test]
    fn test_rejects_other_template_sizes() {
        let config = EngineConfig {
            window_points: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rt_tolerance_fallback() {
        let config = EngineConfig::default();
        assert!((config.locus_rt_tolerance(1500.0) - 100.0).abs() < 1e-3);
        let fixed = EngineConfig {
            rt_tolerance: Some(30.0),
            ..Default::default()
        };
        assert_eq!(fixed.locus_rt_tolerance(1500.0), 30.0);
    }
}

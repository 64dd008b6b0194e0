//! Per-query quality features read at the centre cycle of each extracted window.
//!
//! All features assume the `Center` ion layout: column 0 is the precursor in
//! MS1, column 1 the precursor in MS2 and fragments start at column 2.
//! Missing matches carry negative m/z and mobility; they are read as 0, which
//! pushes their error to the tolerance cap.

use crate::boundary::Boundary;
use crate::coelution::{
    spectral_angle_score,
    CoelutionScores,
};
use crate::config::EngineConfig;
use crate::errors::{
    DataProcessingError,
    Result,
};
use rayon::prelude::*;
use serde::Serialize;
use xicquery::{
    Array2D,
    Array3,
    ExtractedTraces,
    PrecursorQuery,
    TargetIons,
};

const EPSILON: f64 = 1e-7;
const FIRST_FRAGMENT: usize = 2;
/// Fragments used for height, area and library-similarity features.
pub const TOP_FRAGMENTS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualityFeatures {
    /// Mean coelution over valid ions at the centre cycle.
    pub coelution: f32,
    /// Summed coelution of the first six fragments.
    pub coelution_top6: f32,
    /// ln of the mean SNR over valid ions.
    pub snr_mean: f32,
    /// ln of the coelution-weighted SNR.
    pub snr_weighted: f32,
    pub mass_error_ppm_mean: f32,
    pub mass_error_ppm_weighted: f32,
    pub mobility_bias_mean: f32,
    pub mobility_bias_weighted: f32,
    /// ln(height + 1) of the MS1 precursor.
    pub ms1_height: f32,
    /// ln(sum + 1) of the top fragment heights.
    pub ms2_height: f32,
    pub height_ratio: f32,
    pub ms1_area: f32,
    pub ms2_area: f32,
    pub area_ratio: f32,
    /// Top fragment heights against the library heights.
    pub intensity_similarity: f32,
    pub area_similarity: f32,
    pub measured_rt: f32,
    pub rt_bias: f32,
    /// Score-weighted mobility of the well coeluting ions.
    pub measured_mobility: Option<f64>,
}

/// Lower median, the middle element for odd lengths.
pub fn lower_median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted[(sorted.len() - 1) / 2]
}

/// `(max(x[c-1..=c+1]) + 1) / (median(x) + 1)`.
///
/// ```
/// use xicseek::features::signal_to_noise;
///
/// let trace = [0.0, 1.0, 1.0, 9.0, 1.0, 1.0, 0.0];
/// assert_eq!(signal_to_noise(&trace, 3), 5.0);
/// ```
pub fn signal_to_noise(trace: &[f32], center: usize) -> f32 {
    if trace.is_empty() {
        return 1.0;
    }
    let lo = center.saturating_sub(1);
    let hi = (center + 2).min(trace.len());
    let signal = trace[lo..hi].iter().copied().fold(0.0f32, f32::max);
    (signal + 1.0) / (lower_median(trace) + 1.0)
}

/// Relative m/z error, capped at `cap_ppm`. Missing values count as 0.
pub fn mass_error_ppm(predicted: f64, measured: f64, cap_ppm: f64) -> f64 {
    let measured = measured.max(0.0);
    let ppm = 1e6 * (predicted - measured).abs() / (predicted + EPSILON);
    ppm.min(cap_ppm)
}

/// Absolute mobility error, capped at `cap`. Missing values count as 0.
pub fn mobility_bias(predicted: f64, measured: f64, cap: f64) -> f64 {
    (measured.max(0.0) - predicted).abs().min(cap)
}

/// Trapezoid area of `y` over `x`, with samples outside the boundary set to 0.
pub fn masked_area(y: &[f32], x: &[f32], boundary: Boundary) -> f64 {
    let masked = |i: usize| {
        if boundary.contains(i) {
            y[i] as f64
        } else {
            0.0
        }
    };
    (1..y.len().min(x.len()))
        .map(|i| (x[i] as f64 - x[i - 1] as f64) * (masked(i) + masked(i - 1)) * 0.5)
        .sum()
}

/// Spectral-angle similarity of two vectors.
///
/// ```
/// use xicseek::features::similarity;
///
/// assert!((similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-3);
/// assert!(similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
/// ```
pub fn similarity(x: &[f64], y: &[f64]) -> f64 {
    let dot: f64 = x.iter().zip(y).map(|(a, b)| a * b).sum();
    let norm_x = x.iter().map(|a| a * a).sum::<f64>().sqrt();
    let norm_y = y.iter().map(|a| a * a).sum::<f64>().sqrt();
    spectral_angle_score(dot / (norm_x * norm_y + EPSILON))
}

/// Score-weighted mobility of the ions that coelute well.
///
/// Ions without a match (mobility <= 0) and ions scoring below
/// `good_cut * max(score)` are dropped, the rest are weighted by
/// `score + 1e-7`. `None` when no ion survives.
///
/// ```
/// use xicseek::features::measured_mobility;
///
/// let im = measured_mobility(&[1.0, 1.2, -1.0, 0.5], &[0.9, 0.9, 1.0, 0.1], 0.5).unwrap();
/// assert!((im - 1.1).abs() < 1e-6);
/// assert_eq!(measured_mobility(&[-1.0], &[0.9], 0.5), None);
/// ```
pub fn measured_mobility(mobilities: &[f64], scores: &[f64], good_cut: f64) -> Option<f64> {
    let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut acc = 0.0;
    let mut weight_sum = 0.0;
    for (&im, &score) in mobilities.iter().zip(scores) {
        if im <= 0.0 || score < best * good_cut {
            continue;
        }
        let weight = score + EPSILON;
        acc += im * weight;
        weight_sum += weight;
    }
    if weight_sum > 0.0 {
        Some(acc / weight_sum)
    } else {
        None
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        return 0.0;
    }
    values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / weight_sum
}

fn log_ratio(numerator: f64, denominator: f64) -> f32 {
    (numerator / (denominator + EPSILON) + EPSILON).ln() as f32
}

/// Batch inputs shared by every query.
struct FeatureContext<'a> {
    queries: &'a [&'a PrecursorQuery],
    targets: &'a TargetIons,
    smoothed: &'a Array3<f32>,
    mz: &'a Array3<f32>,
    mobility: &'a Array3<f32>,
    retention_times: &'a Array2D<f32>,
    coelution: &'a CoelutionScores,
    boundaries: &'a [Boundary],
    valid_ion_counts: &'a [usize],
    config: &'a EngineConfig,
}

impl FeatureContext<'_> {
    fn query_features(&self, q: usize) -> QualityFeatures {
        let query = self.queries[q];
        let [_, num_ions, trace_len] = self.smoothed.dims();
        let center = trace_len / 2;
        let valid = self.valid_ion_counts[q].min(num_ions);
        let fragments = FIRST_FRAGMENT.min(valid)..valid;
        let top = FIRST_FRAGMENT..(FIRST_FRAGMENT + TOP_FRAGMENTS).min(num_ions);
        let score = |ion: usize| self.coelution.per_ion.get(q, ion, center) as f64;
        let weights: Vec<f64> = (0..valid).map(|ion| score(ion) + EPSILON).collect();

        let snr: Vec<f64> = (0..valid)
            .map(|ion| signal_to_noise(self.smoothed.trace(q, ion), center) as f64)
            .collect();

        let predicted_mz = |ion: usize| self.targets.mz.get(q, ion).unwrap_or(0.0);
        let ppm: Vec<f64> = fragments
            .clone()
            .map(|ion| {
                mass_error_ppm(
                    predicted_mz(ion),
                    self.mz.get(q, ion, center) as f64,
                    self.config.tol_ppm,
                )
            })
            .collect();
        let im_bias: Vec<f64> = fragments
            .clone()
            .map(|ion| {
                mobility_bias(
                    query.predicted_mobility,
                    self.mobility.get(q, ion, center) as f64,
                    self.config.tol_im_xic,
                )
            })
            .collect();
        let fragment_weights = &weights[fragments.clone()];

        let boundary = self.boundaries[q];
        let rts = self.retention_times.get_row(q).unwrap_or(&[]);
        let height = |ion: usize| self.smoothed.get(q, ion, center) as f64;
        let area = |ion: usize| masked_area(self.smoothed.trace(q, ion), rts, boundary);
        let ms1_height = if num_ions > 0 { height(0) } else { 0.0 };
        let ms1_area = if num_ions > 0 { area(0) } else { 0.0 };
        let top_heights: Vec<f64> = top.clone().map(height).collect();
        let top_areas: Vec<f64> = top.clone().map(area).collect();
        let ms2_height: f64 = top_heights.iter().sum();
        let ms2_area: f64 = top_areas.iter().sum();

        let library: Vec<f64> = (0..top_heights.len())
            .map(|i| {
                if i < query.valid_fragments {
                    query.fragment_heights.get(i).copied().unwrap_or(0.0) as f64
                } else {
                    0.0
                }
            })
            .collect();
        let relative = |values: &[f64]| -> Vec<f64> {
            let max = values.iter().copied().fold(0.0, f64::max) + EPSILON;
            values.iter().map(|v| v / max).collect()
        };

        let ims: Vec<f64> = (0..valid)
            .map(|ion| self.mobility.get(q, ion, center) as f64)
            .collect();
        let scores: Vec<f64> = (0..valid).map(score).collect();
        let measured_rt = rts.get(center).copied().unwrap_or(0.0);

        QualityFeatures {
            coelution: self.coelution.aggregate.get(q, center).unwrap_or(0.0),
            coelution_top6: top.clone().filter(|&ion| ion < valid).map(score).sum::<f64>() as f32,
            snr_mean: (mean(&snr) + EPSILON).ln() as f32,
            snr_weighted: (weighted_mean(&snr, &weights) + EPSILON).ln() as f32,
            mass_error_ppm_mean: mean(&ppm) as f32,
            mass_error_ppm_weighted: weighted_mean(&ppm, fragment_weights) as f32,
            mobility_bias_mean: mean(&im_bias) as f32,
            mobility_bias_weighted: weighted_mean(&im_bias, fragment_weights) as f32,
            ms1_height: (ms1_height + 1.0).ln() as f32,
            ms2_height: (ms2_height + 1.0).ln() as f32,
            height_ratio: log_ratio(ms1_height, ms2_height),
            ms1_area: (ms1_area + 1.0).ln() as f32,
            ms2_area: (ms2_area + 1.0).ln() as f32,
            area_ratio: log_ratio(ms1_area, ms2_area),
            intensity_similarity: similarity(&library, &relative(&top_heights)) as f32,
            area_similarity: similarity(&library, &relative(&top_areas)) as f32,
            measured_rt,
            rt_bias: (query.predicted_rt - measured_rt).abs(),
            measured_mobility: measured_mobility(&ims, &scores, self.config.measure_im_good_cut as f64),
        }
    }
}

/// Quality features of every query in a batch extracted with the `Center` layout.
///
/// `extracted` has to carry m/z and mobility tensors; `smoothed` are its
/// smoothed intensities, scored into `coelution` and bounded by `boundaries`.
#[allow(clippy::too_many_arguments)]
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn compute_features(
    queries: &[&PrecursorQuery],
    targets: &TargetIons,
    extracted: &ExtractedTraces,
    smoothed: &Array3<f32>,
    coelution: &CoelutionScores,
    boundaries: &[Boundary],
    valid_ion_counts: &[usize],
    config: &EngineConfig,
) -> Result<Vec<QualityFeatures>> {
    let (Some(mz), Some(mobility)) = (extracted.mz.as_ref(), extracted.mobility.as_ref()) else {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("feature computation needs m/z and mobility traces".to_string()),
        }
        .into());
    };
    let num_queries = smoothed.num_queries();
    for (len, what) in [
        (queries.len(), "queries"),
        (boundaries.len(), "boundaries"),
        (valid_ion_counts.len(), "valid ion counts"),
        (targets.num_queries(), "targets"),
    ] {
        if len != num_queries {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: num_queries,
                other: len,
                context: format!("{} vs traces in feature computation", what),
            }
            .into());
        }
    }

    let ctx = FeatureContext {
        queries,
        targets,
        smoothed,
        mz,
        mobility,
        retention_times: &extracted.retention_times,
        coelution,
        boundaries,
        valid_ion_counts,
        config,
    };
    Ok((0..num_queries)
        .into_par_iter()
        .map(|q| ctx.query_features(q))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_median() {
        assert_eq!(lower_median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(lower_median(&[4.0, 1.0, 3.0, 2.0]), 2.0);
        assert_eq!(lower_median(&[]), 0.0);
    }

    #[test]
    fn test_snr_edges() {
        let trace = [5.0f32, 0.0, 0.0];
        // Window at the first cycle only has two points
        assert_eq!(signal_to_noise(&trace, 0), 6.0);
        assert_eq!(signal_to_noise(&[], 0), 1.0);
    }

    #[test]
    fn test_missing_values_hit_the_cap() {
        assert_eq!(mass_error_ppm(500.0, -1.0, 20.0), 20.0);
        assert!((mass_error_ppm(500.0, 500.005, 20.0) - 10.0).abs() < 1e-3);
        assert_eq!(mobility_bias(1.0, -1.0, 0.05), 0.05);
        assert!((mobility_bias(1.0, 1.01, 0.05) - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_masked_area() {
        let y = [1.0f32, 1.0, 1.0, 1.0, 1.0];
        let x = [0.0f32, 1.0, 2.0, 3.0, 4.0];
        let full = Boundary { left: 0, right: 4 };
        assert!((masked_area(&y, &x, full) - 4.0).abs() < 1e-9);
        // Masked samples still close the trapezoids at the boundary
        let inner = Boundary { left: 1, right: 3 };
        assert!((masked_area(&y, &x, inner) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_measured_mobility_drops_weak_ions() {
        let im = measured_mobility(&[1.0, 2.0], &[1.0, 0.4], 0.5).unwrap();
        assert!((im - 1.0).abs() < 1e-9);
        assert_eq!(measured_mobility(&[], &[], 0.5), None);
    }
}

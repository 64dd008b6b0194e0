//! Locus search: where along the run does a query elute?
//!
//! Queries without a known apex are extracted over their retention-time
//! tolerance, scored for coelution, and every strong local maximum of the
//! aggregate score becomes a candidate locus.

use crate::coelution::score_coelution;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::features::measured_mobility;
use crate::smoothing::smooth_traces;
use serde::Serialize;
use tracing::debug;
use xicquery::{
    AcquisitionWindow,
    Array2D,
    CycleWindow,
    ExtractedTraces,
    IonLayout,
    PrecursorQuery,
    TargetIons,
    extract_traces,
};

/// Quantile with linear interpolation between the closest ranks.
///
/// ```
/// use xicseek::locus::quantile;
///
/// assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.5);
/// assert_eq!(quantile(&[4.0, 1.0, 3.0], 1.0), 4.0);
/// ```
pub fn quantile(values: &[f32], q: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f32;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    let frac = pos - lo as f32;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Zeroes every point that is not strictly above both neighbours.
///
/// Outside the row counts as 0.
pub fn reserve_local_maxima(row: &mut [f32]) {
    let original = row.to_vec();
    let at = |i: isize| -> f32 {
        if i < 0 || i as usize >= original.len() {
            0.0
        } else {
            original[i as usize]
        }
    };
    for (i, slot) in row.iter_mut().enumerate() {
        let i = i as isize;
        if !(at(i) > at(i - 1) && at(i) > at(i + 1)) {
            *slot = 0.0;
        }
    }
}

/// A candidate elution apex of one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocusCandidate {
    /// Cycle index within the whole run.
    pub cycle: usize,
    /// Aggregate coelution at that cycle.
    pub score: f32,
    pub measured_mobility: Option<f64>,
}

/// Positive local maxima of `row` that reach `top_cut` of the row maximum
/// and the `top_cut` quantile of the row, as `(offset, score)` pairs.
///
/// Both thresholds are computed on the row before local-maximum screening.
pub fn screen_row(row: &[f32], top_cut: f32) -> Vec<(usize, f32)> {
    let threshold = quantile(row, top_cut);
    let row_max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut maxima = row.to_vec();
    reserve_local_maxima(&mut maxima);
    maxima
        .into_iter()
        .enumerate()
        .filter(|&(_, score)| {
            let too_low = score / row_max < top_cut || score < threshold;
            score > 0.0 && !too_low
        })
        .collect()
}

/// [`screen_row`] over every query row of an aggregate score matrix.
pub fn screen_loci(aggregate: &Array2D<f32>, top_cut: f32) -> Vec<Vec<(usize, f32)>> {
    aggregate
        .row_apply(|row| screen_row(row, top_cut))
        .collect()
}

/// Candidate loci of each query, searched over its retention-time tolerance.
///
/// Traces use the centre layout at the predicted mobility. The measured
/// mobility of each candidate comes from the ions that coelute well at it.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn search_loci(
    window: &AcquisitionWindow,
    queries: &[&PrecursorQuery],
    config: &EngineConfig,
) -> Result<Vec<Vec<LocusCandidate>>> {
    let cycle_rts = window.cycle_retention_times();
    let Some(&last_rt) = cycle_rts.last() else {
        return Ok(vec![Vec::new(); queries.len()]);
    };
    let rt_tolerance = config.locus_rt_tolerance(last_rt);
    let layout = IonLayout::Center {
        neutrons: 0,
        fragment_slots: config.fragment_slots,
    };
    let targets = TargetIons::from_queries(queries.iter().copied(), layout, |q| q.predicted_mobility);
    let cycles: Vec<CycleWindow> = queries
        .iter()
        .map(|q| CycleWindow::from_rt_tolerance(q.predicted_rt, rt_tolerance, cycle_rts))
        .collect();
    let valid: Vec<usize> = queries.iter().map(|q| layout.valid_ion_count(q)).collect();

    let ExtractedTraces {
        cycle_windows,
        intensity,
        mobility,
        ..
    } = extract_traces(window, &targets, &cycles, &config.xic_tolerance(), false)?;
    let smoothed = smooth_traces(intensity);
    let coelution = score_coelution(&smoothed, &valid)?;
    let screened = screen_loci(&coelution.aggregate, config.locus_top_sa_cut);

    let candidates: Vec<Vec<LocusCandidate>> = screened
        .into_iter()
        .enumerate()
        .map(|(q, hits)| {
            hits.into_iter()
                .map(|(offset, score)| {
                    let ions = 0..valid[q].min(smoothed.num_ions());
                    let ims: Vec<f64> = match &mobility {
                        Some(m) => ions.clone().map(|ion| m.get(q, ion, offset) as f64).collect(),
                        None => Vec::new(),
                    };
                    let scores: Vec<f64> = ions
                        .map(|ion| coelution.per_ion.get(q, ion, offset) as f64)
                        .collect();
                    LocusCandidate {
                        cycle: cycle_windows[q].start() + offset,
                        score,
                        measured_mobility: measured_mobility(
                            &ims,
                            &scores,
                            config.measure_im_good_cut as f64,
                        ),
                    }
                })
                .collect()
        })
        .collect();

    debug!(
        "Found {} loci for {} queries over {} cycles (rt tolerance {:.1})",
        candidates.iter().map(|c| c.len()).sum::<usize>(),
        queries.len(),
        cycle_windows.first().map(|c| c.width()).unwrap_or(0),
        rt_tolerance,
    );
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_maxima() {
        let mut row = [1.0, 3.0, 3.0, 2.0, 5.0, 1.0, 2.0];
        reserve_local_maxima(&mut row);
        // Plateaus are not strict maxima; the last point beats the zero padding
        assert_eq!(row, [0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 2.0]);
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [0.0, 10.0];
        assert!((quantile(&values, 0.75) - 7.5).abs() < 1e-6);
        assert_eq!(quantile(&[], 0.5), 0.0);
        assert_eq!(quantile(&[3.0], 0.9), 3.0);
    }

    #[test]
    fn test_screen_row_keeps_strong_peaks() {
        let row = [0.0, 0.2, 0.9, 0.2, 0.0, 0.5, 0.0, 0.8, 0.1, 0.0];
        let hits = screen_row(&row, 0.75);
        let cycles: Vec<usize> = hits.iter().map(|h| h.0).collect();
        // 0.5 is a local maximum but below 0.75 of the row maximum
        assert_eq!(cycles, vec![2, 7]);
        assert_eq!(hits[0].1, 0.9);
    }

    #[test]
    fn test_screen_row_without_signal() {
        assert!(screen_row(&[0.0; 8], 0.75).is_empty());
        assert!(screen_row(&[-0.2, -0.1, -0.3], 0.75).is_empty());
        assert!(screen_row(&[], 0.75).is_empty());
    }
}

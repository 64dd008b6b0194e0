use crate::coelution::CoelutionScores;
use crate::errors::{
    DataProcessingError,
    Result,
};
use rayon::prelude::*;
use serde::Serialize;
use xicquery::Array3;

const WEIGHT_EPSILON: f64 = 1e-7;
const FALLBACK_OFFSET: isize = 3;

/// Elution start and end, as cycle offsets into the extracted window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Boundary {
    pub left: usize,
    pub right: usize,
}

impl Boundary {
    pub fn span(&self) -> usize {
        self.right - self.left
    }

    pub fn contains(&self, cycle: usize) -> bool {
        self.left <= cycle && cycle <= self.right
    }
}

#[inline]
fn padded(x: &[f32], idx: isize) -> f32 {
    if idx < 0 || idx as usize >= x.len() {
        0.0
    } else {
        x[idx as usize]
    }
}

/// First valley left of `center`, or `center - 3` when there is none.
///
/// Cycle `j` is a left valley when `x[j] < x[j + 1]` and `x[j] <= x[j - 1]`,
/// with zeros outside the trace.
pub fn left_valley(x: &[f32], center: usize) -> isize {
    let center = center as isize;
    (0..center)
        .rev()
        .find(|&j| padded(x, j) < padded(x, j + 1) && padded(x, j) <= padded(x, j - 1))
        .unwrap_or(center - FALLBACK_OFFSET)
}

/// First valley right of `center`, or `center + 3` when there is none.
///
/// Cycle `j` is a right valley when `x[j] <= x[j + 1]` and `x[j] < x[j - 1]`,
/// with zeros outside the trace.
pub fn right_valley(x: &[f32], center: usize) -> isize {
    let center = center as isize;
    ((center + 1)..x.len() as isize)
        .find(|&j| padded(x, j) <= padded(x, j + 1) && padded(x, j) < padded(x, j - 1))
        .unwrap_or(center + FALLBACK_OFFSET)
}

/// Score-weighted boundary over several ion traces of equal length.
///
/// Each ion votes with its own valleys around `len / 2`, weighted by
/// `score + 1e-7`; the weight sum gets another `1e-7`. The averages are
/// rounded and clamped so that `0 <= left <= center <= right < len`.
///
/// ```
/// use xicseek::boundary::estimate_boundary;
///
/// let trace = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0];
/// let boundary = estimate_boundary(&[&trace[..]], &[0.8]);
/// assert_eq!((boundary.left, boundary.right), (2, 10));
/// ```
pub fn estimate_boundary(traces: &[&[f32]], scores: &[f32]) -> Boundary {
    debug_assert_eq!(traces.len(), scores.len());
    let len = traces.first().map(|t| t.len()).unwrap_or(0);
    let center = len / 2;
    if len == 0 || traces.is_empty() {
        return Boundary {
            left: center,
            right: center,
        };
    }

    let mut left_acc = 0.0f64;
    let mut right_acc = 0.0f64;
    let mut weight_sum = 0.0f64;
    for (trace, &score) in traces.iter().zip(scores) {
        let weight = score as f64 + WEIGHT_EPSILON;
        left_acc += left_valley(trace, center) as f64 * weight;
        right_acc += right_valley(trace, center) as f64 * weight;
        weight_sum += weight;
    }

    let denom = weight_sum + WEIGHT_EPSILON;
    let left = (left_acc / denom).round() as isize;
    let right = (right_acc / denom).round() as isize;
    Boundary {
        left: left.clamp(0, center as isize) as usize,
        right: right.clamp(center as isize, len as isize - 1) as usize,
    }
}

/// Boundaries of every query, from its valid ion traces and their scores at the center cycle.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn estimate_boundaries(
    traces: &Array3<f32>,
    coelution: &CoelutionScores,
    valid_ion_counts: &[usize],
) -> Result<Vec<Boundary>> {
    if traces.dims() != coelution.per_ion.dims() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: traces.as_flat().len(),
            other: coelution.per_ion.as_flat().len(),
            context: "traces vs coelution scores in boundary estimation".to_string(),
        }
        .into());
    }
    let [num_queries, num_ions, trace_len] = traces.dims();
    let center = trace_len / 2;
    Ok((0..num_queries)
        .into_par_iter()
        .map(|query| {
            let valid = valid_ion_counts.get(query).copied().unwrap_or(0).min(num_ions);
            let ion_traces: Vec<&[f32]> = (0..valid).map(|ion| traces.trace(query, ion)).collect();
            let scores: Vec<f32> = (0..valid)
                .map(|ion| coelution.per_ion.get(query, ion, center))
                .collect();
            estimate_boundary(&ion_traces, &scores)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_PEAKS: [f32; 13] = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0];

    #[test]
    fn test_two_peak_valleys() {
        assert_eq!(left_valley(&TWO_PEAKS, 6), 2);
        assert_eq!(right_valley(&TWO_PEAKS, 6), 10);
        let boundary = estimate_boundary(&[&TWO_PEAKS[..]], &[1.0]);
        assert!(boundary.left <= 3);
        assert!(boundary.right >= 9);
        assert_eq!(boundary.span(), 8);
    }

    #[test]
    fn test_fallback_without_valley() {
        // Zero padding makes both ends local maxima, not valleys
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        assert_eq!(left_valley(&x, 6), 3);
        assert_eq!(right_valley(&x, 6), 9);
    }

    #[test]
    fn test_fallback_offsets() {
        let flat = [5.0f32; 13];
        assert_eq!(left_valley(&flat, 6), 3);
        assert_eq!(right_valley(&flat, 6), 9);
    }

    #[test]
    fn test_weighted_average_between_ions() {
        let mut early = [0.0f32; 13];
        early[6] = 10.0;
        early[4] = 1.0;
        let mut late = [0.0f32; 13];
        late[2..7].copy_from_slice(&[1.0, 2.0, 3.0, 4.0, 10.0]);
        assert_eq!(left_valley(&early, 6), 5);
        assert_eq!(left_valley(&late, 6), 1);

        let heavy_early = estimate_boundary(&[&early[..], &late[..]], &[0.9, 0.1]);
        assert_eq!(heavy_early.left, 5);
        let even = estimate_boundary(&[&early[..], &late[..]], &[0.5, 0.5]);
        assert_eq!(even.left, 3);
    }

    #[test]
    fn test_short_trace_is_clamped() {
        let x = [1.0f32, 2.0, 1.0];
        let boundary = estimate_boundary(&[&x[..]], &[1.0]);
        assert!(boundary.left <= 1 && boundary.right >= 1 && boundary.right <= 2);
    }
}

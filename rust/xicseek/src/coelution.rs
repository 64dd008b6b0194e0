//! Coelution scoring against a fixed elution-peak template.
//!
//! Every cycle with a full 7-point neighbourhood is compared with a
//! discretized Gaussian through the cosine similarity, turned into a signed
//! spectral-angle score `1 - 2 * acos(cos) / pi`. The 3 cycles at each end of a
//! trace have no full neighbourhood and score 0.
//!
//! Scoring one trace reads overlapping windows of the same samples, so each
//! worker first copies the trace into a zero-padded tile and then scores from
//! it. [`TileBuffer::load`] only hands out a [`LoadedTile`] once the copy is
//! complete, and the tile stays read-only while it is borrowed.

use crate::errors::{
    DataProcessingError,
    Result,
};
use rayon::prelude::*;
use std::f64::consts::PI;
use xicquery::{
    Array2D,
    Array3,
};

pub const TEMPLATE: [f64; 7] = [0.0044, 0.054, 0.242, 0.399, 0.242, 0.054, 0.0044];
/// Norm of [`TEMPLATE`], rounded.
pub const TEMPLATE_NORM: f64 = 0.531225;
pub const HALF_WIDTH: usize = TEMPLATE.len() / 2;
const NORM_EPSILON: f64 = 1e-6;
pub const VALID_ION_EPSILON: f64 = 1e-7;

/// Maps a cosine similarity to `[-1, 1]`, 1 being a perfect alignment.
///
/// ```
/// use xicseek::coelution::spectral_angle_score;
///
/// assert_eq!(spectral_angle_score(1.0), 1.0);
/// assert!(spectral_angle_score(0.0).abs() < 1e-12);
/// // Cosines above 1 from rounding are clamped
/// assert_eq!(spectral_angle_score(1.0000001), 1.0);
/// ```
pub fn spectral_angle_score(cosine: f64) -> f64 {
    1.0 - 2.0 * cosine.clamp(-1.0, 1.0).acos() / PI
}

/// Reusable scratch space for one worker.
#[derive(Debug, Default)]
pub struct TileBuffer {
    padded: Vec<f64>,
}

/// A trace copied into a tile with `HALF_WIDTH` zeros on each side.
#[derive(Debug, Clone, Copy)]
pub struct LoadedTile<'a> {
    padded: &'a [f64],
}

impl TileBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, trace: &[f32]) -> LoadedTile<'_> {
        self.padded.clear();
        self.padded.resize(trace.len() + 2 * HALF_WIDTH, 0.0);
        for (dst, &src) in self.padded[HALF_WIDTH..].iter_mut().zip(trace) {
            *dst = src as f64;
        }
        LoadedTile {
            padded: &self.padded,
        }
    }
}

impl LoadedTile<'_> {
    pub fn len(&self) -> usize {
        self.padded.len() - 2 * HALF_WIDTH
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cosine between the template and the window centred at `cycle`.
    pub fn cosine_at(&self, cycle: usize) -> f64 {
        let window = &self.padded[cycle..cycle + TEMPLATE.len()];
        let mut dot = 0.0;
        let mut sq = 0.0;
        for (&x, &w) in window.iter().zip(TEMPLATE.iter()) {
            dot += x * w;
            sq += x * x;
        }
        let cosine = dot / ((sq.sqrt() + NORM_EPSILON) * TEMPLATE_NORM);
        cosine.min(1.0)
    }

    /// Spectral-angle score of every cycle, ends forced to 0.
    pub fn score_into(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.len());
        out.fill(0.0);
        let len = self.len();
        if len <= 2 * HALF_WIDTH {
            return;
        }
        for (cycle, slot) in out.iter_mut().enumerate().take(len - HALF_WIDTH).skip(HALF_WIDTH) {
            *slot = spectral_angle_score(self.cosine_at(cycle)) as f32;
        }
    }
}

/// Per-ion and per-query coelution scores of a batch.
#[derive(Debug, Clone)]
pub struct CoelutionScores {
    /// (query × ion × cycle); ions past a query's valid count are 0.
    pub per_ion: Array3<f32>,
    /// (query × cycle) mean over valid ions.
    pub aggregate: Array2D<f32>,
}

impl CoelutionScores {
    /// Per-ion scores of one query at one cycle.
    pub fn ions_at(&self, query: usize, cycle: usize) -> Vec<f32> {
        (0..self.per_ion.num_ions())
            .map(|ion| self.per_ion.get(query, ion, cycle))
            .collect()
    }
}

/// Scores every (query, ion) trace against the template.
///
/// `valid_ion_counts[q]` ions of query `q` are real, the remaining columns
/// are padding. The aggregate divides by `valid + 1e-7` so a query without
/// valid ions scores 0.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn score_coelution(traces: &Array3<f32>, valid_ion_counts: &[usize]) -> Result<CoelutionScores> {
    let [num_queries, num_ions, trace_len] = traces.dims();
    if valid_ion_counts.len() != num_queries {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: num_queries,
            other: valid_ion_counts.len(),
            context: "valid ion counts vs queries in coelution scoring".to_string(),
        }
        .into());
    }

    let mut per_ion = Array3::filled([num_queries, num_ions, trace_len], 0.0f32);
    if trace_len > 0 && num_ions > 0 {
        per_ion
            .as_flat_mut()
            .par_chunks_mut(trace_len)
            .zip(traces.as_flat().par_chunks(trace_len))
            .enumerate()
            .with_min_len(64)
            .for_each_init(TileBuffer::new, |tile, (flat, (out, trace))| {
                let (query, ion) = (flat / num_ions, flat % num_ions);
                if ion >= valid_ion_counts[query] {
                    return;
                }
                tile.load(trace).score_into(out);
            });
    }

    let mut aggregate = vec![0.0f32; num_queries * trace_len];
    if trace_len > 0 {
        aggregate
            .par_chunks_mut(trace_len)
            .enumerate()
            .for_each(|(query, row)| {
                let valid = valid_ion_counts[query].min(num_ions);
                let denom = valid as f64 + VALID_ION_EPSILON;
                for (cycle, slot) in row.iter_mut().enumerate() {
                    let total: f64 = (0..valid)
                        .map(|ion| per_ion.get(query, ion, cycle) as f64)
                        .sum();
                    *slot = (total / denom) as f32;
                }
            });
    }

    Ok(CoelutionScores {
        per_ion,
        aggregate: Array2D::from_flat_vector(aggregate, num_queries, trace_len)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_trace(scale: f32, pad: usize) -> Vec<f32> {
        let mut trace = vec![0.0f32; pad];
        trace.extend(TEMPLATE.iter().map(|&w| w as f32 * scale));
        trace.extend(vec![0.0f32; pad]);
        trace
    }

    #[test]
    fn test_template_norm_constant() {
        let norm: f64 = TEMPLATE.iter().map(|w| w * w).sum::<f64>().sqrt();
        assert!((norm - TEMPLATE_NORM).abs() < 1e-5);
    }

    #[test]
    fn test_template_shaped_trace_apex_score() {
        let trace = template_trace(100.0, 3);
        let mut buffer = TileBuffer::new();
        let tile = buffer.load(&trace);
        let mut out = vec![0.0f32; trace.len()];
        tile.score_into(&mut out);

        let apex = 3 + HALF_WIDTH;
        let window: Vec<f64> = trace[3..3 + TEMPLATE.len()].iter().map(|&x| x as f64).collect();
        let dot: f64 = window.iter().zip(TEMPLATE.iter()).map(|(x, w)| x * w).sum();
        let norm: f64 = window.iter().map(|x| x * x).sum::<f64>().sqrt();
        let cosine = (dot / ((norm + 1e-6) * 0.531225)).min(1.0);
        let expected = spectral_angle_score(cosine);

        // Rounded norm constant plus epsilon land just under 1
        assert!((expected - 0.999353).abs() < 2e-6, "expected {expected}");
        assert!(((out[apex] as f64) - expected).abs() < 1e-5, "apex score {}", out[apex]);
        assert!(out[apex] < 1.0);
        assert!(out[apex] > out[apex - 1]);
        assert!(out[apex] > out[apex + 1]);
        assert!(out[..3].iter().all(|&x| x == 0.0));
        assert!(out[out.len() - 3..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_flat_zero_trace_scores_zero() {
        let trace = vec![0.0f32; 13];
        let mut buffer = TileBuffer::new();
        let mut out = vec![1.0f32; 13];
        buffer.load(&trace).score_into(&mut out);
        assert!(out.iter().all(|&x| x.abs() < 1e-6));
    }

    #[test]
    fn test_short_traces_score_zero() {
        let trace = vec![1.0f32; 6];
        let mut buffer = TileBuffer::new();
        let mut out = vec![1.0f32; 6];
        buffer.load(&trace).score_into(&mut out);
        assert_eq!(out, vec![0.0; 6]);
    }

    #[test]
    fn test_padding_ions_are_excluded_from_aggregate() {
        let good = template_trace(10.0, 3);
        let len = good.len();
        let mut flat = good.clone();
        // A second ion with the same shape, but marked as padding
        flat.extend(good.iter());
        let traces = Array3::from_flat_vector(flat, [1, 2, len]).unwrap();

        let scores = score_coelution(&traces, &[1]).unwrap();
        let apex = 3 + HALF_WIDTH;
        assert!(scores.per_ion.trace(0, 1).iter().all(|&x| x == 0.0));
        let single = scores.per_ion.get(0, 0, apex);
        assert!((scores.aggregate.get(0, apex).unwrap() - single).abs() < 1e-5);

        let both = score_coelution(&traces, &[2]).unwrap();
        assert!((both.aggregate.get(0, apex).unwrap() - single).abs() < 1e-5);
    }

    #[test]
    fn test_zero_valid_ions() {
        let traces = Array3::from_flat_vector(template_trace(10.0, 3), [1, 1, 13]).unwrap();
        let scores = score_coelution(&traces, &[0]).unwrap();
        assert!(scores.aggregate.as_flat().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_mismatched_valid_counts() {
        let traces = Array3::filled([2, 1, 13], 0.0f32);
        assert!(score_coelution(&traces, &[1]).is_err());
    }
}

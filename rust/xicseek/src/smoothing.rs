use rayon::prelude::*;
use xicquery::Array3;

const EDGE_NEIGHBOR_WEIGHT: f32 = 0.333;

/// 3-point weighted moving average of one trace into `out`.
///
/// Interior points are `0.5 * x[i] + 0.25 * (x[i - 1] + x[i + 1])`, the first
/// point is `0.667 * x[0] + 0.333 * x[1]` and the last one mirrors it.
/// A single-point trace is copied as is.
///
/// ```
/// use xicseek::smoothing::smooth_trace;
///
/// let mut out = [0.0; 5];
/// smooth_trace(&[0.0, 0.0, 4.0, 0.0, 0.0], &mut out);
/// assert_eq!(out, [0.0, 1.0, 2.0, 1.0, 0.0]);
/// ```
pub fn smooth_trace(x: &[f32], out: &mut [f32]) {
    debug_assert_eq!(x.len(), out.len());
    let len = x.len();
    match len {
        0 => {}
        1 => out[0] = x[0],
        _ => {
            // 0.667 * a + 0.333 * b, written so constant traces stay exact
            out[0] = x[0] + EDGE_NEIGHBOR_WEIGHT * (x[1] - x[0]);
            out[len - 1] = x[len - 1] + EDGE_NEIGHBOR_WEIGHT * (x[len - 2] - x[len - 1]);
            for i in 1..len - 1 {
                out[i] = 0.5 * x[i] + 0.25 * (x[i - 1] + x[i + 1]);
            }
        }
    }
}

/// Smooths every (query, ion) trace, in parallel.
///
/// Consumes the raw tensor and hands back a new one.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn smooth_traces(traces: Array3<f32>) -> Array3<f32> {
    let dims = traces.dims();
    let trace_len = dims[2];
    if trace_len == 0 {
        return traces;
    }
    let mut out = Array3::filled(dims, 0.0f32);
    out.as_flat_mut()
        .par_chunks_mut(trace_len)
        .zip(traces.as_flat().par_chunks(trace_len))
        .with_min_len(128)
        .for_each(|(dst, src)| smooth_trace(src, dst));
    out
}

//! Targeted peak extraction over an acquisition window.
//!
//! Two kernels share the same scan loop: [`find_maximum`] keeps the most
//! intense matching peak per cycle (traces), [`bin_scan_into`] keeps the
//! maximum per mobility bin (2D maps). Both locate the starting peak with
//! [`find_first_match`] and walk forward until the m/z window is passed.

use super::arrays::{
    Array2D,
    Array3,
};
use super::cycle_window::CycleWindow;
use super::grid::IonGrid;
use super::locator::find_first_match;
use super::precursor::TargetIons;
use super::scan_index::{
    AcquisitionWindow,
    ScanIndex,
    ScanSlice,
};
use super::tolerance::Tolerance;
use crate::errors::{
    DataProcessingError,
    Result,
};
use crate::utils::{
    OptionallyRestricted,
    TupleRange,
};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{
    AtomicU32,
    Ordering,
};
use tracing::debug;

/// Best peak of one scan for one target.
///
/// Missing matches carry negative m/z and mobility and zero intensity, which
/// downstream code must read as "missing", not as a zero-intensity peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakMatch {
    pub mz: f32,
    pub mobility: f32,
    pub intensity: f32,
}

impl PeakMatch {
    pub const MISSING: PeakMatch = PeakMatch {
        mz: -1.0,
        mobility: -1.0,
        intensity: 0.0,
    };

    pub fn is_missing(&self) -> bool {
        self.mz < 0.0
    }
}

/// Calls `visit` with the index of every peak inside both windows.
///
/// m/z bounds are inclusive, mobility bounds are exclusive.
#[inline]
fn for_each_match(
    scan: &ScanSlice,
    mz_range: TupleRange<f64>,
    mobility_range: &OptionallyRestricted<TupleRange<f64>>,
    mut visit: impl FnMut(usize),
) {
    if scan.is_empty() {
        return;
    }
    let (left, right) = mz_range.as_tuple();
    let mut seek = find_first_match(scan.mz, left, right);
    while seek < scan.len() {
        let x = scan.mz[seek] as f64;
        if x > right {
            break;
        }
        if x >= left && mobility_range.admits(scan.mobility[seek] as f64) {
            visit(seek);
        }
        seek += 1;
    }
}

/// Most intense peak of `scan` inside the windows.
///
/// Among equally intense peaks the first one in m/z order wins. Peaks with
/// zero intensity never count as a match.
///
/// ```
/// use xicquery::{find_maximum, ScanIndex, Tolerance, PeakMatch};
/// use xicquery::models::tolerance::{MzTolerance, MobilityTolerance};
///
/// let index = ScanIndex::from_scans(vec![(
///     1.0,
///     vec![100.0, 100.0, 100.1, 100.2],
///     vec![0.8, 1.0, 1.1, 1.2],
///     vec![5.0, 9.0, 3.0, 1.0],
/// )])
/// .unwrap();
/// let tol = Tolerance {
///     ms: MzTolerance::Ppm((50.0, 50.0)),
///     mobility: MobilityTolerance::Absolute((0.05, 0.05)),
/// };
/// let best = find_maximum(&index.scan(0), tol.mz_range(100.0), &tol.mobility_range(1.0));
/// assert_eq!(best, PeakMatch { mz: 100.0, mobility: 1.0, intensity: 9.0 });
/// ```
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn find_maximum(
    scan: &ScanSlice,
    mz_range: TupleRange<f64>,
    mobility_range: &OptionallyRestricted<TupleRange<f64>>,
) -> PeakMatch {
    let mut best: Option<usize> = None;
    let mut best_intensity = 0.0f32;
    for_each_match(scan, mz_range, mobility_range, |idx| {
        let y = scan.intensity[idx];
        if y > best_intensity {
            best_intensity = y;
            best = Some(idx);
        }
    });
    match best {
        Some(idx) => PeakMatch {
            mz: scan.mz[idx],
            mobility: scan.mobility[idx],
            intensity: best_intensity,
        },
        None => PeakMatch::MISSING,
    }
}

/// Raises `cell` to `value` if it is larger, with a compare-and-swap loop.
#[inline]
fn atomic_max_f32(cell: &AtomicU32, value: f32) {
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        if value > f32::from_bits(bits) {
            Some(value.to_bits())
        } else {
            None
        }
    });
}

/// Updates the per-bin maxima of one cycle with every matching peak of `scan`.
///
/// The bin of a peak is `floor((mobility - lower_bound) / bin_width)`; peaks
/// landing outside `bins` through rounding are dropped.
pub fn bin_scan_into(
    scan: &ScanSlice,
    mz_range: TupleRange<f64>,
    mobility_range: TupleRange<f64>,
    bin_width: f64,
    bins: &[AtomicU32],
) {
    let base = mobility_range.start();
    let restricted = OptionallyRestricted::Restricted(mobility_range);
    for_each_match(scan, mz_range, &restricted, |idx| {
        let bin = ((scan.mobility[idx] as f64 - base) / bin_width).floor();
        if bin >= 0.0 && (bin as usize) < bins.len() {
            atomic_max_f32(&bins[bin as usize], scan.intensity[idx]);
        }
    });
}

/// Traces extracted for one batch of queries.
#[derive(Debug, Clone)]
pub struct ExtractedTraces {
    pub cycle_windows: Vec<CycleWindow>,
    /// Retention time of every extracted cycle (query × cycle).
    pub retention_times: Array2D<f32>,
    pub intensity: Array3<f32>,
    pub mz: Option<Array3<f32>>,
    pub mobility: Option<Array3<f32>>,
}

fn check_windows(window: &AcquisitionWindow, targets: &TargetIons, cycles: &[CycleWindow]) -> Result<usize> {
    if cycles.len() != targets.num_queries() {
        return Err(DataProcessingError::ExpectedVectorLength {
            real: cycles.len(),
            expected: targets.num_queries(),
        }
        .into());
    }
    let width = cycles.first().map(|c| c.width()).unwrap_or(0);
    for c in cycles {
        if c.width() != width {
            return Err(DataProcessingError::InvalidWindowWidth { width: c.width() }.into());
        }
        if c.end() > window.num_cycles() {
            return Err(DataProcessingError::IndexOutOfBoundsError(c.end()).into());
        }
    }
    Ok(width)
}

#[inline]
fn stage_for<'a>(window: &'a AcquisitionWindow, targets: &TargetIons, ion: usize) -> &'a ScanIndex {
    if ion < targets.ms1_ion_count {
        &window.ms1
    } else {
        &window.ms2
    }
}

/// Extracts one max-intensity trace per (query, ion) pair.
///
/// Ion columns below `targets.ms1_ion_count` read MS1 scans, the rest read
/// MS2 scans. All cycle windows must share a width. With `only_intensity`
/// the m/z and mobility tensors are skipped.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn extract_traces(
    window: &AcquisitionWindow,
    targets: &TargetIons,
    cycles: &[CycleWindow],
    tolerance: &Tolerance,
    only_intensity: bool,
) -> Result<ExtractedTraces> {
    let width = check_windows(window, targets, cycles)?;
    let grid = IonGrid::new(targets.num_queries(), targets.num_ions());
    debug!(
        "Extracting {} traces of {} cycles from window {}",
        grid.num_units(),
        width,
        window.id
    );

    let matches = grid.fill_par(width, PeakMatch::MISSING, |query, ion, chunk| {
        let target = targets.mz.values[query * grid.num_ions + ion];
        if target <= 0.0 {
            return;
        }
        let stage = stage_for(window, targets, ion);
        let mz_range = tolerance.mz_range(target);
        let mobility_range = tolerance.mobility_range(targets.mobility[query]);
        for (slot, cycle) in chunk.iter_mut().zip(cycles[query].cycles()) {
            *slot = find_maximum(&stage.scan(cycle), mz_range, &mobility_range);
        }
    });

    let dims = [grid.num_queries, grid.num_ions, width];
    let intensity = Array3::from_flat_vector(matches.iter().map(|m| m.intensity).collect(), dims)?;
    let (mz, mobility) = if only_intensity {
        (None, None)
    } else {
        (
            Some(Array3::from_flat_vector(matches.iter().map(|m| m.mz).collect(), dims)?),
            Some(Array3::from_flat_vector(
                matches.iter().map(|m| m.mobility).collect(),
                dims,
            )?),
        )
    };

    let cycle_rts = window.cycle_retention_times();
    let rts: Vec<f32> = cycles
        .iter()
        .flat_map(|c| cycle_rts[c.cycles()].iter().copied())
        .collect();
    let retention_times = Array2D::from_flat_vector(rts, cycles.len(), width)?;

    Ok(ExtractedTraces {
        cycle_windows: cycles.to_vec(),
        retention_times,
        intensity,
        mz,
        mobility,
    })
}

/// Bin layout of the mobility axis of 2D maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapGeometry {
    pub bin_width: f64,
    pub num_bins: usize,
}

/// Dense (query × ion × cycle × mobility-bin) intensity maps.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityMaps {
    values: Vec<f32>,
    dims: [usize; 4],
}

impl IntensityMaps {
    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub fn num_queries(&self) -> usize {
        self.dims[0]
    }

    pub fn get(&self, query: usize, ion: usize, cycle: usize, bin: usize) -> f32 {
        let [_, n_ion, n_cycle, n_bin] = self.dims;
        self.values[((query * n_ion + ion) * n_cycle + cycle) * n_bin + bin]
    }

    /// The (cycle × bin) map of one ion.
    pub fn map(&self, query: usize, ion: usize) -> &[f32] {
        let len = self.dims[2] * self.dims[3];
        let start = (query * self.dims[1] + ion) * len;
        &self.values[start..start + len]
    }

    /// Copy keeping only the given ion columns, in the given order.
    pub fn select_ions(&self, columns: &[usize]) -> Result<IntensityMaps> {
        if let Some(&bad) = columns.iter().find(|&&c| c >= self.dims[1]) {
            return Err(DataProcessingError::IndexOutOfBoundsError(bad).into());
        }
        let mut values = Vec::with_capacity(self.dims[0] * columns.len() * self.dims[2] * self.dims[3]);
        for query in 0..self.dims[0] {
            for &ion in columns {
                values.extend_from_slice(self.map(query, ion));
            }
        }
        Ok(IntensityMaps {
            values,
            dims: [self.dims[0], columns.len(), self.dims[2], self.dims[3]],
        })
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.values
    }
}

/// Builds max-in-bin 2D maps for every (query, ion) pair.
///
/// Work is split per (query, ion, cycle). Each matching peak raises its
/// (cycle, bin) cell through an atomic max, so concurrent updates of one cell
/// keep the largest intensity. The mobility lower bound of each query is the
/// start of its tolerance window, which therefore has to be restricted.
#[cfg_attr(
    feature = "instrumentation",
    tracing::instrument(skip_all, level = "trace")
)]
pub fn extract_maps(
    window: &AcquisitionWindow,
    targets: &TargetIons,
    cycles: &[CycleWindow],
    tolerance: &Tolerance,
    geometry: MapGeometry,
) -> Result<IntensityMaps> {
    let width = check_windows(window, targets, cycles)?;
    let grid = IonGrid::new(targets.num_queries(), targets.num_ions());
    let mobility_ranges = targets
        .mobility
        .iter()
        .map(|&im| match tolerance.mobility_range(im) {
            OptionallyRestricted::Restricted(range) => Ok(range),
            OptionallyRestricted::Unrestricted => {
                Err(DataProcessingError::ExpectedRestrictedMobility)
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let num_bins = geometry.num_bins;
    let cells: Vec<AtomicU32> = (0..grid.num_units() * width * num_bins)
        .map(|_| AtomicU32::new(0.0f32.to_bits()))
        .collect();

    if width > 0 && num_bins > 0 {
        (0..grid.num_units() * width)
            .into_par_iter()
            .with_min_len(256)
            .for_each(|flat| {
                let (query, ion) = grid.unit(flat / width);
                let cycle_offset = flat % width;
                let target = targets.mz.values[query * grid.num_ions + ion];
                if target <= 0.0 {
                    return;
                }
                let stage = stage_for(window, targets, ion);
                let scan = stage.scan(cycles[query].start() + cycle_offset);
                let bins = &cells[flat * num_bins..(flat + 1) * num_bins];
                bin_scan_into(
                    &scan,
                    tolerance.mz_range(target),
                    mobility_ranges[query],
                    geometry.bin_width,
                    bins,
                );
            });
    }

    Ok(IntensityMaps {
        values: cells
            .into_iter()
            .map(|c| f32::from_bits(c.into_inner()))
            .collect(),
        dims: [grid.num_queries, grid.num_ions, width, num_bins],
    })
}

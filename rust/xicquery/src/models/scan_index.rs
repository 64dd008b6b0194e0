use crate::errors::{
    DataProcessingError,
    DataReadingError,
    Result,
};
use crate::utils::constants::SCAN_FORMAT_VERSION;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

/// Centroid peak lists of one detector stage of one acquisition window.
///
/// CSR layout: scan `i` occupies `seek_offset[i]..seek_offset[i + 1]` of the
/// flat `mz`, `mobility` and `intensity` arrays. Every scan is sorted by m/z.
/// Construction never sorts, it only validates.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanIndex {
    seek_offset: Vec<usize>,
    mz: Vec<f32>,
    mobility: Vec<f32>,
    intensity: Vec<f32>,
    retention_time: Vec<f32>,
}

/// Borrowed view over the peaks of a single scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanSlice<'a> {
    pub mz: &'a [f32],
    pub mobility: &'a [f32],
    pub intensity: &'a [f32],
    pub retention_time: f32,
}

impl ScanSlice<'_> {
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }
}

/// Serialized form of a [`ScanIndex`], as handed over by the scan store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanIndexParts {
    pub format_version: u32,
    pub seek_offset: Vec<usize>,
    pub mz: Vec<f32>,
    pub mobility: Vec<f32>,
    pub intensity: Vec<f32>,
    pub retention_time: Vec<f32>,
}

impl ScanIndex {
    /// Validates the CSR arrays and wraps them.
    ///
    /// Checks that the peak arrays share a length, that the offsets start
    /// at zero, never decrease and end at the peak count, and that retention
    /// times strictly increase. Sorting within each scan is checked separately
    /// by [`ScanIndex::check_sorted`] since it is linear in the peak count.
    pub fn try_new(
        seek_offset: Vec<usize>,
        mz: Vec<f32>,
        mobility: Vec<f32>,
        intensity: Vec<f32>,
        retention_time: Vec<f32>,
    ) -> Result<Self> {
        if mz.len() != mobility.len() || mz.len() != intensity.len() {
            return Err(DataProcessingError::ExpectedVectorSameLength.into());
        }
        if seek_offset.len() != retention_time.len() + 1 {
            return Err(DataProcessingError::ExpectedVectorLength {
                real: seek_offset.len(),
                expected: retention_time.len() + 1,
            }
            .into());
        }
        if seek_offset[0] != 0 {
            return Err(DataProcessingError::InvalidSeekOffsets { position: 0 }.into());
        }
        for (i, w) in seek_offset.windows(2).enumerate() {
            if w[1] < w[0] {
                return Err(DataProcessingError::InvalidSeekOffsets { position: i + 1 }.into());
            }
        }
        if seek_offset[seek_offset.len() - 1] != mz.len() {
            return Err(DataProcessingError::InvalidSeekOffsets {
                position: seek_offset.len() - 1,
            }
            .into());
        }
        for (i, w) in retention_time.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(DataProcessingError::NonIncreasingRetentionTime { scan: i + 1 }.into());
            }
        }

        Ok(Self {
            seek_offset,
            mz,
            mobility,
            intensity,
            retention_time,
        })
    }

    /// Builds the index from already-sorted per-scan peak lists.
    ///
    /// Each item is `(retention_time, mz, mobility, intensity)`.
    ///
    /// ```
    /// use xicquery::ScanIndex;
    ///
    /// let index = ScanIndex::from_scans(vec![
    ///     (1.0, vec![100.0, 200.0], vec![1.0, 1.1], vec![10.0, 20.0]),
    ///     (2.0, vec![], vec![], vec![]),
    /// ])
    /// .unwrap();
    /// assert_eq!(index.num_scans(), 2);
    /// assert_eq!(index.num_peaks(), 2);
    /// assert!(index.scan(1).is_empty());
    /// ```
    pub fn from_scans<I>(scans: I) -> Result<Self>
    where
        I: IntoIterator<Item = (f32, Vec<f32>, Vec<f32>, Vec<f32>)>,
    {
        let mut seek_offset = vec![0];
        let mut mz = Vec::new();
        let mut mobility = Vec::new();
        let mut intensity = Vec::new();
        let mut retention_time = Vec::new();

        for (rt, scan_mz, scan_mobility, scan_intensity) in scans {
            if scan_mz.len() != scan_mobility.len() || scan_mz.len() != scan_intensity.len() {
                return Err(DataProcessingError::ExpectedVectorSameLength.into());
            }
            mz.extend(scan_mz);
            mobility.extend(scan_mobility);
            intensity.extend(scan_intensity);
            retention_time.push(rt);
            seek_offset.push(mz.len());
        }

        Self::try_new(seek_offset, mz, mobility, intensity, retention_time)
    }

    pub fn try_from_parts(parts: ScanIndexParts) -> Result<Self> {
        if parts.format_version != SCAN_FORMAT_VERSION {
            return Err(DataReadingError::UnsupportedFormatVersion {
                found: parts.format_version,
                expected: SCAN_FORMAT_VERSION,
            }
            .into());
        }
        Self::try_new(
            parts.seek_offset,
            parts.mz,
            parts.mobility,
            parts.intensity,
            parts.retention_time,
        )
    }

    pub fn into_parts(self) -> ScanIndexParts {
        ScanIndexParts {
            format_version: SCAN_FORMAT_VERSION,
            seek_offset: self.seek_offset,
            mz: self.mz,
            mobility: self.mobility,
            intensity: self.intensity,
            retention_time: self.retention_time,
        }
    }

    /// Ingestion check that every scan is sorted by m/z.
    pub fn check_sorted(&self) -> Result<()> {
        for scan_idx in 0..self.num_scans() {
            let scan = self.scan(scan_idx);
            if scan.mz.windows(2).any(|w| w[1] < w[0]) {
                debug!("Scan {} is not sorted by m/z", scan_idx);
                return Err(DataProcessingError::UnsortedScan { scan: scan_idx }.into());
            }
        }
        Ok(())
    }

    pub fn scan(&self, index: usize) -> ScanSlice<'_> {
        let start = self.seek_offset[index];
        let end = self.seek_offset[index + 1];
        ScanSlice {
            mz: &self.mz[start..end],
            mobility: &self.mobility[start..end],
            intensity: &self.intensity[start..end],
            retention_time: self.retention_time[index],
        }
    }

    pub fn num_scans(&self) -> usize {
        self.retention_time.len()
    }

    pub fn num_peaks(&self) -> usize {
        self.mz.len()
    }

    pub fn retention_times(&self) -> &[f32] {
        &self.retention_time
    }
}

/// Both detector stages of one acquisition window.
///
/// One cycle holds one MS1 scan and one MS2 scan of this window, so both
/// stages must have the same number of scans.
#[derive(Debug, Clone)]
pub struct AcquisitionWindow {
    pub id: u32,
    pub ms1: ScanIndex,
    pub ms2: ScanIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionWindowParts {
    pub id: u32,
    pub ms1: ScanIndexParts,
    pub ms2: ScanIndexParts,
}

impl AcquisitionWindow {
    pub fn try_new(id: u32, ms1: ScanIndex, ms2: ScanIndex) -> Result<Self> {
        if ms1.num_scans() != ms2.num_scans() {
            return Err(DataProcessingError::CycleCountMismatch {
                ms1: ms1.num_scans(),
                ms2: ms2.num_scans(),
            }
            .into());
        }
        Ok(Self { id, ms1, ms2 })
    }

    pub fn try_from_parts(parts: AcquisitionWindowParts) -> Result<Self> {
        let ms1 = ScanIndex::try_from_parts(parts.ms1)?;
        let ms2 = ScanIndex::try_from_parts(parts.ms2)?;
        ms1.check_sorted()?;
        ms2.check_sorted()?;
        Self::try_new(parts.id, ms1, ms2)
    }

    pub fn num_cycles(&self) -> usize {
        self.ms1.num_scans()
    }

    /// Retention time of each cycle, taken from the MS1 scans.
    pub fn cycle_retention_times(&self) -> &[f32] {
        self.ms1.retention_times()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::XicqueryError;

    fn two_scan_index() -> ScanIndex {
        ScanIndex::from_scans(vec![
            (1.0, vec![100.0, 100.0, 100.1], vec![0.8, 1.0, 1.1], vec![5.0, 9.0, 3.0]),
            (2.0, vec![200.0], vec![1.2], vec![1.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_scan_views_follow_offsets() {
        let index = two_scan_index();
        assert_eq!(index.num_scans(), 2);
        assert_eq!(index.scan(0).mz, &[100.0, 100.0, 100.1]);
        assert_eq!(index.scan(1).intensity, &[1.0]);
        assert_eq!(index.scan(1).retention_time, 2.0);
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let out = ScanIndex::try_new(vec![0, 2], vec![1.0, 2.0], vec![1.0], vec![1.0, 1.0], vec![1.0]);
        assert!(matches!(
            out,
            Err(XicqueryError::DataProcessingError(
                DataProcessingError::ExpectedVectorSameLength
            ))
        ));
    }

    #[test]
    fn test_rejects_bad_offsets() {
        let out = ScanIndex::try_new(
            vec![0, 2, 1],
            vec![1.0, 2.0],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            vec![1.0, 2.0],
        );
        assert!(matches!(
            out,
            Err(XicqueryError::DataProcessingError(
                DataProcessingError::InvalidSeekOffsets { position: 2 }
            ))
        ));
    }

    #[test]
    fn test_rejects_non_increasing_rt() {
        let out = ScanIndex::from_scans(vec![
            (2.0, vec![], vec![], vec![]),
            (2.0, vec![], vec![], vec![]),
        ]);
        assert!(out.is_err());
    }

    #[test]
    fn test_check_sorted() {
        assert!(two_scan_index().check_sorted().is_ok());
        let unsorted = ScanIndex::from_scans(vec![(1.0, vec![2.0, 1.0], vec![1.0, 1.0], vec![1.0, 1.0])])
            .unwrap();
        assert!(matches!(
            unsorted.check_sorted(),
            Err(XicqueryError::DataProcessingError(
                DataProcessingError::UnsortedScan { scan: 0 }
            ))
        ));
    }

    #[test]
    fn test_format_version_mismatch() {
        let mut parts = two_scan_index().into_parts();
        parts.format_version = SCAN_FORMAT_VERSION + 1;
        assert!(matches!(
            ScanIndex::try_from_parts(parts),
            Err(XicqueryError::DataReadingError(
                DataReadingError::UnsupportedFormatVersion { .. }
            ))
        ));
    }

    #[test]
    fn test_window_requires_matching_cycles() {
        let ms2 = ScanIndex::from_scans(vec![(1.0, vec![], vec![], vec![])]).unwrap();
        assert!(AcquisitionWindow::try_new(0, two_scan_index(), ms2).is_err());
    }
}

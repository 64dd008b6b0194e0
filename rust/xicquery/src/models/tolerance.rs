use crate::utils::{
    OptionallyRestricted,
    TupleRange,
};
use serde::{
    Deserialize,
    Serialize,
};

/// Tolerance settings for a targeted extraction.
///
/// Encapsulates how wide the m/z and ion-mobility windows are around
/// each target.
///
/// Example:
/// ```
/// use xicquery::Tolerance;
///
/// let tolerance = Tolerance::default();
/// let mz = tolerance.mz_range(500.0);
/// assert!((mz.start() - 499.99).abs() < 1e-6);
/// assert!((mz.end() - 500.01).abs() < 1e-6);
/// ```
///
/// Convention:
/// Ranges are written as positive half-widths. A tolerance of (1,1) on a
/// value of 10 means the range (9,11).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tolerance {
    pub ms: MzTolerance,
    pub mobility: MobilityTolerance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MzTolerance {
    #[serde(rename = "da")]
    Absolute((f64, f64)),
    #[serde(rename = "ppm")]
    Ppm((f64, f64)),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MobilityTolerance {
    #[serde(rename = "absolute")]
    Absolute((f64, f64)),
    Unrestricted,
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance {
            ms: MzTolerance::Ppm((20.0, 20.0)),
            mobility: MobilityTolerance::Absolute((0.05, 0.05)),
        }
    }
}

impl Tolerance {
    /// Closed m/z window around `mz`.
    ///
    /// For ppm tolerances this is `mz * (1 - low/1e6) ..= mz * (1 + high/1e6)`.
    pub fn mz_range(&self, mz: f64) -> TupleRange<f64> {
        match self.ms {
            MzTolerance::Absolute((low, high)) => {
                TupleRange::from_ordered(mz - low.abs(), mz + high.abs())
            }
            MzTolerance::Ppm((low, high)) => TupleRange::from_ordered(
                mz * (1.0 - low.abs() / 1e6),
                mz * (1.0 + high.abs() / 1e6),
            ),
        }
    }

    /// Mobility window around `mobility`.
    ///
    /// Matching against this window excludes both ends, see
    /// [`OptionallyRestricted::admits`].
    ///
    /// ```
    /// use xicquery::Tolerance;
    /// use xicquery::models::tolerance::MobilityTolerance;
    ///
    /// let tol = Tolerance::default().with_mobility_tolerance(MobilityTolerance::Absolute((0.05, 0.05)));
    /// let range = tol.mobility_range(1.0);
    /// assert!(range.admits(1.04));
    /// assert!(!range.admits(0.9));
    ///
    /// let open = tol.with_mobility_tolerance(MobilityTolerance::Unrestricted);
    /// assert!(open.mobility_range(1.0).admits(0.1));
    /// ```
    pub fn mobility_range(&self, mobility: f64) -> OptionallyRestricted<TupleRange<f64>> {
        let (low, high) = match self.mobility {
            MobilityTolerance::Absolute((low, high)) => (low, high),
            MobilityTolerance::Unrestricted => return OptionallyRestricted::Unrestricted,
        };
        OptionallyRestricted::Restricted(TupleRange::from_ordered(
            mobility - low.abs(),
            mobility + high.abs(),
        ))
    }

    pub fn with_mz_tolerance(self, ms: MzTolerance) -> Self {
        Self { ms, ..self }
    }

    pub fn with_mobility_tolerance(self, mobility: MobilityTolerance) -> Self {
        Self { mobility, ..self }
    }

    /// Same tolerance with the m/z window scaled by `factor`.
    ///
    /// Used to extract the same ions again at half and quarter width.
    pub fn scaled_mz(&self, factor: f64) -> Self {
        let ms = match self.ms {
            MzTolerance::Absolute((low, high)) => MzTolerance::Absolute((low * factor, high * factor)),
            MzTolerance::Ppm((low, high)) => MzTolerance::Ppm((low * factor, high * factor)),
        };
        self.clone().with_mz_tolerance(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ppm_window_matches_relative_formula() {
        let tol = Tolerance::default().with_mz_tolerance(MzTolerance::Ppm((50.0, 50.0)));
        let range = tol.mz_range(100.0);
        assert_eq!(range.start(), 100.0 * (1.0 - 50.0 / 1e6));
        assert_eq!(range.end(), 100.0 * (1.0 + 50.0 / 1e6));

        // A peak computed the same way sits on the inclusive edge
        let mz = 734.3913;
        let range = Tolerance::default().mz_range(mz);
        assert!(range.contains(mz * (1.0 + 20.0 / 1e6)));
        assert!(range.contains(mz * (1.0 - 20.0 / 1e6)));
    }

    #[test]
    fn test_absolute_window() {
        let tol = Tolerance::default().with_mz_tolerance(MzTolerance::Absolute((0.5, 0.25)));
        let range = tol.mz_range(100.0);
        assert_eq!((range.start(), range.end()), (99.5, 100.25));
    }

    #[test]
    fn test_scaled_mz() {
        let tol = Tolerance::default().scaled_mz(0.5);
        assert_eq!(tol.ms, MzTolerance::Ppm((10.0, 10.0)));
        assert_eq!(tol.mobility, Tolerance::default().mobility);
    }

    #[test]
    fn test_unrestricted_mobility() {
        let tol = Tolerance::default().with_mobility_tolerance(MobilityTolerance::Unrestricted);
        assert_eq!(tol.mobility_range(1.0), OptionallyRestricted::Unrestricted);
    }

    #[test]
    fn test_serde_names() {
        let tol = Tolerance::default();
        let json = serde_json::to_string(&tol).unwrap();
        assert!(json.contains("\"ppm\""));
        assert!(json.contains("\"absolute\""));
        let back: Tolerance = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tol);
    }
}

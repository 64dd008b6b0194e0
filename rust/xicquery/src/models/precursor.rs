use super::arrays::Array2D;
use crate::utils::constants::NEUTRON_MASS;
use serde::{
    Deserialize,
    Serialize,
};

/// One candidate precursor with its fragments, as resolved from a spectral library.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrecursorQuery {
    pub id: u64,
    /// Acquisition window this precursor falls into.
    pub window_id: u32,
    pub precursor_mz: f64,
    pub charge: u8,
    pub fragment_mzs: Vec<f64>,
    /// Empty means every fragment is singly charged.
    #[serde(default)]
    pub fragment_charges: Vec<u8>,
    #[serde(default)]
    pub fragment_annotations: Vec<u32>,
    #[serde(default)]
    pub fragment_heights: Vec<f32>,
    pub predicted_rt: f32,
    pub predicted_mobility: f64,
    #[serde(default)]
    pub measured_mobility: Option<f64>,
    /// Number of leading entries of `fragment_mzs` that are real fragments.
    pub valid_fragments: usize,
    /// Cycle index of the candidate elution apex, once located.
    #[serde(default)]
    pub locus: Option<usize>,
}

/// m/z of an ion shifted by `neutrons` C13 isotopes.
///
/// ```
/// use xicquery::models::precursor::isotope_mz;
///
/// let shifted = isotope_mz(500.0, 2, 1);
/// assert!((shifted - 500.5016774189).abs() < 1e-9);
/// assert_eq!(isotope_mz(500.0, 2, 0), 500.0);
/// ```
pub fn isotope_mz(mz: f64, charge: u8, neutrons: i32) -> f64 {
    let charge = charge.max(1) as f64;
    (mz * charge + neutrons as f64 * NEUTRON_MASS) / charge
}

/// Index of the acquisition window a precursor falls into.
///
/// `edges` are the ascending window boundaries; the result is the number of
/// edges that are `<=` the m/z, so values below the first edge map to 0.
///
/// ```
/// use xicquery::models::precursor::assign_window;
///
/// let edges = [400.0, 425.0, 450.0];
/// assert_eq!(assign_window(&edges, 390.0), 0);
/// assert_eq!(assign_window(&edges, 425.0), 2);
/// assert_eq!(assign_window(&edges, 460.0), 3);
/// ```
pub fn assign_window(edges: &[f64], precursor_mz: f64) -> u32 {
    edges.partition_point(|&edge| edge <= precursor_mz) as u32
}

impl PrecursorQuery {
    pub fn fragment_charge(&self, idx: usize) -> u8 {
        self.fragment_charges.get(idx).copied().unwrap_or(1)
    }

    pub fn precursor_isotope(&self, neutrons: i32) -> f64 {
        isotope_mz(self.precursor_mz, self.charge, neutrons)
    }

    /// Fragment m/z for the slot, 0 for padding slots.
    ///
    /// Slots at or past `valid_fragments` are padding even when they carry an
    /// m/z. An m/z of 0 never matches a real peak.
    pub fn fragment_isotope(&self, idx: usize, neutrons: i32) -> f64 {
        if idx >= self.valid_fragments {
            return 0.0;
        }
        match self.fragment_mzs.get(idx) {
            Some(&mz) if mz > 0.0 => isotope_mz(mz, self.fragment_charge(idx), neutrons),
            _ => 0.0,
        }
    }

    /// Mobility used to center 2D maps: measured when available.
    pub fn map_mobility(&self) -> f64 {
        self.measured_mobility.unwrap_or(self.predicted_mobility)
    }
}

/// How the ion columns of a query row are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IonLayout {
    /// `[precursor (MS1), precursor (MS2), fragments...]` at one isotope shift.
    Center { neutrons: i32, fragment_slots: usize },
    /// Only the first fragments, all from MS2.
    TopFragments(usize),
    /// Precursor at -1, 0, +1, +2 neutrons from MS1 then from MS2, followed
    /// by all fragment slots at each of the same four shifts.
    IsotopeEnvelope { fragment_slots: usize },
}

pub const ENVELOPE_SHIFTS: [i32; 4] = [-1, 0, 1, 2];

impl IonLayout {
    pub fn num_ions(&self) -> usize {
        match self {
            IonLayout::Center { fragment_slots, .. } => 2 + fragment_slots,
            IonLayout::TopFragments(k) => *k,
            IonLayout::IsotopeEnvelope { fragment_slots } => 4 * (2 + fragment_slots),
        }
    }

    /// Ion columns below this index are read from MS1 scans.
    pub fn ms1_ion_count(&self) -> usize {
        match self {
            IonLayout::Center { .. } => 1,
            IonLayout::TopFragments(_) => 0,
            IonLayout::IsotopeEnvelope { .. } => 4,
        }
    }

    /// Number of non-padding ion columns for a query.
    pub fn valid_ion_count(&self, query: &PrecursorQuery) -> usize {
        match self {
            IonLayout::Center { fragment_slots, .. } => 2 + query.valid_fragments.min(*fragment_slots),
            IonLayout::TopFragments(k) => query.valid_fragments.min(*k),
            IonLayout::IsotopeEnvelope { fragment_slots } => {
                4 * (2 + query.valid_fragments.min(*fragment_slots))
            }
        }
    }

    pub fn row(&self, query: &PrecursorQuery) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.num_ions());
        match *self {
            IonLayout::Center {
                neutrons,
                fragment_slots,
            } => {
                let pr = query.precursor_isotope(neutrons);
                out.push(pr);
                out.push(pr);
                out.extend((0..fragment_slots).map(|i| query.fragment_isotope(i, neutrons)));
            }
            IonLayout::TopFragments(k) => {
                out.extend((0..k).map(|i| query.fragment_isotope(i, 0)));
            }
            IonLayout::IsotopeEnvelope { fragment_slots } => {
                for _stage in 0..2 {
                    out.extend(ENVELOPE_SHIFTS.iter().map(|&n| query.precursor_isotope(n)));
                }
                for &n in ENVELOPE_SHIFTS.iter() {
                    out.extend((0..fragment_slots).map(|i| query.fragment_isotope(i, n)));
                }
            }
        }
        out
    }

    /// Column indices of one isotope shift within an envelope layout.
    ///
    /// Selects the MS1 and MS2 precursor columns and the fragment block of
    /// that shift, giving the same column order as a `Center` layout.
    pub fn envelope_sub_columns(fragment_slots: usize, shift_idx: usize) -> Vec<usize> {
        let mut cols = vec![shift_idx, shift_idx + 4];
        let start = 8 + shift_idx * fragment_slots;
        cols.extend(start..start + fragment_slots);
        cols
    }
}

/// Target m/z matrix (query × ion) plus per-query mobility for one batch.
#[derive(Debug, Clone)]
pub struct TargetIons {
    pub mz: Array2D<f64>,
    pub mobility: Vec<f64>,
    pub ms1_ion_count: usize,
}

impl TargetIons {
    pub fn from_queries<'a>(
        queries: impl IntoIterator<Item = &'a PrecursorQuery>,
        layout: IonLayout,
        mobility_of: impl Fn(&PrecursorQuery) -> f64,
    ) -> Self {
        let num_ions = layout.num_ions();
        let mut mz = Vec::new();
        let mut mobility = Vec::new();
        for query in queries {
            mz.extend(layout.row(query));
            mobility.push(mobility_of(query));
        }
        let nrows = mobility.len();
        Self {
            mz: Array2D {
                values: mz,
                major_dim: num_ions,
                minor_dim: nrows,
            },
            mobility,
            ms1_ion_count: layout.ms1_ion_count(),
        }
    }

    pub fn num_queries(&self) -> usize {
        self.mobility.len()
    }

    pub fn num_ions(&self) -> usize {
        self.mz.ncols()
    }
}

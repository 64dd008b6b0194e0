#![doc = include_str!("../README.md")]

// Re-export main structures
pub use crate::models::extraction::{
    bin_scan_into,
    extract_maps,
    extract_traces,
    find_maximum,
};
pub use crate::models::locator::find_first_match;
pub use crate::models::{
    AcquisitionWindow,
    AcquisitionWindowParts,
    Array2D,
    Array3,
    CycleWindow,
    ExtractedTraces,
    IntensityMaps,
    IonGrid,
    IonLayout,
    MapGeometry,
    PeakMatch,
    PrecursorQuery,
    ScanIndex,
    ScanIndexParts,
    ScanSlice,
    TargetIons,
    Tolerance,
};

// Re-export traits
pub use crate::traits::{
    InMemoryScanStore,
    PeakRepresentation,
    ResidentWindow,
    ScanStore,
};

// Declare modules
pub mod errors;
pub mod models;
pub mod traits;
pub mod utils;
pub use crate::utils::{
    OptionallyRestricted,
    TupleRange,
};

// Re-export errors
pub use crate::errors::{
    DataProcessingError,
    DataReadingError,
    XicqueryError,
};

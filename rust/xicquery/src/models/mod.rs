pub mod arrays;
pub mod cycle_window;
pub mod extraction;
pub mod grid;
pub mod locator;
pub mod precursor;
pub mod scan_index;
pub mod tolerance;

pub use arrays::{
    Array2D,
    Array3,
};
pub use cycle_window::CycleWindow;
pub use extraction::{
    ExtractedTraces,
    IntensityMaps,
    MapGeometry,
    PeakMatch,
};
pub use grid::IonGrid;
pub use precursor::{
    IonLayout,
    PrecursorQuery,
    TargetIons,
};
pub use scan_index::{
    AcquisitionWindow,
    AcquisitionWindowParts,
    ScanIndex,
    ScanIndexParts,
    ScanSlice,
};
pub use tolerance::Tolerance;

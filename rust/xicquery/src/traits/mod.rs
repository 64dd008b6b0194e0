pub mod scan_store;

pub use scan_store::{
    InMemoryScanStore,
    PeakRepresentation,
    ResidentWindow,
    ScanStore,
};

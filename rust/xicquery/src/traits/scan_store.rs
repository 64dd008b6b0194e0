use crate::errors::{
    DataReadingError,
    Result,
};
use crate::models::scan_index::{
    AcquisitionWindow,
    AcquisitionWindowParts,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{
    debug,
    info,
};

/// Which peak representation of a window to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PeakRepresentation {
    #[default]
    Centroid,
    Profile,
}

/// Source of per-window scan data.
///
/// Windows are handed out behind an `Arc`: stores that keep windows around
/// share them without copying, stores that read on demand give away the only
/// handle.
pub trait ScanStore: Sync {
    fn load_window(
        &self,
        window_id: u32,
        representation: PeakRepresentation,
    ) -> Result<Arc<AcquisitionWindow>>;
}

/// A loaded window whose handle is released when dropped.
///
/// Only one of these is meant to be alive at a time, which bounds memory to
/// a single window's scans on top of whatever the store itself keeps.
#[derive(Debug)]
pub struct ResidentWindow {
    window: Arc<AcquisitionWindow>,
    representation: PeakRepresentation,
    loaded_at: Instant,
}

impl ResidentWindow {
    pub fn acquire<S: ScanStore + ?Sized>(
        store: &S,
        window_id: u32,
        representation: PeakRepresentation,
    ) -> Result<Self> {
        let st = Instant::now();
        let window = store.load_window(window_id, representation)?;
        debug!(
            "Loaded window {} ({:?}): {} cycles, {} MS1 peaks, {} MS2 peaks in {:?}",
            window_id,
            representation,
            window.num_cycles(),
            window.ms1.num_peaks(),
            window.ms2.num_peaks(),
            st.elapsed()
        );
        Ok(Self {
            window,
            representation,
            loaded_at: Instant::now(),
        })
    }

    pub fn representation(&self) -> PeakRepresentation {
        self.representation
    }
}

impl std::ops::Deref for ResidentWindow {
    type Target = AcquisitionWindow;

    fn deref(&self) -> &Self::Target {
        &self.window
    }
}

impl Drop for ResidentWindow {
    fn drop(&mut self) {
        info!(
            "Releasing window {} ({:?}) after {:?}",
            self.window.id,
            self.representation,
            self.loaded_at.elapsed()
        );
    }
}

/// Scan store backed by windows already in memory.
///
/// Loading hands out a shared handle, the scans are never copied.
#[derive(Debug, Default)]
pub struct InMemoryScanStore {
    windows: HashMap<(u32, PeakRepresentation), Arc<AcquisitionWindow>>,
}

impl InMemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, window: AcquisitionWindow, representation: PeakRepresentation) {
        self.windows
            .insert((window.id, representation), Arc::new(window));
    }

    /// Reads a JSON array of window parts, all as centroided data.
    pub fn from_json_reader(reader: impl std::io::Read) -> Result<Self> {
        let parts: Vec<AcquisitionWindowParts> =
            serde_json::from_reader(reader).map_err(DataReadingError::from)?;
        let mut store = Self::new();
        for part in parts {
            store.insert(
                AcquisitionWindow::try_from_parts(part)?,
                PeakRepresentation::Centroid,
            );
        }
        Ok(store)
    }

    pub fn window_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.windows.keys().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl ScanStore for InMemoryScanStore {
    fn load_window(
        &self,
        window_id: u32,
        representation: PeakRepresentation,
    ) -> Result<Arc<AcquisitionWindow>> {
        self.windows
            .get(&(window_id, representation))
            .map(Arc::clone)
            .ok_or_else(|| DataReadingError::WindowNotFound(window_id).into())
    }
}

//! Wall-clock time spent in each stage of the scoring pipeline.
//!
//! Timings of every batch are summed per window and over the whole run.

use serde::Serialize;
use std::time::{
    Duration,
    Instant,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct StageTimings {
    /// Locus search over the retention-time tolerance.
    pub locate: Duration,
    /// Trace extraction, all tolerances and layouts.
    pub extract: Duration,
    pub smooth: Duration,
    pub coelution: Duration,
    pub boundary: Duration,
    pub features: Duration,
    /// 2D max-in-bin maps.
    pub maps: Duration,
    pub model: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.locate
            + self.extract
            + self.smooth
            + self.coelution
            + self.boundary
            + self.features
            + self.maps
            + self.model
    }
}

/// Runs `f` and adds its wall-clock time to `slot`.
pub fn timed<T>(slot: &mut Duration, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    *slot += start.elapsed();
    out
}

impl Serialize for StageTimings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("StageTimings", 8)?;
        state.serialize_field("locate_ms", &self.locate.as_millis())?;
        state.serialize_field("extract_ms", &self.extract.as_millis())?;
        state.serialize_field("smooth_ms", &self.smooth.as_millis())?;
        state.serialize_field("coelution_ms", &self.coelution.as_millis())?;
        state.serialize_field("boundary_ms", &self.boundary.as_millis())?;
        state.serialize_field("features_ms", &self.features.as_millis())?;
        state.serialize_field("maps_ms", &self.maps.as_millis())?;
        state.serialize_field("model_ms", &self.model.as_millis())?;
        state.end()
    }
}

impl std::ops::AddAssign for StageTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.locate += rhs.locate;
        self.extract += rhs.extract;
        self.smooth += rhs.smooth;
        self.coelution += rhs.coelution;
        self.boundary += rhs.boundary;
        self.features += rhs.features;
        self.maps += rhs.maps;
        self.model += rhs.model;
    }
}

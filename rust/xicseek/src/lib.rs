pub mod boundary;
pub mod coelution;
pub mod config;
pub mod errors;
pub mod features;
pub mod locus;
pub mod model;
pub mod orchestrator;
pub mod smoothing;
pub mod timings;

pub use boundary::Boundary;
pub use coelution::CoelutionScores;
pub use config::EngineConfig;
pub use errors::XicSeekError;
pub use features::QualityFeatures;
pub use locus::LocusCandidate;
pub use model::{
    ElutionModel,
    ModelOutput,
};
pub use orchestrator::{
    BatchOutput,
    LocusScores,
    Orchestrator,
    ScoringRow,
    WindowPlan,
};
pub use timings::StageTimings;

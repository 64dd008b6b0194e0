use crate::errors::{
    Result,
    XicSeekError,
};
use xicquery::{
    Array2D,
    IntensityMaps,
};

/// Output of an external scoring model for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    /// (query × feature) embedding.
    pub features: Array2D<f32>,
    /// One probability per query.
    pub probability: Vec<f32>,
}

impl ModelOutput {
    /// Fails unless there is exactly one row and one probability per query.
    pub fn check_rows(&self, num_queries: usize) -> Result<()> {
        if self.probability.len() != num_queries || self.features.nrows() != num_queries {
            return Err(XicSeekError::Model {
                msg: format!(
                    "expected {} rows, got {} probabilities and {} feature rows",
                    num_queries,
                    self.probability.len(),
                    self.features.nrows()
                ),
            });
        }
        Ok(())
    }
}

/// A trained model scoring (query × ion × cycle × mobility-bin) maps.
///
/// Implementations are opaque to the engine; it only hands over the maps of
/// a batch and the number of real ion columns of each query.
pub trait ElutionModel: Send + Sync {
    fn score(&self, maps: &IntensityMaps, valid_ion_counts: &[usize]) -> Result<ModelOutput>;
}

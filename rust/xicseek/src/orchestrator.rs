//! Drives the extraction and scoring stages over every acquisition window.
//!
//! Queries are grouped by window in order of first appearance. Each window is
//! loaded once, its queries without a locus are searched for candidate loci,
//! and the resulting rows go through the pipeline in batches of
//! `batch_size`:
//!
//! 1. extract centre-layout traces around each locus (plus narrower m/z
//!    tolerances and the isotope envelope, intensity only);
//! 2. smooth;
//! 3. score coelution;
//! 4. estimate elution boundaries;
//! 5. compute quality features;
//! 6. optionally build 2D maps and run the external models.
//!
//! The window is released before the next one is loaded.

use crate::boundary::{
    estimate_boundaries,
    Boundary,
};
use crate::coelution::{
    score_coelution,
    CoelutionScores,
};
use crate::config::EngineConfig;
use crate::errors::{
    Result,
    XicSeekError,
};
use crate::features::{
    compute_features,
    QualityFeatures,
};
use crate::locus::{
    search_loci,
    LocusCandidate,
};
use crate::model::{
    ElutionModel,
    ModelOutput,
};
use crate::smoothing::smooth_traces;
use crate::timings::{
    timed,
    StageTimings,
};
use arrayvec::ArrayVec;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};
use xicquery::errors::DataReadingError;
use xicquery::models::precursor::ENVELOPE_SHIFTS;
use xicquery::{
    AcquisitionWindow,
    Array3,
    CycleWindow,
    ExtractedTraces,
    IntensityMaps,
    IonLayout,
    PeakRepresentation,
    PrecursorQuery,
    ResidentWindow,
    ScanStore,
    TargetIons,
    XicqueryError,
    extract_maps,
    extract_traces,
};

/// Scales applied to the ppm tolerance for the narrower coelution scores.
const NARROW_PPM_SCALES: [f64; 2] = [0.5, 0.25];
pub const TOLERANCE_LEVELS: usize = NARROW_PPM_SCALES.len() + 1;

/// Queries of one acquisition window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowPlan {
    pub window_id: u32,
    /// Positions in the input slice, in input order.
    pub query_indices: Vec<usize>,
}

/// Groups queries by window id, windows in order of first appearance.
///
/// ```
/// use xicseek::orchestrator::plan_windows;
/// use xicquery::PrecursorQuery;
///
/// let query = |window_id| PrecursorQuery {
///     id: 0,
///     window_id,
///     precursor_mz: 500.0,
///     charge: 2,
///     fragment_mzs: vec![],
///     fragment_charges: vec![],
///     fragment_annotations: vec![],
///     fragment_heights: vec![],
///     predicted_rt: 10.0,
///     predicted_mobility: 1.0,
///     measured_mobility: None,
///     valid_fragments: 0,
///     locus: None,
/// };
/// let plans = plan_windows(&[query(3), query(1), query(3)]);
/// assert_eq!(plans.len(), 2);
/// assert_eq!(plans[0].window_id, 3);
/// assert_eq!(plans[0].query_indices, vec![0, 2]);
/// assert_eq!(plans[1].query_indices, vec![1]);
/// ```
pub fn plan_windows(queries: &[PrecursorQuery]) -> Vec<WindowPlan> {
    let mut plans: Vec<WindowPlan> = Vec::new();
    let mut slot_of: HashMap<u32, usize> = HashMap::new();
    for (idx, query) in queries.iter().enumerate() {
        let slot = *slot_of.entry(query.window_id).or_insert_with(|| {
            plans.push(WindowPlan {
                window_id: query.window_id,
                query_indices: Vec::new(),
            });
            plans.len() - 1
        });
        plans[slot].query_indices.push(idx);
    }
    plans
}

/// One (query, locus) pair to score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoringRow {
    pub query_index: usize,
    pub query_id: u64,
    /// Cycle index within the run.
    pub locus: usize,
    /// Aggregate coelution found by the locus search, if it ran.
    pub seek_score: Option<f32>,
    pub measured_mobility: Option<f64>,
}

impl ScoringRow {
    fn extraction_mobility(&self, query: &PrecursorQuery) -> f64 {
        self.measured_mobility.unwrap_or(query.predicted_mobility)
    }
}

/// Everything computed for one batch of rows.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub window_id: u32,
    pub rows: Vec<ScoringRow>,
    /// Raw centre-layout traces, with matched m/z and mobility.
    pub traces: ExtractedTraces,
    pub smoothed: Array3<f32>,
    pub coelution: CoelutionScores,
    /// Centre coelution at the full, half and quarter ppm tolerance.
    pub tolerance_coelution: Vec<ArrayVec<f32, TOLERANCE_LEVELS>>,
    /// Centre coelution at each isotope shift of the envelope.
    pub envelope_coelution: Vec<[f32; 4]>,
    pub boundaries: Vec<Boundary>,
    pub features: Vec<QualityFeatures>,
    pub maps: Option<IntensityMaps>,
    /// Centre-model probability at each isotope shift.
    pub center_model: Option<Vec<[f32; 4]>>,
    pub envelope_model: Option<ModelOutput>,
}

/// Flat per-row summary of a [`BatchOutput`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocusScores {
    pub query_index: usize,
    pub query_id: u64,
    pub window_id: u32,
    pub locus: usize,
    pub seek_score: Option<f32>,
    /// First and last cycle of the elution, within the run.
    pub elution_start: usize,
    pub elution_end: usize,
    pub coelution_by_tolerance: Vec<f32>,
    pub envelope_coelution: [f32; 4],
    #[serde(flatten)]
    pub features: QualityFeatures,
    pub center_model: Option<[f32; 4]>,
    pub envelope_probability: Option<f32>,
}

impl BatchOutput {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn scores(&self) -> Vec<LocusScores> {
        self.rows
            .iter()
            .enumerate()
            .map(|(q, row)| {
                let start = self.traces.cycle_windows[q].start();
                LocusScores {
                    query_index: row.query_index,
                    query_id: row.query_id,
                    window_id: self.window_id,
                    locus: row.locus,
                    seek_score: row.seek_score,
                    elution_start: start + self.boundaries[q].left,
                    elution_end: start + self.boundaries[q].right,
                    coelution_by_tolerance: self.tolerance_coelution[q].to_vec(),
                    envelope_coelution: self.envelope_coelution[q],
                    features: self.features[q],
                    center_model: self.center_model.as_ref().map(|m| m[q]),
                    envelope_probability: self.envelope_model.as_ref().map(|m| m.probability[q]),
                }
            })
            .collect()
    }
}

fn center_score(scores: &CoelutionScores, query: usize) -> f32 {
    let center = scores.per_ion.trace_len() / 2;
    scores.aggregate.get(query, center).unwrap_or(0.0)
}

fn row_targets(batch: &[&PrecursorQuery], rows: &[ScoringRow], layout: IonLayout) -> TargetIons {
    let mut targets = TargetIons::from_queries(batch.iter().copied(), layout, |q| q.predicted_mobility);
    targets.mobility = rows
        .iter()
        .zip(batch)
        .map(|(row, query)| row.extraction_mobility(query))
        .collect();
    targets
}

/// Whether the error only means the window is absent from the store.
pub fn is_missing_window(err: &XicSeekError) -> bool {
    matches!(
        err,
        XicSeekError::Xicquery(XicqueryError::DataReadingError(
            DataReadingError::WindowNotFound(_)
        ))
    )
}

pub struct Orchestrator<'a, S: ScanStore + ?Sized> {
    store: &'a S,
    config: EngineConfig,
    center_model: Option<Box<dyn ElutionModel>>,
    envelope_model: Option<Box<dyn ElutionModel>>,
}

impl<'a, S: ScanStore + ?Sized> Orchestrator<'a, S> {
    pub fn new(store: &'a S, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            center_model: None,
            envelope_model: None,
        })
    }

    /// Model scored on each isotope shift of the envelope maps.
    pub fn with_center_model(mut self, model: Box<dyn ElutionModel>) -> Self {
        self.center_model = Some(model);
        self
    }

    /// Model scored on the full envelope maps.
    pub fn with_envelope_model(mut self, model: Box<dyn ElutionModel>) -> Self {
        self.envelope_model = Some(model);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan(&self, queries: &[PrecursorQuery]) -> Vec<WindowPlan> {
        plan_windows(queries)
    }

    fn needs_maps(&self) -> bool {
        self.config.compute_maps || self.center_model.is_some() || self.envelope_model.is_some()
    }

    /// Scores every query of one window, handing each finished batch to `sink`.
    ///
    /// The window's scans are held for the duration of the call only.
    pub fn process_window(
        &self,
        plan: &WindowPlan,
        queries: &[PrecursorQuery],
        mut sink: impl FnMut(BatchOutput) -> Result<()>,
    ) -> Result<StageTimings> {
        let mut timings = StageTimings::default();
        if plan.query_indices.is_empty() {
            return Ok(timings);
        }
        let st = Instant::now();
        let window = ResidentWindow::acquire(self.store, plan.window_id, PeakRepresentation::Centroid)?;
        if window.num_cycles() == 0 {
            warn!(
                "Window {} has no cycles, skipping {} queries",
                plan.window_id,
                plan.query_indices.len()
            );
            return Ok(timings);
        }

        let profile = if self.needs_maps() && self.config.map_representation == PeakRepresentation::Profile {
            match ResidentWindow::acquire(self.store, plan.window_id, PeakRepresentation::Profile) {
                Ok(profile) => Some(profile),
                Err(e) => {
                    warn!(
                        "No profile data for window {} ({:?}), building maps from centroids",
                        plan.window_id, e
                    );
                    None
                }
            }
        } else {
            None
        };
        let map_window: Option<&AcquisitionWindow> = if self.needs_maps() {
            Some(profile.as_deref().unwrap_or(&*window))
        } else {
            None
        };

        let rows = self.locate(&window, plan, queries, &mut timings)?;
        let mut num_batches = 0;
        for chunk in rows.chunks(self.config.batch_size) {
            let output = self.process_batch(&window, map_window, plan.window_id, queries, chunk, &mut timings)?;
            debug!(
                "Window {} batch {}: {} rows, mean centre coelution {:.3}",
                plan.window_id,
                num_batches,
                output.len(),
                output.features.iter().map(|f| f.coelution as f64).sum::<f64>() / output.len().max(1) as f64,
            );
            sink(output)?;
            num_batches += 1;
        }

        let elapsed = st.elapsed();
        info!(
            "Window {}: {} queries -> {} loci in {} batches, {:?} ({:.1} loci/s)",
            plan.window_id,
            plan.query_indices.len(),
            rows.len(),
            num_batches,
            elapsed,
            rows.len() as f64 / elapsed.as_secs_f64().max(1e-9),
        );
        Ok(timings)
    }

    /// Rows of a window in input order; queries without a locus expand into
    /// one row per candidate locus, or none.
    fn locate(
        &self,
        window: &AcquisitionWindow,
        plan: &WindowPlan,
        queries: &[PrecursorQuery],
        timings: &mut StageTimings,
    ) -> Result<Vec<ScoringRow>> {
        let pending: Vec<usize> = plan
            .query_indices
            .iter()
            .copied()
            .filter(|&i| queries[i].locus.is_none())
            .collect();
        let mut found: HashMap<usize, Vec<LocusCandidate>> = HashMap::with_capacity(pending.len());
        timed(&mut timings.locate, || -> Result<()> {
            for chunk in pending.chunks(self.config.batch_size) {
                let batch: Vec<&PrecursorQuery> = chunk.iter().map(|&i| &queries[i]).collect();
                let candidates = search_loci(window, &batch, &self.config)?;
                found.extend(chunk.iter().copied().zip(candidates));
            }
            Ok(())
        })?;

        let mut rows = Vec::with_capacity(plan.query_indices.len());
        let mut unlocated = 0;
        for &idx in &plan.query_indices {
            let query = &queries[idx];
            match query.locus {
                Some(locus) => rows.push(ScoringRow {
                    query_index: idx,
                    query_id: query.id,
                    locus,
                    seek_score: None,
                    measured_mobility: query.measured_mobility,
                }),
                None => {
                    let candidates = found.remove(&idx).unwrap_or_default();
                    if candidates.is_empty() {
                        unlocated += 1;
                    }
                    rows.extend(candidates.into_iter().map(|c| ScoringRow {
                        query_index: idx,
                        query_id: query.id,
                        locus: c.cycle,
                        seek_score: Some(c.score),
                        measured_mobility: c.measured_mobility.or(query.measured_mobility),
                    }));
                }
            }
        }
        if unlocated > 0 {
            debug!(
                "{} of {} queries in window {} have no candidate locus",
                unlocated,
                pending.len(),
                plan.window_id
            );
        }
        Ok(rows)
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    fn process_batch(
        &self,
        window: &AcquisitionWindow,
        map_window: Option<&AcquisitionWindow>,
        window_id: u32,
        queries: &[PrecursorQuery],
        rows: &[ScoringRow],
        timings: &mut StageTimings,
    ) -> Result<BatchOutput> {
        let config = &self.config;
        let batch: Vec<&PrecursorQuery> = rows.iter().map(|r| &queries[r.query_index]).collect();
        let center_layout = IonLayout::Center {
            neutrons: 0,
            fragment_slots: config.fragment_slots,
        };
        let envelope_layout = IonLayout::IsotopeEnvelope {
            fragment_slots: config.fragment_slots,
        };
        let valid: Vec<usize> = batch.iter().map(|q| center_layout.valid_ion_count(q)).collect();
        let total_cycles = window.num_cycles();
        let cycles: Vec<CycleWindow> = rows
            .iter()
            .map(|r| CycleWindow::centered(r.locus, config.map_cycle_dim, total_cycles))
            .collect();
        let targets = row_targets(&batch, rows, center_layout);
        let envelope_targets = row_targets(&batch, rows, envelope_layout);
        let tolerance = config.xic_tolerance();

        let (traces, narrow, envelope) = timed(&mut timings.extract, || -> Result<_> {
            let traces = extract_traces(window, &targets, &cycles, &tolerance, false)?;
            let mut narrow = Vec::with_capacity(NARROW_PPM_SCALES.len());
            if config.multi_tolerance {
                for scale in NARROW_PPM_SCALES {
                    let scaled = tolerance.scaled_mz(scale);
                    narrow.push(extract_traces(window, &targets, &cycles, &scaled, true)?.intensity);
                }
            }
            let envelope = extract_traces(window, &envelope_targets, &cycles, &tolerance, true)?.intensity;
            Ok((traces, narrow, envelope))
        })?;

        let (smoothed, narrow, envelope) = timed(&mut timings.smooth, || {
            (
                smooth_traces(traces.intensity.clone()),
                narrow.into_iter().map(smooth_traces).collect::<Vec<_>>(),
                smooth_traces(envelope),
            )
        });

        let (coelution, tolerance_coelution, envelope_coelution) =
            timed(&mut timings.coelution, || -> Result<_> {
                let coelution = score_coelution(&smoothed, &valid)?;
                let mut by_tolerance: Vec<ArrayVec<f32, TOLERANCE_LEVELS>> = (0..rows.len())
                    .map(|q| {
                        let mut levels = ArrayVec::new();
                        levels.push(center_score(&coelution, q));
                        levels
                    })
                    .collect();
                for traces in &narrow {
                    let scores = score_coelution(traces, &valid)?;
                    for (q, levels) in by_tolerance.iter_mut().enumerate() {
                        levels.push(center_score(&scores, q));
                    }
                }
                let mut by_shift = vec![[0.0f32; 4]; rows.len()];
                for shift in 0..ENVELOPE_SHIFTS.len() {
                    let columns = IonLayout::envelope_sub_columns(config.fragment_slots, shift);
                    let scores = score_coelution(&envelope.select_ions(&columns)?, &valid)?;
                    for (q, shifts) in by_shift.iter_mut().enumerate() {
                        shifts[shift] = center_score(&scores, q);
                    }
                }
                Ok((coelution, by_tolerance, by_shift))
            })?;

        let boundaries = timed(&mut timings.boundary, || {
            estimate_boundaries(&smoothed, &coelution, &valid)
        })?;

        let features = timed(&mut timings.features, || {
            compute_features(
                &batch,
                &targets,
                &traces,
                &smoothed,
                &coelution,
                &boundaries,
                &valid,
                config,
            )
        })?;

        let maps = match map_window {
            Some(map_window) => Some(timed(&mut timings.maps, || {
                extract_maps(
                    map_window,
                    &envelope_targets,
                    &cycles,
                    &config.map_tolerance(),
                    config.map_geometry(),
                )
            })?),
            None => None,
        };

        let envelope_valid: Vec<usize> = batch
            .iter()
            .map(|q| envelope_layout.valid_ion_count(q))
            .collect();
        let (center_model, envelope_model) = timed(&mut timings.model, || -> Result<_> {
            let Some(maps) = maps.as_ref() else {
                return Ok((None, None));
            };
            let center_model = match &self.center_model {
                Some(model) => {
                    let mut by_shift = vec![[0.0f32; 4]; rows.len()];
                    for shift in 0..ENVELOPE_SHIFTS.len() {
                        let columns = IonLayout::envelope_sub_columns(config.fragment_slots, shift);
                        let output = model.score(&maps.select_ions(&columns)?, &valid)?;
                        output.check_rows(rows.len())?;
                        for (shifts, &p) in by_shift.iter_mut().zip(&output.probability) {
                            shifts[shift] = p;
                        }
                    }
                    Some(by_shift)
                }
                None => None,
            };
            let envelope_model = match &self.envelope_model {
                Some(model) => {
                    let output = model.score(maps, &envelope_valid)?;
                    output.check_rows(rows.len())?;
                    Some(output)
                }
                None => None,
            };
            Ok((center_model, envelope_model))
        })?;

        Ok(BatchOutput {
            window_id,
            rows: rows.to_vec(),
            traces,
            smoothed,
            coelution,
            tolerance_coelution,
            envelope_coelution,
            boundaries,
            features,
            maps,
            center_model,
            envelope_model,
        })
    }

    /// Scores all queries, window by window.
    ///
    /// Windows missing from the store are skipped with a warning.
    pub fn score_all(&self, queries: &[PrecursorQuery]) -> Result<(Vec<LocusScores>, StageTimings)> {
        let mut out = Vec::new();
        let mut timings = StageTimings::default();
        for plan in self.plan(queries) {
            let result = self.process_window(&plan, queries, |batch| {
                out.extend(batch.scores());
                Ok(())
            });
            match result {
                Ok(window_timings) => timings += window_timings,
                Err(e) if is_missing_window(&e) => warn!(
                    "Window {} is not in the scan store, skipping {} queries",
                    plan.window_id,
                    plan.query_indices.len()
                ),
                Err(e) => return Err(e),
            }
        }
        info!(
            "Scored {} loci for {} queries in {:?}",
            out.len(),
            queries.len(),
            timings.total()
        );
        Ok((out, timings))
    }
}

use xicquery::utils::constants::NEUTRON_MASS;
use xicquery::{
    AcquisitionWindow,
    Array2D,
    InMemoryScanStore,
    IntensityMaps,
    PeakRepresentation,
    PrecursorQuery,
    ScanIndex,
};
use xicseek::errors::Result;
use xicseek::{
    BatchOutput,
    ElutionModel,
    EngineConfig,
    ModelOutput,
    Orchestrator,
    XicSeekError,
};

const NUM_CYCLES: usize = 40;
const APEX: usize = 20;
const BASELINE: f32 = 2.0;
const PRECURSOR_MZ: f64 = 500.0;
const FRAGMENTS: [f64; 3] = [300.0, 400.0, 600.0];

fn cycle_rt(cycle: usize) -> f32 {
    10.0 + 2.0 * cycle as f32
}

fn elution(cycle: usize) -> f32 {
    let d = cycle as f32 - APEX as f32;
    BASELINE + 1000.0 * (-0.5 * d * d).exp()
}

fn scan(rt: f32, mut peaks: Vec<(f64, f32)>) -> (f32, Vec<f32>, Vec<f32>, Vec<f32>) {
    peaks.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let mz = peaks.iter().map(|p| p.0 as f32).collect();
    let mobility = vec![1.0f32; peaks.len()];
    let intensity = peaks.iter().map(|p| p.1).collect();
    (rt, mz, mobility, intensity)
}

/// One window with a single co-eluting precursor and its fragments.
fn synthetic_window(id: u32) -> AcquisitionWindow {
    let iso = |mz: f64, z: f64, k: f64| (mz * z + k * NEUTRON_MASS) / z;
    let ms1 = ScanIndex::from_scans((0..NUM_CYCLES).map(|c| {
        let x = elution(c);
        scan(
            cycle_rt(c),
            vec![
                (450.0, 50.0),
                (iso(PRECURSOR_MZ, 2.0, -1.0), 0.1 * x),
                (PRECURSOR_MZ, x),
                (iso(PRECURSOR_MZ, 2.0, 1.0), 0.6 * x),
                (iso(PRECURSOR_MZ, 2.0, 2.0), 0.25 * x),
            ],
        )
    }))
    .unwrap();
    let ms2 = ScanIndex::from_scans((0..NUM_CYCLES).map(|c| {
        let x = elution(c);
        let mut peaks = vec![(PRECURSOR_MZ, 0.2 * x)];
        for (i, &mz) in FRAGMENTS.iter().enumerate() {
            peaks.push((mz, x * (1.0 - 0.2 * i as f32)));
            peaks.push((iso(mz, 1.0, 1.0), 0.3 * x));
        }
        scan(cycle_rt(c), peaks)
    }))
    .unwrap();
    AcquisitionWindow::try_new(id, ms1, ms2).unwrap()
}

fn query(id: u64, window_id: u32, locus: Option<usize>) -> PrecursorQuery {
    PrecursorQuery {
        id,
        window_id,
        precursor_mz: PRECURSOR_MZ,
        charge: 2,
        fragment_mzs: FRAGMENTS.to_vec(),
        fragment_charges: vec![],
        fragment_annotations: vec![],
        fragment_heights: vec![1.0, 0.8, 0.6],
        predicted_rt: cycle_rt(APEX + 1),
        predicted_mobility: 1.0,
        measured_mobility: None,
        valid_fragments: FRAGMENTS.len(),
        locus,
    }
}

fn store() -> InMemoryScanStore {
    let mut store = InMemoryScanStore::new();
    store.insert(synthetic_window(0), PeakRepresentation::Centroid);
    store
}

fn config() -> EngineConfig {
    EngineConfig {
        fragment_slots: 4,
        rt_tolerance: Some(20.0),
        batch_size: 2,
        ..Default::default()
    }
}

#[test]
fn test_locus_search_finds_the_apex() {
    let store = store();
    let orchestrator = Orchestrator::new(&store, config()).unwrap();
    let queries = vec![query(1, 0, None)];
    let (scores, timings) = orchestrator.score_all(&queries).unwrap();

    assert!(!scores.is_empty());
    assert!(timings.total() >= timings.locate);
    let best = scores
        .iter()
        .max_by(|a, b| a.seek_score.partial_cmp(&b.seek_score).unwrap())
        .unwrap();
    assert!((APEX - 1..=APEX + 1).contains(&best.locus), "locus {}", best.locus);
    assert!(best.seek_score.unwrap() > 0.8);
    assert!(best.elution_start <= best.locus && best.locus <= best.elution_end);
    assert!(best.features.measured_mobility.is_some());
}

#[test]
fn test_known_locus_scores() {
    let store = store();
    let orchestrator = Orchestrator::new(&store, config()).unwrap();
    let queries = vec![query(1, 0, Some(APEX))];
    let (scores, _) = orchestrator.score_all(&queries).unwrap();

    assert_eq!(scores.len(), 1);
    let row = &scores[0];
    assert_eq!(row.query_index, 0);
    assert_eq!(row.locus, APEX);
    assert_eq!(row.seek_score, None);
    assert!(row.features.coelution > 0.8, "coelution {}", row.features.coelution);
    assert!(row.elution_start <= APEX && APEX <= row.elution_end);

    // Exact m/z and mobility everywhere
    assert!(row.features.mass_error_ppm_mean < 1e-3);
    assert!(row.features.mobility_bias_mean < 1e-6);
    let im = row.features.measured_mobility.unwrap();
    assert!((im - 1.0).abs() < 1e-6);
    assert!(row.features.intensity_similarity > 0.9);

    // Narrower tolerances still match the same peaks
    assert_eq!(row.coelution_by_tolerance.len(), 3);
    for score in &row.coelution_by_tolerance {
        assert!((score - row.features.coelution).abs() < 1e-6);
    }
    // The zero-shift envelope block is the centre layout
    assert!((row.envelope_coelution[1] - row.features.coelution).abs() < 1e-6);
    assert!(row.envelope_coelution[1] > row.envelope_coelution[0]);
    assert_eq!(row.center_model, None);
}

#[test]
fn test_entries_past_valid_fragments_are_not_extracted() {
    let store = store();
    let orchestrator = Orchestrator::new(&store, config()).unwrap();

    let mut padded = query(1, 0, Some(APEX));
    padded.valid_fragments = 1;
    let mut truncated = padded.clone();
    truncated.id = 2;
    truncated.fragment_mzs.truncate(1);
    let full = query(3, 0, Some(APEX));

    let queries = vec![padded, truncated, full];
    let (mut scores, _) = orchestrator.score_all(&queries).unwrap();
    assert_eq!(scores.len(), 3);
    scores.sort_by_key(|row| row.query_index);

    assert_eq!(scores[0].features.ms2_height, scores[1].features.ms2_height);
    assert_eq!(scores[0].features.ms2_area, scores[1].features.ms2_area);
    assert_eq!(
        scores[0].features.intensity_similarity,
        scores[1].features.intensity_similarity
    );
    assert_eq!(scores[0].features, scores[1].features);
    assert_eq!(scores[0].envelope_coelution, scores[1].envelope_coelution);
    assert!(scores[0].features.ms2_height < scores[2].features.ms2_height);
}

#[test]
fn test_missing_window_is_skipped() {
    let store = store();
    let orchestrator = Orchestrator::new(&store, config()).unwrap();
    let queries = vec![
        query(1, 5, Some(APEX)),
        query(2, 0, Some(APEX)),
        query(3, 5, Some(APEX)),
    ];
    let (scores, _) = orchestrator.score_all(&queries).unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].query_index, 1);
    assert_eq!(scores[0].query_id, 2);
}

#[test]
fn test_batches_keep_input_order() {
    let store = store();
    let orchestrator = Orchestrator::new(&store, config()).unwrap();
    let queries: Vec<PrecursorQuery> = (0..5).map(|i| query(i, 0, Some(APEX - 2 + i as usize))).collect();
    let plans = orchestrator.plan(&queries);
    assert_eq!(plans.len(), 1);

    let mut batches: Vec<BatchOutput> = Vec::new();
    orchestrator
        .process_window(&plans[0], &queries, |batch| {
            batches.push(batch);
            Ok(())
        })
        .unwrap();

    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    let order: Vec<usize> = batches
        .iter()
        .flat_map(|b| b.rows.iter().map(|r| r.query_index))
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
    assert!(batches.iter().all(|b| b.maps.is_none()));
    assert_eq!(batches[0].smoothed.dims(), [2, 6, 13]);
}

/// Scores a query by whether any of its map cells carries signal.
struct SignalModel;

impl ElutionModel for SignalModel {
    fn score(&self, maps: &IntensityMaps, _valid_ion_counts: &[usize]) -> Result<ModelOutput> {
        let [n, ions, cycles, bins] = maps.dims();
        let per_query = ions * cycles * bins;
        let probability = (0..n)
            .map(|q| {
                let block = &maps.as_flat()[q * per_query..(q + 1) * per_query];
                if block.iter().any(|&x| x > 0.0) { 0.9 } else { 0.1 }
            })
            .collect();
        Ok(ModelOutput {
            features: Array2D::filled(n, 2, 0.0),
            probability,
        })
    }
}

struct BrokenModel;

impl ElutionModel for BrokenModel {
    fn score(&self, _maps: &IntensityMaps, _valid_ion_counts: &[usize]) -> Result<ModelOutput> {
        Ok(ModelOutput {
            features: Array2D::filled(0, 2, 0.0),
            probability: vec![],
        })
    }
}

#[test]
fn test_models_run_on_centroid_fallback_maps() {
    let store = store();
    // Profile maps are requested, but the store only holds centroids
    let orchestrator = Orchestrator::new(&store, config())
        .unwrap()
        .with_center_model(Box::new(SignalModel))
        .with_envelope_model(Box::new(SignalModel));
    let queries = vec![query(1, 0, Some(APEX))];
    let plans = orchestrator.plan(&queries);

    let mut batches = Vec::new();
    orchestrator
        .process_window(&plans[0], &queries, |batch| {
            batches.push(batch);
            Ok(())
        })
        .unwrap();
    let batch = &batches[0];
    let maps = batch.maps.as_ref().unwrap();
    assert_eq!(maps.dims(), [1, 24, 13, 50]);

    let scores = batch.scores();
    assert_eq!(scores[0].center_model, Some([0.9; 4]));
    assert_eq!(scores[0].envelope_probability, Some(0.9));
}

#[test]
fn test_model_row_mismatch_is_an_error() {
    let store = store();
    let orchestrator = Orchestrator::new(&store, config())
        .unwrap()
        .with_envelope_model(Box::new(BrokenModel));
    let queries = vec![query(1, 0, Some(APEX))];
    match orchestrator.score_all(&queries) {
        Err(XicSeekError::Model { .. }) => {}
        other => panic!("expected a model error, got {:?}", other.map(|x| x.0.len())),
    }
}

#[test]
fn test_invalid_config_is_rejected() {
    let store = store();
    let bad = EngineConfig {
        batch_size: 0,
        ..config()
    };
    assert!(Orchestrator::new(&store, bad).is_err());
}

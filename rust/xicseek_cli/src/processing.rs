use crate::config::{
    InputConfig,
    OutputConfig,
};
use crate::errors::CliError;
use indicatif::{
    ProgressIterator,
    ProgressStyle,
};
use std::fs::File;
use std::io::{
    BufReader,
    BufWriter,
    Write,
};
use std::time::Instant;
use xicquery::{
    InMemoryScanStore,
    PrecursorQuery,
};
use xicseek::errors::XicSeekError;
use xicseek::orchestrator::is_missing_window;
use xicseek::{
    EngineConfig,
    Orchestrator,
    StageTimings,
};
use tracing::{
    debug,
    info,
    warn,
};

pub const SCORES_FILENAME: &str = "locus_scores.jsonl";
pub const TIMINGS_FILENAME: &str = "timings.json";

fn open(path: &std::path::Path) -> Result<BufReader<File>, CliError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| CliError::io(e, path))
}

pub fn load_inputs(input: &InputConfig) -> Result<(InMemoryScanStore, Vec<PrecursorQuery>), CliError> {
    let st = Instant::now();
    let store = InMemoryScanStore::from_json_reader(open(&input.scans)?)?;
    info!(
        "Loaded {} windows from {} in {:?}",
        store.window_ids().len(),
        input.scans.display(),
        st.elapsed()
    );

    let st = Instant::now();
    let queries: Vec<PrecursorQuery> = serde_json::from_reader(open(&input.queries)?)
        .map_err(|e| CliError::ParseError { msg: e.to_string() })?;
    info!(
        "Loaded {} queries from {} in {:?}",
        queries.len(),
        input.queries.display(),
        st.elapsed()
    );
    Ok((store, queries))
}

/// Scores every query window by window, streaming one JSON line per locus.
pub fn main_loop(
    store: &InMemoryScanStore,
    queries: &[PrecursorQuery],
    config: EngineConfig,
    output: &OutputConfig,
) -> Result<StageTimings, CliError> {
    let orchestrator = Orchestrator::new(store, config)?;
    let plans = orchestrator.plan(queries);

    let out_path = output.directory.join(SCORES_FILENAME);
    let mut writer = BufWriter::new(File::create(&out_path).map_err(|e| CliError::io(e, &out_path))?);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
    )
    .map_err(|e| CliError::Config {
        source: e.to_string(),
    })?;

    let start = Instant::now();
    let mut timings = StageTimings::default();
    let mut nwritten = 0;
    let mut nskipped = 0;
    for plan in plans.iter().progress_with_style(style) {
        let result = orchestrator.process_window(plan, queries, |batch| {
            debug!("Writing batch of {} rows for window {}", batch.len(), batch.window_id);
            for score in batch.scores() {
                serde_json::to_writer(&mut writer, &score)?;
                writer.write_all(b"\n").map_err(|e| XicSeekError::Io {
                    source: e,
                    path: Some(out_path.clone()),
                })?;
                nwritten += 1;
            }
            Ok(())
        });
        match result {
            Ok(window_timings) => {
                info!("Window {} timings: {:?}", plan.window_id, window_timings);
                timings += window_timings;
            }
            Err(e) if is_missing_window(&e) => {
                warn!(
                    "Window {} is not in the scan input, skipping {} queries",
                    plan.window_id,
                    plan.query_indices.len()
                );
                nskipped += plan.query_indices.len();
            }
            Err(e) => return Err(e.into()),
        }
    }
    writer.flush().map_err(|e| CliError::io(e, &out_path))?;

    info!(
        "Processed {} queries ({} skipped), wrote {} rows to {} in {:?}",
        queries.len(),
        nskipped,
        nwritten,
        out_path.display(),
        start.elapsed()
    );
    Ok(timings)
}

pub fn write_timings(timings: &StageTimings, output: &OutputConfig) -> Result<(), CliError> {
    let path = output.directory.join(TIMINGS_FILENAME);
    let file = File::create(&path).map_err(|e| CliError::io(e, &path))?;
    serde_json::to_writer_pretty(file, timings).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(path.to_string_lossy().to_string()),
    })?;
    Ok(())
}

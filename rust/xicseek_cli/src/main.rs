mod cli;
mod config;
mod errors;
mod processing;

use clap::Parser;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;
use errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> std::result::Result<(), CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    let args = Cli::parse();

    let conf = std::fs::File::open(&args.config).map_err(|e| CliError::io(e, &args.config))?;
    let config: Config = serde_json::from_reader(std::io::BufReader::new(conf))
        .map_err(|e| CliError::ParseError { msg: e.to_string() })?;
    let config = config.with_cli_args(args)?;
    info!("Parsed configuration: {:#?}", config);

    let (Some(input), Some(output)) = (config.input, config.output) else {
        return Err(CliError::Config {
            source: "Input and output have to be set".to_string(),
        });
    };

    std::fs::create_dir_all(&output.directory).map_err(|e| CliError::io(e, &output.directory))?;

    let (store, queries) = processing::load_inputs(&input)?;
    let timings = processing::main_loop(&store, &queries, config.analysis, &output)?;
    info!("Stage timings: {:#?}", timings);
    processing::write_timings(&timings, &output)?;

    Ok(())
}

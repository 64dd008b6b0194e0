use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;
use xicseek::EngineConfig;

use crate::cli::Cli;
use crate::errors::CliError;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub input: Option<InputConfig>,
    #[serde(default)]
    pub analysis: EngineConfig,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InputConfig {
    /// JSON array of acquisition windows.
    pub scans: PathBuf,
    /// JSON array of precursor queries.
    pub queries: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Config {
    /// Applies the command line overrides and checks that inputs and outputs are set.
    pub fn with_cli_args(mut self, args: Cli) -> Result<Self, CliError> {
        match (self.input.as_mut(), args.scans, args.queries) {
            (Some(input), scans, queries) => {
                if let Some(scans) = scans {
                    input.scans = scans;
                }
                if let Some(queries) = queries {
                    input.queries = queries;
                }
            }
            (None, Some(scans), Some(queries)) => {
                self.input = Some(InputConfig { scans, queries });
            }
            (None, _, _) => {
                return Err(CliError::Config {
                    source: "No input provided, please provide one in either the config file or with the --scans and --queries flags".to_string(),
                });
            }
        }
        if let Some(directory) = args.output_dir {
            self.output = Some(OutputConfig { directory });
        }
        if self.output.is_none() {
            return Err(CliError::Config {
                source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
            });
        }
        self.analysis.validate().map_err(|e| CliError::Config {
            source: format!("{:?}", e),
        })?;
        Ok(self)
    }
}

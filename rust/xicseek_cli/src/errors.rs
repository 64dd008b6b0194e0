#[derive(Debug)]
pub enum CliError {
    Config { source: String },
    ParseError { msg: String },
    Io { source: String, path: Option<String> },
    Processing { source: String },
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config { source } => write!(f, "Error interpreting the config: {}", source),
            CliError::ParseError { msg } => write!(f, "Error parsing input: {}", msg),
            CliError::Io { source, path } => {
                if let Some(path) = path {
                    write!(f, "Error reading file {}: {}", path, source)
                } else {
                    write!(f, "Error reading file: {}", source)
                }
            }
            CliError::Processing { source } => write!(f, "Error while scoring: {}", source),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    pub fn io(e: std::io::Error, path: &std::path::Path) -> Self {
        CliError::Io {
            source: e.to_string(),
            path: Some(path.to_string_lossy().to_string()),
        }
    }
}

impl From<xicquery::XicqueryError> for CliError {
    fn from(e: xicquery::XicqueryError) -> Self {
        CliError::ParseError {
            msg: format!("{:?}", e),
        }
    }
}

impl From<xicseek::XicSeekError> for CliError {
    fn from(e: xicseek::XicSeekError) -> Self {
        CliError::Processing {
            source: format!("{:?}", e),
        }
    }
}

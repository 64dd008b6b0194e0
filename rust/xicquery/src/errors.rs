use std::fmt::Display;

#[derive(Debug)]
pub enum XicqueryError {
    DataReadingError(DataReadingError),
    DataProcessingError(DataProcessingError),
    Other(String),
}

impl Display for XicqueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for XicqueryError {}

impl XicqueryError {
    pub fn custom(msg: impl Display) -> Self {
        Self::Other(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, XicqueryError>;

#[derive(Debug)]
pub enum DataReadingError {
    UnsupportedFormatVersion { found: u32, expected: u32 },
    WindowNotFound(u32),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Display for DataReadingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedFormatVersion { found, expected } => write!(
                f,
                "Unsupported scan format version {} (expected {})",
                found, expected
            ),
            Self::WindowNotFound(id) => write!(f, "Acquisition window {} not found", id),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl From<std::io::Error> for DataReadingError {
    fn from(e: std::io::Error) -> Self {
        DataReadingError::Io(e)
    }
}

impl From<serde_json::Error> for DataReadingError {
    fn from(e: serde_json::Error) -> Self {
        DataReadingError::Json(e)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataProcessingError {
    ExpectedVectorLength { real: usize, expected: usize },
    ExpectedNonEmptyData,
    ExpectedVectorSameLength,
    IndexOutOfBoundsError(usize),
    InvalidSeekOffsets { position: usize },
    NonIncreasingRetentionTime { scan: usize },
    UnsortedScan { scan: usize },
    CycleCountMismatch { ms1: usize, ms2: usize },
    InvalidWindowWidth { width: usize },
    ExpectedRestrictedMobility,
}

impl Display for DataProcessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<DataProcessingError> for XicqueryError {
    fn from(e: DataProcessingError) -> Self {
        XicqueryError::DataProcessingError(e)
    }
}

impl<T: Into<DataReadingError>> From<T> for XicqueryError {
    fn from(e: T) -> Self {
        XicqueryError::DataReadingError(e.into())
    }
}

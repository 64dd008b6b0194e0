use xicquery::{
    DataProcessingError as XQDataProcessingError,
    XicqueryError,
};

#[derive(Debug)]
pub enum DataProcessingError {
    ExpectedSlicesSameLength {
        expected: usize,
        other: usize,
        context: String,
    },
    ExpectedNonEmptyData {
        context: Option<String>,
    },
    InvalidConfiguration {
        field: &'static str,
        context: String,
    },
    XicqueryDataProcessingError {
        error: XQDataProcessingError,
        context: String,
    },
}

impl From<XQDataProcessingError> for DataProcessingError {
    fn from(x: XQDataProcessingError) -> Self {
        Self::XicqueryDataProcessingError {
            error: x,
            context: "".to_string(),
        }
    }
}

impl DataProcessingError {
    pub fn append_to_context(mut self, context: &str) -> Self {
        match &mut self {
            DataProcessingError::ExpectedSlicesSameLength {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::ExpectedNonEmptyData {
                context: owned_context,
            } => match owned_context {
                Some(x) => x.push_str(context),
                None => *owned_context = Some(context.to_string()),
            },
            DataProcessingError::InvalidConfiguration {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
            DataProcessingError::XicqueryDataProcessingError {
                context: owned_context,
                ..
            } => {
                owned_context.push_str(context);
            }
        }
        self
    }
}

#[derive(Debug)]
pub enum XicSeekError {
    Xicquery(XicqueryError),
    Io {
        source: std::io::Error,
        path: Option<std::path::PathBuf>,
    },
    ParseError {
        msg: String,
    },
    Model {
        msg: String,
    },
    DataProcessingError(DataProcessingError),
}

impl std::fmt::Display for XicSeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for XicSeekError {}

pub type Result<T> = std::result::Result<T, XicSeekError>;

impl From<XicqueryError> for XicSeekError {
    fn from(x: XicqueryError) -> Self {
        Self::Xicquery(x)
    }
}

impl From<serde_json::Error> for XicSeekError {
    fn from(val: serde_json::Error) -> Self {
        XicSeekError::ParseError {
            msg: val.to_string(),
        }
    }
}

impl From<DataProcessingError> for XicSeekError {
    fn from(x: DataProcessingError) -> Self {
        Self::DataProcessingError(x)
    }
}

impl From<XQDataProcessingError> for XicSeekError {
    fn from(x: XQDataProcessingError) -> Self {
        Self::DataProcessingError(DataProcessingError::XicqueryDataProcessingError {
            error: x,
            context: "".to_string(),
        })
    }
}

//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for rankfolio.
#[derive(Debug, thiserror::Error)]
pub enum RankfolioError {
    #[error("singular matrix: no non-zero pivot in column {column}")]
    SingularMatrix { column: usize },

    #[error("insufficient data for {what}: have {have}, need {need}")]
    InsufficientData {
        what: String,
        have: usize,
        need: usize,
    },

    #[error("no price for {instrument} on {date}")]
    MissingPrice { instrument: String, date: NaiveDate },

    #[error("allocation strategy selected no instruments on {date}")]
    EmptyTargetSet { date: NaiveDate },

    #[error("invalid configuration [{section}] {key}: {reason}")]
    InvalidConfiguration {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("data load error: {reason}")]
    DataLoad { reason: String },

    #[error("report error: {reason}")]
    ReportInvalid { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RankfolioError {
    pub(crate) fn invalid_config(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RankfolioError::InvalidConfiguration {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn insufficient(what: impl Into<String>, have: usize, need: usize) -> Self {
        RankfolioError::InsufficientData {
            what: what.into(),
            have,
            need,
        }
    }
}

impl From<&RankfolioError> for std::process::ExitCode {
    fn from(err: &RankfolioError) -> Self {
        let code: u8 = match err {
            RankfolioError::Io(_) => 1,
            RankfolioError::InvalidConfiguration { .. }
            | RankfolioError::ConfigParse { .. }
            | RankfolioError::ConfigMissing { .. } => 2,
            RankfolioError::DataLoad { .. }
            | RankfolioError::Csv(_)
            | RankfolioError::InsufficientData { .. }
            | RankfolioError::MissingPrice { .. }
            | RankfolioError::EmptyTargetSet { .. } => 3,
            RankfolioError::SingularMatrix { .. } | RankfolioError::InvalidInput { .. } => 4,
            RankfolioError::ReportInvalid { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure of a single specification.
///
/// All three kinds are contained at the specification boundary by the batch
/// runner: the row is left null and the batch moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    /// Unsupported or malformed axis value; raised before any fit is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Solver non-convergence, rank deficiency, estimator/data incompatibility or timeout.
    #[error("fit error: {0}")]
    Fit(String),

    /// A required labelled parameter or fit statistic is absent from the solution.
    #[error("extraction error: {0}")]
    Extraction(String),
}

impl SpecError {
    pub fn kind(&self) -> &'static str {
        match self {
            SpecError::Configuration(_) => "configuration",
            SpecError::Fit(_) => "fit",
            SpecError::Extraction(_) => "extraction",
        }
    }
}

impl From<SpecError> for AppError {
    fn from(err: SpecError) -> Self {
        let code = match err {
            SpecError::Configuration(_) => 2,
            SpecError::Fit(_) | SpecError::Extraction(_) => 4,
        };
        AppError::new(code, err.to_string())
    }
}

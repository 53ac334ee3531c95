use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur when the
/// tool loads, reconciles, or exports tables.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when a CSV input cannot be decoded.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::Error),

    /// Raised when the TOML configuration cannot be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Raised when the configuration parses but holds unusable values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Raised when a loaded table does not have a usable shape.
    #[error("invalid table: {0}")]
    InvalidTable(String),

    /// Raised when a projection asks for a column the table does not carry.
    #[error("missing column '{0}'")]
    MissingColumn(String),

    /// Raised when the declared input format is not one we can read.
    #[error("unsupported file type '{0}'")]
    UnsupportedFormat(String),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when no logged-in session backs the request.
    #[error("not logged in")]
    Unauthenticated,

    /// Validation failure from one of the reconciliation stages.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ToolError {
    /// Whether the error describes bad user input rather than a system fault.
    /// These are shown to the user as warnings.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ToolError::Reconcile(_)
                | ToolError::Csv(_)
                | ToolError::ExcelRead(_)
                | ToolError::InvalidTable(_)
                | ToolError::MissingColumn(_)
                | ToolError::UnsupportedFormat(_)
                | ToolError::Unauthenticated
        )
    }
}

/// Stage-tagged failures raised while reconciling a PVT table with a survey
/// table.
///
/// The rendered message is deliberately coarse; callers that want to know
/// which column or row was at fault can branch on the variant and read
/// [`ReconcileError::reason`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("The survey file was invalid.")]
    InvalidSurveyFormat { reason: String },

    #[error("The PVT file was invalid.")]
    InvalidPvtFormat { reason: String },

    #[error(
        "A error occured when combining the files. Check to make sure you have the right files uploaded."
    )]
    CombineFailure { reason: String },
}

impl ReconcileError {
    pub fn survey(reason: impl Into<String>) -> Self {
        ReconcileError::InvalidSurveyFormat {
            reason: reason.into(),
        }
    }

    pub fn pvt(reason: impl Into<String>) -> Self {
        ReconcileError::InvalidPvtFormat {
            reason: reason.into(),
        }
    }

    pub fn combine(reason: impl Into<String>) -> Self {
        ReconcileError::CombineFailure {
            reason: reason.into(),
        }
    }

    /// Detailed diagnostic for the failure.
    pub fn reason(&self) -> &str {
        match self {
            ReconcileError::InvalidSurveyFormat { reason }
            | ReconcileError::InvalidPvtFormat { reason }
            | ReconcileError::CombineFailure { reason } => reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconcile_errors_render_coarse_messages() {
        let error = ReconcileError::pvt("column 'datetime' is missing");
        assert_eq!(error.to_string(), "The PVT file was invalid.");
        assert_eq!(error.reason(), "column 'datetime' is missing");

        let wrapped = ToolError::from(ReconcileError::survey("key 3 is not text"));
        assert_eq!(wrapped.to_string(), "The survey file was invalid.");
        assert!(wrapped.is_user_facing());
    }

    #[test]
    fn malformed_tables_are_user_facing() {
        let error = ToolError::InvalidTable("row 1 has 3 cells but the header has 2".into());
        assert!(error.is_user_facing());
    }

    #[test]
    fn io_errors_are_not_user_facing() {
        let error = ToolError::from(std::io::Error::other("disk full"));
        assert!(!error.is_user_facing());
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Input files error: {message}")]
    InputError { message: String },

    #[error("Template error ({sheet}): {message}")]
    TemplateError { sheet: String, message: String },

    #[error("Data file error: {message}")]
    DataError { message: String },

    #[error("Natural abundance correction failed for {ion}: {message}")]
    CorrectionError { ion: String, message: String },

    #[error("Standard fit failed for {ion}: {message}")]
    FitError { ion: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Computation,
    Output,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnalyzerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AnalyzerError::ConfigValidationError { .. }
            | AnalyzerError::InvalidConfigValueError { .. }
            | AnalyzerError::MissingConfigError { .. } => ErrorCategory::Configuration,
            AnalyzerError::InputError { .. }
            | AnalyzerError::TemplateError { .. }
            | AnalyzerError::DataError { .. }
            | AnalyzerError::CsvError(_) => ErrorCategory::Input,
            AnalyzerError::CorrectionError { .. } | AnalyzerError::FitError { .. } => {
                ErrorCategory::Computation
            }
            AnalyzerError::ZipError(_) | AnalyzerError::SerializationError(_) => {
                ErrorCategory::Output
            }
            AnalyzerError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Configuration | ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Computation => ErrorSeverity::Medium,
            ErrorCategory::Output => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            AnalyzerError::ConfigValidationError { .. } => {
                "Check the TOML syntax and section names of the analysis config".to_string()
            }
            AnalyzerError::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}' in the config file or on the command line", field)
            }
            AnalyzerError::MissingConfigError { field } => {
                format!("Provide a value for '{}'", field)
            }
            AnalyzerError::InputError { .. } => {
                "Pass exactly two paths: the data export and a template directory whose name contains 'template'".to_string()
            }
            AnalyzerError::TemplateError { sheet, .. } => {
                format!("Check the {} sheet of the template directory", sheet)
            }
            AnalyzerError::DataError { .. } | AnalyzerError::CsvError(_) => {
                "Check that the data export has the ion header row followed by the column header row".to_string()
            }
            AnalyzerError::CorrectionError { .. } => {
                "Check the tracer atom and purity vector, or switch correction method".to_string()
            }
            AnalyzerError::FitError { ion, .. } => {
                format!("Inspect the standard points of {} and adjust the exclusions", ion)
            }
            AnalyzerError::ZipError(_) | AnalyzerError::SerializationError(_) => {
                "Check that the results directory is writable".to_string()
            }
            AnalyzerError::IoError(_) => {
                "Check file paths and permissions".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Could not read the experiment: {}", self),
            ErrorCategory::Computation => format!("Analysis failed: {}", self),
            ErrorCategory::Output => format!("Could not write the results: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        AnalyzerError::DataError {
            message: message.into(),
        }
    }

    pub fn template(sheet: &str, message: impl Into<String>) -> Self {
        AnalyzerError::TemplateError {
            sheet: sheet.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_by_category() {
        let err = AnalyzerError::data("no samples");
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::High);

        let err = AnalyzerError::CorrectionError {
            ion: "C16:0 (270)".to_string(),
            message: "singular matrix".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);

        let err = AnalyzerError::IoError(std::io::Error::other("disk"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_messages_mention_context() {
        let err = AnalyzerError::template("MAP", "missing SampleID column");
        assert!(err.to_string().contains("MAP"));
        assert!(err.recovery_suggestion().contains("MAP"));
        assert!(err.user_friendly_message().starts_with("Could not read"));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A gradient threshold label could not be parsed, or thresholds are not ascending.
    InvalidThreshold { label: String, reason: String },
    UnsupportedKind(String),
    /// A configuration field holds a value of the wrong type or out of range.
    InvalidValue { field: String, expected: String },
}

impl BuildError {
    pub fn invalid_threshold(label: impl Into<String>, reason: impl Into<String>) -> Self {
        BuildError::InvalidThreshold {
            label: label.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, expected: impl Into<String>) -> Self {
        BuildError::InvalidValue {
            field: field.into(),
            expected: expected.into(),
        }
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildError::InvalidThreshold { label, reason } => {
                write!(f, "invalid gradient threshold {label:?}: {reason}")
            }
            BuildError::UnsupportedKind(kind) => write!(f, "unsupported overlay kind {kind:?}"),
            BuildError::InvalidValue { field, expected } => {
                write!(f, "invalid value for {field:?}: expected {expected}")
            }
        }
    }
}

impl std::error::Error for BuildError {}

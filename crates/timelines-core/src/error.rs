/// Fatal conditions that abort a reconciliation pass.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum TimelinesError {
    #[error("unable to find {what} for {key}")]
    NotFound { what: &'static str, key: String },
    #[error("inconsistent anchor: {0}")]
    InconsistentAnchor(String),
    #[error("derivation error: {0}")]
    Derivation(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("store error: {0}")]
    Store(String),
}

impl TimelinesError {
    pub(crate) fn not_found(what: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            key: key.into(),
        }
    }

    /// True for the provenance / anchor / derivation failures that indicate a
    /// data or window problem rather than a store or setup problem.
    #[must_use]
    pub fn is_data_fault(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. } | Self::InconsistentAnchor(_) | Self::Derivation(_)
        )
    }
}

impl From<anyhow::Error> for TimelinesError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}

pub type Result<T> = std::result::Result<T, DataModelError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DataModelError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("No transform found from {from} to {to}")]
    NoTransformFound { from: String, to: String },
    #[error("Transform unavailable: no {0} transform")]
    TransformUnavailable(&'static str),
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("Aggregates can not be merged: {0}")]
    IncompatibleMerge(String),
    #[error("There is no intersection between regions")]
    NoIntersection,
    #[error("Polynomial fit failed: {0}")]
    Fit(String),
    #[error("PROJ error: {0}")]
    Proj(String),
}

impl DataModelError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[cfg(feature = "proj")]
impl From<proj::ProjCreateError> for DataModelError {
    fn from(value: proj::ProjCreateError) -> Self {
        Self::Proj(value.to_string())
    }
}

#[cfg(feature = "proj")]
impl From<proj::ProjError> for DataModelError {
    fn from(value: proj::ProjError) -> Self {
        Self::Proj(value.to_string())
    }
}

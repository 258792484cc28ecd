use tagreg_ledger::RegistryError;
use tagreg_refs::RefError;
use tagreg_types::TypeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown artifact type {kind:?}; allowed types: {allowed:?}")]
    UnknownType { kind: String, allowed: Vec<String> },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RefError> for SdkError {
    fn from(err: RefError) -> Self {
        SdkError::Registry(err.into())
    }
}

impl From<TypeError> for SdkError {
    fn from(err: TypeError) -> Self {
        SdkError::Registry(err.into())
    }
}

pub type SdkResult<T> = Result<T, SdkError>;

use thiserror::Error;

/// Errors that end a dispatch before or after the gateway call.
///
/// Delivery failures reported by a gateway are not errors: they travel on the
/// `SendOutcome` and are classified by `FailureKind`.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No active template, or no usable provider for the tenant. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The delivery record could not be written. Breaks the one-record-per-event
    /// guarantee, so it must reach an operator.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl DispatchError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{:#}", err))
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

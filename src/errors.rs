use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("TRANSPORT_FAILURE: {0}")]
    Transport(String),
    #[error("MALFORMED_RESPONSE: {0}")]
    MalformedResponse(String),
    #[error("UNSUPPORTED: {0}")]
    Unsupported(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl ControllerError {
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_FAILURE",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::Unsupported(_) => "UNSUPPORTED",
            Self::Config(_) => "CONFIG_INVALID",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<std::io::Error> for ControllerError {
    fn from(value: std::io::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<serde_json::Error> for ControllerError {
    fn from(value: serde_json::Error) -> Self {
        Self::MalformedResponse(value.to_string())
    }
}

impl From<serde_yaml::Error> for ControllerError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<anyhow::Error> for ControllerError {
    fn from(value: anyhow::Error) -> Self {
        Self::Transport(format!("{value:#}"))
    }
}

pub type ControllerResult<T> = Result<T, ControllerError>;

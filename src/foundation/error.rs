use serde::{Deserialize, Serialize};

pub type RenderResult<T> = Result<T, RenderError>;

/// Stable tag for every failure the orchestration layer can surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidParameter,
    AssetError,
    LaunchError,
    Failed,
    TimedOut,
    OutputMissing,
    PublishError,
    Config,
    Io,
}

impl ErrorKind {
    /// `true` for failures caused by the caller's input rather than the render itself.
    pub fn is_rejection(self) -> bool {
        matches!(self, Self::InvalidParameter)
    }
}

/// Why a logo payload was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoProblem {
    Decode,
    Empty,
    UnsupportedFormat,
}

impl std::fmt::Display for LogoProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Decode => "decode failure",
            Self::Empty => "empty payload",
            Self::UnsupportedFormat => "unsupported image format",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("invalid parameter '{field}': {message}")]
    InvalidParameter {
        field: &'static str,
        logo: Option<LogoProblem>,
        message: String,
    },

    #[error("asset error: {0}")]
    Asset(String),

    #[error("launch error: {0}")]
    Launch(String),

    #[error("render failed: {0}")]
    Failed(String),

    #[error("render timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("output missing: {0}")]
    OutputMissing(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RenderError {
    pub fn invalid_parameter(field: &'static str, msg: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field,
            logo: None,
            message: msg.into(),
        }
    }

    pub fn invalid_logo(problem: LogoProblem, msg: impl Into<String>) -> Self {
        Self::InvalidParameter {
            field: "logo",
            logo: Some(problem),
            message: format!("{problem}: {}", msg.into()),
        }
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn launch(msg: impl Into<String>) -> Self {
        Self::Launch(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn output_missing(msg: impl Into<String>) -> Self {
        Self::OutputMissing(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::Asset(_) => ErrorKind::AssetError,
            Self::Launch(_) => ErrorKind::LaunchError,
            Self::Failed(_) => ErrorKind::Failed,
            Self::TimedOut(_) => ErrorKind::TimedOut,
            Self::OutputMissing(_) => ErrorKind::OutputMissing,
            Self::Publish(_) => ErrorKind::PublishError,
            Self::Config(_) => ErrorKind::Config,
            Self::Other(_) => ErrorKind::Io,
        }
    }
}

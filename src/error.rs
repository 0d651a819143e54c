use arcstr::ArcStr;
use thiserror::Error;

use crate::params::ParamKey;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error serializing/deserializing JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("error parsing configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered with HTTP 401.
    #[error("unauthorized: {}", .message.as_deref().unwrap_or("credential rejected"))]
    Unauthorized { message: Option<String> },

    #[error("backend returned status {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Backend { status: u16, message: Option<String> },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidParameter {
        key: String,
        value: String,
        reason: &'static str,
    },

    #[error("pin {0} is not part of the chosen subcircuit")]
    UnknownPin(ArcStr),

    #[error("no subcircuit named {0}")]
    UnknownSubckt(String),

    #[error("no subcircuit has been chosen")]
    NoSubcktChosen,

    #[error("no pulse preset named {0}")]
    UnknownPreset(String),

    #[error("no simulation backend configured")]
    NotConfigured,

    #[error("request was cancelled")]
    Cancelled,

    #[error("error plotting waveforms: {0}")]
    Plot(String),
}

impl Error {
    pub(crate) fn invalid_param(key: ParamKey, value: &str, reason: &'static str) -> Self {
        Self::InvalidParameter {
            key: key.as_str().to_string(),
            value: value.to_string(),
            reason,
        }
    }

    /// Message suitable for showing to a user, preferring the server-supplied text.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Unauthorized { message } | Self::Backend { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    #[inline]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use cutout::CutoutError;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Failure classes reported by segmentation / inpainting collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceErrorKind {
    /// The remote model is still warming up
    ModelLoading,
    RateLimited,
    Auth,
    Quota,
    /// Content rejected by the provider's safety policy
    Policy,
    Network,
    Unknown,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} error: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn model_loading(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::ModelLoading, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::RateLimited, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ServiceErrorKind::Network, message)
    }

    /// Classify an HTTP-style failure from its status code and response body
    pub fn from_status(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        let kind = match status {
            503 if lower.contains("loading") => ServiceErrorKind::ModelLoading,
            429 => ServiceErrorKind::RateLimited,
            401 | 403 => ServiceErrorKind::Auth,
            402 => ServiceErrorKind::Quota,
            _ if lower.contains("quota") || lower.contains("credits") => ServiceErrorKind::Quota,
            _ if lower.contains("nsfw") || lower.contains("safety") || lower.contains("policy") => {
                ServiceErrorKind::Policy
            }
            _ if lower.contains("loading") => ServiceErrorKind::ModelLoading,
            _ => ServiceErrorKind::Unknown,
        };
        Self::new(kind, format!("status {status}: {body}"))
    }

    /// Only transient provider states are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ServiceErrorKind::ModelLoading | ServiceErrorKind::RateLimited)
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] CutoutError),

    #[error("Service call failed: {0}")]
    Service(#[from] ServiceError),

    #[error("No segmentation available; segment the image first")]
    NotSegmented,

    #[error("No detected region labelled '{0}'")]
    UnknownRegion(String),

    #[error("No detected region matches '{0}'")]
    NoMatchingRegion(String),

    #[error("The base image has no transparent pixels to fill")]
    NothingToFill,

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;

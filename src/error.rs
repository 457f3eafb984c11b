// Error taxonomy for the provisioning steps.
//
// `SchemaNotReady` is the one failure the orchestrator turns into a guided
// halt instead of propagating. Operator abort is not an error at all; see
// `ui::run`.

use reqwest::StatusCode;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The request never produced an HTTP response.
    #[error("{step}: request failed: {source}")]
    Transport {
        step: &'static str,
        #[source]
        source: BoxError,
    },

    /// The remote authority answered with a status this step does not accept.
    #[error("{step}: unexpected status {status}: {body}")]
    Provisioning {
        step: &'static str,
        status: StatusCode,
        body: String,
    },

    /// A success status whose body could not be used.
    #[error("{step}: malformed response: {reason}")]
    MalformedResponse { step: &'static str, reason: String },

    /// The profile table does not exist yet; the schema has not been applied.
    #[error("table `{table}` not found (schema not applied?): {body}")]
    SchemaNotReady { table: String, body: String },
}

impl ProvisionError {
    pub fn transport(step: &'static str, source: impl Into<BoxError>) -> Self {
        ProvisionError::Transport {
            step,
            source: source.into(),
        }
    }

    /// Status and body for operator diagnosis, when the remote answered.
    pub fn response_details(&self) -> Option<(StatusCode, &str)> {
        match self {
            ProvisionError::Provisioning { status, body, .. } => Some((*status, body.as_str())),
            ProvisionError::SchemaNotReady { body, .. } => {
                Some((StatusCode::NOT_FOUND, body.as_str()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(String),

    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

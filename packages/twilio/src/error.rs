use thiserror::Error;

/// Errors raised by the Telephony Gateway client.
#[derive(Debug, Error)]
pub enum TwilioError {
    #[error("request to provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    ProviderError { status: u16, body: String },

    #[error("failed to parse provider response: {0}")]
    InvalidResponse(String),

    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),
}

impl TwilioError {
    /// Whether the failure is worth retrying (transient) or terminal.
    ///
    /// A 4xx other than 429 means the provider rejected the request itself
    /// (bad number, bad credentials) and retrying will not help.
    pub fn is_retryable(&self) -> bool {
        match self {
            TwilioError::Request(_) => true,
            TwilioError::ProviderError { status, .. } => {
                *status >= 500 || *status == 429
            }
            TwilioError::InvalidResponse(_) => false,
            TwilioError::InvalidWebhook(_) => false,
        }
    }
}

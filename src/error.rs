use thiserror::Error;

/// Failure talking to the market-data provider.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("provider rate limit exceeded for {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// 4xx responses other than 429 will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode(_) => false,
            FetchError::Http(_) | FetchError::RateLimited(_) => true,
        }
    }
}

/// Failure delivering a broadcast to a sink.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("telegram rejected message for chat {chat_id}: {description}")]
    Telegram {
        chat_id: String,
        description: String,
    },

    #[error("desktop notification failed: {0}")]
    Desktop(String),

    #[error("no recipients configured")]
    NoRecipients,

    #[error("all {0} sinks failed")]
    AllSinksFailed(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = FetchError::Status {
            status: 503,
            url: "u".into(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = FetchError::Status {
            status: 404,
            url: "u".into(),
        };
        assert!(!err.is_retryable());
        assert!(FetchError::RateLimited("u".into()).is_retryable());
    }

    #[test]
    fn display_includes_context() {
        let err = NotifyError::Telegram {
            chat_id: "42".into(),
            description: "chat not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "telegram rejected message for chat 42: chat not found"
        );
    }
}

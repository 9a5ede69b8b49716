use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("not found: {0}")]
    NotFound(String),

    /// 4xx other than 404; repeating the request will not help.
    #[error("request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Server { .. })
    }

    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            404 => ClientError::NotFound(body),
            code if status.is_server_error() => ClientError::Server { status: code, body },
            code => ClientError::Rejected { status: code, body },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn only_server_side_failures_retry() {
        assert!(ClientError::from_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_retryable());
        assert!(!ClientError::from_status(StatusCode::NOT_FOUND, String::new()).is_retryable());
        assert!(!ClientError::from_status(StatusCode::UNPROCESSABLE_ENTITY, String::new()).is_retryable());
        assert!(!ClientError::Decode("eof".into()).is_retryable());
        assert!(matches!(
            ClientError::from_status(StatusCode::BAD_REQUEST, "nope".into()),
            ClientError::Rejected { status: 400, .. }
        ));
    }
}

use shared::domain::OrderId;
use thiserror::Error;

/// Failures surfaced by the order store client and the session on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("could not reach the order store: {0}")]
    ConnectionUnavailable(String),
    #[error("order store rejected the request: {0}")]
    QueryFailed(String),
    #[error("malformed change event: {0}")]
    MalformedEvent(String),
    #[error("order {0} is not in the current list")]
    NotFound(OrderId),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            ClientError::ConnectionUnavailable(err.to_string())
        } else {
            ClientError::QueryFailed(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::ConnectionUnavailable(err.to_string())
    }
}

use thiserror::Error;

/// Startup-only errors: the process refuses to start on any of these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Broker unreachable or dropped. Handled by the reconnect loop.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("MQTT connection error: {0}")]
    Mqtt(#[from] rumqttc::ConnectionError),
    #[error("broker closed the connection")]
    Closed,
}

impl ConnectionError {
    /// The broker answered but refused the session (bad credentials, bad client id...).
    pub fn is_refused(&self) -> bool {
        matches!(self, ConnectionError::Mqtt(rumqttc::ConnectionError::ConnectionRefused(_)))
    }
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("subscribe request could not be queued: {0}")]
    Request(#[from] rumqttc::ClientError),
    #[error("broker rejected {rejected} of {requested} subscriptions")]
    Rejected { requested: usize, rejected: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("payload on {topic} is not valid UTF-8")]
    NotUtf8 { topic: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("display write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("timestamp formatting failed: {0}")]
    Format(#[from] time::error::Format),
    #[error("display unavailable: {0}")]
    Unavailable(String),
}

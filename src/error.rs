use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChorusError {
    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Adapter rate limited: {adapter}, retry after {retry_after_ms}ms")]
    RateLimited {
        adapter: String,
        retry_after_ms: u64,
    },

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Tier timed out: model={model}, {elapsed_ms}ms elapsed")]
    TierTimeout { model: String, elapsed_ms: u64 },

    #[error("Circuit open for {binding}")]
    CircuitOpen { binding: String },

    #[error("Cascade exhausted for role {role}: tried {attempts} tiers, last error: {last_error}")]
    CascadeExhausted {
        role: String,
        attempts: usize,
        last_error: String,
    },

    #[error("No response for role {role}: {detail}")]
    NoResponse { role: String, detail: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type ChorusResult<T> = Result<T, ChorusError>;

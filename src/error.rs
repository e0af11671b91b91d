use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt cache entry {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no layout worker is running")]
    Unavailable,
    #[error("failed to spawn layout worker: {0}")]
    Spawn(#[from] std::io::Error),
}

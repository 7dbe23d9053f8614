use thiserror::Error;

#[derive(Debug, Error)]
pub enum MgmtError {
    #[error("Statistic already registered: {0}")]
    DuplicateStatisticName(String),

    #[error("No registered statistic named '{0}'")]
    UnknownStatistic(String),

    #[error("Cannot handle registered statistic kind: {0}")]
    UnsupportedRegisteredStatisticKind(String),

    #[error("Capability not found: {0}")]
    UnknownCapability(String),

    #[error("Context not found: {0}")]
    UnknownContext(String),

    #[error("Management call failed: {0}")]
    CallFailed(String),

    #[error("Cache already bound: {0}")]
    CacheAlreadyBound(String),

    #[error("Statistic source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Statistics registry disposed")]
    RegistryDisposed,

    #[error("Scheduler shut down")]
    SchedulerShutdown,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),
}

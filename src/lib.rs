pub mod config;
pub mod context;
pub mod errors;
pub mod logger;
pub mod management;
pub mod notification;
pub mod stats;

pub use config::{ManagementConfig, StatisticsConfig};
pub use context::Context;
pub use errors::MgmtError;
pub use management::ManagementRegistry;
pub use notification::{NotificationEvent, NotificationKind};

use std::path::Path;

/// Load configuration from `path` (or defaults when `None`), apply environment overrides and
/// start a management registry on the system clock.
pub fn open(path: Option<&Path>) -> Result<ManagementRegistry, MgmtError> {
    let mut config = match path {
        Some(p) => ManagementConfig::from_file(p)?,
        None => ManagementConfig::default(),
    };
    config.apply_env();
    config.validate()?;
    ManagementRegistry::new(config)
}

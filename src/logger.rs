//! Process-wide logging setup on top of `log4rs`.
//!
//! Three rolling files are written to the chosen directory:
//! - `app.log`: everything not routed elsewhere
//! - `stats.log`: the `tiermon::stats` target (sampling ticks, registry lifecycle)
//! - `notifications.log`: the `tiermon::notifications` target (lifecycle events)
//!
//! Sampler transitions on `tiermon::diag` share `stats.log` and only show at TRACE.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

pub const STATS_TARGET: &str = "tiermon::stats";
pub const NOTIFICATIONS_TARGET: &str = "tiermon::notifications";
pub const DIAG_TARGET: &str = "tiermon::diag";

const ENCODER_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Initializes the logging system from a log4rs config file.
pub fn init_path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

fn rolling_appender(
    base: &Path,
    stem: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE_BYTES)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(ENCODER_PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?;
    Ok(appender)
}

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Configure logging globally for the process.
/// - dir: base directory for logs; if None, current directory.
/// - level: error|warn|info|debug|trace
/// - retention: number of rolled files to keep (default 7)
///
/// Returns `false` when a logger was already installed: the files are created but the new
/// routing is not applied.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
) -> Result<bool, Box<dyn std::error::Error>> {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);

    let app = rolling_appender(&base, "app", keep)?;
    let stats = rolling_appender(&base, "stats", keep)?;
    let notifications = rolling_appender(&base, "notifications", keep)?;

    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(app)))
        .appender(Appender::builder().build("stats", Box::new(stats)))
        .appender(Appender::builder().build("notifications", Box::new(notifications)))
        .logger(Logger::builder().appender("stats").additive(false).build(STATS_TARGET, lvl))
        .logger(
            Logger::builder()
                .appender("notifications")
                .additive(false)
                .build(NOTIFICATIONS_TARGET, lvl),
        )
        .logger(Logger::builder().appender("stats").additive(false).build(DIAG_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))?;
    match log4rs::init_config(config) {
        Ok(_) => Ok(true),
        Err(e) => {
            log::debug!("keeping the installed logger, {} not applied: {e}", base.display());
            Ok(false)
        }
    }
}

/// Configure logging from environment variables if present:
/// - TIERMON_LOG_DIR
/// - TIERMON_LOG_LEVEL
/// - TIERMON_LOG_RETENTION
pub fn configure_from_env() -> Result<bool, Box<dyn std::error::Error>> {
    let dir = std::env::var("TIERMON_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("TIERMON_LOG_LEVEL").ok();
    let retention =
        std::env::var("TIERMON_LOG_RETENTION").ok().and_then(|s| s.parse::<usize>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention)
}

//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use weave_models::{Resolution, WeekAnchor};

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// Maximum concurrent submission downloads per job
    pub max_download_parallel: usize,
    /// Root under which each run gets its own scratch directory
    pub work_dir: PathBuf,
    /// Kill an FFmpeg invocation after this long
    pub ffmpeg_timeout: Option<Duration>,
    /// Unfinished jobs older than this are failed by the sweeper
    pub stale_after: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
    /// How often the executor scans for abandoned queue messages
    pub claim_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Name on the outro card
    pub product_name: String,
    /// Weekday compilation windows start on
    pub week_anchor: WeekAnchor,
    pub intro_secs: f64,
    pub outro_secs: f64,
    pub resolution: Resolution,
    /// Font for title cards
    pub title_font: Option<PathBuf>,
    /// Prometheus exporter port; no exporter when unset
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_download_parallel: 2,
            work_dir: PathBuf::from("/tmp/weave"),
            ffmpeg_timeout: Some(Duration::from_secs(1800)),
            stale_after: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            claim_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(60),
            product_name: "Weave".to_string(),
            week_anchor: WeekAnchor::default(),
            intro_secs: 3.0,
            outro_secs: 2.0,
            resolution: Resolution::HD,
            title_font: None,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        let defaults = Self::default();

        let ffmpeg_timeout = match env_parse::<u64>("WORKER_FFMPEG_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.ffmpeg_timeout,
        };

        Ok(Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")?.unwrap_or(defaults.max_concurrent_jobs).max(1),
            max_download_parallel: env_parse("WORKER_DOWNLOAD_PARALLEL")?
                .unwrap_or(defaults.max_download_parallel)
                .max(1),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            ffmpeg_timeout,
            stale_after: env_secs("WORKER_STALE_AFTER_SECS")?.unwrap_or(defaults.stale_after),
            sweep_interval: env_secs("WORKER_SWEEP_INTERVAL_SECS")?.unwrap_or(defaults.sweep_interval),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS")?.unwrap_or(defaults.claim_interval),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT_SECS")?.unwrap_or(defaults.shutdown_timeout),
            product_name: std::env::var("WEAVE_PRODUCT_NAME").unwrap_or(defaults.product_name),
            week_anchor: env_parse("WEAVE_WEEK_ANCHOR")?.unwrap_or(defaults.week_anchor),
            intro_secs: env_parse("WEAVE_INTRO_SECS")?.unwrap_or(defaults.intro_secs),
            outro_secs: env_parse("WEAVE_OUTRO_SECS")?.unwrap_or(defaults.outro_secs),
            resolution: defaults.resolution,
            title_font: std::env::var("WEAVE_TITLE_FONT").ok().map(PathBuf::from),
            metrics_port: env_parse("METRICS_PORT")?,
        })
    }
}

fn env_parse<T: FromStr>(name: &str) -> WorkerResult<Option<T>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| WorkerError::config_error(format!("invalid {} '{}'", name, raw))),
        _ => Ok(None),
    }
}

fn env_secs(name: &str) -> WorkerResult<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.work_dir, PathBuf::from("/tmp/weave"));
        assert_eq!(config.stale_after, Duration::from_secs(3600));
        assert_eq!(config.week_anchor, WeekAnchor(Weekday::Mon));
        assert_eq!(config.resolution, Resolution::HD);
        assert_eq!(config.product_name, "Weave");
    }

    #[test]
    fn test_env_parse_rejects_garbage() {
        std::env::set_var("WEAVE_TEST_ENV_PARSE", "seven");
        assert!(env_parse::<u64>("WEAVE_TEST_ENV_PARSE").is_err());
        std::env::set_var("WEAVE_TEST_ENV_PARSE", " 7 ");
        assert_eq!(env_parse::<u64>("WEAVE_TEST_ENV_PARSE").unwrap(), Some(7));
        std::env::remove_var("WEAVE_TEST_ENV_PARSE");
        assert_eq!(env_parse::<u64>("WEAVE_TEST_ENV_PARSE").unwrap(), None);
    }
}

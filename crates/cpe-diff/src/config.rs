//! Configuration for a diff run

use crate::error::{HarnessError, HarnessResult};
use crate::retry::RetryPolicy;
use crate::sampler::ComparisonKey;
use reqwest::Url;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_OLD_URL: &str = "http://127.0.0.1:1325";
pub const DEFAULT_NEW_URL: &str = "http://127.0.0.1:1326";
pub const DEFAULT_SAMPLE_RATE: f64 = 0.001;

/// Which API surface is being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `GET /cpes/{vendor}/{product}`
    Cpes,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Cpes => "cpes",
        }
    }

    /// File name of the key list under `integration/`
    pub fn list_file(&self) -> &'static str {
        match self {
            Mode::Cpes => "cpe.txt",
        }
    }

    /// Request path for one key, relative to the backend base URL
    pub fn request_path(&self, key: &ComparisonKey) -> String {
        match self {
            Mode::Cpes => format!("cpes/{}/{}", key.vendor, key.product),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-flight health probe settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckPolicy {
    pub path: String,
    pub attempts: u32,
    pub interval: Duration,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            path: "health".to_string(),
            attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

/// Everything a run needs, threaded explicitly through each component
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    /// Fraction of the key list to test, in `(0, 1]`
    pub sample_rate: f64,
    /// Base URL of the old backend
    pub old_url: String,
    /// Base URL of the new backend
    pub new_url: String,
    /// Path to the `vendor|product` key list
    pub list_path: PathBuf,
    /// Directory that receives `.old`/`.new` artifacts; wiped at start
    pub diff_dir: PathBuf,
    /// Number of concurrent workers
    pub workers: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
    pub health: HealthCheckPolicy,
    /// Fixed RNG seed for reproducible sampling
    pub seed: Option<u64>,
}

impl RunConfig {
    /// Defaults matching the `integration/` layout of the server repository
    pub fn new(mode: Mode) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            mode,
            sample_rate: DEFAULT_SAMPLE_RATE,
            old_url: DEFAULT_OLD_URL.to_string(),
            new_url: DEFAULT_NEW_URL.to_string(),
            list_path: PathBuf::from("integration").join(mode.list_file()),
            diff_dir: PathBuf::from("integration").join("diff").join(mode.as_str()),
            workers,
            connect_timeout: Duration::from_secs(2),
            read_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            health: HealthCheckPolicy::default(),
            seed: None,
        }
    }

    /// Defaults, overridden by environment variables where set
    pub fn from_env(mode: Mode) -> Self {
        let mut config = Self::new(mode);
        if let Ok(url) = env::var("OLD_BACKEND_URL") {
            config.old_url = url;
        }
        if let Ok(url) = env::var("NEW_BACKEND_URL") {
            config.new_url = url;
        }
        if let Ok(path) = env::var("CPE_DIFF_LIST") {
            config.list_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("CPE_DIFF_OUTPUT") {
            config.diff_dir = PathBuf::from(path);
        }
        config
    }

    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = rate;
        self
    }

    pub fn with_backends(mut self, old_url: &str, new_url: &str) -> Self {
        self.old_url = old_url.to_string();
        self.new_url = new_url.to_string();
        self
    }

    pub fn with_paths(mut self, list_path: impl Into<PathBuf>, diff_dir: impl Into<PathBuf>) -> Self {
        self.list_path = list_path.into();
        self.diff_dir = diff_dir.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check values that would otherwise fail deep inside the run
    pub fn validate(&self) -> HarnessResult<()> {
        if !(self.sample_rate > 0.0 && self.sample_rate <= 1.0) {
            return Err(HarnessError::config(
                "sample_rate",
                format!("{} is not in (0, 1]", self.sample_rate),
            ));
        }
        if self.workers == 0 {
            return Err(HarnessError::config("workers", "must be at least 1"));
        }
        if self.health.attempts == 0 {
            return Err(HarnessError::config("health.attempts", "must be at least 1"));
        }
        for (key, url) in [("old_url", &self.old_url), ("new_url", &self.new_url)] {
            let parsed = Url::parse(url)
                .map_err(|e| HarnessError::config(key, format!("{url}: {e}")))?;
            if parsed.cannot_be_a_base() {
                return Err(HarnessError::config(key, format!("{url} cannot be a base URL")));
            }
        }
        Ok(())
    }
}

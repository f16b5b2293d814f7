//! CPE Server-Mode Diff
//!
//! Compares the answers of two running go-cpe-dictionary servers for a
//! random sample of `vendor|product` keys and writes mismatches under
//! `integration/diff/<mode>/`.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use cpe_diff::{DiffHarness, Mode, RunConfig};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Cpes,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Cpes => Mode::Cpes,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Diff the responses of two CPE dictionary servers")]
struct Args {
    /// Specify the mode to test
    #[arg(value_enum)]
    mode: ModeArg,
    /// Adjust the rate of data used for testing (len(test_data) * sample_rate)
    #[arg(long = "sample_rate", alias = "sample-rate", default_value_t = cpe_diff::config::DEFAULT_SAMPLE_RATE)]
    sample_rate: f64,
    /// Print debug messages
    #[arg(long, overrides_with = "no_debug")]
    debug: bool,
    /// Disable debug messages
    #[arg(long, overrides_with = "debug")]
    no_debug: bool,
    /// Base URL of the old backend (env: OLD_BACKEND_URL)
    #[arg(long)]
    old_url: Option<String>,
    /// Base URL of the new backend (env: NEW_BACKEND_URL)
    #[arg(long)]
    new_url: Option<String>,
    /// Key list (one `vendor|product` per line)
    #[arg(long)]
    list: Option<PathBuf>,
    /// Directory for diff artifacts; cleared at start
    #[arg(long)]
    output: Option<PathBuf>,
    /// Concurrent workers (default: available parallelism)
    #[arg(long)]
    workers: Option<usize>,
    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> RunConfig {
        let mut config = RunConfig::from_env(self.mode.into()).with_sample_rate(self.sample_rate);
        if let Some(url) = self.old_url {
            config.old_url = url;
        }
        if let Some(url) = self.new_url {
            config.new_url = url;
        }
        if let Some(path) = self.list {
            config.list_path = path;
        }
        if let Some(path) = self.output {
            config.diff_dir = path;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.seed = self.seed;
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = if args.debug && !args.no_debug {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let harness = DiffHarness::new(args.into_config())?;

    let cancel = harness.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let summary = harness.run().await?;
    info!(
        "Server mode test finished (mode: {}): {}",
        harness.config().mode,
        summary
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["diff-server-mode", "cpes"]).unwrap();
        assert_eq!(args.sample_rate, 0.001);
        assert!(!args.debug);

        let config = args.into_config();
        assert_eq!(config.mode, Mode::Cpes);
        assert_eq!(config.list_path, PathBuf::from("integration/cpe.txt"));
    }

    #[test]
    fn test_flags() {
        let args = Args::try_parse_from([
            "diff-server-mode",
            "cpes",
            "--sample_rate",
            "0.5",
            "--debug",
            "--workers",
            "3",
            "--seed",
            "11",
        ])
        .unwrap();
        assert!(args.debug);

        let config = args.into_config();
        assert_eq!(config.sample_rate, 0.5);
        assert_eq!(config.workers, 3);
        assert_eq!(config.seed, Some(11));
    }

    #[test]
    fn test_last_debug_flag_wins() {
        let args =
            Args::try_parse_from(["diff-server-mode", "cpes", "--debug", "--no-debug"]).unwrap();
        assert!(!args.debug);

        let args =
            Args::try_parse_from(["diff-server-mode", "cpes", "--no-debug", "--debug"]).unwrap();
        assert!(args.debug);
    }

    #[test]
    fn test_rejects_unknown_mode() {
        assert!(Args::try_parse_from(["diff-server-mode", "products"]).is_err());
    }
}

use std::{fs, net::SocketAddr, path::Path, time::Duration};

use admin_ipc::DEFAULT_SOCKET_PATH;
use anyhow::{bail, Result};
use clap::Parser;

const MEMORY_PREFIX: &str = "sqlite::memory:";
const URL_PREFIX: &str = "sqlite://";

#[derive(Parser, Debug, Clone)]
#[command(name = "collectord", about = "Polls the live match feed and stores snapshots")]
pub struct Args {
    #[arg(long, env = "SQLITE_PATH", default_value = "sqlite://collector.db")]
    pub sqlite_path: String,

    #[arg(long, env = "FEED_URL")]
    pub feed_url: String,

    #[arg(long, env = "FEED_TOKEN", hide_env_values = true)]
    pub feed_token: Option<String>,

    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Must be shorter than the poll interval.
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 15)]
    pub fetch_timeout_secs: u64,

    #[arg(long, env = "ADMIN_SOCKET", default_value = DEFAULT_SOCKET_PATH)]
    pub admin_socket: String,

    #[arg(long, env = "METRICS_ADDR", default_value = "127.0.0.1:9109")]
    pub metrics_addr: SocketAddr,
}

impl Args {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        validate_sqlite_path(&self.sqlite_path)?;
        if !(self.feed_url.starts_with("http://") || self.feed_url.starts_with("https://")) {
            bail!("feed url must be an http(s) url, got `{}`", self.feed_url);
        }
        if self.poll_interval_secs == 0 || self.fetch_timeout_secs == 0 {
            bail!("poll interval and fetch timeout must be at least one second");
        }
        if self.fetch_timeout_secs >= self.poll_interval_secs {
            bail!(
                "fetch timeout ({}s) must be shorter than the poll interval ({}s)",
                self.fetch_timeout_secs,
                self.poll_interval_secs
            );
        }
        Ok(())
    }
}

pub fn validate_sqlite_path(path: &str) -> Result<()> {
    if path.starts_with(MEMORY_PREFIX) {
        return Ok(());
    }

    let Some(rest) = path.strip_prefix(URL_PREFIX) else {
        bail!("sqlite path must start with `sqlite://` or use `sqlite::memory:`");
    };
    if file_part(rest).is_empty() {
        bail!("sqlite path is missing a filesystem component after `sqlite://`");
    }
    Ok(())
}

/// Creates the directory holding a file-backed database.
pub fn ensure_sqlite_parent_dir(path: &str) -> Result<()> {
    let Some(rest) = path.strip_prefix(URL_PREFIX) else {
        return Ok(());
    };
    if let Some(parent) = Path::new(file_part(rest)).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn file_part(rest: &str) -> &str {
    rest.split_once('?').map(|(path, _)| path).unwrap_or(rest)
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::cfg::logger::LogConfig;

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Process-level settings: where to listen, where the keypair lives.
    pub server: ServerConfig,
    /// Knobs of the replication core itself.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Logging setup; see [`crate::cfg::logger`].
    pub logger: LogConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    /// TCP address the demo transport binds to.
    pub listen_addr: String,

    /// Path of the keypair cache file. Created on first run.
    #[serde(default = "default_keypair_path")]
    pub keypair_path: PathBuf,

    /// RSA modulus size for a freshly generated keypair.
    #[serde(default = "default_keypair_bits")]
    pub keypair_bits: usize,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    /// Messages a session may buffer while its context hydrates; overflow is
    /// dropped with a warning.
    #[serde(default = "default_inbox_limit")]
    pub pending_inbox_limit: usize,

    /// Idle wake-up period of a context worker, in seconds.
    #[serde(default = "default_worker_idle_secs")]
    pub worker_idle_secs: u64,
}

impl RuntimeConfig {
    pub fn worker_idle(&self) -> Duration {
        Duration::from_secs(self.worker_idle_secs)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pending_inbox_limit: default_inbox_limit(),
            worker_idle_secs: default_worker_idle_secs(),
        }
    }
}

fn default_keypair_path() -> PathBuf {
    PathBuf::from(".uuid_keypair")
}

fn default_keypair_bits() -> usize {
    4096
}

fn default_inbox_limit() -> usize {
    64
}

fn default_worker_idle_secs() -> u64 {
    10
}

impl Config {
    /// Loads from a possibly-relative path: resolved against the current
    /// working directory and canonicalized before reading.
    pub fn load(rel: &str) -> Result<Self> {
        let p = Path::new(rel);
        let abs = if p.is_absolute() {
            p.to_path_buf()
        } else {
            std::env::current_dir()
                .context("cannot get current working dir")?
                .join(p)
        };
        let canon = abs
            .canonicalize()
            .with_context(|| format!("failed to canonicalize config path {abs:?}"))?;
        Self::load_from_file(canon)
    }

    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {path:?}"))?;
        let cfg: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {path:?}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            !self.server.listen_addr.is_empty(),
            "server.listen_addr must not be empty"
        );
        ensure!(
            self.server.keypair_bits >= 2048,
            "server.keypair_bits must be at least 2048"
        );
        ensure!(
            self.runtime.pending_inbox_limit > 0,
            "runtime.pending_inbox_limit must be > 0"
        );
        ensure!(
            self.runtime.worker_idle_secs > 0,
            "runtime.worker_idle_secs must be > 0"
        );
        Ok(())
    }
}

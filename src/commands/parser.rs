//! Command-line parsing
//!
//! Without `--worker` the binary runs as a full participant. Every fleet
//! setting can be overridden here; flags win over the config file and the
//! environment.

use crate::config::FleetConfig;
use crate::core::WorkerKind;
use crate::error::FleetResult;
use clap::{Args, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fleet-counter",
    about = "Shared counter coordinated across cooperating processes",
    version
)]
pub struct Cli {
    /// Run a single worker body and exit
    #[arg(long, value_enum, value_name = "KIND")]
    pub worker: Option<WorkerKind>,

    /// Same as `--worker adder`
    #[arg(long, hide = true, conflicts_with_all = ["worker", "child2"])]
    pub child1: bool,

    /// Same as `--worker doubler`
    #[arg(long, hide = true, conflicts_with_all = ["worker", "child1"])]
    pub child2: bool,

    /// TOML file layered over the built-in defaults
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Diagnostic filter (overrides RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Also write diagnostics to this file
    #[arg(long, value_name = "PATH")]
    pub diagnostic_log: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// Per-field overrides of [`FleetConfig`]
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Shared memory segment name
    #[arg(long, value_name = "NAME")]
    pub shm_name: Option<String>,

    /// Cross-process lock name
    #[arg(long, value_name = "NAME")]
    pub lock_name: Option<String>,

    /// Leader lock file
    #[arg(long, value_name = "PATH")]
    pub leader_lock: Option<PathBuf>,

    /// Counter event log
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    #[arg(long, value_name = "MS")]
    pub increment_interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    pub log_interval_ms: Option<u64>,

    #[arg(long, value_name = "MS")]
    pub spawn_interval_ms: Option<u64>,

    /// Pause between the doubler's two critical sections
    #[arg(long, value_name = "MS")]
    pub doubler_delay_ms: Option<u64>,

    /// Polls before an attacher gives up on an uninitialized segment
    #[arg(long, value_name = "N")]
    pub init_wait_attempts: Option<u32>,

    #[arg(long, value_name = "MS")]
    pub init_wait_step_ms: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut FleetConfig) {
        if let Some(value) = &self.shm_name {
            config.shm_name = value.clone();
        }
        if let Some(value) = &self.lock_name {
            config.lock_name = value.clone();
        }
        if let Some(value) = &self.leader_lock {
            config.leader_lock_path = value.clone();
        }
        if let Some(value) = &self.log_file {
            config.log_path = value.clone();
        }
        if let Some(value) = self.increment_interval_ms {
            config.increment_interval_ms = value;
        }
        if let Some(value) = self.log_interval_ms {
            config.log_interval_ms = value;
        }
        if let Some(value) = self.spawn_interval_ms {
            config.spawn_interval_ms = value;
        }
        if let Some(value) = self.doubler_delay_ms {
            config.doubler_delay_ms = value;
        }
        if let Some(value) = self.init_wait_attempts {
            config.init_wait_attempts = value;
        }
        if let Some(value) = self.init_wait_step_ms {
            config.init_wait_step_ms = value;
        }
    }
}

/// What the process was asked to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    Participant,
    Worker(WorkerKind),
}

impl Cli {
    pub fn mode(&self) -> LaunchMode {
        if let Some(kind) = self.worker {
            LaunchMode::Worker(kind)
        } else if self.child1 {
            LaunchMode::Worker(WorkerKind::Adder)
        } else if self.child2 {
            LaunchMode::Worker(WorkerKind::Doubler)
        } else {
            LaunchMode::Participant
        }
    }

    /// Defaults, then `--config`, then the environment, then flags.
    pub fn resolve_config(&self) -> FleetResult<FleetConfig> {
        let mut config = FleetConfig::load(self.config.as_deref())?;
        self.overrides.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}

//! Fleet configuration
//!
//! Defaults live here as constants. [`FleetConfig::load`] layers an optional
//! TOML file and `FLEET_COUNTER_*` environment variables on top of them;
//! command-line flags are applied last by the binary.

use crate::core::InitWait;
use crate::error::{errors, FleetResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SHM_NAME: &str = "/counter_shared_mem";
pub const DEFAULT_LOCK_NAME: &str = "/counter_mutex";
pub const DEFAULT_LEADER_LOCK_FILE: &str = "counter_leader.lock";
pub const DEFAULT_LOG_FILE: &str = "counter_log.txt";

pub const ENV_PREFIX: &str = "FLEET_COUNTER";

/// Value seeded by the process that creates the shared segment
pub const INITIAL_COUNTER_VALUE: i64 = 1;
/// Amount the adder worker adds to the counter
pub const ADDER_INCREMENT: i64 = 10;

pub const INCREMENT_INTERVAL_DEFAULT: Duration = Duration::from_millis(300);
pub const LOG_INTERVAL_DEFAULT: Duration = Duration::from_millis(1000);
pub const SPAWN_INTERVAL_DEFAULT: Duration = Duration::from_millis(3000);
pub const DOUBLER_DELAY_DEFAULT: Duration = Duration::from_millis(2000);

// 100 x 10ms: attachers give up on an uninitialized segment after about a second
pub const INIT_WAIT_ATTEMPTS_DEFAULT: u32 = 100;
pub const INIT_WAIT_STEP_DEFAULT: Duration = Duration::from_millis(10);

/// Effective configuration shared by every process of one fleet.
///
/// Two processes belong to the same fleet when `shm_name`, `lock_name` and
/// `leader_lock_path` agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub shm_name: String,
    pub lock_name: String,
    pub leader_lock_path: PathBuf,
    pub log_path: PathBuf,
    pub increment_interval_ms: u64,
    pub log_interval_ms: u64,
    pub spawn_interval_ms: u64,
    pub doubler_delay_ms: u64,
    pub init_wait_attempts: u32,
    pub init_wait_step_ms: u64,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            shm_name: DEFAULT_SHM_NAME.to_string(),
            lock_name: DEFAULT_LOCK_NAME.to_string(),
            leader_lock_path: PathBuf::from(DEFAULT_LEADER_LOCK_FILE),
            log_path: PathBuf::from(DEFAULT_LOG_FILE),
            increment_interval_ms: INCREMENT_INTERVAL_DEFAULT.as_millis() as u64,
            log_interval_ms: LOG_INTERVAL_DEFAULT.as_millis() as u64,
            spawn_interval_ms: SPAWN_INTERVAL_DEFAULT.as_millis() as u64,
            doubler_delay_ms: DOUBLER_DELAY_DEFAULT.as_millis() as u64,
            init_wait_attempts: INIT_WAIT_ATTEMPTS_DEFAULT,
            init_wait_step_ms: INIT_WAIT_STEP_DEFAULT.as_millis() as u64,
        }
    }
}

impl FleetConfig {
    /// Load defaults, then `file` (if any), then the environment.
    pub fn load(file: Option<&Path>) -> FleetResult<Self> {
        let defaults = config::Config::try_from(&FleetConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = file {
            if !path.is_file() {
                return Err(errors::config_error(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        let loaded: FleetConfig = builder.build()?.try_deserialize()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> FleetResult<()> {
        for (field, value) in [("shm_name", &self.shm_name), ("lock_name", &self.lock_name)] {
            if value.trim().is_empty() {
                return Err(errors::validation_error(
                    format!("{field} must not be empty"),
                    Some(field),
                    None,
                ));
            }
        }

        if self.leader_lock_path.as_os_str().is_empty() {
            return Err(errors::validation_error(
                "leader_lock_path must not be empty",
                Some("leader_lock_path"),
                None,
            ));
        }

        if self.log_path.as_os_str().is_empty() {
            return Err(errors::validation_error(
                "log_path must not be empty",
                Some("log_path"),
                None,
            ));
        }

        for (field, value) in [
            ("increment_interval_ms", self.increment_interval_ms),
            ("log_interval_ms", self.log_interval_ms),
            ("spawn_interval_ms", self.spawn_interval_ms),
            ("init_wait_step_ms", self.init_wait_step_ms),
        ] {
            if value == 0 {
                return Err(errors::validation_error(
                    format!("{field} must be greater than zero"),
                    Some(field),
                    Some("0"),
                ));
            }
        }

        if self.init_wait_attempts == 0 {
            return Err(errors::validation_error(
                "init_wait_attempts must be greater than zero",
                Some("init_wait_attempts"),
                Some("0"),
            ));
        }

        Ok(())
    }

    pub fn increment_interval(&self) -> Duration {
        Duration::from_millis(self.increment_interval_ms)
    }

    pub fn log_interval(&self) -> Duration {
        Duration::from_millis(self.log_interval_ms)
    }

    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms)
    }

    pub fn doubler_delay(&self) -> Duration {
        Duration::from_millis(self.doubler_delay_ms)
    }

    pub fn init_wait(&self) -> InitWait {
        InitWait::new(
            self.init_wait_attempts,
            Duration::from_millis(self.init_wait_step_ms),
        )
    }

    /// The effective configuration as command-line flags, so a spawned
    /// worker joins the same fleet regardless of its environment.
    pub fn worker_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        let mut push = |flag: &str, value: OsString| {
            args.push(OsString::from(flag));
            args.push(value);
        };

        push("--shm-name", self.shm_name.clone().into());
        push("--lock-name", self.lock_name.clone().into());
        push("--leader-lock", self.leader_lock_path.clone().into_os_string());
        push("--log-file", self.log_path.clone().into_os_string());
        push("--increment-interval-ms", self.increment_interval_ms.to_string().into());
        push("--log-interval-ms", self.log_interval_ms.to_string().into());
        push("--spawn-interval-ms", self.spawn_interval_ms.to_string().into());
        push("--doubler-delay-ms", self.doubler_delay_ms.to_string().into());
        push("--init-wait-attempts", self.init_wait_attempts.to_string().into());
        push("--init-wait-step-ms", self.init_wait_step_ms.to_string().into());

        args
    }
}

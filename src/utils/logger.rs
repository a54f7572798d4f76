//! Diagnostic logging setup

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when neither `--log-level` nor `RUST_LOG` is set
pub const DEFAULT_FILTER: &str = "warn,fleet_counter=info";

/// Build the filter from an explicit level, then `RUST_LOG`, then the default.
pub fn build_filter(log_level: Option<&str>) -> Result<EnvFilter> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    Ok(filter)
}

/// 初始化日志系统
///
/// # Arguments
/// * `log_level` - filter directive (`debug`, `fleet_counter=trace`, ...); `None` falls back to `RUST_LOG`
/// * `log_file` - optional extra file sink for diagnostics
///
/// Diagnostics go to stderr so they never interleave with console replies on
/// stdout. Calling this twice is a no-op.
///
/// # Examples
/// ```no_run
/// use fleet_counter::utils::logger::init_logger;
///
/// init_logger(Some("debug"), None).unwrap();
/// ```
pub fn init_logger(log_level: Option<&str>, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter = build_filter(log_level)?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .with_level(true)
        .compact();

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    let installed = if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        // 文件中不使用 ANSI 颜色
        let file_layer = fmt::layer()
            .with_writer(std::sync::Arc::new(file))
            .with_target(true)
            .with_ansi(false)
            .with_level(true);

        registry.with(file_layer).try_init().is_ok()
    } else {
        registry.try_init().is_ok()
    };

    if installed {
        tracing::debug!("Logger initialized");
    }
    Ok(())
}

//! Periodic counter tasks
//!
//! Every participant runs the increment task. The leader additionally runs
//! the logging and supervision tasks. Each task is a named OS thread that
//! checks the running flag between slices of its interval.

use crate::context::FleetContext;
use crate::error::{errors, FleetResult};
use crate::event_log::CounterEvent;
use crate::logging::{debug, error, warn};
use crate::supervisor::{ProcessSupervisor, SupervisionDecision, SupervisionReport, WorkerLauncher};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on how long a task sleeps before re-checking the running flag
const SLEEP_SLICE: Duration = Duration::from_millis(50);

pub struct CounterEngine {
    handles: Vec<JoinHandle<()>>,
}

impl CounterEngine {
    /// Start the tasks this process is entitled to run.
    ///
    /// Leader tasks start only when `ctx` is leader; `supervisor` is ignored
    /// otherwise. Every task waits one interval before its first iteration,
    /// and each leader iteration refreshes the heartbeat first. A task stops
    /// on its first unrecoverable error.
    pub fn start<L>(ctx: Arc<FleetContext>, supervisor: Option<ProcessSupervisor<L>>) -> FleetResult<Self>
    where
        L: WorkerLauncher + 'static,
    {
        let mut engine = Self { handles: Vec::new() };

        let interval = ctx.config().increment_interval();
        engine.spawn("fleet-increment", &ctx, interval, |ctx| {
            increment_once(ctx).map(|_| ())
        })?;

        if ctx.is_leader() {
            let interval = ctx.config().log_interval();
            engine.spawn("fleet-log", &ctx, interval, |ctx| {
                if ctx.is_current_leader()? {
                    log_once(ctx)?;
                }
                Ok(())
            })?;

            if let Some(supervisor) = supervisor {
                let interval = ctx.config().spawn_interval();
                engine.spawn("fleet-supervise", &ctx, interval, move |ctx| {
                    if ctx.is_current_leader()? {
                        supervise_once(ctx, &supervisor)?;
                    }
                    Ok(())
                })?;
            }
        }

        Ok(engine)
    }

    fn spawn<F>(&mut self, name: &str, ctx: &Arc<FleetContext>, interval: Duration, mut task: F) -> FleetResult<()>
    where
        F: FnMut(&FleetContext) -> FleetResult<()> + Send + 'static,
    {
        let ctx = Arc::clone(ctx);
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug(format!("{thread_name} started"));
                while ctx.running() {
                    sleep_while_running(&ctx, interval);
                    if !ctx.running() {
                        break;
                    }
                    match task(&ctx) {
                        Ok(()) => {}
                        Err(err) if err.is_recoverable() => {
                            warn(format!("{thread_name}: {err}, retrying next cycle"))
                        }
                        Err(err) => {
                            error(format!("{thread_name} stopping: {err}"));
                            break;
                        }
                    }
                }
                debug(format!("{thread_name} stopped"));
            })
            .map_err(|err| errors::resource_error(format!("cannot start {name} thread"), "thread", err))?;
        self.handles.push(handle);
        Ok(())
    }

    /// Number of task threads started
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every task to finish its current iteration.
    ///
    /// The caller is expected to have cleared the running flag.
    pub fn stop(self) {
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("task").to_string();
            if handle.join().is_err() {
                error(format!("{name} panicked"));
            }
        }
    }
}

/// Add one to the counter and publish the new value.
pub fn increment_once(ctx: &FleetContext) -> FleetResult<i64> {
    let value = {
        let mut record = ctx.lock_state()?;
        record.value = record.value.wrapping_add(1);
        record.value
    };
    ctx.publish(value);
    Ok(value)
}

/// Read the counter under the lock and append a tick line outside it.
pub fn log_once(ctx: &FleetContext) -> FleetResult<i64> {
    let value = ctx.lock_state()?.value;
    ctx.events().record(CounterEvent::Tick {
        pid: ctx.pid(),
        value,
    })?;
    Ok(value)
}

/// Run one supervision cycle, then log its outcome after the lock is released.
pub fn supervise_once<L: WorkerLauncher>(
    ctx: &FleetContext,
    supervisor: &ProcessSupervisor<L>,
) -> FleetResult<SupervisionReport> {
    let report = supervisor.supervise(ctx.state(), ctx.lock())?;

    for (kind, decision) in &report.decisions {
        match decision {
            SupervisionDecision::Launched { pid } => debug(format!("launched {kind} PID={pid}")),
            SupervisionDecision::AlreadyRunning { pid } => {
                ctx.events().record_or_warn(CounterEvent::WorkerStillRunning {
                    pid: ctx.pid(),
                    kind: *kind,
                    worker_pid: *pid,
                });
            }
            SupervisionDecision::LaunchFailed { reason } => {
                warn(format!("could not launch {kind}, retrying next cycle: {reason}"))
            }
        }
    }

    Ok(report)
}

/// Sleep for `total`, waking early once the running flag is cleared.
pub fn sleep_while_running(ctx: &FleetContext, total: Duration) {
    let deadline = Instant::now() + total;
    while ctx.running() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

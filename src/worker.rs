//! Worker process bodies
//!
//! A worker attaches to the fleet, performs one scripted mutation and exits.

use crate::config::ADDER_INCREMENT;
use crate::context::FleetContext;
use crate::core::WorkerKind;
use crate::error::FleetResult;
use crate::event_log::CounterEvent;
use std::thread;

/// Run the body for `kind` and return the value it logged at the end.
pub fn run_worker(ctx: &FleetContext, kind: WorkerKind) -> FleetResult<i64> {
    ctx.events().record_or_warn(CounterEvent::WorkerStart { kind, pid: ctx.pid() });

    let value = match kind {
        WorkerKind::Adder => run_adder(ctx)?,
        WorkerKind::Doubler => run_doubler(ctx)?,
    };

    ctx.events().record_or_warn(CounterEvent::WorkerEnd {
        kind,
        pid: ctx.pid(),
        value,
    });
    Ok(value)
}

/// Add ten in a single critical section.
pub fn run_adder(ctx: &FleetContext) -> FleetResult<i64> {
    let value = {
        let mut record = ctx.lock_state()?;
        record.value = record.value.wrapping_add(ADDER_INCREMENT);
        record.value
    };
    ctx.publish(value);
    Ok(value)
}

/// Double, release the lock for `doubler_delay`, then halve.
///
/// Other processes observe the doubled value during the pause.
pub fn run_doubler(ctx: &FleetContext) -> FleetResult<i64> {
    {
        let mut record = ctx.lock_state()?;
        record.value = record.value.wrapping_mul(2);
        ctx.publish(record.value);
    }

    thread::sleep(ctx.config().doubler_delay());

    let value = {
        let mut record = ctx.lock_state()?;
        record.value /= 2;
        record.value
    };
    ctx.publish(value);
    Ok(value)
}

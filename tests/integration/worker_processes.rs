use crate::support::{wait_until, TestFleet};
use assert_cmd::prelude::*;
use fleet_counter::CounterRecord;
use predicates::prelude::*;
use serial_test::serial;
use shared_memory::ShmemConf;
use std::time::Duration;

#[test]
#[serial]
fn doubler_process_exposes_double_then_restores() {
    let fleet = TestFleet::new().with(|config| config.doubler_delay_ms = 800);
    let ctx = fleet.context();
    ctx.set_value(8).unwrap();

    let mut child = fleet.worker("doubler").spawn().expect("spawn doubler");

    let saw_double = wait_until(Duration::from_secs(3), || ctx.snapshot().unwrap().value == 16);
    assert!(saw_double, "doubled value was never observable");

    assert!(child.wait().unwrap().success());
    assert_eq!(ctx.snapshot().unwrap().value, 8);

    let log = fleet.log();
    assert!(log.contains("CHILD2 START PID="));
    assert!(log.contains("CHILD2 END PID="));
    assert!(log.contains("COUNTER=8"));
}

#[test]
#[serial]
fn legacy_child_flag_runs_the_doubler() {
    let fleet = TestFleet::new().with(|config| config.doubler_delay_ms = 0);
    let ctx = fleet.context();
    ctx.set_value(3).unwrap();

    let mut cmd = fleet.command();
    cmd.arg("--child2");
    cmd.assert().success();

    assert_eq!(ctx.snapshot().unwrap().value, 3);
}

#[test]
#[serial]
fn worker_refuses_uninitialized_segment() {
    let fleet = TestFleet::new().with(|config| {
        config.init_wait_attempts = 5;
        config.init_wait_step_ms = 10;
    });

    // sized like a record but never seeded
    let _raw = ShmemConf::new()
        .os_id(&fleet.config.shm_name)
        .size(std::mem::size_of::<CounterRecord>())
        .create()
        .expect("create raw segment");

    fleet
        .worker("adder")
        .assert()
        .failure()
        .stderr(predicate::str::contains("never initialized"));

    assert!(!fleet.log().contains("CHILD1 END"));
}

#[test]
fn invalid_configuration_exits_non_zero() {
    let fleet = TestFleet::new().with(|config| config.increment_interval_ms = 0);
    fleet
        .worker("adder")
        .assert()
        .failure()
        .stderr(predicate::str::contains("increment_interval_ms"));
}

use crate::support::{wait_until, TestFleet};
use fleet_counter::engine::supervise_once;
use fleet_counter::{ProcessSupervisor, SupervisionDecision, WorkerKind};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn running_doubler_is_not_launched_twice() {
    let fleet = TestFleet::new().with(|config| config.doubler_delay_ms = 2000);
    let leader = fleet.participant();
    assert!(leader.is_leader());

    let supervisor = ProcessSupervisor::new(fleet.launcher());

    let first = supervise_once(&leader, &supervisor).unwrap();
    assert_eq!(first.launched().count(), 2);
    let Some(&SupervisionDecision::Launched { pid: doubler_pid }) = first.decision(WorkerKind::Doubler) else {
        panic!("doubler was not launched: {first:?}");
    };
    let snapshot = leader.snapshot().unwrap();
    assert_eq!(snapshot.worker(WorkerKind::Doubler).pid, Some(doubler_pid));
    assert!(snapshot.worker(WorkerKind::Doubler).started_at.is_some());

    // the adder finishes at once; the doubler is still sleeping
    let adder_done = wait_until(Duration::from_secs(5), || fleet.log().contains("CHILD1 END"));
    assert!(adder_done);

    let second = supervise_once(&leader, &supervisor).unwrap();
    assert_eq!(
        second.decision(WorkerKind::Doubler),
        Some(&SupervisionDecision::AlreadyRunning { pid: doubler_pid })
    );
    assert!(matches!(
        second.decision(WorkerKind::Adder),
        Some(SupervisionDecision::Launched { .. })
    ));
    assert!(fleet
        .log()
        .contains(&format!("WARNING: Child2 (PID={doubler_pid}) still running, skipping spawn")));

    let doubler_done = wait_until(Duration::from_secs(10), || fleet.log().contains("CHILD2 END"));
    assert!(doubler_done);

    // reaped on the next cycle, so a fresh doubler is started
    let third = wait_until(Duration::from_secs(5), || {
        let report = supervise_once(&leader, &supervisor).unwrap();
        matches!(
            report.decision(WorkerKind::Doubler),
            Some(SupervisionDecision::Launched { pid }) if *pid != doubler_pid
        )
    });
    assert!(third, "a finished doubler was never replaced");
}

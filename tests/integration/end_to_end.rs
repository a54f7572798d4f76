use crate::support::{wait_until, TestFleet};
use fleet_counter::engine::{increment_once, supervise_once};
use fleet_counter::error::errors;
use fleet_counter::supervisor::LaunchedWorker;
use fleet_counter::{
    CounterEngine, FleetResult, ProcessSupervisor, SelfExecLauncher, SupervisionDecision, WorkerKind,
    WorkerLauncher,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Launches real adders and refuses doublers, so the counter stays predictable
struct AdderOnly(SelfExecLauncher);

impl WorkerLauncher for AdderOnly {
    fn launch(&self, kind: WorkerKind) -> FleetResult<LaunchedWorker> {
        match kind {
            WorkerKind::Adder => self.0.launch(kind),
            WorkerKind::Doubler => Err(errors::process_error(
                "doubler disabled",
                "doubler",
                io::Error::new(io::ErrorKind::PermissionDenied, "disabled for this run"),
            )),
        }
    }
}

#[test]
#[serial]
fn leader_tick_then_adder_then_follower_joins() {
    let fleet = TestFleet::new();
    let leader = Arc::new(fleet.participant());
    assert!(leader.is_leader());
    assert_eq!(leader.snapshot().unwrap().value, 1);

    assert_eq!(increment_once(&leader).unwrap(), 2);

    let supervisor = ProcessSupervisor::new(AdderOnly(fleet.launcher()));
    let report = supervise_once(&leader, &supervisor).unwrap();
    assert!(matches!(
        report.decision(WorkerKind::Adder),
        Some(SupervisionDecision::Launched { .. })
    ));
    assert!(matches!(
        report.decision(WorkerKind::Doubler),
        Some(SupervisionDecision::LaunchFailed { .. })
    ));
    assert_eq!(leader.snapshot().unwrap().worker(WorkerKind::Doubler).pid, None);

    let added = wait_until(Duration::from_secs(5), || leader.snapshot().unwrap().value == 12);
    assert!(added, "adder never finished its ten increments");
    assert!(fleet.log().contains("CHILD1 END"));

    let follower = Arc::new(fleet.participant());
    assert!(!follower.is_leader());
    assert_eq!(follower.snapshot().unwrap().value, 12);

    let engine = CounterEngine::start(Arc::clone(&follower), None::<ProcessSupervisor<SelfExecLauncher>>).unwrap();
    assert_eq!(engine.task_count(), 1);
    follower.request_shutdown();
    engine.stop();
}

#[test]
#[serial]
fn console_sessions_share_one_counter() {
    let fleet = TestFleet::new().with(|config| {
        config.increment_interval_ms = 100;
        config.log_interval_ms = 200;
        config.spawn_interval_ms = 60_000;
        config.doubler_delay_ms = 100;
    });

    let mut a = fleet.spawn_participant();
    a.expect_line("Role: LEADER", Duration::from_secs(10));
    let mut b = fleet.spawn_participant();
    b.expect_line("Role: FOLLOWER", Duration::from_secs(10));
    let b_pid = b.pid();

    b.send("set 100");
    b.expect_line("Counter set to 100", Duration::from_secs(5));

    let caught_up = wait_until(Duration::from_secs(5), || {
        a.send("get");
        let line = a.expect_line("Current counter value:", Duration::from_secs(2));
        line.rsplit(' ')
            .next()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .is_some_and(|value| value >= 100)
    });
    assert!(caught_up, "leader never observed the follower's set");

    a.send("status");
    a.expect_line("leader: PID=", Duration::from_secs(5));

    assert!(b.exit(Duration::from_secs(10)).success());
    assert!(a.exit(Duration::from_secs(10)).success());
    assert!(!fleet.artifact().exists());

    let log = fleet.log();
    assert!(log.contains(&format!("PID={b_pid} MANUAL_SET COUNTER=100")));
    assert!(!log.contains(&format!("] PID={b_pid} COUNTER=")));
    assert_eq!(log.matches("MAIN EXIT").count(), 2);
}

#[test]
#[serial]
fn unknown_console_command_is_reported() {
    let fleet = TestFleet::new().with(|config| config.spawn_interval_ms = 60_000);

    let mut participant = fleet.spawn_participant();
    participant.expect_line("Role:", Duration::from_secs(10));
    participant.send("frobnicate");
    participant.expect_line("Error: unknown command 'frobnicate'", Duration::from_secs(5));
    participant.send("set abc");
    participant.expect_line("invalid number format", Duration::from_secs(5));

    assert!(participant.exit(Duration::from_secs(10)).success());
}

#[test]
#[serial]
fn leader_waits_one_spawn_interval_before_launching() {
    let fleet = TestFleet::new().with(|config| {
        config.spawn_interval_ms = 1500;
        config.doubler_delay_ms = 50;
    });

    let participant = fleet.spawn_participant();
    participant.expect_line("Role: LEADER", Duration::from_secs(10));
    std::thread::sleep(Duration::from_millis(500));
    assert!(!fleet.log().contains("CHILD"));

    let launched = wait_until(Duration::from_secs(5), || fleet.log().contains("CHILD1 END"));
    assert!(launched, "no adder after the first spawn interval");

    assert!(participant.exit(Duration::from_secs(10)).success());
}

use clap::Parser;
use fleet_counter::commands::{Cli, LaunchMode};
use fleet_counter::WorkerKind;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::io::Write;
use test_case::test_case;

#[test_case(&["fleet-counter"], LaunchMode::Participant ; "participant")]
#[test_case(&["fleet-counter", "--worker", "adder"], LaunchMode::Worker(WorkerKind::Adder) ; "adder")]
#[test_case(&["fleet-counter", "--worker", "1"], LaunchMode::Worker(WorkerKind::Adder) ; "adder by number")]
#[test_case(&["fleet-counter", "--worker", "doubler"], LaunchMode::Worker(WorkerKind::Doubler) ; "doubler")]
#[test_case(&["fleet-counter", "--child1"], LaunchMode::Worker(WorkerKind::Adder) ; "legacy child1")]
#[test_case(&["fleet-counter", "--child2"], LaunchMode::Worker(WorkerKind::Doubler) ; "legacy child2")]
fn launch_modes(argv: &[&str], expected: LaunchMode) {
    let cli = Cli::try_parse_from(argv).unwrap();
    assert_eq!(cli.mode(), expected);
}

#[test_case(&["fleet-counter", "--child1", "--child2"] ; "both legacy flags")]
#[test_case(&["fleet-counter", "--worker", "adder", "--child2"] ; "worker and legacy")]
#[test_case(&["fleet-counter", "--worker", "tripler"] ; "unknown kind")]
fn conflicting_modes_are_rejected(argv: &[&str]) {
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
#[serial]
fn flags_win_over_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "increment_interval_ms = 42").unwrap();
    writeln!(file, "doubler_delay_ms = 5").unwrap();
    file.flush().unwrap();

    let path = file.path().to_string_lossy().into_owned();
    let cli = Cli::try_parse_from(["fleet-counter", "--config", &path, "--doubler-delay-ms", "7"]).unwrap();
    let config = cli.resolve_config().unwrap();

    assert_eq!(config.increment_interval_ms, 42);
    assert_eq!(config.doubler_delay_ms, 7);
    assert_eq!(config.shm_name, "/counter_shared_mem");
}

#[test]
#[serial]
fn zero_interval_flag_fails_validation() {
    let cli = Cli::try_parse_from(["fleet-counter", "--spawn-interval-ms", "0"]).unwrap();
    let err = cli.resolve_config().unwrap_err();
    assert!(err.to_string().contains("spawn_interval_ms"));
}

#[test]
#[serial]
fn missing_config_file_is_an_error() {
    let cli = Cli::try_parse_from(["fleet-counter", "--config", "/nonexistent/fleet.toml"]).unwrap();
    assert!(cli.resolve_config().is_err());
}

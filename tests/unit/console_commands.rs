use fleet_counter::commands::{CommandError, ConsoleCommand};
use pretty_assertions::assert_eq;
use test_case::test_case;

#[test_case("set 42", ConsoleCommand::Set(42) ; "set positive")]
#[test_case("set -7", ConsoleCommand::Set(-7) ; "set negative")]
#[test_case("  set   0  ", ConsoleCommand::Set(0) ; "set with padding")]
#[test_case("get", ConsoleCommand::Get ; "get")]
#[test_case("status", ConsoleCommand::Status ; "status")]
#[test_case("help", ConsoleCommand::Help ; "help")]
#[test_case("exit", ConsoleCommand::Exit ; "exit")]
#[test_case("quit", ConsoleCommand::Exit ; "quit")]
fn accepted_commands(line: &str, expected: ConsoleCommand) {
    assert_eq!(ConsoleCommand::parse(line), Ok(Some(expected)));
}

#[test_case("set abc", CommandError::InvalidNumber("abc".into()) ; "not a number")]
#[test_case("set 99999999999999999999", CommandError::InvalidNumber("99999999999999999999".into()) ; "overflow")]
#[test_case("set", CommandError::MissingValue ; "missing value")]
#[test_case("set 1 2", CommandError::Unknown("set 1 2".into()) ; "extra argument")]
#[test_case("GET", CommandError::Unknown("GET".into()) ; "case sensitive")]
#[test_case("reset", CommandError::Unknown("reset".into()) ; "unknown word")]
fn rejected_commands(line: &str, expected: CommandError) {
    assert_eq!(ConsoleCommand::parse(line), Err(expected));
}

#[test]
fn blank_lines_are_ignored() {
    assert_eq!(ConsoleCommand::parse(""), Ok(None));
    assert_eq!(ConsoleCommand::parse("   \t"), Ok(None));
}

#[test]
fn error_messages_name_the_input() {
    let err = ConsoleCommand::parse("set x1").unwrap_err();
    assert_eq!(err.to_string(), "invalid number format: 'x1'");

    let err = ConsoleCommand::parse("bogus").unwrap_err();
    assert!(err.to_string().starts_with("unknown command 'bogus'"));
}

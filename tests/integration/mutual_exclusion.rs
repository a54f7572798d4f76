use crate::support::TestFleet;
use assert_cmd::prelude::*;
use fleet_counter::engine::increment_once;
use serial_test::serial;
use std::sync::Arc;

#[test]
fn threaded_increments_are_never_lost() {
    let fleet = TestFleet::new();
    let ctx = Arc::new(fleet.context());
    let other = Arc::new(fleet.context());

    let handles: Vec<_> = [Arc::clone(&ctx), Arc::clone(&other)]
        .into_iter()
        .flat_map(|ctx| (0..2).map(move |_| Arc::clone(&ctx)))
        .map(|ctx| {
            std::thread::spawn(move || {
                for _ in 0..200 {
                    increment_once(&ctx).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(ctx.snapshot().unwrap().value, 1 + 800);
}

#[test]
#[serial]
fn concurrent_adder_processes_each_add_ten() {
    let fleet = TestFleet::new();
    let ctx = fleet.context();
    assert!(ctx.state().is_owner());

    let children: Vec<_> = (0..4)
        .map(|_| fleet.worker("adder").spawn().expect("spawn adder"))
        .collect();
    for mut child in children {
        assert!(child.wait().unwrap().success());
    }

    assert_eq!(ctx.snapshot().unwrap().value, 1 + 4 * 10);
    assert_eq!(fleet.log().matches("CHILD1 END").count(), 4);
}

#[test]
#[serial]
fn processes_and_threads_share_one_critical_section() {
    let fleet = TestFleet::new();
    let ctx = Arc::new(fleet.context());

    let adders: Vec<_> = (0..3)
        .map(|_| fleet.worker("1").spawn().expect("spawn adder"))
        .collect();
    let incrementer = {
        let ctx = Arc::clone(&ctx);
        std::thread::spawn(move || {
            for _ in 0..300 {
                increment_once(&ctx).unwrap();
            }
        })
    };

    incrementer.join().unwrap();
    for mut child in adders {
        assert!(child.wait().unwrap().success());
    }

    assert_eq!(ctx.snapshot().unwrap().value, 1 + 300 + 30);
}

#[test]
#[serial]
fn adder_reports_new_value_on_exit() {
    let fleet = TestFleet::new();
    let ctx = fleet.context();
    ctx.set_value(100).unwrap();

    fleet.worker("adder").assert().success();

    assert_eq!(ctx.snapshot().unwrap().value, 110);
    assert!(fleet.log().contains("COUNTER=110"));
}

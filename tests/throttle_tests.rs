use std::time::{Duration, Instant};

use quizgrader::grader::Scheduler;

#[test]
fn triggers_inside_the_interval_are_dropped() {
    let scheduler = Scheduler::new(Duration::from_secs(60));
    let start = Instant::now();

    assert!(scheduler.should_run(start));
    assert!(!scheduler.should_run(start + Duration::from_secs(1)));
    assert!(!scheduler.should_run(start + Duration::from_secs(60)));
}

#[test]
fn triggers_past_the_interval_each_start_a_run() {
    let scheduler = Scheduler::new(Duration::from_secs(60));
    let start = Instant::now();

    assert!(scheduler.should_run(start));
    assert!(scheduler.should_run(start + Duration::from_secs(61)));
    assert!(scheduler.should_run(start + Duration::from_secs(122)));
}

#[test]
fn the_interval_restarts_from_the_last_allowed_run() {
    let scheduler = Scheduler::new(Duration::from_secs(60));
    let start = Instant::now();

    assert!(scheduler.should_run(start));
    assert!(scheduler.should_run(start + Duration::from_secs(61)));
    // measured from the second run now, not the first
    assert!(!scheduler.should_run(start + Duration::from_secs(100)));
}

#[test]
fn the_first_trigger_always_runs() {
    let scheduler = Scheduler::new(Duration::from_secs(0));
    assert!(scheduler.should_run(Instant::now()));
}

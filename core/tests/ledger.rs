//! Run ledger lifecycle and the in-memory sink.

use chrono::{TimeZone, Utc};
use costalloc_core::{
    AllocError, AllocationPosting, Clock, CostVector, MemorySink, RunContext, RunLedger,
    RunStatus,
};
use rust_decimal_macros::dec;

fn ledger() -> RunLedger<MemorySink> {
    let clock = Clock::fixed(Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap());
    RunLedger::new(MemorySink::default(), clock)
}

fn ctx() -> RunContext {
    RunContext::new("overhead", 1, "2024-01", "actual")
}

fn posting(parent: &str, child: &str) -> AllocationPosting {
    AllocationPosting {
        iteration_no: 1,
        parent_code: parent.into(),
        child_code: child.into(),
        amount: dec!(10.000000),
    }
}

#[test]
fn run_identity_includes_scope_and_start_time() {
    let mut ledger = ledger();
    let run_id = ledger.start_run(&ctx()).unwrap();

    assert_eq!(run_id, "overhead@v1/2024-01/actual/20240131T120000.000000Z");
    let run = ledger.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert!(run.finished_at.is_none());

    // Same scope, next tick of the clock: a distinct run.
    let second = ledger.start_run(&ctx()).unwrap();
    assert_ne!(run_id, second);
}

#[test]
fn finish_writes_nonzero_results_only() {
    let mut ledger = ledger();
    let run_id = ledger.start_run(&ctx()).unwrap();

    let finals: CostVector = vec![
        ("100".to_string(), dec!(0)),
        ("110".to_string(), dec!(40)),
        ("120".to_string(), dec!(60)),
    ]
    .into_iter()
    .collect();
    let results = ledger.finish_run(&run_id, &finals).unwrap();

    let codes: Vec<&str> = results.iter().map(|r| r.account_code.as_str()).collect();
    assert_eq!(codes, vec!["110", "120"]);

    let run = ledger.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.finished_at.is_some());
    assert_eq!(ledger.sink().results[&run_id].len(), 2);
    assert_eq!(ledger.sink().runs[&run_id].status, RunStatus::Completed);
}

#[test]
fn finished_run_is_frozen() {
    let mut ledger = ledger();
    let run_id = ledger.start_run(&ctx()).unwrap();
    ledger.finish_run(&run_id, &CostVector::new()).unwrap();

    let err = ledger.record_postings(&run_id, &[posting("100", "110")]).unwrap_err();
    assert!(matches!(err, AllocError::RunFinished { .. }));

    let err = ledger.fail_run(&run_id, "late failure").unwrap_err();
    assert!(matches!(err, AllocError::InvalidTransition { .. }));

    let err = ledger.finish_run(&run_id, &CostVector::new()).unwrap_err();
    assert!(matches!(err, AllocError::RunFinished { .. }));
}

#[test]
fn failed_run_keeps_postings_but_no_results() {
    let mut ledger = ledger();
    let run_id = ledger.start_run(&ctx()).unwrap();
    ledger.record_postings(&run_id, &[posting("100", "110")]).unwrap();
    ledger.fail_run(&run_id, "model defect").unwrap();

    let run = ledger.run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.message.as_deref(), Some("model defect"));
    assert_eq!(ledger.sink().postings[&run_id].len(), 1);
    assert!(!ledger.sink().results.contains_key(&run_id));
}

#[test]
fn postings_append_in_order() {
    let mut ledger = ledger();
    let run_id = ledger.start_run(&ctx()).unwrap();
    ledger.record_postings(&run_id, &[posting("100", "110")]).unwrap();
    ledger.record_postings(&run_id, &[posting("100", "120")]).unwrap();

    let children: Vec<&str> = ledger.sink().postings[&run_id]
        .iter()
        .map(|p| p.child_code.as_str())
        .collect();
    assert_eq!(children, vec!["110", "120"]);
}

#[test]
fn unknown_run_is_reported() {
    let mut ledger = ledger();
    let err = ledger.record_postings("missing", &[]).unwrap_err();
    assert!(matches!(err, AllocError::RunNotFound { .. }));
}

#[test]
fn status_transitions_are_monotonic() {
    assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
    assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
    assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
    assert!(!RunStatus::Failed.can_transition_to(RunStatus::Completed));
    assert!(!RunStatus::Completed.can_transition_to(RunStatus::Failed));
    assert_eq!("failed".parse::<RunStatus>().unwrap(), RunStatus::Failed);
}

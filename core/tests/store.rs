//! SQLite result sink: runs, postings and results survive a round trip.

use chrono::{TimeZone, Utc};
use costalloc_core::{
    Account, AllocStore, AllocationModel, AllocationResult, AllocationRule, AllocationRunner, Clock,
    EngineConfig, InitialCost, InputSnapshot, RunContext, RunStatus,
};
use rust_decimal_macros::dec;

fn store() -> AllocStore {
    let store = AllocStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn runner(config: EngineConfig) -> AllocationRunner<AllocStore> {
    let clock = Clock::fixed(Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap());
    AllocationRunner::new(store(), clock, config)
}

fn accounts() -> Vec<Account> {
    vec![
        Account::root("100", "Overhead"),
        Account::new("110", "Office upkeep", Some("100")),
        Account::new("120", "IT", Some("100")),
        Account::new("121", "Helpdesk", Some("120")),
        Account::new("122", "Infrastructure", Some("120")),
    ]
}

fn model() -> AllocationModel {
    AllocationModel::new(
        "overhead",
        1,
        vec![
            AllocationRule::new("100", "110", dec!(1)),
            AllocationRule::new("100", "120", dec!(2)),
            AllocationRule::new("120", "121", dec!(1)),
            AllocationRule::new("120", "122", dec!(1)),
        ],
    )
}

#[test]
fn completed_run_round_trips() {
    let mut runner = runner(EngineConfig::default());
    let ctx = RunContext::new("overhead", 1, "2024-06", "actual");
    let costs = vec![InitialCost::new("2024-06", "actual", "100", dec!(1000))];

    let outcome = runner.execute(&ctx, accounts(), &model(), &costs).unwrap();
    let store = runner.into_sink();

    let run = store.run(&outcome.run.run_id).unwrap().expect("run row");
    assert_eq!(run, outcome.run);
    assert_eq!(run.status, RunStatus::Completed);

    let postings = store.postings_for_run(&run.run_id).unwrap();
    assert_eq!(postings, outcome.postings);
    assert_eq!(store.posting_count(&run.run_id).unwrap(), 4);

    let results = store.results_for_run(&run.run_id).unwrap();
    assert_eq!(results, outcome.results);
    let amounts: Vec<String> = results.iter().map(|r| r.amount.to_string()).collect();
    // 120 takes the remainder 666.666667; halving it rounds half-to-even.
    assert_eq!(amounts, vec!["333.333333", "333.333334", "333.333333"]);

    let json = store.input_json(&run.run_id).unwrap().expect("input snapshot");
    let snapshot = InputSnapshot::from_json(&json).unwrap();
    assert_eq!(snapshot.tree.len(), 5);
    assert_eq!(snapshot.costs.get("100"), dec!(1000));

    assert_eq!(
        store.runs_with_status(RunStatus::Completed).unwrap(),
        vec![run.run_id.clone()]
    );
}

#[test]
fn failed_run_is_persisted_without_results() {
    let mut runner = runner(EngineConfig {
        iteration_cap: Some(1),
    });
    let ctx = RunContext::new("overhead", 1, "2024-06", "actual");
    let costs = vec![InitialCost::new("2024-06", "actual", "100", dec!(1000))];

    assert!(runner.execute(&ctx, accounts(), &model(), &costs).is_err());
    let store = runner.into_sink();

    let failed = store.runs_with_status(RunStatus::Failed).unwrap();
    assert_eq!(failed.len(), 1);
    let run = store.run(&failed[0]).unwrap().unwrap();
    assert!(run.message.is_some());
    assert!(run.finished_at.is_some());
    assert_eq!(store.posting_count(&run.run_id).unwrap(), 2);
    assert!(store.results_for_run(&run.run_id).unwrap().is_empty());
}

#[test]
fn finished_run_row_cannot_change() {
    let mut runner = runner(EngineConfig::default());
    let ctx = RunContext::new("overhead", 1, "2024-06", "actual");
    let outcome = runner.execute(&ctx, accounts(), &model(), &[]).unwrap();
    let store = runner.into_sink();

    let mut tampered = outcome.run.clone();
    tampered.status = RunStatus::Failed;
    assert!(store.update_run(&tampered).is_err());
    assert_eq!(
        store.run(&outcome.run.run_id).unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[test]
fn retried_posting_batch_is_not_duplicated() {
    let mut runner = runner(EngineConfig::default());
    let ctx = RunContext::new("overhead", 1, "2024-06", "actual");
    let costs = vec![InitialCost::new("2024-06", "actual", "100", dec!(9))];
    let outcome = runner.execute(&ctx, accounts(), &model(), &costs).unwrap();
    let store = runner.into_sink();

    store
        .append_postings(&outcome.run.run_id, 0, &outcome.postings)
        .unwrap();
    assert_eq!(
        store.posting_count(&outcome.run.run_id).unwrap(),
        outcome.postings.len() as i64
    );
}

#[test]
fn completing_a_finished_run_writes_no_results() {
    let mut runner = runner(EngineConfig {
        iteration_cap: Some(1),
    });
    let ctx = RunContext::new("overhead", 1, "2024-06", "actual");
    let costs = vec![InitialCost::new("2024-06", "actual", "100", dec!(1000))];
    assert!(runner.execute(&ctx, accounts(), &model(), &costs).is_err());
    let store = runner.into_sink();
    let run_id = store.runs_with_status(RunStatus::Failed).unwrap().remove(0);

    let mut completed = store.run(&run_id).unwrap().unwrap();
    completed.status = RunStatus::Completed;
    let rows = [AllocationResult {
        account_code: "110".into(),
        amount: dec!(1000),
    }];

    assert!(store.complete_run(&completed, &rows).is_err());
    assert!(store.results_for_run(&run_id).unwrap().is_empty());
    assert_eq!(store.run(&run_id).unwrap().unwrap().status, RunStatus::Failed);
}

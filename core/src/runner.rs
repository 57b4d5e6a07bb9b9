//! Allocation runner: one run end to end.
//!
//! ORDER (fixed):
//!   1. Validate accounts, rules and the run's costs (complete report).
//!   2. Build the tree, normalize the rules, select the cost vector.
//!   3. Freeze them into an `InputSnapshot`, start the run, store the input.
//!   4. Run the engine over the snapshot.
//!   5. Record postings; complete the run, or fail it keeping the partial log.
//!      Any error after the run has started marks it failed.

use crate::{
    clock::Clock,
    config::EngineConfig,
    costs::{CostVector, InitialCost},
    engine::{AllocationEngine, AllocationPosting},
    error::{AllocError, AllocResult},
    ledger::{AllocationResult, AllocationRun, ResultSink, RunContext, RunLedger},
    rules::{AllocationModel, RuleSet},
    snapshot::InputSnapshot,
    tree::{Account, AccountTree},
    types::{IterationNo, RunId},
    validate::{self, Finding, ValidationReport},
};

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: AllocationRun,
    pub postings: Vec<AllocationPosting>,
    pub results: Vec<AllocationResult>,
    /// Non-fatal findings (dropped rules, zero-weight parents).
    pub diagnostics: Vec<Finding>,
    pub iterations: IterationNo,
}

pub struct AllocationRunner<S: ResultSink> {
    ledger: RunLedger<S>,
    config: EngineConfig,
}

impl<S: ResultSink> AllocationRunner<S> {
    pub fn new(sink: S, clock: Clock, config: EngineConfig) -> Self {
        Self {
            ledger: RunLedger::new(sink, clock),
            config,
        }
    }

    pub fn ledger(&self) -> &RunLedger<S> {
        &self.ledger
    }

    pub fn into_sink(self) -> S {
        self.ledger.into_sink()
    }

    /// Run the checks without allocating anything.
    pub fn validate_only(
        &self,
        ctx: &RunContext,
        accounts: &[Account],
        model: &AllocationModel,
        costs: &[InitialCost],
    ) -> ValidationReport {
        let scoped = scoped_costs(ctx, costs);
        validate::validate(accounts, &model.rules, &scoped)
    }

    pub fn execute(
        &mut self,
        ctx: &RunContext,
        accounts: Vec<Account>,
        model: &AllocationModel,
        costs: &[InitialCost],
    ) -> AllocResult<RunOutcome> {
        let report = self.validate_only(ctx, &accounts, model, costs);
        if !report.is_ok() {
            return Err(AllocError::Validation(report));
        }
        let diagnostics: Vec<Finding> = report.warnings().cloned().collect();

        let tree = AccountTree::build(accounts)?;
        let rules = RuleSet::normalize(&tree, &model.rules)?;
        let initial = CostVector::from_initial_costs(&tree, &ctx.period, &ctx.scenario, costs)?;
        let snapshot = InputSnapshot {
            context: ctx.clone(),
            tree,
            rules,
            costs: initial,
        };

        let run_id = self.ledger.start_run(ctx)?;
        if let Err(error) = self.ledger.save_input(&run_id, &snapshot) {
            return Err(self.abort(run_id, error, Vec::new()));
        }

        let engine =
            AllocationEngine::new(&snapshot.tree, &snapshot.rules).with_config(&self.config);
        match engine.run(snapshot.costs.clone()) {
            Ok(settlement) => {
                let recorded = self
                    .ledger
                    .record_postings(&run_id, &settlement.postings)
                    .and_then(|()| self.ledger.finish_run(&run_id, &settlement.final_costs));
                let results = match recorded {
                    Ok(results) => results,
                    Err(error) => return Err(self.abort(run_id, error, settlement.postings)),
                };
                Ok(RunOutcome {
                    run: self.current(&run_id)?,
                    postings: settlement.postings,
                    results,
                    diagnostics,
                    iterations: settlement.iterations,
                })
            }
            Err(failure) => {
                if let Err(error) = self.ledger.record_postings(&run_id, &failure.postings) {
                    log::error!("Run {run_id}: partial postings not recorded: {error}");
                }
                Err(self.abort(run_id, failure.error, failure.postings))
            }
        }
    }

    /// Close a started run as failed and wrap the cause. A sink that cannot
    /// even record the failure is logged; the original cause is returned.
    fn abort(
        &mut self,
        run_id: RunId,
        error: AllocError,
        postings: Vec<AllocationPosting>,
    ) -> AllocError {
        if let Err(e) = self.ledger.fail_run(&run_id, &error.to_string()) {
            log::error!("Run {run_id} could not be marked failed: {e}");
        }
        AllocError::RunFailed {
            run_id,
            source: Box::new(error),
            postings,
        }
    }

    fn current(&self, run_id: &str) -> AllocResult<AllocationRun> {
        self.ledger
            .run(run_id)
            .cloned()
            .ok_or_else(|| AllocError::RunNotFound {
                run_id: run_id.to_string(),
            })
    }
}

fn scoped_costs(ctx: &RunContext, costs: &[InitialCost]) -> Vec<InitialCost> {
    costs
        .iter()
        .filter(|c| c.period == ctx.period && c.scenario == ctx.scenario)
        .cloned()
        .collect()
}

//! Run ledger: run identity, status transitions, postings and results.
//!
//! Status only moves forward: running → completed | failed. A finished run
//! is frozen; further postings, results or transitions are rejected.
//!
//! ZERO SUPPRESSION: a run writes one `AllocationResult` per account whose
//! final amount is nonzero. Accounts that end at zero (fully distributed
//! parents, accounts that never received cost) get no row.

use crate::{
    clock::Clock,
    costs::CostVector,
    engine::AllocationPosting,
    error::{AllocError, AllocResult},
    money::Amount,
    snapshot::InputSnapshot,
    types::{AccountCode, Period, RunId, Scenario},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Running, RunStatus::Completed) | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = AllocError;

    fn from_str(s: &str) -> AllocResult<Self> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(anyhow::anyhow!("unknown run status '{other}'").into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    pub version: u32,
}

/// Everything that scopes one run. Passed explicitly to every call; there is
/// no implicit "current run".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub model: ModelRef,
    pub period: Period,
    pub scenario: Scenario,
}

impl RunContext {
    pub fn new(model: &str, version: u32, period: &str, scenario: &str) -> Self {
        Self {
            model: ModelRef {
                name: model.to_string(),
                version,
            },
            period: period.to_string(),
            scenario: scenario.to_string(),
        }
    }

    /// model + version + period + scenario + start time.
    pub fn run_id(&self, started_at: DateTime<Utc>) -> RunId {
        format!(
            "{}@v{}/{}/{}/{}",
            self.model.name,
            self.model.version,
            self.period,
            self.scenario,
            started_at.format("%Y%m%dT%H%M%S%.6fZ")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRun {
    pub run_id: RunId,
    pub model: ModelRef,
    pub period: Period,
    pub scenario: Scenario,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub account_code: AccountCode,
    pub amount: Amount,
}

/// The zero-suppressed result rows of a final vector, ascending by code.
pub fn results_from(final_costs: &CostVector) -> Vec<AllocationResult> {
    final_costs
        .nonzero()
        .map(|(code, amount)| AllocationResult {
            account_code: code.to_string(),
            amount,
        })
        .collect()
}

/// Rebuild the final vector from the initial one and a postings log.
pub fn replay<'a>(
    initial: &CostVector,
    postings: impl IntoIterator<Item = &'a AllocationPosting>,
) -> CostVector {
    let mut costs = initial.clone();
    for posting in postings {
        costs.add(&posting.parent_code, -posting.amount);
        costs.add(&posting.child_code, posting.amount);
    }
    costs
}

/// Where finished runs go. Implemented by the SQLite store and by
/// `MemorySink`.
pub trait ResultSink {
    fn insert_run(&mut self, run: &AllocationRun) -> AllocResult<()>;

    /// Overwrite status, finished_at and message of an existing run.
    fn update_run(&mut self, run: &AllocationRun) -> AllocResult<()>;

    fn save_input(&mut self, run_id: &str, input_json: &str) -> AllocResult<()>;

    /// `first_seq` is the position of `postings[0]` in the run's log, which
    /// makes a retried append a no-op.
    fn append_postings(
        &mut self,
        run_id: &str,
        first_seq: u64,
        postings: &[AllocationPosting],
    ) -> AllocResult<()>;

    /// Write the result rows and mark the run completed, both or neither.
    /// `run` already carries the completed status and finish time.
    fn complete_run(
        &mut self,
        run: &AllocationRun,
        results: &[AllocationResult],
    ) -> AllocResult<()>;
}

/// In-process sink. Keeps everything in ordered maps.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub runs: BTreeMap<RunId, AllocationRun>,
    pub inputs: BTreeMap<RunId, String>,
    pub postings: BTreeMap<RunId, Vec<AllocationPosting>>,
    pub results: BTreeMap<RunId, Vec<AllocationResult>>,
}

impl ResultSink for MemorySink {
    fn insert_run(&mut self, run: &AllocationRun) -> AllocResult<()> {
        if self.runs.contains_key(&run.run_id) {
            return Err(anyhow::anyhow!("run '{}' already exists", run.run_id).into());
        }
        self.runs.insert(run.run_id.clone(), run.clone());
        Ok(())
    }

    fn update_run(&mut self, run: &AllocationRun) -> AllocResult<()> {
        match self.runs.get_mut(&run.run_id) {
            Some(slot) => {
                *slot = run.clone();
                Ok(())
            }
            None => Err(AllocError::RunNotFound {
                run_id: run.run_id.clone(),
            }),
        }
    }

    fn save_input(&mut self, run_id: &str, input_json: &str) -> AllocResult<()> {
        self.inputs.insert(run_id.to_string(), input_json.to_string());
        Ok(())
    }

    fn append_postings(
        &mut self,
        run_id: &str,
        first_seq: u64,
        postings: &[AllocationPosting],
    ) -> AllocResult<()> {
        let log = self.postings.entry(run_id.to_string()).or_default();
        let have = log.len() as u64;
        for (offset, posting) in postings.iter().enumerate() {
            if first_seq + offset as u64 >= have {
                log.push(posting.clone());
            }
        }
        Ok(())
    }

    fn complete_run(
        &mut self,
        run: &AllocationRun,
        results: &[AllocationResult],
    ) -> AllocResult<()> {
        let slot = self
            .runs
            .get_mut(&run.run_id)
            .ok_or_else(|| AllocError::RunNotFound {
                run_id: run.run_id.clone(),
            })?;
        if slot.status.is_finished() {
            return Err(AllocError::RunFinished {
                run_id: run.run_id.clone(),
                status: slot.status.to_string(),
            });
        }
        *slot = run.clone();
        self.results.insert(run.run_id.clone(), results.to_vec());
        Ok(())
    }
}

/// Owns run lifecycle bookkeeping for one sink.
pub struct RunLedger<S: ResultSink> {
    sink: S,
    clock: Clock,
    runs: BTreeMap<RunId, AllocationRun>,
    posted: BTreeMap<RunId, u64>,
}

impl<S: ResultSink> RunLedger<S> {
    pub fn new(sink: S, clock: Clock) -> Self {
        Self {
            sink,
            clock,
            runs: BTreeMap::new(),
            posted: BTreeMap::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn run(&self, run_id: &str) -> Option<&AllocationRun> {
        self.runs.get(run_id)
    }

    pub fn start_run(&mut self, ctx: &RunContext) -> AllocResult<RunId> {
        let started_at = self.clock.now();
        let run = AllocationRun {
            run_id: ctx.run_id(started_at),
            model: ctx.model.clone(),
            period: ctx.period.clone(),
            scenario: ctx.scenario.clone(),
            started_at,
            finished_at: None,
            status: RunStatus::Running,
            message: None,
        };
        self.sink.insert_run(&run)?;
        log::info!("Run {} started", run.run_id);
        let run_id = run.run_id.clone();
        self.runs.insert(run_id.clone(), run);
        self.posted.insert(run_id.clone(), 0);
        Ok(run_id)
    }

    /// Store the immutable input the run was computed from.
    pub fn save_input(&mut self, run_id: &str, snapshot: &InputSnapshot) -> AllocResult<()> {
        self.running(run_id)?;
        let json = snapshot.to_json()?;
        self.sink.save_input(run_id, &json)
    }

    pub fn record_postings(
        &mut self,
        run_id: &str,
        postings: &[AllocationPosting],
    ) -> AllocResult<()> {
        self.running(run_id)?;
        let first_seq = self.posted.get(run_id).copied().unwrap_or(0);
        self.sink.append_postings(run_id, first_seq, postings)?;
        self.posted
            .insert(run_id.to_string(), first_seq + postings.len() as u64);
        Ok(())
    }

    /// Write the zero-suppressed results and complete the run in one sink
    /// call. On error the run is still `running` and nothing was written.
    pub fn finish_run(
        &mut self,
        run_id: &str,
        final_costs: &CostVector,
    ) -> AllocResult<Vec<AllocationResult>> {
        self.running(run_id)?;
        let results = results_from(final_costs);
        let completed = self.finished(run_id, RunStatus::Completed, None)?;
        self.sink.complete_run(&completed, &results)?;
        self.runs.insert(run_id.to_string(), completed);
        log::info!("Run {run_id} completed with {} result rows", results.len());
        Ok(results)
    }

    /// Mark the run failed. No results are written.
    pub fn fail_run(&mut self, run_id: &str, message: &str) -> AllocResult<()> {
        let failed = self.finished(run_id, RunStatus::Failed, Some(message.to_string()))?;
        self.sink.update_run(&failed)?;
        self.runs.insert(run_id.to_string(), failed);
        log::warn!("Run {run_id} failed: {message}");
        Ok(())
    }

    fn running(&self, run_id: &str) -> AllocResult<&AllocationRun> {
        let run = self.runs.get(run_id).ok_or_else(|| AllocError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        if run.status.is_finished() {
            return Err(AllocError::RunFinished {
                run_id: run_id.to_string(),
                status: run.status.to_string(),
            });
        }
        Ok(run)
    }

    /// The run as it will look once moved to `next`. Not yet applied.
    fn finished(
        &self,
        run_id: &str,
        next: RunStatus,
        message: Option<String>,
    ) -> AllocResult<AllocationRun> {
        let run = self.runs.get(run_id).ok_or_else(|| AllocError::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        if !run.status.can_transition_to(next) {
            return Err(AllocError::InvalidTransition {
                run_id: run_id.to_string(),
                from: run.status.to_string(),
                to: next.to_string(),
            });
        }
        let mut updated = run.clone();
        updated.status = next;
        updated.finished_at = Some(self.clock.now());
        updated.message = message;
        Ok(updated)
    }
}

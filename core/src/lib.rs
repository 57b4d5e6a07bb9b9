//! Cost allocation core.
//!
//! Redistributes costs recorded on nodes of a chart-of-accounts tree down to
//! descendants by weighted allocation rules, keeping a full postings log.
//!
//! # Modules
//!
//! - **tree**: validated account hierarchy (parent / children / depth)
//! - **rules**: allocation models and weight normalization
//! - **engine**: iterative top-down distribution
//! - **ledger**: run lifecycle, postings, results, replay
//! - **validate**: complete pre-flight diagnostics
//! - **runner**: validate → normalize → allocate → record, for one run
//! - **store**: SQLite result sink

pub mod clock;
pub mod config;
pub mod costs;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod money;
pub mod rules;
pub mod runner;
pub mod snapshot;
pub mod store;
pub mod tree;
pub mod types;
pub mod validate;

pub use clock::Clock;
pub use config::{AllocConfig, EngineConfig};
pub use costs::{aggregate_costs, CostVector, InitialCost};
pub use engine::{allocate, AllocationEngine, AllocationPosting, EngineFailure, Settlement};
pub use error::{AllocError, AllocResult};
pub use ledger::{
    replay, results_from, AllocationResult, AllocationRun, MemorySink, ModelRef, ResultSink,
    RunContext, RunLedger, RunStatus,
};
pub use money::{format_amount, parse_amount, round_amount, Amount};
pub use rules::{AllocationModel, AllocationRule, NormalizedRule, RuleSet};
pub use runner::{AllocationRunner, RunOutcome};
pub use snapshot::InputSnapshot;
pub use store::AllocStore;
pub use tree::{Account, AccountTree};
pub use validate::{Finding, Severity, ValidationReport};

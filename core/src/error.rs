use crate::{
    engine::AllocationPosting,
    types::{AccountCode, IterationNo, RunId},
    validate::ValidationReport,
};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllocError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cycle in account hierarchy: parent links from '{code}' never reach a root")]
    Cycle { code: AccountCode },

    #[error("Account '{code}' references unknown parent '{parent}'")]
    DanglingParent { code: AccountCode, parent: AccountCode },

    #[error("Account code '{code}' appears more than once")]
    DuplicateAccount { code: AccountCode },

    #[error("Unknown account '{code}'")]
    UnknownAccount { code: AccountCode },

    #[error("Rule {parent} -> {child} has negative weight {weight}")]
    NegativeWeight {
        parent: AccountCode,
        child: AccountCode,
        weight: Decimal,
    },

    #[error("More than one cost for account '{code}' in {period}/{scenario}")]
    DuplicateCost {
        period: String,
        scenario: String,
        code: AccountCode,
    },

    #[error("Allocation did not converge: iteration {iteration} exceeds cap {cap}")]
    Convergence { iteration: IterationNo, cap: IterationNo },

    #[error("Invalid amount: '{0}'")]
    InvalidAmount(String),

    #[error("Validation failed with {} error(s)", .0.errors().count())]
    Validation(ValidationReport),

    #[error("Run '{run_id}' failed: {source}")]
    RunFailed {
        run_id: RunId,
        source: Box<AllocError>,
        postings: Vec<AllocationPosting>,
    },

    #[error("Run '{run_id}' not found")]
    RunNotFound { run_id: RunId },

    #[error("Run '{run_id}' is already {status}")]
    RunFinished { run_id: RunId, status: String },

    #[error("Run '{run_id}' cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: RunId,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AllocResult<T> = Result<T, AllocError>;

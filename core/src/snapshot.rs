//! Input snapshot: the frozen inputs of one run.
//!
//! A run is computed from a snapshot passed by value; accounts or rules
//! edited after the snapshot is taken cannot leak into a run in flight.
//! The snapshot is stored next to the run as JSON so any run can be
//! replayed later.

use crate::{
    costs::CostVector, error::AllocResult, ledger::RunContext, rules::RuleSet, tree::AccountTree,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSnapshot {
    pub context: RunContext,
    pub tree: AccountTree,
    pub rules: RuleSet,
    pub costs: CostVector,
}

impl InputSnapshot {
    pub fn to_json(&self) -> AllocResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> AllocResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

//! The allocation engine: iterative top-down distribution.
//!
//! ITERATION k:
//!   1. Frontier = distributing parents (ascending code) holding a nonzero
//!      amount at the start of the iteration.
//!   2. Empty frontier → converged.
//!   3. Each frontier parent pushes its current amount to its children by
//!      normalized share, one posting per rule, and drops to zero.
//!
//! RULES:
//!   - The engine is pure: same tree, rules and costs → same postings, byte
//!     for byte. No clock, no I/O.
//!   - Cost only ever moves from a parent to a direct child, so a tree of
//!     height D converges in at most D distributing iterations. Iteration
//!     D + 1 finding a non-empty frontier is a `Convergence` failure.
//!   - For every distribution event the child deltas sum to the parent's
//!     amount exactly; the last child absorbs the rounding remainder.

use crate::{
    config::EngineConfig,
    costs::CostVector,
    error::AllocError,
    money::{round_amount, Amount},
    rules::RuleSet,
    tree::AccountTree,
    types::{AccountCode, IterationNo},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One parent → child cost movement. The ordered sequence is the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPosting {
    pub iteration_no: IterationNo,
    pub parent_code: AccountCode,
    pub child_code: AccountCode,
    pub amount: Amount,
}

#[derive(Debug, Clone)]
pub struct Settlement {
    pub postings: Vec<AllocationPosting>,
    pub final_costs: CostVector,
    /// Iterations that produced postings.
    pub iterations: IterationNo,
}

/// An aborted run keeps the postings made before the failure.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct EngineFailure {
    #[source]
    pub error: AllocError,
    pub postings: Vec<AllocationPosting>,
}

pub struct AllocationEngine<'a> {
    tree: &'a AccountTree,
    rules: &'a RuleSet,
    iteration_cap: IterationNo,
}

impl<'a> AllocationEngine<'a> {
    pub fn new(tree: &'a AccountTree, rules: &'a RuleSet) -> Self {
        Self {
            tree,
            rules,
            iteration_cap: tree.height() + 1,
        }
    }

    /// Apply engine settings. A configured cap can only tighten the
    /// depth-derived one.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        if let Some(cap) = config.iteration_cap {
            self.iteration_cap = self.iteration_cap.min(cap);
        }
        self
    }

    pub fn iteration_cap(&self) -> IterationNo {
        self.iteration_cap
    }

    /// Run to convergence. `initial` is consumed: the run owns its vector.
    pub fn run(&self, initial: CostVector) -> Result<Settlement, EngineFailure> {
        let mut costs: CostVector = initial
            .iter()
            .map(|(code, amount)| (code.to_string(), round_amount(amount)))
            .collect();
        let mut postings = Vec::new();
        let mut iterations = 0;

        log::debug!(
            "Allocating over {} accounts (height {}, cap {})",
            self.tree.len(),
            self.tree.height(),
            self.iteration_cap
        );

        let mut k: IterationNo = 0;
        loop {
            k += 1;
            let frontier: Vec<&str> = self
                .rules
                .parents()
                .filter(|p| !costs.get(p).is_zero())
                .collect();

            if frontier.is_empty() {
                break;
            }
            if k > self.iteration_cap {
                log::error!("Iteration {k} still has {} parents to distribute", frontier.len());
                return Err(EngineFailure {
                    error: AllocError::Convergence {
                        iteration: k,
                        cap: self.iteration_cap,
                    },
                    postings,
                });
            }

            let before = postings.len();
            for parent in frontier {
                self.distribute(k, parent, &mut costs, &mut postings);
            }
            iterations = k;
            log::debug!("Iteration {k}: {} postings", postings.len() - before);
        }

        log::debug!("Converged after {iterations} iteration(s), {} postings", postings.len());
        Ok(Settlement {
            postings,
            final_costs: costs,
            iterations,
        })
    }

    fn distribute(
        &self,
        iteration_no: IterationNo,
        parent: &str,
        costs: &mut CostVector,
        postings: &mut Vec<AllocationPosting>,
    ) {
        let amount = costs.get(parent);
        let rules = self.rules.rules_for(parent);
        let mut remaining = amount;

        for (i, rule) in rules.iter().enumerate() {
            let delta = if i + 1 == rules.len() {
                remaining
            } else {
                round_amount(amount * rule.share)
            };
            remaining -= delta;
            costs.add(&rule.child_code, delta);
            postings.push(AllocationPosting {
                iteration_no,
                parent_code: parent.to_string(),
                child_code: rule.child_code.clone(),
                amount: delta,
            });
        }
        costs.set(parent, Decimal::ZERO);
    }
}

/// Convenience wrapper with default settings.
pub fn allocate(
    tree: &AccountTree,
    rules: &RuleSet,
    initial: CostVector,
) -> Result<Settlement, EngineFailure> {
    AllocationEngine::new(tree, rules).run(initial)
}

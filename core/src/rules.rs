//! Allocation models and the rule normalizer.
//!
//! A model's raw weights are rescaled per parent so they sum to exactly 1.
//! Parents whose usable weights sum to zero are terminal-by-absence: they
//! get no normalized rules and keep whatever cost reaches them.

use crate::{
    error::{AllocError, AllocResult},
    tree::AccountTree,
    types::AccountCode,
    validate::Finding,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRule {
    pub parent_code: AccountCode,
    pub child_code: AccountCode,
    pub weight: Decimal,
}

impl AllocationRule {
    pub fn new(parent: &str, child: &str, weight: Decimal) -> Self {
        Self {
            parent_code: parent.to_string(),
            child_code: child.to_string(),
            weight,
        }
    }
}

/// Named, versioned set of allocation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationModel {
    pub name: String,
    pub version: u32,
    pub rules: Vec<AllocationRule>,
}

impl AllocationModel {
    pub fn new(name: &str, version: u32, rules: Vec<AllocationRule>) -> Self {
        Self {
            name: name.to_string(),
            version,
            rules,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRule {
    pub parent_code: AccountCode,
    pub child_code: AccountCode,
    /// Share of the parent's cost, in (0, 1].
    pub share: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    /// Children of each parent are in ascending code order.
    by_parent: BTreeMap<AccountCode, Vec<NormalizedRule>>,
    /// Parents that had rules but nothing usable to distribute over.
    zero_weight: BTreeSet<AccountCode>,
    diagnostics: Vec<Finding>,
}

impl RuleSet {
    /// Normalize raw rules against the tree.
    ///
    /// - Duplicate (parent, child) rules are summed.
    /// - Rules whose child is not a direct tree child of the parent are
    ///   dropped with a `NonChildRule` warning.
    /// - Zero-weight rules are dropped.
    /// - The last child (by code) of each parent absorbs the division
    ///   remainder, so every parent's shares sum to exactly 1.
    pub fn normalize(tree: &AccountTree, rules: &[AllocationRule]) -> AllocResult<Self> {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, Decimal>> = BTreeMap::new();
        for rule in rules {
            if rule.weight < Decimal::ZERO {
                return Err(AllocError::NegativeWeight {
                    parent: rule.parent_code.clone(),
                    child: rule.child_code.clone(),
                    weight: rule.weight,
                });
            }
            *grouped
                .entry(rule.parent_code.as_str())
                .or_default()
                .entry(rule.child_code.as_str())
                .or_default() += rule.weight;
        }

        let mut set = RuleSet::default();
        for (parent, children) in grouped {
            let mut usable: Vec<(&str, Decimal)> = Vec::with_capacity(children.len());
            for (child, weight) in children {
                if !tree.is_child(parent, child) {
                    log::warn!("Dropping rule {parent} -> {child}: not a direct child");
                    set.diagnostics.push(Finding::NonChildRule {
                        parent: parent.to_string(),
                        child: child.to_string(),
                    });
                    continue;
                }
                if weight > Decimal::ZERO {
                    usable.push((child, weight));
                }
            }

            let total: Decimal = usable.iter().map(|(_, w)| *w).sum();
            if total.is_zero() {
                log::warn!("Parent {parent} has no positive weight; its cost stays on it");
                set.zero_weight.insert(parent.to_string());
                set.diagnostics.push(Finding::ZeroWeightParent {
                    parent: parent.to_string(),
                });
                continue;
            }

            let mut normalized = Vec::with_capacity(usable.len());
            let mut assigned = Decimal::ZERO;
            let last = usable.len() - 1;
            for (i, (child, weight)) in usable.into_iter().enumerate() {
                let share = if i == last {
                    Decimal::ONE - assigned
                } else {
                    (weight / total).normalize()
                };
                assigned += share;
                normalized.push(NormalizedRule {
                    parent_code: parent.to_string(),
                    child_code: child.to_string(),
                    share,
                });
            }
            set.by_parent.insert(parent.to_string(), normalized);
        }
        Ok(set)
    }

    /// Normalized rules of `parent`; empty when it is terminal.
    pub fn rules_for(&self, parent: &str) -> &[NormalizedRule] {
        self.by_parent.get(parent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_rules(&self, parent: &str) -> bool {
        self.by_parent.contains_key(parent)
    }

    /// Terminal-by-absence: no usable outgoing rule.
    pub fn is_terminal(&self, code: &str) -> bool {
        !self.has_rules(code)
    }

    /// Parents that had rules whose usable weights summed to zero.
    pub fn zero_weight_parents(&self) -> impl Iterator<Item = &str> {
        self.zero_weight.iter().map(String::as_str)
    }

    /// Distributing parents in ascending code order.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.by_parent.keys().map(String::as_str)
    }

    pub fn share_sum(&self, parent: &str) -> Decimal {
        self.rules_for(parent).iter().map(|r| r.share).sum()
    }

    /// Warnings raised while normalizing.
    pub fn diagnostics(&self) -> &[Finding] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.by_parent.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }
}

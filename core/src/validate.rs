//! Pre-flight validation.
//!
//! Unlike `AccountTree::build` and `RuleSet::normalize`, which stop at the
//! first problem, the validator walks everything and returns the complete
//! list of findings so a caller can fix an input file in one pass.

use crate::{
    costs::InitialCost,
    rules::{AllocationRule, RuleSet},
    tree::{Account, AccountTree},
    types::AccountCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error:"),
            Severity::Warning => f.write_str("warning:"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    // ── Accounts ──────────────────────────────────
    DuplicateAccount {
        code: AccountCode,
    },
    DanglingParent {
        code: AccountCode,
        parent: AccountCode,
    },
    Cycle {
        code: AccountCode,
    },

    // ── Rules ─────────────────────────────────────
    UnknownRuleParent {
        parent: AccountCode,
        child: AccountCode,
    },
    UnknownRuleChild {
        parent: AccountCode,
        child: AccountCode,
    },
    NegativeWeight {
        parent: AccountCode,
        child: AccountCode,
        weight: Decimal,
    },
    NonChildRule {
        parent: AccountCode,
        child: AccountCode,
    },
    ZeroWeightParent {
        parent: AccountCode,
    },

    // ── Costs ─────────────────────────────────────
    UnknownCostAccount {
        code: AccountCode,
    },
    DuplicateCost {
        period: String,
        scenario: String,
        code: AccountCode,
    },
}

impl Finding {
    pub fn severity(&self) -> Severity {
        match self {
            Finding::NonChildRule { .. } | Finding::ZeroWeightParent { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::DuplicateAccount { code } => write!(f, "duplicate account code '{code}'"),
            Finding::DanglingParent { code, parent } => {
                write!(f, "account '{code}' references unknown parent '{parent}'")
            }
            Finding::Cycle { code } => write!(f, "account '{code}' is part of a parent cycle"),
            Finding::UnknownRuleParent { parent, child } => {
                write!(f, "rule {parent} -> {child}: parent account does not exist")
            }
            Finding::UnknownRuleChild { parent, child } => {
                write!(f, "rule {parent} -> {child}: child account does not exist")
            }
            Finding::NegativeWeight {
                parent,
                child,
                weight,
            } => write!(f, "rule {parent} -> {child}: negative weight {weight}"),
            Finding::NonChildRule { parent, child } => write!(
                f,
                "rule {parent} -> {child}: '{child}' is not a direct child of '{parent}', rule ignored"
            ),
            Finding::ZeroWeightParent { parent } => write!(
                f,
                "account '{parent}' has no positive weight to a child, its cost stays on it"
            ),
            Finding::UnknownCostAccount { code } => {
                write!(f, "cost recorded on unknown account '{code}'")
            }
            Finding::DuplicateCost {
                period,
                scenario,
                code,
            } => write!(f, "more than one cost for '{code}' in {period}/{scenario}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| !f.is_error())
    }

    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.findings.extend(other.findings);
    }
}

/// Everything a run consumes, checked together.
pub fn validate(
    accounts: &[Account],
    rules: &[AllocationRule],
    costs: &[InitialCost],
) -> ValidationReport {
    let mut report = validate_accounts(accounts);
    let tree_ok = report.is_ok();
    report.extend(validate_rules(accounts, rules));
    report.extend(validate_costs(accounts, costs));

    // Normalizer warnings need a well-formed tree. Rules already reported as
    // errors are left out so their warnings show up in the same pass.
    if tree_ok {
        if let Ok(tree) = AccountTree::build(accounts.to_vec()) {
            let usable: Vec<AllocationRule> = rules
                .iter()
                .filter(|r| {
                    r.weight >= Decimal::ZERO
                        && tree.contains(&r.parent_code)
                        && tree.contains(&r.child_code)
                })
                .cloned()
                .collect();
            if let Ok(set) = RuleSet::normalize(&tree, &usable) {
                for finding in set.diagnostics() {
                    report.push(finding.clone());
                }
            }
        }
    }
    report
}

/// Duplicates, dangling parents and cycles, one finding per account.
pub fn validate_accounts(accounts: &[Account]) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut parent_of: HashMap<&str, Option<&str>> = HashMap::with_capacity(accounts.len());
    let mut duplicates = BTreeSet::new();
    for account in accounts {
        if parent_of
            .insert(account.code.as_str(), account.parent_code.as_deref())
            .is_some()
        {
            duplicates.insert(account.code.as_str());
        }
    }
    for code in duplicates {
        report.push(Finding::DuplicateAccount {
            code: code.to_string(),
        });
    }

    let mut sorted: Vec<&Account> = accounts.iter().collect();
    sorted.sort_by(|a, b| a.code.cmp(&b.code));
    sorted.dedup_by(|a, b| a.code == b.code);

    for account in &sorted {
        if let Some(parent) = account.parent_code.as_deref() {
            if !parent_of.contains_key(parent) {
                report.push(Finding::DanglingParent {
                    code: account.code.clone(),
                    parent: parent.to_string(),
                });
            }
        }
    }

    for code in cycle_members(&sorted, &parent_of) {
        report.push(Finding::Cycle {
            code: code.to_string(),
        });
    }
    report
}

/// Accounts lying on a parent cycle, ascending by code.
fn cycle_members<'a>(
    sorted: &[&'a Account],
    parent_of: &HashMap<&'a str, Option<&'a str>>,
) -> BTreeSet<&'a str> {
    let mut on_cycle = BTreeSet::new();
    let mut settled: HashSet<&str> = HashSet::new();

    for account in sorted {
        let mut chain: Vec<&str> = Vec::new();
        let mut cur = Some(account.code.as_str());
        while let Some(code) = cur {
            if settled.contains(code) {
                break;
            }
            if let Some(pos) = chain.iter().position(|c| *c == code) {
                on_cycle.extend(chain[pos..].iter().copied());
                break;
            }
            chain.push(code);
            // Dangling parents end the walk; they are reported separately.
            cur = parent_of.get(code).copied().flatten().filter(|p| parent_of.contains_key(p));
        }
        settled.extend(chain);
    }
    on_cycle
}

/// Unknown endpoints and negative weights, one finding per offending rule.
pub fn validate_rules(accounts: &[Account], rules: &[AllocationRule]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let known: HashSet<&str> = accounts.iter().map(|a| a.code.as_str()).collect();

    for rule in rules {
        if !known.contains(rule.parent_code.as_str()) {
            report.push(Finding::UnknownRuleParent {
                parent: rule.parent_code.clone(),
                child: rule.child_code.clone(),
            });
        }
        if !known.contains(rule.child_code.as_str()) {
            report.push(Finding::UnknownRuleChild {
                parent: rule.parent_code.clone(),
                child: rule.child_code.clone(),
            });
        }
        if rule.weight < Decimal::ZERO {
            report.push(Finding::NegativeWeight {
                parent: rule.parent_code.clone(),
                child: rule.child_code.clone(),
                weight: rule.weight,
            });
        }
    }
    report
}

/// Unknown accounts and duplicate (period, scenario, account) rows.
pub fn validate_costs(accounts: &[Account], costs: &[InitialCost]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let known: HashSet<&str> = accounts.iter().map(|a| a.code.as_str()).collect();
    let mut seen = HashSet::new();
    let mut unknown = BTreeSet::new();

    for cost in costs {
        if !known.contains(cost.account_code.as_str()) {
            unknown.insert(cost.account_code.as_str());
        }
        let key = (
            cost.period.as_str(),
            cost.scenario.as_str(),
            cost.account_code.as_str(),
        );
        if !seen.insert(key) {
            report.push(Finding::DuplicateCost {
                period: cost.period.clone(),
                scenario: cost.scenario.clone(),
                code: cost.account_code.clone(),
            });
        }
    }
    for code in unknown {
        report.push(Finding::UnknownCostAccount {
            code: code.to_string(),
        });
    }
    report
}

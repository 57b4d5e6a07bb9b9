//! Initial costs and the mutable cost vector the engine works on.

use crate::{
    error::{AllocError, AllocResult},
    money::{round_amount, Amount},
    tree::AccountTree,
    types::{AccountCode, Period, Scenario},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{btree_map, BTreeMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialCost {
    pub period: Period,
    pub scenario: Scenario,
    pub account_code: AccountCode,
    pub amount: Amount,
}

impl InitialCost {
    pub fn new(period: &str, scenario: &str, account_code: &str, amount: Amount) -> Self {
        Self {
            period: period.to_string(),
            scenario: scenario.to_string(),
            account_code: account_code.to_string(),
            amount,
        }
    }
}

/// Sum rows that share (period, scenario, account). Front ends call this
/// before handing costs to the core; the core itself rejects duplicates.
/// Output is ordered by (period, scenario, account).
pub fn aggregate_costs(rows: impl IntoIterator<Item = InitialCost>) -> Vec<InitialCost> {
    let mut sums: BTreeMap<(Period, Scenario, AccountCode), Amount> = BTreeMap::new();
    for row in rows {
        *sums
            .entry((row.period, row.scenario, row.account_code))
            .or_default() += row.amount;
    }
    sums.into_iter()
        .map(|((period, scenario, account_code), amount)| InitialCost {
            period,
            scenario,
            account_code,
            amount,
        })
        .collect()
}

/// Account → amount, ordered by account code. Missing accounts are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostVector {
    amounts: BTreeMap<AccountCode, Amount>,
}

impl CostVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the rows for one (period, scenario) and check them against the
    /// tree. Amounts are rounded to the amount scale on the way in.
    pub fn from_initial_costs(
        tree: &AccountTree,
        period: &str,
        scenario: &str,
        rows: &[InitialCost],
    ) -> AllocResult<Self> {
        let mut vector = CostVector::new();
        for row in rows
            .iter()
            .filter(|r| r.period == period && r.scenario == scenario)
        {
            if !tree.contains(&row.account_code) {
                return Err(AllocError::UnknownAccount {
                    code: row.account_code.clone(),
                });
            }
            match vector.amounts.entry(row.account_code.clone()) {
                btree_map::Entry::Occupied(_) => {
                    return Err(AllocError::DuplicateCost {
                        period: period.to_string(),
                        scenario: scenario.to_string(),
                        code: row.account_code.clone(),
                    })
                }
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(round_amount(row.amount));
                }
            }
        }
        Ok(vector)
    }

    pub fn get(&self, code: &str) -> Amount {
        self.amounts.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn set(&mut self, code: &str, amount: Amount) {
        match self.amounts.get_mut(code) {
            Some(slot) => *slot = amount,
            None => {
                self.amounts.insert(code.to_string(), amount);
            }
        }
    }

    pub fn add(&mut self, code: &str, delta: Amount) {
        match self.amounts.get_mut(code) {
            Some(slot) => *slot += delta,
            None => {
                self.amounts.insert(code.to_string(), delta);
            }
        }
    }

    pub fn total(&self) -> Amount {
        self.amounts.values().copied().sum()
    }

    /// Every tracked entry, zero or not, ascending by code.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Amount)> {
        self.amounts.iter().map(|(c, a)| (c.as_str(), *a))
    }

    /// Entries with a nonzero amount, ascending by code.
    pub fn nonzero(&self) -> impl Iterator<Item = (&str, Amount)> {
        self.iter().filter(|(_, a)| !a.is_zero())
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }
}

impl FromIterator<(AccountCode, Amount)> for CostVector {
    fn from_iter<I: IntoIterator<Item = (AccountCode, Amount)>>(iter: I) -> Self {
        let mut vector = CostVector::new();
        for (code, amount) in iter {
            vector.add(&code, amount);
        }
        vector
    }
}

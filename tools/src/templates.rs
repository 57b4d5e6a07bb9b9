//! Sample input files: a five-account overhead chart.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const ACCOUNTS_FILE: &str = "template_accounts.csv";
pub const COSTS_FILE: &str = "template_costs.csv";
pub const RULES_FILE: &str = "template_rules.csv";

const ACCOUNTS: &str = "\
account_id,parent_id,name
100,,Overhead
110,100,Office upkeep
120,100,IT
121,120,Helpdesk
122,120,Infrastructure
";

const COSTS: &str = "\
account_id,amount
100,100000
";

const RULES: &str = "\
parent_id,child_id,weight
100,110,0.4
100,120,0.6
120,121,0.3
120,122,0.7
";

/// Write the three templates into `dir`, creating it when missing.
pub fn write_templates(dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    let mut written = Vec::with_capacity(3);
    for (name, body) in [(ACCOUNTS_FILE, ACCOUNTS), (COSTS_FILE, COSTS), (RULES_FILE, RULES)] {
        let path = dir.join(name);
        std::fs::write(&path, body).with_context(|| format!("Cannot write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{accounts_from, costs_from, parse_table, rules_from};
    use costalloc_core::{
        config::ColumnAliases, AllocationModel, AllocationRunner, Clock, EngineConfig, MemorySink,
        RunContext,
    };
    use rust_decimal_macros::dec;

    #[test]
    fn templates_allocate_to_the_leaves() {
        let columns = ColumnAliases::default();
        let accounts = accounts_from(&parse_table(ACCOUNTS, None).unwrap(), &columns).unwrap();
        let costs =
            costs_from(&parse_table(COSTS, None).unwrap(), &columns, "p", "s").unwrap();
        let rules = rules_from(&parse_table(RULES, None).unwrap(), &columns).unwrap();

        let ctx = RunContext::new("templates", 1, "p", "s");
        let model = AllocationModel::new("templates", 1, rules);
        let mut runner =
            AllocationRunner::new(MemorySink::default(), Clock::default(), EngineConfig::default());
        let outcome = runner.execute(&ctx, accounts, &model, &costs).unwrap();

        let amounts: Vec<(&str, _)> = outcome
            .results
            .iter()
            .map(|r| (r.account_code.as_str(), r.amount))
            .collect();
        assert_eq!(
            amounts,
            [("110", dec!(40000)), ("121", dec!(18000)), ("122", dec!(42000))]
        );
    }
}

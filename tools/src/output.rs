//! Result table and diagnostics rendering.

use anyhow::{Context, Result};
use costalloc_core::{format_amount, AccountTree, AllocationResult, Amount, Finding};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;

#[derive(Debug, Serialize, PartialEq)]
pub struct ResultRow {
    pub account_id: String,
    pub parent_id: String,
    pub name: String,
    pub amount: String,
}

/// Rows sorted by (parent_id, account_id). With `keep_zero` every account in
/// the chart gets a row; otherwise only the run's result rows appear.
pub fn result_rows(
    tree: &AccountTree,
    results: &[AllocationResult],
    keep_zero: bool,
) -> Vec<ResultRow> {
    let mut amounts: BTreeMap<&str, Amount> = BTreeMap::new();
    if keep_zero {
        for account in tree.accounts() {
            amounts.insert(&account.code, Amount::ZERO);
        }
    }
    for result in results {
        amounts.insert(&result.account_code, result.amount);
    }

    let mut rows: Vec<ResultRow> = amounts
        .into_iter()
        .map(|(code, amount)| {
            let account = tree.account(code);
            ResultRow {
                account_id: code.to_string(),
                parent_id: account
                    .and_then(|a| a.parent_code.clone())
                    .unwrap_or_default(),
                name: account.map(|a| a.name.clone()).unwrap_or_default(),
                amount: format_amount(amount),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        (a.parent_id.as_str(), a.account_id.as_str())
            .cmp(&(b.parent_id.as_str(), b.account_id.as_str()))
    });
    rows
}

pub fn write_rows<W: Write>(out: W, rows: &[ResultRow], delimiter: u8) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_writer(out);
    writer.write_record(["account_id", "parent_id", "name", "amount"])?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_rows_to(path: Option<&str>, rows: &[ResultRow], delimiter: u8) -> Result<()> {
    match path {
        Some(path) => {
            let file =
                std::fs::File::create(path).with_context(|| format!("Cannot create {path}"))?;
            write_rows(file, rows, delimiter)?;
            eprintln!("Wrote {} rows to {path}", rows.len());
        }
        None => write_rows(std::io::stdout().lock(), rows, delimiter)?,
    }
    Ok(())
}

pub fn print_findings<'a>(title: &str, findings: impl IntoIterator<Item = &'a Finding>) {
    let mut findings = findings.into_iter().peekable();
    if findings.peek().is_none() {
        return;
    }
    eprintln!("\n[{title}]");
    for finding in findings {
        eprintln!(" - {} {finding}", finding.severity());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use costalloc_core::Account;
    use rust_decimal_macros::dec;

    fn chart() -> AccountTree {
        AccountTree::build(vec![
            Account::root("100", "Overhead"),
            Account::new("110", "Office", Some("100")),
            Account::new("120", "IT", Some("100")),
            Account::new("121", "Helpdesk", Some("120")),
        ])
        .unwrap()
    }

    fn results() -> Vec<AllocationResult> {
        vec![
            AllocationResult { account_code: "110".into(), amount: dec!(40) },
            AllocationResult { account_code: "121".into(), amount: dec!(60) },
        ]
    }

    #[test]
    fn rows_sort_by_parent_then_code() {
        let rows = result_rows(&chart(), &results(), false);
        let ids: Vec<&str> = rows.iter().map(|r| r.account_id.as_str()).collect();
        assert_eq!(ids, ["110", "121"]);
        assert_eq!(rows[1].amount, "60.000000");
        assert_eq!(rows[1].name, "Helpdesk");
    }

    #[test]
    fn keep_zero_lists_the_whole_chart() {
        let rows = result_rows(&chart(), &results(), true);
        let ids: Vec<&str> = rows.iter().map(|r| r.account_id.as_str()).collect();
        assert_eq!(ids, ["100", "110", "120", "121"]);
        assert_eq!(rows[0].amount, "0.000000");
    }

    #[test]
    fn csv_has_fixed_header() {
        let mut buf = Vec::new();
        write_rows(&mut buf, &result_rows(&chart(), &results(), false), b',').unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("account_id,parent_id,name,amount\n110,100,Office,40.000000\n"));
    }
}

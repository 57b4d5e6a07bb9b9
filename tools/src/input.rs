//! CSV input: delimiter sniffing, header aliases, row → core records.

use anyhow::{anyhow, Context, Result};
use costalloc_core::{
    aggregate_costs, config::ColumnAliases, parse_amount, Account, AllocationRule, InitialCost,
};
use csv::StringRecord;

const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// A parsed table: header row and data rows.
pub struct Table {
    headers: Vec<String>,
    rows: Vec<StringRecord>,
}

/// Pick the candidate delimiter that appears most often on the header line.
pub fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().next().unwrap_or("");
    DELIMITERS
        .iter()
        .copied()
        .map(|d| (d, first.bytes().filter(|b| *b == d).count()))
        .filter(|(_, n)| *n > 0)
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

pub fn parse_table(text: &str, delimiter: Option<char>) -> Result<Table> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let delimiter = match delimiter {
        Some(c) => u8::try_from(c).map_err(|_| anyhow!("delimiter '{c}' is not a single byte"))?,
        None => sniff_delimiter(text),
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();
    let rows = reader.records().collect::<Result<Vec<_>, _>>()?;
    Ok(Table { headers, rows })
}

pub fn read_table(path: &str, delimiter: Option<char>) -> Result<Table> {
    let lower = path.to_lowercase();
    if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
        return Err(anyhow!("{path}: spreadsheets are not supported, save the sheet as CSV"));
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
    parse_table(&text, delimiter).with_context(|| format!("Cannot parse {path}"))
}

impl Table {
    fn column(&self, logical: &str, aliases: &[String]) -> Result<usize> {
        self.optional_column(aliases).ok_or_else(|| {
            anyhow!(
                "Missing required column '{logical}'. Accepted headers: {}",
                aliases.join(", ")
            )
        })
    }

    fn optional_column(&self, aliases: &[String]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            let alias = alias.to_lowercase();
            self.headers.iter().position(|h| *h == alias)
        })
    }
}

fn field(row: &StringRecord, idx: usize) -> &str {
    row.get(idx).unwrap_or("").trim()
}

pub fn accounts_from(table: &Table, columns: &ColumnAliases) -> Result<Vec<Account>> {
    let code = table.column("account_id", &columns.account_id)?;
    let parent = table.column("parent_id", &columns.parent_id)?;
    let name = table.optional_column(&columns.name);

    let mut accounts = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let code = field(row, code);
        if code.is_empty() {
            continue;
        }
        let parent = field(row, parent);
        accounts.push(Account {
            code: code.to_string(),
            name: name.map(|i| field(row, i).to_string()).unwrap_or_default(),
            parent_code: (!parent.is_empty()).then(|| parent.to_string()),
        });
    }
    Ok(accounts)
}

/// Cost rows, tagged with the run's period and scenario when the file has
/// no such columns. Repeated rows for one account are summed.
pub fn costs_from(
    table: &Table,
    columns: &ColumnAliases,
    period: &str,
    scenario: &str,
) -> Result<Vec<InitialCost>> {
    let code = table.column("account_id", &columns.account_id)?;
    let amount = table.column("amount", &columns.amount)?;
    let period_col = table.optional_column(&columns.period);
    let scenario_col = table.optional_column(&columns.scenario);

    let mut costs = Vec::with_capacity(table.rows.len());
    for (line, row) in table.rows.iter().enumerate() {
        let code = field(row, code);
        if code.is_empty() {
            continue;
        }
        let value = parse_amount(field(row, amount))
            .with_context(|| format!("cost row {}", line + 2))?;
        let tag = |col: Option<usize>, default: &str| {
            col.map(|i| field(row, i))
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
                .to_string()
        };
        costs.push(InitialCost {
            period: tag(period_col, period),
            scenario: tag(scenario_col, scenario),
            account_code: code.to_string(),
            amount: value,
        });
    }
    Ok(aggregate_costs(costs))
}

pub fn rules_from(table: &Table, columns: &ColumnAliases) -> Result<Vec<AllocationRule>> {
    let parent = table.column("parent_id", &columns.rule_parent)?;
    let child = table.column("child_id", &columns.rule_child)?;
    let weight = table.column("weight", &columns.weight)?;

    let mut rules = Vec::with_capacity(table.rows.len());
    for (line, row) in table.rows.iter().enumerate() {
        let parent = field(row, parent);
        let child = field(row, child);
        if parent.is_empty() && child.is_empty() {
            continue;
        }
        rules.push(AllocationRule {
            parent_code: parent.to_string(),
            child_code: child.to_string(),
            weight: parse_amount(field(row, weight))
                .with_context(|| format!("rule row {}", line + 2))?,
        });
    }
    Ok(rules)
}

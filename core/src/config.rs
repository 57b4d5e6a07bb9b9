use serde::{Deserialize, Serialize};

/// Top-level settings file, e.g. `alloc.json`:
///
/// ```json
/// { "engine": { "iteration_cap": 12 }, "output": { "keep_zero": true } }
/// ```
///
/// Every section is optional; missing values fall back to `Default`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocConfig {
    pub engine: EngineConfig,
    pub output: OutputConfig,
    pub columns: ColumnAliases,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lowers the depth-derived iteration cap. Never raises it.
    pub iteration_cap: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Also report accounts that end the run at zero.
    pub keep_zero: bool,
    /// Input delimiter; sniffed from the file when absent.
    pub delimiter: Option<char>,
}

/// Accepted header names per logical input column, compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub account_id: Vec<String>,
    pub parent_id: Vec<String>,
    pub name: Vec<String>,
    pub amount: Vec<String>,
    pub period: Vec<String>,
    pub scenario: Vec<String>,
    pub rule_parent: Vec<String>,
    pub rule_child: Vec<String>,
    pub weight: Vec<String>,
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            account_id: aliases(&["account_id", "konto", "id", "accountid", "account id"]),
            parent_id: aliases(&["parent_id", "parent", "rodzic", "parentid", "parent id", "nadrzędne"]),
            name: aliases(&["name", "nazwa", "opis"]),
            amount: aliases(&["amount", "kwota", "value", "wartosc", "wartość"]),
            period: aliases(&["period", "okres"]),
            scenario: aliases(&["scenario", "scenariusz"]),
            rule_parent: aliases(&["parent_id", "konto_nadrzedne", "rodzic", "parentid"]),
            rule_child: aliases(&["child_id", "konto_podrzedne", "dziecko", "childid"]),
            weight: aliases(&["weight", "udzial", "udział", "klucz", "proporcja", "wspolczynnik"]),
        }
    }
}

impl AllocConfig {
    /// Load a JSON settings file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AllocConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }
}

//! alloc-runner: allocate costs down a chart of accounts from CSV files.
//!
//! Usage:
//!   alloc-runner allocate --coa coa.csv --costs costs.csv --alloc rules.csv
//!   alloc-runner allocate --coa coa.csv --costs costs.csv --db runs.db --out result.csv
//!   alloc-runner validate --coa coa.csv --alloc rules.csv
//!   alloc-runner write-templates --dir samples

mod input;
mod output;
mod templates;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use costalloc_core::{
    Account, AccountTree, AllocConfig, AllocError, AllocStore, AllocationModel, AllocationRule,
    AllocationRunner, Clock, InitialCost, MemorySink, ResultSink, RunContext, Severity,
};
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_READ: u8 = 3;
const EXIT_INVALID: u8 = 4;
const EXIT_RUN_FAILED: u8 = 5;

#[derive(Parser)]
#[command(name = "alloc-runner", version, about = "Top-down cost allocation over a chart of accounts")]
struct Cli {
    /// JSON settings file (engine cap, output, column aliases).
    #[arg(long, global = true, env = "ALLOC_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one allocation and print or write the result table.
    Allocate(AllocateArgs),
    /// Check the inputs and report every finding without allocating.
    Validate(ValidateArgs),
    /// Write three sample input files.
    WriteTemplates {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

/// Chart, rules and run scope, shared by `allocate` and `validate`.
#[derive(Args)]
struct ScopeArgs {
    /// Chart of accounts CSV.
    #[arg(long)]
    coa: String,
    /// Allocation rules CSV. Without it every account keeps its cost.
    #[arg(long)]
    alloc: Option<String>,
    #[arg(long, default_value = "default")]
    model: String,
    #[arg(long, default_value_t = 1)]
    model_version: u32,
    #[arg(long, default_value = "current")]
    period: String,
    #[arg(long, default_value = "actual")]
    scenario: String,
}

#[derive(Args)]
struct ValidateArgs {
    #[command(flatten)]
    scope: ScopeArgs,
    /// Initial costs CSV; cost checks are skipped without it.
    #[arg(long)]
    costs: Option<String>,
}

#[derive(Args)]
struct AllocateArgs {
    #[command(flatten)]
    scope: ScopeArgs,
    /// Initial costs CSV.
    #[arg(long)]
    costs: String,
    /// Output CSV; stdout when absent.
    #[arg(long)]
    out: Option<String>,
    /// Also list accounts that end the run at zero.
    #[arg(long)]
    keep_zero: bool,
    /// Persist the run to this SQLite file.
    #[arg(long, env = "ALLOC_DB")]
    db: Option<String>,
}

struct Inputs {
    ctx: RunContext,
    accounts: Vec<Account>,
    model: AllocationModel,
    costs: Vec<InitialCost>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("[ERROR] {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    let config = match &cli.config {
        Some(path) => AllocConfig::load(path)?,
        None => AllocConfig::default(),
    };

    match cli.command {
        Command::WriteTemplates { dir } => {
            for path in templates::write_templates(&dir)? {
                println!("Wrote {}", path.display());
            }
            Ok(0)
        }
        Command::Validate(args) => {
            let inputs = match load_inputs(&args.scope, args.costs.as_deref(), &config) {
                Ok(inputs) => inputs,
                Err(e) => return Ok(read_failed(e)),
            };
            let runner =
                AllocationRunner::new(MemorySink::default(), Clock::default(), config.engine);
            let report =
                runner.validate_only(&inputs.ctx, &inputs.accounts, &inputs.model, &inputs.costs);
            output::print_findings("VALIDATION", report.findings());
            if report.is_ok() {
                println!("OK: {} accounts, {} rules", inputs.accounts.len(), inputs.model.rules.len());
                Ok(0)
            } else {
                Ok(EXIT_INVALID)
            }
        }
        Command::Allocate(args) => {
            let inputs = match load_inputs(&args.scope, Some(&args.costs), &config) {
                Ok(inputs) => inputs,
                Err(e) => return Ok(read_failed(e)),
            };
            match &args.db {
                Some(path) => {
                    let store = AllocStore::open(path)?;
                    store.migrate()?;
                    allocate(store, inputs, &args, &config)
                }
                None => allocate(MemorySink::default(), inputs, &args, &config),
            }
        }
    }
}

fn load_inputs(args: &ScopeArgs, costs: Option<&str>, config: &AllocConfig) -> Result<Inputs> {
    let delimiter = config.output.delimiter;
    let columns = &config.columns;

    let accounts = input::accounts_from(&input::read_table(&args.coa, delimiter)?, columns)?;
    let costs = match costs {
        Some(path) => input::costs_from(
            &input::read_table(path, delimiter)?,
            columns,
            &args.period,
            &args.scenario,
        )?,
        None => Vec::new(),
    };
    let rules: Vec<AllocationRule> = match &args.alloc {
        Some(path) => input::rules_from(&input::read_table(path, delimiter)?, columns)?,
        None => Vec::new(),
    };
    log::info!(
        "Loaded {} accounts, {} cost rows, {} rules",
        accounts.len(),
        costs.len(),
        rules.len()
    );

    Ok(Inputs {
        ctx: RunContext::new(&args.model, args.model_version, &args.period, &args.scenario),
        accounts,
        model: AllocationModel::new(&args.model, args.model_version, rules),
        costs,
    })
}

fn read_failed(e: anyhow::Error) -> u8 {
    eprintln!("[ERROR] Cannot read input: {e:#}");
    EXIT_READ
}

fn allocate<S: ResultSink>(
    sink: S,
    inputs: Inputs,
    args: &AllocateArgs,
    config: &AllocConfig,
) -> Result<u8> {
    let mut runner = AllocationRunner::new(sink, Clock::default(), config.engine.clone());
    let Inputs {
        ctx,
        accounts,
        model,
        costs,
    } = inputs;

    match runner.execute(&ctx, accounts.clone(), &model, &costs) {
        Ok(outcome) => {
            let tree = AccountTree::build(accounts)?;
            let keep_zero = args.keep_zero || config.output.keep_zero;
            let rows = output::result_rows(&tree, &outcome.results, keep_zero);
            output::write_rows_to(args.out.as_deref(), &rows, b',')?;
            output::print_findings("NOTES", &outcome.diagnostics);
            eprintln!(
                "Run {}: {} postings over {} iteration(s)",
                outcome.run.run_id,
                outcome.postings.len(),
                outcome.iterations
            );
            Ok(0)
        }
        Err(AllocError::Validation(report)) => {
            output::print_findings(
                "VALIDATION",
                report.findings().iter().filter(|f| f.severity() == Severity::Error),
            );
            eprintln!("[ERROR] {} error(s); no run was started", report.errors().count());
            Ok(EXIT_INVALID)
        }
        Err(AllocError::RunFailed {
            run_id,
            source,
            postings,
        }) => {
            eprintln!(
                "[ERROR] Run {run_id} failed after {} postings: {source}",
                postings.len()
            );
            Ok(EXIT_RUN_FAILED)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    const CHART: &str = "account_id,parent_id,name\n100,,Overhead\n110,100,Office\n120,100,IT\n";
    const COSTS: &str = "account_id,amount\n100,1000\n";
    const RULES: &str = "parent_id,child_id,weight\n100,110,1\n100,120,3\n";

    fn workdir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("alloc-runner-{}-{name}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn put(dir: &Path, file: &str, body: &str) -> String {
        let path = dir.join(file);
        std::fs::write(&path, body).unwrap();
        path.to_str().unwrap().to_string()
    }

    fn exit_code(args: &[&str]) -> u8 {
        let mut argv = vec!["alloc-runner"];
        argv.extend_from_slice(args);
        run(Cli::try_parse_from(argv).unwrap()).unwrap()
    }

    #[test]
    fn allocate_requires_costs() {
        let err = Cli::try_parse_from(["alloc-runner", "allocate", "--coa", "coa.csv"])
            .err()
            .expect("missing --costs must be rejected");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);

        assert!(Cli::try_parse_from(["alloc-runner", "validate", "--coa", "coa.csv"]).is_ok());
    }

    #[test]
    fn clean_run_exits_zero_and_writes_table() {
        let dir = workdir("ok");
        let coa = put(&dir, "coa.csv", CHART);
        let costs = put(&dir, "costs.csv", COSTS);
        let rules = put(&dir, "rules.csv", RULES);
        let out = dir.join("out.csv");
        let out = out.to_str().unwrap();

        let code = exit_code(&[
            "allocate", "--coa", &coa, "--costs", &costs, "--alloc", &rules, "--out", out,
        ]);
        assert_eq!(code, 0);
        let table = std::fs::read_to_string(out).unwrap();
        assert_eq!(
            table,
            "account_id,parent_id,name,amount\n110,100,Office,250.000000\n120,100,IT,750.000000\n"
        );
    }

    #[test]
    fn unreadable_input_exits_three() {
        let dir = workdir("read");
        let costs = put(&dir, "costs.csv", COSTS);
        let missing = dir.join("no-such-chart.csv");

        let code = exit_code(&["allocate", "--coa", missing.to_str().unwrap(), "--costs", &costs]);
        assert_eq!(code, EXIT_READ);

        let coa = put(&dir, "coa.csv", "code,up\n100,\n");
        assert_eq!(exit_code(&["validate", "--coa", &coa]), EXIT_READ);
    }

    #[test]
    fn invalid_input_exits_four() {
        let dir = workdir("invalid");
        let coa = put(&dir, "coa.csv", "account_id,parent_id\n100,\n110,999\n");
        let costs = put(&dir, "costs.csv", COSTS);

        assert_eq!(exit_code(&["validate", "--coa", &coa]), EXIT_INVALID);
        assert_eq!(
            exit_code(&["allocate", "--coa", &coa, "--costs", &costs]),
            EXIT_INVALID
        );
    }

    #[test]
    fn failed_run_exits_five() {
        let dir = workdir("failed");
        let coa = put(&dir, "coa.csv", "account_id,parent_id\n100,\n110,100\n111,110\n");
        let costs = put(&dir, "costs.csv", COSTS);
        let rules = put(&dir, "rules.csv", "parent_id,child_id,weight\n100,110,1\n110,111,1\n");
        let config = put(&dir, "alloc.json", r#"{ "engine": { "iteration_cap": 1 } }"#);

        let code = exit_code(&[
            "--config", &config, "allocate", "--coa", &coa, "--costs", &costs, "--alloc", &rules,
        ]);
        assert_eq!(code, EXIT_RUN_FAILED);
    }
}

use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use pool_ledger::{
    Amount, ExternalAsset, PackedTokenLedger, Principal, TokenConfig, TokenLedger, TokenOp, Vault,
};

/// Scenario runner: an external caller that drives the ledgers from a
/// JSON script and prints the events and the final snapshot. Principals
/// appear in scripts as human-readable labels and are mapped to their
/// derived identities before any ledger call.
#[derive(Parser)]
#[command(name = "pool-ledger", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a token scenario against both variants and verify equivalence.
    Token { scenario: PathBuf },
    /// Run a deposit/withdraw scenario against the vault.
    Vault { scenario: PathBuf },
}

#[derive(Deserialize)]
struct TokenScenario {
    name: String,
    symbol: String,
    owner: String,
    max_supply: Amount,
    steps: Vec<TokenStep>,
}

#[derive(Deserialize)]
struct TokenStep {
    caller: String,
    timestamp: u64,
    #[serde(flatten)]
    op: ScriptOp,
}

/// Label-keyed mirror of [`TokenOp`], the form scenario files use.
#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ScriptOp {
    Transfer { to: String, amount: Amount },
    Approve { spender: String, amount: Amount },
    TransferFrom {
        from: String,
        to: String,
        amount: Amount,
    },
    Mint { to: String, amount: Amount },
    Burn { amount: Amount },
    SetPaused { paused: bool },
}

impl ScriptOp {
    fn resolve(&self) -> TokenOp {
        match self {
            ScriptOp::Transfer { to, amount } => TokenOp::Transfer {
                to: Principal::from_label(to),
                amount: *amount,
            },
            ScriptOp::Approve { spender, amount } => TokenOp::Approve {
                spender: Principal::from_label(spender),
                amount: *amount,
            },
            ScriptOp::TransferFrom { from, to, amount } => TokenOp::TransferFrom {
                from: Principal::from_label(from),
                to: Principal::from_label(to),
                amount: *amount,
            },
            ScriptOp::Mint { to, amount } => TokenOp::Mint {
                to: Principal::from_label(to),
                amount: *amount,
            },
            ScriptOp::Burn { amount } => TokenOp::Burn { amount: *amount },
            ScriptOp::SetPaused { paused } => TokenOp::SetPaused { paused: *paused },
        }
    }
}

#[derive(Deserialize)]
struct VaultScenario {
    funding: Vec<Funding>,
    steps: Vec<VaultStep>,
}

#[derive(Deserialize)]
struct Funding {
    principal: String,
    amount: Amount,
}

#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum VaultStep {
    Deposit { principal: String, amount: Amount },
    Withdraw { principal: String, amount: Amount },
}

#[derive(Serialize)]
struct StepReport {
    step: usize,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn load_scenario<T: serde::de::DeserializeOwned>(path: &PathBuf) -> T {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!("error: cannot read {}: {err}", path.display());
            process::exit(2);
        }
    };
    match serde_json::from_str(&raw) {
        Ok(scenario) => scenario,
        Err(err) => {
            eprintln!("error: invalid scenario {}: {err}", path.display());
            process::exit(2);
        }
    }
}

fn report(step: usize, result: &Result<(), pool_ledger::LedgerError>) -> StepReport {
    StepReport {
        step,
        ok: result.is_ok(),
        error: result.as_ref().err().map(|err| err.to_string()),
    }
}

fn run_token(path: PathBuf) {
    let scenario: TokenScenario = load_scenario(&path);
    let config = TokenConfig {
        name: scenario.name,
        symbol: scenario.symbol,
        owner: Principal::from_label(&scenario.owner),
        max_supply: scenario.max_supply,
    };
    let mut plain = match TokenLedger::new(config.clone()) {
        Ok(ledger) => ledger,
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    };
    let mut packed = PackedTokenLedger::new(config).expect("same config already validated");

    for (i, step) in scenario.steps.iter().enumerate() {
        let caller = Principal::from_label(&step.caller);
        let op = step.op.resolve();
        let plain_result = plain.apply(caller, op.clone(), step.timestamp);
        let packed_result = packed.apply(caller, op, step.timestamp);
        if plain_result != packed_result {
            eprintln!(
                "variant divergence at step {i}: plain={plain_result:?} packed={packed_result:?}"
            );
            process::exit(1);
        }
        println!(
            "{}",
            serde_json::to_string(&report(i, &plain_result)).expect("report is serializable")
        );
    }

    let plain_snapshot = plain.snapshot();
    if plain_snapshot != packed.snapshot() {
        eprintln!("variant divergence: final snapshots differ");
        process::exit(1);
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&plain_snapshot).expect("snapshot is serializable")
    );
}

fn run_vault(path: PathBuf) {
    let scenario: VaultScenario = load_scenario(&path);
    let mut asset = ExternalAsset::new();
    for funding in &scenario.funding {
        let principal = Principal::from_label(&funding.principal);
        asset.fund(principal, funding.amount);
        asset.approve_custody(principal, funding.amount);
    }
    let mut vault = Vault::new(asset);

    for (i, step) in scenario.steps.iter().enumerate() {
        let result = match step {
            VaultStep::Deposit { principal, amount } => {
                vault.deposit(Principal::from_label(principal), *amount)
            }
            VaultStep::Withdraw { principal, amount } => {
                vault.withdraw(Principal::from_label(principal), *amount)
            }
        };
        println!(
            "{}",
            serde_json::to_string(&report(i, &result)).expect("report is serializable")
        );
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&vault.snapshot()).expect("snapshot is serializable")
    );
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Token { scenario } => run_token(scenario),
        Command::Vault { scenario } => run_vault(scenario),
    }
}

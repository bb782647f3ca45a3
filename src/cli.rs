//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use crate::adapters::csv_table_adapter::CsvTableAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::observer_adapter::LogObserver;
use crate::domain::env::{EnvConfig, PortfolioEnv, StepOutput};
use crate::domain::error::PortsimError;
use crate::domain::portfolio::Side;
use crate::domain::reward::{BaselineRewardStrategy, MixedRewardStrategy, RewardStrategy};
use crate::domain::table::SymbolTable;
use crate::domain::transfer::TransferPenalties;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "portsim", about = "Tick-level portfolio allocation simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a simulation to completion with a scripted policy
    Simulate {
        #[arg(short, long)]
        config: PathBuf,
        /// Print every allocation transfer as it happens
        #[arg(long)]
        trace_events: bool,
    },
    /// Show the symbols and data ranges a config resolves to
    Inspect {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Check that a config builds a runnable simulation
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Simulate {
            config,
            trace_events,
        } => run_simulate(&config, trace_events),
        Command::Inspect { config } => run_inspect(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PortsimError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Scripted driver policies. A learned agent would replace this loop; the
/// CLI ships fixed policies for exercising and sanity-checking a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    /// Keep the initial allocation for the whole run.
    Hold,
    /// Walk the action space round-robin, one action per tick.
    Cycle,
}

impl Policy {
    fn from_config(config: &dyn ConfigPort) -> Result<Self, PortsimError> {
        match config
            .get_string("simulation", "policy")
            .unwrap_or_else(|| "hold".to_string())
            .as_str()
        {
            "hold" => Ok(Policy::Hold),
            "cycle" => Ok(Policy::Cycle),
            other => Err(PortsimError::ConfigInvalid {
                section: "simulation".into(),
                key: "policy".into(),
                reason: format!("unknown policy {other:?}, expected hold or cycle"),
            }),
        }
    }
}

fn run_simulate(config_path: &PathBuf, trace_events: bool) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let policy = match Policy::from_config(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let mut env = match build_env(&adapter) {
        Ok(env) => env,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if adapter.get_bool("simulation", "log_observer", false) {
        env.observe(Box::new(LogObserver));
    }

    let frame = env.frame_bound();
    info!(
        start = frame.start,
        end = frame.end,
        actions = env.action_space().len(),
        "simulation ready"
    );

    let output = drive(&mut env, policy);
    print_summary(&env, &output, trace_events);
    ExitCode::SUCCESS
}

fn run_inspect(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let (data_port, symbols) = match resolve_symbols(&adapter) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    println!("{} symbol(s):", symbols.len());
    for symbol in &symbols {
        match data_port.fetch_table(symbol) {
            Ok(table) => {
                let range = table
                    .timestamps()
                    .first()
                    .zip(table.last_timestamp())
                    .map(|(first, last)| format!("{first} .. {last}"))
                    .unwrap_or_else(|| "empty".to_string());
                println!(
                    "  {symbol}: {} rows, columns [{}], {range}",
                    table.len(),
                    table.columns().join(", "),
                );
            }
            Err(e) => println!("  {symbol}: unreadable ({e})"),
        }
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let checks = Policy::from_config(&adapter)
        .map(|_| ())
        .and_then(|_| build_env(&adapter).map(|_| ()));
    match checks {
        Ok(()) => {
            println!("ok: config builds a runnable simulation");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Assemble an environment from an INI config: data loading, penalties,
/// reward strategy, and initial allocation.
pub fn build_env(config: &dyn ConfigPort) -> Result<PortfolioEnv, PortsimError> {
    let (data_port, symbols) = resolve_symbols(config)?;

    let mut tables: BTreeMap<String, SymbolTable> = BTreeMap::new();
    for symbol in &symbols {
        tables.insert(symbol.clone(), data_port.fetch_table(symbol)?);
    }

    let price_column = config
        .get_string("data", "price_column")
        .unwrap_or_else(|| "Close".to_string());
    let signal_columns = config.get_list("data", "signal_columns");

    let window_size = config.get_int("simulation", "window_size", 10);
    if window_size <= 0 {
        return Err(PortsimError::ConfigInvalid {
            section: "simulation".into(),
            key: "window_size".into(),
            reason: format!("{window_size} is not a positive tick count"),
        });
    }

    let mut env_config = EnvConfig::new(window_size as usize, price_column, signal_columns);
    env_config.penalties = TransferPenalties {
        long: config.get_double("simulation", "long_penalty", 0.005),
        short: config.get_double("simulation", "short_penalty", 0.01),
    };

    let initial_symbol = config
        .get_string("simulation", "initial_symbol")
        .or_else(|| symbols.first().cloned())
        .ok_or(PortsimError::ConfigMissing {
            section: "simulation".into(),
            key: "initial_symbol".into(),
        })?;
    let initial_shares = config.get_double("simulation", "initial_shares", 1.0);
    let mut allocation = BTreeMap::new();
    allocation.insert(initial_symbol, initial_shares);

    PortfolioEnv::new(env_config, tables, allocation, reward_strategy(config)?)
}

fn resolve_symbols(
    config: &dyn ConfigPort,
) -> Result<(CsvTableAdapter, Vec<String>), PortsimError> {
    let path = config
        .get_string("data", "path")
        .ok_or(PortsimError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })?;
    let data_port = CsvTableAdapter::new(PathBuf::from(path));

    let mut symbols = config.get_list("simulation", "symbols");
    if symbols.is_empty() {
        symbols = data_port.list_symbols()?;
    }
    if symbols.is_empty() {
        return Err(PortsimError::Data {
            reason: "no symbols configured and none found in the data directory".into(),
        });
    }
    Ok((data_port, symbols))
}

fn reward_strategy(config: &dyn ConfigPort) -> Result<Box<dyn RewardStrategy>, PortsimError> {
    match config
        .get_string("simulation", "reward")
        .unwrap_or_else(|| "baseline".to_string())
        .as_str()
    {
        "baseline" => Ok(Box::new(BaselineRewardStrategy)),
        "mixed" => {
            let defaults = MixedRewardStrategy::default();
            Ok(Box::new(MixedRewardStrategy {
                momentum_period: config
                    .get_int("reward", "momentum_period", defaults.momentum_period as i64)
                    .max(0) as usize,
                momentum_bonus: config.get_double(
                    "reward",
                    "momentum_bonus",
                    defaults.momentum_bonus,
                ),
                min_holding_ticks: config.get_int("reward", "min_holding_ticks", 0).max(0)
                    as usize,
                greedy_penalty: config.get_double("reward", "greedy_penalty", 0.0),
                max_holding_ticks: config.get_int("reward", "max_holding_ticks", 0).max(0)
                    as usize,
                passive_penalty: config.get_double("reward", "passive_penalty", 0.0),
            }))
        }
        other => Err(PortsimError::ConfigInvalid {
            section: "simulation".into(),
            key: "reward".into(),
            reason: format!("unknown reward strategy {other:?}, expected baseline or mixed"),
        }),
    }
}

fn drive(env: &mut PortfolioEnv, policy: Policy) -> StepOutput {
    let hold_action = env
        .portfolio()
        .allocated()
        .and_then(|(symbol, side, _)| env.action_space().encode(symbol, side))
        .unwrap_or(0);
    let action_count = env.action_space().len();

    let mut next_cycle = 0;
    loop {
        let action = match policy {
            Policy::Hold => hold_action,
            Policy::Cycle => {
                let action = next_cycle;
                next_cycle = (next_cycle + 1) % action_count;
                action
            }
        };
        let output = env.step(action);
        if output.done {
            return output;
        }
    }
}

fn print_summary(env: &PortfolioEnv, output: &StepOutput, trace_events: bool) {
    println!("ticks:     {} .. {}", env.frame_bound().start, env.frame_bound().end);
    println!("transfers: {}", env.events().len());
    println!("value:     {:.4}", output.info.current_portfolio_value);
    println!("profit:    {:.4}", output.info.current_profit);
    println!("reward:    {:.4}", output.reward);

    if let Some((symbol, side, position)) = env.portfolio().allocated() {
        println!(
            "position:  {} {} {:.4} shares",
            side,
            symbol,
            position.shares.abs()
        );
    } else {
        println!("position:  flat");
    }

    if trace_events {
        for event in env.events() {
            let source = match &event.source {
                Some(leg) => format!(
                    "{} {} @ {:.4} (held {}, return {:+.4})",
                    leg.side, leg.symbol, leg.price, leg.held_ticks, leg.realized_return,
                ),
                None => "flat".to_string(),
            };
            println!(
                "tick {:>6}: {source} -> {} {} @ {:.4}, {:.4} shares",
                event.tick,
                event.target_side,
                event.target_symbol,
                event.target_price,
                event.target_shares.abs(),
            );
        }
    }

    // Transfer statistics over the whole run.
    let closed: Vec<&crate::domain::transfer::SourceLeg> = env
        .events()
        .iter()
        .filter_map(|event| event.source.as_ref())
        .collect();
    if !closed.is_empty() {
        let wins = closed
            .iter()
            .filter(|leg| leg.realized_return > 0.0)
            .count();
        let mean_return =
            closed.iter().map(|leg| leg.realized_return).sum::<f64>() / closed.len() as f64;
        println!(
            "closed:    {} ({} profitable, mean return {:+.4})",
            closed.len(),
            wins,
            mean_return,
        );
    }

    let shorts = env
        .events()
        .iter()
        .filter(|event| event.target_side == Side::Short)
        .count();
    println!("entries:   {} long, {} short", env.events().len() - shorts, shorts);
}

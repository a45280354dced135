//! clearing-core CLI
//!
//! Run generated clearing scenarios from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Run a 20-step scenario with the default economy
//! clearing-core run --steps 20 --seed 42
//!
//! # Larger economy, JSON summary
//! clearing-core run --steps 50 --banks 8 --households 100 --format json
//!
//! # Dump a generated scenario's opening state
//! clearing-core generate --seed 7
//! ```

use clearing_core::engine::scenario::{
    build_simulation, queue_background_orders, ScenarioConfig,
};
use clearing_core::market::rationing::RationingPolicy;
use clearing_core::prelude::*;
use std::process;

fn print_usage() {
    eprintln!(
        r#"clearing-core — market clearing and balance-sheet resolution core

USAGE:
    clearing-core <COMMAND> [OPTIONS]

COMMANDS:
    run         Run a generated scenario for a number of steps
    generate    Print a generated scenario's opening state as JSON
    help        Show this message

OPTIONS (run):
    --steps <N>        Number of simulated steps (default: 20)
    --seed <N>         Global seed (default: 0)
    --households <N>   Household count (default: 20)
    --firms <N>        Firm count (default: 4)
    --banks <N>        Bank count (default: 3)
    --funds <N>        Fund count (default: 2)
    --sectors <N>      Goods sectors (default: 2)
    --rationing <P>    homogeneous | random-deny:<k> (default: homogeneous)
    --format <FORMAT>  Output format: text (default) or json

OPTIONS (generate):
    --seed <N>         Global seed (default: 0)

EXAMPLES:
    clearing-core run --steps 20 --seed 42
    clearing-core run --steps 50 --rationing random-deny:0.1 --format json
    clearing-core generate --seed 7"#
    );
}

/// JSON summary of one run.
#[derive(serde::Serialize)]
struct RunOutput {
    steps: u64,
    trades: usize,
    total_traded_value: String,
    final_total_cash: String,
    final_total_equity: String,
    bankruptcies: usize,
    bailouts: usize,
    liquidations: usize,
}

fn parse_scenario(args: &[String]) -> (ScenarioConfig, u64, String) {
    let mut config = ScenarioConfig::default();
    let mut steps = 20u64;
    let mut format = "text".to_string();
    let mut i = 0;
    while i < args.len() {
        let take_value = |i: &mut usize| -> String {
            *i += 1;
            args.get(*i).cloned().unwrap_or_else(|| {
                eprintln!("option {} requires a value", args[*i - 1]);
                process::exit(1);
            })
        };
        match args[i].as_str() {
            "--steps" => {
                steps = take_value(&mut i).parse().unwrap_or_else(|_| {
                    eprintln!("--steps requires a number");
                    process::exit(1);
                })
            }
            "--seed" => {
                config.engine.seed = take_value(&mut i).parse().unwrap_or_else(|_| {
                    eprintln!("--seed requires a number");
                    process::exit(1);
                })
            }
            "--households" => {
                config.households = take_value(&mut i).parse().unwrap_or_else(|_| {
                    eprintln!("--households requires a number");
                    process::exit(1);
                })
            }
            "--firms" => {
                config.firms = take_value(&mut i).parse().unwrap_or_else(|_| {
                    eprintln!("--firms requires a number");
                    process::exit(1);
                })
            }
            "--banks" => {
                config.banks = take_value(&mut i).parse().unwrap_or_else(|_| {
                    eprintln!("--banks requires a number");
                    process::exit(1);
                })
            }
            "--funds" => {
                config.funds = take_value(&mut i).parse().unwrap_or_else(|_| {
                    eprintln!("--funds requires a number");
                    process::exit(1);
                })
            }
            "--sectors" => {
                config.goods_sectors = take_value(&mut i).parse().unwrap_or_else(|_| {
                    eprintln!("--sectors requires a number");
                    process::exit(1);
                })
            }
            "--rationing" => {
                let value = take_value(&mut i);
                config.engine.rationing = parse_rationing(&value);
            }
            "--format" => format = take_value(&mut i),
            other => {
                eprintln!("Unknown option: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }
    (config, steps, format)
}

fn parse_rationing(value: &str) -> RationingPolicy {
    if value == "homogeneous" {
        return RationingPolicy::Homogeneous;
    }
    if let Some(k) = value.strip_prefix("random-deny:") {
        let inhomogeneity: f64 = k.parse().unwrap_or_else(|_| {
            eprintln!("random-deny requires a numeric factor, e.g. random-deny:0.1");
            process::exit(1);
        });
        return RationingPolicy::RandomDeny { inhomogeneity };
    }
    eprintln!("Unknown rationing policy: {}", value);
    process::exit(1);
}

fn cmd_run(args: &[String]) {
    let (config, steps, format) = parse_scenario(args);
    let mut sim = build_simulation(&config);

    let mut bankruptcies = 0usize;
    let mut bailouts = 0usize;
    let mut liquidations = 0usize;

    for _ in 0..steps {
        queue_background_orders(&mut sim, &config);
        let report = match sim.step() {
            Ok(report) => report,
            Err(e) => {
                eprintln!("round {} aborted: {}", sim.round(), e);
                process::exit(1);
            }
        };

        bankruptcies += report.resolutions.len();
        for resolution in &report.resolutions {
            if resolution.liquidation.is_some() {
                liquidations += 1;
            } else {
                bailouts += 1;
            }
        }

        if format == "text" {
            print!("{}", report);
        }
    }

    if format == "json" {
        let output = RunOutput {
            steps,
            trades: sim.settlement_log().len(),
            total_traded_value: sim.settlement_log().total_value().to_string(),
            final_total_cash: sim.ledger().total_cash().to_string(),
            final_total_equity: sim.ledger().total_equity(sim.registry()).to_string(),
            bankruptcies,
            bailouts,
            liquidations,
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
    } else {
        println!("--------------------------------------------");
        println!("steps:          {}", steps);
        println!("trades:         {}", sim.settlement_log().len());
        println!("traded value:   {}", sim.settlement_log().total_value());
        println!("total cash:     {}", sim.ledger().total_cash());
        println!(
            "total equity:   {}",
            sim.ledger().total_equity(sim.registry())
        );
        println!(
            "bankruptcies:   {} ({} bailed out, {} liquidated)",
            bankruptcies, bailouts, liquidations
        );
    }
}

fn cmd_generate(args: &[String]) {
    let (config, _, _) = parse_scenario(args);
    let sim = build_simulation(&config);

    #[derive(serde::Serialize)]
    struct AgentState {
        agent: String,
        role: String,
        cash: String,
        equity: String,
    }

    let agents: Vec<AgentState> = sim
        .ledger()
        .agents()
        .map(|agent| {
            let sheet = sim.ledger().sheet(agent).unwrap();
            AgentState {
                agent: agent.to_string(),
                role: sim
                    .ledger()
                    .role(agent)
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
                cash: sheet.cash().to_string(),
                equity: sheet.equity(sim.registry()).to_string(),
            }
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&agents).unwrap());
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "run" => cmd_run(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}

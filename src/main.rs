//! Fleet charging simulator entry point — CLI wiring and config-driven run.

use std::process;

use fleet_charge_sim::cli::parse_args;
use fleet_charge_sim::config::ScenarioConfig;
use fleet_charge_sim::error::SimError;
use fleet_charge_sim::simulation::Simulation;

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = match parse_args() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("error: {e}");
            fleet_charge_sim::cli::print_usage();
            process::exit(1);
        }
    };

    let scenario = if let Some(ref path) = cli.scenario {
        ScenarioConfig::from_toml_file(path)
    } else {
        ScenarioConfig::from_preset(cli.preset.as_deref().unwrap_or("baseline"))
    };
    let scenario = match scenario {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            process::exit(1);
        }
    };

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let mut sim = match Simulation::from_config(scenario) {
        Ok(sim) => sim,
        Err(e) => {
            report_and_exit(&e);
        }
    };

    if let Err(e) = sim.run() {
        report_and_exit(&e);
    }

    if let Err(e) = sim.export(&cli.out_dir) {
        report_and_exit(&e);
    }

    println!("wrote results to {}", cli.out_dir.display());
}

fn report_and_exit(err: &SimError) -> ! {
    eprintln!("error: {err}");
    process::exit(1);
}

//! Command-line argument parsing.

use std::env;
use std::path::PathBuf;

pub struct CliOptions {
    pub scenario: Option<PathBuf>,
    pub preset: Option<String>,
    pub out_dir: PathBuf,
}

pub fn parse_args() -> Result<CliOptions, String> {
    let args: Vec<String> = env::args().skip(1).collect();
    parse_args_from(args)
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }
    parse_options(&args)
}

fn parse_options(args: &[String]) -> Result<CliOptions, String> {
    let mut i = 0usize;
    let mut scenario = None;
    let mut preset = None;
    let mut out_dir = PathBuf::from("out");

    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| "missing value for --scenario (expected a TOML file path)".to_string())?;
                if scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--preset" => {
                i += 1;
                let name = args.get(i).ok_or_else(|| "missing value for --preset (expected a preset name)".to_string())?;
                if preset.replace(name.clone()).is_some() {
                    return Err("--preset provided more than once".to_string());
                }
            }
            "--out-dir" => {
                i += 1;
                let path = args.get(i).ok_or_else(|| "missing value for --out-dir (expected a directory path)".to_string())?;
                out_dir = PathBuf::from(path);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    if scenario.is_some() && preset.is_some() {
        return Err("arguments `--scenario` and `--preset` are mutually exclusive; choose one source".to_string());
    }
    if scenario.is_none() && preset.is_none() {
        preset = Some("baseline".to_string());
    }

    Ok(CliOptions { scenario, preset, out_dir })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  fleet-charge-sim [--scenario <path> | --preset <name>] [--out-dir <path>]");
}

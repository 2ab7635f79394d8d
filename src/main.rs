//! # Weaver CLI
//!
//! ```bash
//! weaver <layout.xml> <gti.xml> <api_or_analysis.xml>...
//! ```
//!
//! API and analysis specifications may be mixed in any order; they are
//! classified by their root element. The GTI-internal specifications are
//! always included. Verbosity is controlled through `WEAVER_VERBOSITY`
//! (0..3); levels 2 and up also write DOT dumps next to the outputs.
//!
//! Exit code 0 on success, 1 on any fatal error.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use tbon_weaver::config::WeaverConfig;
use tbon_weaver::driver::{self, WeaverArgs, WeaveSummary};

fn print_usage(program: &str) {
    eprintln!("Usage: {} <layout.xml> <gti.xml> <api_or_analysis.xml>...", program);
    eprintln!();
    eprintln!("  layout.xml   layout specification (layers and connections)");
    eprintln!("  gti.xml      infrastructure specification (strategies, protocols, places)");
    eprintln!("  further      any number of API and analysis specifications");
    eprintln!();
    eprintln!("Environment: WEAVER_VERBOSITY=0..3, WEAVER_OUTPUT_DIR=<dir>");
}

fn main() -> ExitCode {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_else(|| "weaver".to_string());
    let rest: Vec<String> = args.collect();

    if rest.iter().any(|a| a == "-h" || a == "--help" || a == "-help") {
        print_usage(&program);
        return ExitCode::SUCCESS;
    }
    if rest.len() < 3 {
        eprintln!("Error: not enough arguments");
        print_usage(&program);
        return ExitCode::FAILURE;
    }

    match weave(&rest) {
        Ok(summary) => {
            println!(
                "weave complete: {} layers, {} documents written",
                summary.layers,
                summary.outputs.len()
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn weave(rest: &[String]) -> anyhow::Result<WeaveSummary> {
    let config = WeaverConfig::load().context("invalid configuration")?;

    let level = match config.verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    let args = WeaverArgs {
        layout: PathBuf::from(&rest[0]),
        gti: PathBuf::from(&rest[1]),
        specs: rest[2..].iter().map(PathBuf::from).collect(),
    };
    driver::run(&args, &config).context("weave failed")
}

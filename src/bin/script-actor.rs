//! Script Actor CLI - run and check script actors from a config file
//!
//! Provides subcommands for running an actor through a sequential director,
//! checking that its script binds, and listing available languages.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use script_actor::interpreter::Value;
use script_actor::runtime::{Director, LanguageRegistry, storage};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "script-actor")]
#[command(about = "Run workflow actors written in embedded scripting languages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an actor through preinitialize, N iterations, and wrapup
    Run {
        /// Actor config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Token to queue on an input port, as port=json (repeatable)
        #[arg(short, long = "input")]
        inputs: Vec<String>,

        /// Override the configured iteration count
        #[arg(short = 'n', long)]
        iterations: Option<usize>,
    },

    /// Evaluate and bind the script without running any phase
    Check {
        /// Actor config file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// List registered languages
    Languages,
}

fn parse_input(arg: &str) -> Result<(String, Value)> {
    let Some((port, json)) = arg.split_once('=') else {
        bail!("expected port=json, got '{}'", arg);
    };
    let value: Value = serde_json::from_str(json)
        .with_context(|| format!("Invalid JSON token for port '{}'", port))?;
    Ok((port.trim().to_string(), value))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let registry = LanguageRegistry::builtin();

    match cli.command {
        Commands::Run {
            config: config_path,
            inputs,
            iterations,
        } => {
            let config = storage::load_config(&config_path)?;
            let script = storage::load_script(&config, &config_path)?;
            let mut assembly = config
                .assemble(&script, registry)
                .with_context(|| format!("Failed to configure actor '{}'", config.name))?;

            for arg in &inputs {
                let (port, value) = parse_input(arg)?;
                let Some(target) = assembly.inputs.get(&port) else {
                    bail!("actor '{}' has no input port '{}'", config.name, port);
                };
                target.push(value);
            }

            let director = Director::new(iterations.unwrap_or(config.iterations));
            let report = director
                .run(&mut assembly.actor, &assembly.outputs)
                .with_context(|| format!("Run of actor '{}' failed", config.name))?;

            println!("Actor: {}", config.name);
            println!("Iterations: {}", report.iterations);
            if report.stopped_by_actor {
                println!("Stopped by postfire");
            }
            if report.not_ready {
                println!("Stopped by prefire (not ready)");
            }
            for (port, tokens) in &report.outputs {
                let rendered: Vec<String> = tokens.iter().map(ToString::to_string).collect();
                println!("{}: [{}]", port, rendered.join(", "));
            }
        }

        Commands::Check {
            config: config_path,
        } => {
            let config = storage::load_config(&config_path)?;
            let script = storage::load_script(&config, &config_path)?;
            let assembly = config
                .assemble(&script, registry)
                .with_context(|| format!("Failed to configure actor '{}'", config.name))?;

            println!("Actor: {}", config.name);
            println!("Language: {}", config.language);
            println!("Script: {}", assembly.actor.source().fingerprint());
            println!("Bindings: {}", assembly.actor.bound_names().join(", "));
        }

        Commands::Languages => {
            for language in registry.languages() {
                println!("{}", language);
            }
        }
    }

    Ok(())
}

//! Macro dry-runner console
//!
//! Loads a KDL macro configuration, then lists the defined macros or runs
//! one against the config's static state. Composed commands print to stdout
//! with a `> ` marker, info responses with `// `, and fault reports as-is.
//!
//! ```text
//! console --config config/macros.kdl list
//! console --config config/macros.kdl run PARK
//! console --config config/macros.kdl run LOAD_FILAMENT TEMP=205
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use macros::{
    CommandSink, Invocation, MacroConfig, MacroRunner, MacroSource, Responder,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "console", about = "Helios macro dry-runner")]
struct Args {
    /// Path to the KDL macro configuration
    #[arg(long, short = 'c', value_name = "PATH")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the configured macros
    List,
    /// Run one macro with KEY=VALUE arguments
    Run {
        /// Macro name (case-insensitive)
        name: String,
        /// Invocation arguments, e.g. TEMP=205
        args: Vec<String>,
    },
}

/// Prints composed commands the way the host's command log would
struct ConsoleSink;

impl CommandSink for ConsoleSink {
    fn submit(&self, command: &str) -> macros::Result<()> {
        println!("> {}", command);
        Ok(())
    }
}

/// Prints display output; info lines carry the host's comment marker
struct ConsoleResponder;

impl Responder for ConsoleResponder {
    fn info(&self, text: &str) {
        println!("// {}", text);
    }

    fn raw(&self, text: &str) {
        println!("{}", text);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = MacroConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    tracing::debug!("Loaded {} macros from {}", config.macros.len(), args.config.display());

    match args.command {
        Command::List => list_macros(&config),
        Command::Run { name, args } => run_macro(&config, &name, &args)?,
    }

    Ok(())
}

fn list_macros(config: &MacroConfig) {
    for def in &config.macros {
        let source = match def.source() {
            MacroSource::Inline(_) => "inline".to_string(),
            MacroSource::File { path, .. } => path.display().to_string(),
        };
        println!("{:<20} {:<30} {}", def.name(), source, def.description());
    }
}

fn run_macro(config: &MacroConfig, name: &str, args: &[String]) -> Result<()> {
    let def = config
        .find(name)
        .ok_or_else(|| anyhow!("unknown macro: {}", name))?;

    let registry = Arc::new(config.build_registry());
    let runner = MacroRunner::new(registry, Arc::new(ConsoleSink));
    let responder: Arc<dyn Responder> = Arc::new(ConsoleResponder);

    runner.run(def, parse_invocation(args), &responder);
    Ok(())
}

/// Split `KEY=VALUE` tokens into named parameters
///
/// Tokens without `=` are kept out of the parameter map but stay visible
/// through the raw argument text, the same way the host's command channel
/// hands arguments through.
fn parse_invocation(args: &[String]) -> Invocation {
    let mut params = HashMap::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            params.insert(key.to_string(), value.to_string());
        }
    }
    Invocation {
        params,
        raw: args.join(" "),
    }
}

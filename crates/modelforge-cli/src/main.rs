//! Modelforge CLI
//!
//! Runs convention-based schema inference over a JSON host catalog:
//! - `infer`: build and finalize a model, print it (human or JSON)
//! - `conventions`: list the rules registered for each model event

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use modelforge_conventions::{build_model, default_convention_set};
use modelforge_metadata::{FinalizeError, HostCatalog, ModelOptions};

mod render;

#[derive(Parser)]
#[command(name = "modelforge")]
#[command(author, version, about = "Modelforge: convention-based schema inference")]
struct Cli {
    /// Log every convention decision (overridden by `RUST_LOG`)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer a finalized model from a host catalog (JSON).
    Infer {
        /// Host catalog: `{ "types": [ ... ] }`
        catalog: PathBuf,
        /// Comma-separated root types (default: every non-complex type)
        #[arg(long, value_delimiter = ',')]
        roots: Vec<String>,
        /// Model options JSON (dispatch depth, registered services)
        #[arg(long)]
        options: Option<PathBuf>,
        /// Print the finalized model as JSON
        #[arg(long)]
        json: bool,
        /// Write the JSON model here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// List the default conventions in dispatch order, per event.
    Conventions,
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("modelforge_metadata=debug,modelforge_conventions=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match cli.command {
        Commands::Infer {
            catalog,
            roots,
            options,
            json,
            out,
        } => cmd_infer(&catalog, &roots, options.as_deref(), json, out.as_deref()),
        Commands::Conventions => {
            cmd_conventions();
            Ok(())
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

fn load_catalog(path: &Path) -> Result<HostCatalog> {
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read catalog `{}`: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| anyhow!("invalid catalog `{}`: {e}", path.display()))
}

fn load_options(path: Option<&Path>) -> Result<ModelOptions> {
    let Some(path) = path else {
        return Ok(ModelOptions::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read options `{}`: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| anyhow!("invalid options `{}`: {e}", path.display()))
}

fn cmd_infer(
    catalog_path: &Path,
    roots: &[String],
    options_path: Option<&Path>,
    json: bool,
    out: Option<&Path>,
) -> Result<()> {
    let catalog = load_catalog(catalog_path)?;
    let options = load_options(options_path)?;
    let unknown: Vec<&str> = roots
        .iter()
        .filter(|r| !catalog.contains(r))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(anyhow!(
            "unknown root type(s): {} (catalog has {} types)",
            unknown.join(", "),
            catalog.len()
        ));
    }

    let model = build_model(catalog, roots, options);
    let finalized = match model.finalize_model() {
        Ok(finalized) => finalized,
        Err(err) => {
            report_failure(&err);
            return Err(anyhow!(
                "model validation failed for {} type(s)",
                err.problems().len()
            ));
        }
    };

    if json || out.is_some() {
        let text = finalized.to_json_pretty()?;
        match out {
            Some(out) => {
                fs::write(out, text)
                    .map_err(|e| anyhow!("failed to write `{}`: {e}", out.display()))?;
                eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
            }
            None => println!("{text}"),
        }
    } else {
        print!("{}", render::model(&finalized));
    }
    Ok(())
}

fn report_failure(err: &FinalizeError) {
    for (type_name, problems) in err.problems() {
        eprintln!("{} {}", "error".red().bold(), type_name.bold());
        for problem in problems {
            eprintln!("  - {problem}");
        }
    }
}

fn cmd_conventions() {
    let set = default_convention_set();
    for (event, rules) in set.registrations() {
        if rules.is_empty() {
            continue;
        }
        println!("{}", event.cyan().bold());
        for (i, rule) in rules.iter().enumerate() {
            println!("  {:>2}. {rule}", i + 1);
        }
    }
}

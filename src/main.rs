use std::path::{Path, PathBuf};
use std::process::Command;

/// Reset SIGPIPE to default behavior so piping (e.g. `tfsynth list | head`)
/// exits cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use tfsynth::synth::manifest::Manifest;

/// tfsynth - Terraform synthesis driver
#[derive(Parser)]
#[command(name = "tfsynth", version, about, long_about = None)]
struct Cli {
    /// Path to the project config file
    #[arg(short, long, default_value = "tfsynth.json")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured app command and synthesize all stacks
    Synth {
        /// App command override (defaults to the config file's "app")
        #[arg(long)]
        app: Option<String>,

        /// Output directory override
        #[arg(short, long)]
        output: Option<String>,
    },

    /// List synthesized stacks and their dependencies
    List {
        /// Output directory holding manifest.json
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Project file: `{ "app": "<command>", "output": "<dir>" }`.
#[derive(Deserialize)]
struct DriverConfig {
    app: String,
    #[serde(default = "default_output")]
    output: String,
}

fn default_output() -> String {
    "cdktf.out".to_string()
}

fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Synth {
            ref app,
            ref output,
        } => cmd_synth(&cli, app.as_deref(), output.as_deref()),
        Commands::List { ref output } => cmd_list(&cli, output.as_deref()),
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

fn cmd_synth(cli: &Cli, app_override: Option<&str>, output_override: Option<&str>) -> Result<()> {
    let config = load_config(&cli.config, app_override, output_override)?;
    let outdir = PathBuf::from(&config.output);

    tracing::debug!(app = %config.app, outdir = %outdir.display(), "spawning app command");
    let status = Command::new("sh")
        .arg("-c")
        .arg(&config.app)
        .env("TFSYNTH_OUTDIR", &outdir)
        .status()
        .with_context(|| format!("failed to spawn app command: {}", config.app))?;

    if !status.success() {
        let code = status.code().unwrap_or(1);
        println!("{} app command exited with code {}", "✗".red().bold(), code);
        std::process::exit(code);
    }

    let manifest = read_manifest(&outdir)?;
    println!(
        "{} synthesized {} stack(s) to {}",
        "✓".green().bold(),
        manifest.stacks.len(),
        config.output
    );
    for name in manifest.stacks.keys() {
        println!("  {}", name);
    }
    Ok(())
}

fn cmd_list(cli: &Cli, output_override: Option<&str>) -> Result<()> {
    let config = load_config(&cli.config, None, output_override)?;
    let manifest = read_manifest(Path::new(&config.output))?;

    for (name, entry) in &manifest.stacks {
        let deps: Vec<&str> = entry["dependencies"]
            .as_array()
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        if deps.is_empty() {
            println!("{}", name.bold());
        } else {
            println!("{}  (depends on: {})", name.bold(), deps.join(", "));
        }
    }
    Ok(())
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn load_config(
    path: &str,
    app_override: Option<&str>,
    output_override: Option<&str>,
) -> Result<DriverConfig> {
    let mut config = if Path::new(path).exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path))?;
        serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path))?
    } else {
        match app_override {
            Some(app) => DriverConfig {
                app: app.to_string(),
                output: default_output(),
            },
            None => bail!("no {} found and no --app given", path),
        }
    };

    if let Some(app) = app_override {
        config.app = app.to_string();
    }
    if let Some(output) = output_override {
        config.output = output.to_string();
    }
    Ok(config)
}

fn read_manifest(outdir: &Path) -> Result<Manifest> {
    let path = outdir.join("manifest.json");
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}; did synthesis run?", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

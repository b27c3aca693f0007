//! DistGuard CLI
//!
//! Build hook that protects a static site's output directory. Run with no
//! subcommand after the site build (`"postbuild": "distguard"`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use distguard_core::{
    guard_snippet, FileTransformer, ObfuscationPolicy, Pipeline, PipelineReport, ProtectConfig,
    CONFIG_FILE,
};

#[derive(Parser)]
#[command(name = "distguard")]
#[command(about = "Domain-lock and obfuscate a static site build")]
#[command(version)]
struct Cli {
    /// Project root (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default: <root>/distguard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Protect the build directory in place
    Protect {
        /// Fail without swapping when any file cannot be protected
        #[arg(long)]
        strict: bool,

        /// Inject the guard but skip obfuscation
        #[arg(long)]
        no_obfuscate: bool,

        /// Process files one at a time
        #[arg(long)]
        sequential: bool,

        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Protect a single file
    File {
        input: PathBuf,
        output: PathBuf,
    },

    /// Check a hostname against the whitelist (exit code 1 when denied)
    CheckHost { host: String },

    /// Print the guard snippet for the configured whitelist
    Guard,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "distguard=debug" } else { "distguard=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = match &cli.config {
        Some(path) => ProtectConfig::load_from(path),
        None => ProtectConfig::load(&root),
    }
    .with_context(|| format!("Failed to load {}", CONFIG_FILE))?;

    match cli.command.unwrap_or(Commands::Protect {
        strict: false,
        no_obfuscate: false,
        sequential: false,
        timeout: None,
        json: false,
    }) {
        Commands::Protect {
            strict,
            no_obfuscate,
            sequential,
            timeout,
            json,
        } => cmd_protect(&root, config, strict, no_obfuscate, sequential, timeout, json),
        Commands::File { input, output } => cmd_file(config, &input, &output),
        Commands::CheckHost { host } => cmd_check_host(config, &host),
        Commands::Guard => cmd_guard(config),
    }
}

/// Run the pipeline over the build directory
fn cmd_protect(
    root: &Path,
    config: ProtectConfig,
    strict: bool,
    no_obfuscate: bool,
    sequential: bool,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let mut pipeline_config = config
        .into_pipeline_config(root)
        .context("Invalid configuration")?;
    pipeline_config.strict |= strict;
    if no_obfuscate {
        pipeline_config.policy = ObfuscationPolicy::disabled();
    }
    if sequential {
        pipeline_config.parallel = false;
    }
    if let Some(secs) = timeout {
        pipeline_config.timeout = Some(Duration::from_secs(secs));
    }

    let report = Pipeline::new(pipeline_config)
        .run()
        .context("Failed to protect build")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &PipelineReport) {
    let walk = &report.walk;
    println!("Protected {}", report.build_dir.display());
    println!("  scripts:     {}", walk.scripts);
    println!("  assets:      {}", walk.assets);
    println!("  directories: {}", walk.directories);
    println!("  transforms:  {}", walk.transforms);
    println!("  bytes:       {} -> {}", walk.bytes_in, walk.bytes_out);
    if !walk.skipped.is_empty() {
        println!("  skipped:     {}", walk.skipped.len());
    }
    if !walk.failed.is_empty() {
        println!("  failed:      {}", walk.failed.len());
        for failed in &walk.failed {
            println!("    {}: {}", failed.path.display(), failed.error);
        }
    }
}

/// Protect one file
fn cmd_file(config: ProtectConfig, input: &Path, output: &Path) -> Result<()> {
    let whitelist = config.whitelist().context("Invalid domains")?;
    let transformer = FileTransformer::new(Arc::new(config.obfuscation), Arc::new(whitelist))
        .context("Invalid obfuscation policy")?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let outcome = transformer
        .transform_file(input, output)
        .context("Failed to protect file")?;

    println!(
        "{} -> {} ({} bytes -> {} bytes, {} transforms)",
        input.display(),
        output.display(),
        outcome.bytes_in,
        outcome.bytes_out,
        outcome.transforms
    );
    Ok(())
}

/// Report whether the whitelist allows `host`
fn cmd_check_host(config: ProtectConfig, host: &str) -> Result<()> {
    let whitelist = config.whitelist().context("Invalid domains")?;
    if whitelist.allows(host) {
        println!("{host}: allowed");
        Ok(())
    } else {
        println!("{host}: denied (whitelist: {})", whitelist.entries().join(", "));
        std::process::exit(1);
    }
}

/// Print the guard snippet
fn cmd_guard(config: ProtectConfig) -> Result<()> {
    let whitelist = config.whitelist().context("Invalid domains")?;
    println!("{}", guard_snippet(&whitelist));
    Ok(())
}

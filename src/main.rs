use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use nodescan::{
    analyzer,
    config::Config,
    output::{format_report_to_string, print_packages, print_report, OutputFormat},
};
use tracing_subscriber::EnvFilter;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const VULNS_FOUND: u8 = 2;
}

#[derive(Parser)]
#[command(name = "nodescan")]
#[command(
    author,
    version,
    about = "Scan Node.js project dependencies for known vulnerabilities"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan an installed Node.js project directory
    Scan {
        /// Path to the project root (where package.json and lockfiles live)
        path: PathBuf,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip vulnerability checking, only list discovered packages
        #[arg(long)]
        no_vuln_check: bool,

        /// Directory holding an extracted advisory database (JSON files)
        #[arg(long)]
        advisory_db: Option<PathBuf>,

        /// Exit with code 2 when vulnerabilities are found
        #[arg(long)]
        fail_on_vulns: bool,

        /// Append detailed logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan {
            path,
            format,
            output,
            no_vuln_check,
            advisory_db,
            fail_on_vulns,
            log_file,
        } => {
            init_logging(log_file.as_deref())?;

            let mut config = Config::load().unwrap_or_default();
            if advisory_db.is_some() {
                config.advisory_db_dir = advisory_db;
            }

            let format_str = format.unwrap_or_else(|| config.default_format.clone());
            let format = OutputFormat::from_str(&format_str).map_err(|e| anyhow::anyhow!(e))?;
            let skip_vuln = no_vuln_check || config.skip_vuln_check;

            run_scan(&path, &config, format, output, skip_vuln, fail_on_vulns).await
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(
    path: &Path,
    config: &Config,
    format: OutputFormat,
    output_file: Option<PathBuf>,
    skip_vuln_check: bool,
    fail_on_vulns: bool,
) -> Result<u8> {
    let is_interactive = format == OutputFormat::Table && output_file.is_none();

    if skip_vuln_check {
        let packages = analyzer::discover_packages(path, config)?;
        print_packages(&packages, format)?;
        return Ok(exit_codes::SUCCESS);
    }

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Scanning {}...", path.display()));
        Some(pb)
    } else {
        None
    };

    let report = analyzer::analyze(path, config).await;

    if let Some(pb) = progress {
        match &report {
            Ok(report) => pb.finish_with_message(format!(
                "Found {} vulnerabilities",
                report.total()
            )),
            Err(_) => pb.finish_and_clear(),
        }
    }
    let report = report?;

    if let Some(path) = output_file {
        let rendered = format_report_to_string(&report, format)?;
        std::fs::write(&path, rendered)
            .with_context(|| format!("writing results to {}", path.display()))?;
        println!("Results written to: {}", path.display());
    } else {
        print_report(&report, format)?;
    }

    if fail_on_vulns && !report.is_clean() {
        return Ok(exit_codes::VULNS_FOUND);
    }
    Ok(exit_codes::SUCCESS)
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'nodescan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}

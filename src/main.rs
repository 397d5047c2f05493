use anyhow::Result;
use clap::Parser;
use outlook_export::cli::{self, Cli, Commands, ProgressReporter};
use outlook_export::config::Config;
use outlook_export::error::ExportError;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        display_error(&e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Pick up a .env file if one exists; real environment variables win
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("outlook_export=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("outlook_export=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = cli.apply_overrides(Config::from_env()?);
    let reporter = ProgressReporter::new();

    println!("{:=<60}", "");
    println!("  OUTLOOK TO EXCEL EXPORTER");
    println!("{:=<60}", "");
    println!("Folder: {}", config.folder);
    println!("Output: {}", config.output_file.display());

    let report = match cli.command {
        Commands::Graph { force_auth } => {
            if force_auth && config.token_cache.exists() {
                tokio::fs::remove_file(&config.token_cache).await?;
                tracing::info!("Removed cached token");
            }
            cli::run_graph_export(&config, &reporter).await?
        }
        Commands::Imap => cli::run_imap_export(&config, &reporter).await?,
    };

    println!("\n{:=<60}", "");
    println!("Export Summary");
    println!("{:=<60}", "");
    println!("Emails exported: {}", report.exported);
    if report.skipped > 0 {
        println!("Records skipped: {}", report.skipped);
    }
    println!("Duration: {} seconds", report.duration_seconds);
    println!("Output file: {}", report.output_file.display());
    println!("{:=<60}", "");

    Ok(())
}

/// Print the error plus remediation steps keyed on its variant.
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(export_err) = error.downcast_ref::<ExportError>() {
        match export_err {
            ExportError::Config(_) => {
                eprintln!("\nHint: Settings are read from the environment or a .env file.");
                eprintln!("      Copy .env.example to .env and fill in your values.");
            }
            ExportError::Auth(_) => {
                eprintln!("\nHint: For the graph command, re-run with --force-auth to");
                eprintln!("      restart the device-code sign-in.");
                eprintln!("      For the imap command, make sure you are using an app");
                eprintln!("      password and that IMAP is enabled for the account.");
            }
            ExportError::Connect(_) => {
                eprintln!("\nHint: Check your network connection and any proxy settings.");
            }
            ExportError::FolderNotFound(_) => {
                eprintln!("\nHint: Folder names are matched case-insensitively; pass the");
                eprintln!("      display name exactly as it appears in Outlook.");
            }
            ExportError::Persistence(_) => {
                eprintln!("\nHint: Close the spreadsheet if it is open in Excel and check");
                eprintln!("      that the output directory exists and is writable.");
            }
            _ => {}
        }
    }
}

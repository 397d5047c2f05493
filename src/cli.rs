//! Command-line interface and export pipelines.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::auth;
use crate::config::Config;
use crate::error::{ExportError, Result};
use crate::graph::GraphClient;
use crate::imap::{most_recent, MailboxSession};
use crate::normalize::{normalize_graph, normalize_mime, ExportRow};
use crate::sheet::{write_sheet, FOLDER_HEADER, STATUS_HEADER};

#[derive(Parser, Debug)]
#[command(name = "outlook-export")]
#[command(version)]
#[command(about = "Export Outlook emails to an Excel spreadsheet", long_about = None)]
pub struct Cli {
    /// Folder to export (overrides FOLDER)
    #[arg(short, long)]
    pub folder: Option<String>,

    /// Maximum number of emails to export (overrides MAX_EMAILS)
    #[arg(short, long)]
    pub max_emails: Option<usize>,

    /// Output spreadsheet path (overrides OUTPUT_FILE)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export via the Microsoft Graph API with OAuth2 device-code login
    Graph {
        /// Discard the cached token and re-authenticate
        #[arg(long)]
        force_auth: bool,
    },

    /// Export via IMAP with an app password
    Imap,
}

impl Cli {
    /// Fold the command-line overrides into the environment configuration.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(folder) = &self.folder {
            config.folder = folder.clone();
        }
        if let Some(max_emails) = self.max_emails {
            config.max_emails = max_emails;
        }
        if let Some(output) = &self.output {
            config.output_file = output.clone();
        }
        config
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-");

        Self {
            multi: MultiProgress::new(),
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb
    }

    /// Finish a spinner and clear it from the display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        println!("  ✓ {}", msg);
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary of one export run, printed by the binary.
pub struct ExportReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Rows written to the spreadsheet.
    pub exported: usize,
    /// Records dropped because they could not be fetched or decoded.
    pub skipped: usize,
    pub output_file: PathBuf,
}

impl ExportReport {
    fn finish(started_at: DateTime<Utc>, exported: usize, skipped: usize, config: &Config) -> Self {
        let completed_at = Utc::now();
        Self {
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_seconds(),
            exported,
            skipped,
            output_file: config.output_file.clone(),
        }
    }
}

/// Run the Graph (REST API) export pipeline.
pub async fn run_graph_export(
    config: &Config,
    reporter: &ProgressReporter,
) -> Result<ExportReport> {
    config.validate_graph()?;
    let started_at = Utc::now();

    let spinner = reporter.add_spinner("Authenticating with Microsoft...");
    let token = auth::acquire_token(config).await?;
    reporter.finish_spinner(&spinner, "Authenticated");

    let client = GraphClient::new(&config.graph_base_url, token)?;

    let spinner = reporter.add_spinner(&format!("Finding folder '{}'...", config.folder));
    let folder_id = client
        .resolve_folder(&config.folder)
        .await?
        .ok_or_else(|| ExportError::FolderNotFound(config.folder.clone()))?;
    reporter.finish_spinner(&spinner, "Folder found");

    let spinner = reporter.add_spinner(&format!(
        "Retrieving up to {} emails...",
        config.max_emails
    ));
    let messages = client.fetch_messages(&folder_id, config.max_emails).await?;
    reporter.finish_spinner(&spinner, &format!("Retrieved {} emails", messages.len()));

    let pb = reporter.add_progress_bar(messages.len() as u64, "Processing emails...");
    let mut rows: Vec<ExportRow> = Vec::with_capacity(messages.len());
    for (index, message) in messages.iter().enumerate() {
        rows.push(normalize_graph(message));
        pb.inc(1);
        if (index + 1) % 10 == 0 {
            debug!("Processed {}/{} emails", index + 1, messages.len());
        }
    }
    pb.finish_and_clear();

    let spinner = reporter.add_spinner("Writing spreadsheet...");
    write_sheet(&rows, STATUS_HEADER, &config.output_file)?;
    reporter.finish_spinner(
        &spinner,
        &format!("Wrote {}", config.output_file.display()),
    );

    Ok(ExportReport::finish(started_at, rows.len(), 0, config))
}

/// Run the IMAP export pipeline.
///
/// The session is logged out on every exit path, including errors inside
/// the fetch loop.
pub async fn run_imap_export(config: &Config, reporter: &ProgressReporter) -> Result<ExportReport> {
    config.validate_imap()?;
    let started_at = Utc::now();

    let spinner = reporter.add_spinner(&format!("Connecting to {}...", config.imap_host));
    let mut session = MailboxSession::connect(
        &config.imap_host,
        config.imap_port,
        &config.email,
        &config.password,
    )
    .await?;
    reporter.finish_spinner(&spinner, &format!("Connected as {}", config.email));

    let result = fetch_imap_rows(&mut session, config, reporter).await;

    // Guaranteed cleanup: log out whether the fetch succeeded or not
    if let Err(e) = session.logout().await {
        warn!("Logout failed: {}", e);
    }

    let (rows, skipped) = result?;

    let spinner = reporter.add_spinner("Writing spreadsheet...");
    write_sheet(&rows, FOLDER_HEADER, &config.output_file)?;
    reporter.finish_spinner(
        &spinner,
        &format!("Wrote {}", config.output_file.display()),
    );

    Ok(ExportReport::finish(started_at, rows.len(), skipped, config))
}

/// Select, search and fetch inside an open session.
///
/// Returns the normalized rows plus the number of records skipped over
/// fetch or decode failures.
async fn fetch_imap_rows(
    session: &mut MailboxSession,
    config: &Config,
    reporter: &ProgressReporter,
) -> Result<(Vec<ExportRow>, usize)> {
    if let Err(e) = session.select_folder(&config.folder).await {
        if matches!(e, ExportError::FolderNotFound(_)) {
            match session.list_folders().await {
                Ok(folders) => {
                    eprintln!("Folder '{}' does not exist. Available folders:", config.folder);
                    for name in folders {
                        eprintln!("  - {}", name);
                    }
                }
                Err(list_error) => warn!("Could not list folders: {}", list_error),
            }
        }
        return Err(e);
    }

    let uids = session.search_all().await?;
    info!("Found {} emails", uids.len());

    if uids.len() > config.max_emails {
        info!("Limiting to {} most recent emails", config.max_emails);
    }
    let recent = most_recent(&uids, config.max_emails);

    let pb = reporter.add_progress_bar(recent.len() as u64, "Fetching emails...");
    let mut rows: Vec<ExportRow> = Vec::with_capacity(recent.len());
    let mut skipped = 0usize;

    for (index, uid) in recent.iter().enumerate() {
        match session.fetch_message(*uid).await {
            Ok(raw) => match normalize_mime(&raw, &config.folder) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!("Skipping message {}: {}", uid, e);
                    skipped += 1;
                }
            },
            Err(e) => {
                warn!("Skipping message {}: {}", uid, e);
                skipped += 1;
            }
        }
        pb.inc(1);
        if (index + 1) % 10 == 0 {
            debug!("Processed {}/{} emails", index + 1, recent.len());
        }
    }
    pb.finish_and_clear();

    Ok((rows, skipped))
}

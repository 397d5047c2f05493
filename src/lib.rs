//! Outlook to Excel Exporter
//!
//! Retrieves email messages from an Outlook mailbox and writes a tabular
//! summary of each message into an `.xlsx` spreadsheet. Two independent
//! pipelines are provided behind a common output stage:
//!
//! - **Graph**: Microsoft Graph REST API with OAuth2 device-code
//!   authentication and cursor-following pagination.
//! - **IMAP**: classic IMAP session with app-password login and
//!   per-message fetching.
//!
//! The two pipelines deliberately keep different failure granularities: a
//! failed Graph page stops pagination and exports what was accumulated,
//! while a failed IMAP message is skipped individually and fetching
//! continues.
//!
//! # Example Usage
//!
//! ```no_run
//! use outlook_export::cli::{run_graph_export, ProgressReporter};
//! use outlook_export::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let reporter = ProgressReporter::new();
//!     let report = run_graph_export(&config, &reporter).await?;
//!     println!("exported {} emails", report.exported);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 device-code flow and token cache
//! - [`cli`] - Command-line interface and the two export pipelines
//! - [`config`] - Run configuration from the environment
//! - [`error`] - Error types and result alias
//! - [`graph`] - Microsoft Graph client (folders, paged messages)
//! - [`imap`] - IMAP session (select, search, fetch, logout)
//! - [`normalize`] - Raw message to export row conversion
//! - [`sheet`] - Spreadsheet output

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod graph;
pub mod imap;
pub mod normalize;
pub mod sheet;

// Re-export commonly used types for convenience
pub use error::{ExportError, Result};

pub use config::Config;
pub use graph::{GraphClient, GraphMessage};
pub use imap::MailboxSession;
pub use normalize::ExportRow;

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ExportReport, ProgressReporter};

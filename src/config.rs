//! Run configuration read once from the environment at startup.
//!
//! Every component receives the resulting [`Config`] by reference; nothing
//! reads environment variables after process start.

use secrecy::SecretString;
use std::env;
use std::path::PathBuf;

use crate::error::{ExportError, Result};

/// Placeholder values that signal an unconfigured setting. Validation
/// rejects these before any network activity.
pub const CLIENT_ID_PLACEHOLDER: &str = "your-client-id-here";
pub const EMAIL_PLACEHOLDER: &str = "your-email@outlook.com";
pub const PASSWORD_PLACEHOLDER: &str = "your-app-password-here";

/// Well-known public client id usable for personal Microsoft accounts.
/// Shown in remediation output when CLIENT_ID is unset.
pub const PUBLIC_CLIENT_ID_HINT: &str = "d3590ed6-52b3-4102-aeff-aad2292ab01c";

#[derive(Debug, Clone)]
pub struct Config {
    /// OAuth2 application (client) id for the Graph variant.
    pub client_id: String,
    /// Azure AD tenant; "common" accepts any personal or organizational
    /// account.
    pub tenant_id: String,
    /// Mailbox address for the IMAP variant.
    pub email: String,
    /// App password for the IMAP variant.
    pub password: SecretString,
    /// Display name of the folder to export.
    pub folder: String,
    /// Maximum number of messages to export.
    pub max_emails: usize,
    /// Output spreadsheet path; overwritten if it exists.
    pub output_file: PathBuf,
    /// IMAP server host.
    pub imap_host: String,
    /// IMAP server port.
    pub imap_port: u16,
    /// Microsoft Graph base URL. Overridable for tests.
    pub graph_base_url: String,
    /// OAuth2 authority base URL. Overridable for tests.
    pub authority: String,
    /// Where the OAuth2 token cache is persisted between runs.
    pub token_cache: PathBuf,
}

fn default_folder() -> String {
    "inbox".to_string()
}

fn default_max_emails() -> usize {
    100
}

fn default_output_file() -> PathBuf {
    PathBuf::from("outlook_emails.xlsx")
}

fn default_imap_host() -> String {
    "outlook.office365.com".to_string()
}

fn default_imap_port() -> u16 {
    993
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_authority() -> String {
    "https://login.microsoftonline.com".to_string()
}

fn default_token_cache() -> PathBuf {
    PathBuf::from(".outlook-export/token.json")
}

fn env_or(name: &str, fallback: impl FnOnce() -> String) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(fallback)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID_PLACEHOLDER.to_string(),
            tenant_id: "common".to_string(),
            email: EMAIL_PLACEHOLDER.to_string(),
            password: SecretString::from(PASSWORD_PLACEHOLDER),
            folder: default_folder(),
            max_emails: default_max_emails(),
            output_file: default_output_file(),
            imap_host: default_imap_host(),
            imap_port: default_imap_port(),
            graph_base_url: default_graph_base_url(),
            authority: default_authority(),
            token_cache: default_token_cache(),
        }
    }
}

impl Config {
    /// Build the configuration from environment variables, falling back to
    /// the documented defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let max_emails = match env::var("MAX_EMAILS") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ExportError::Config(format!(
                    "MAX_EMAILS must be a positive integer, got '{}'",
                    raw
                ))
            })?,
            Err(_) => default_max_emails(),
        };

        let imap_port = match env::var("IMAP_PORT") {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| {
                ExportError::Config(format!("IMAP_PORT must be a port number, got '{}'", raw))
            })?,
            Err(_) => default_imap_port(),
        };

        Ok(Self {
            client_id: env_or("CLIENT_ID", || CLIENT_ID_PLACEHOLDER.to_string()),
            tenant_id: env_or("TENANT_ID", || "common".to_string()),
            email: env_or("EMAIL", || EMAIL_PLACEHOLDER.to_string()),
            password: SecretString::from(env_or("PASSWORD", || {
                PASSWORD_PLACEHOLDER.to_string()
            })),
            folder: env_or("FOLDER", default_folder),
            max_emails,
            output_file: PathBuf::from(env_or("OUTPUT_FILE", || {
                default_output_file().display().to_string()
            })),
            imap_host: env_or("IMAP_HOST", default_imap_host),
            imap_port,
            graph_base_url: env_or("GRAPH_API_BASE", default_graph_base_url),
            authority: env_or("OAUTH_AUTHORITY", default_authority),
            token_cache: PathBuf::from(env_or("TOKEN_CACHE", || {
                default_token_cache().display().to_string()
            })),
        })
    }

    /// Settings common to both variants.
    fn validate_common(&self) -> Result<()> {
        if self.max_emails == 0 {
            return Err(ExportError::Config(
                "MAX_EMAILS must be at least 1".to_string(),
            ));
        }
        if self.folder.trim().is_empty() {
            return Err(ExportError::Config("FOLDER cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Validate the settings the Graph variant needs. Runs before any
    /// network activity so a placeholder client id fails fast.
    pub fn validate_graph(&self) -> Result<()> {
        self.validate_common()?;
        if self.client_id == CLIENT_ID_PLACEHOLDER || self.client_id.trim().is_empty() {
            return Err(ExportError::Config(format!(
                "CLIENT_ID is not configured.\n\
                 Set CLIENT_ID in the environment or a .env file.\n\
                 For personal Microsoft accounts this public client id works:\n\
                 CLIENT_ID={}",
                PUBLIC_CLIENT_ID_HINT
            )));
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ExportError::Config(
                "TENANT_ID cannot be empty; use 'common' for personal accounts".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate the settings the IMAP variant needs.
    pub fn validate_imap(&self) -> Result<()> {
        use secrecy::ExposeSecret;

        self.validate_common()?;
        if self.email == EMAIL_PLACEHOLDER || self.email.trim().is_empty() {
            return Err(ExportError::Config(
                "EMAIL is not configured.\n\
                 Set EMAIL to your mailbox address in the environment or a .env file."
                    .to_string(),
            ));
        }
        if self.password.expose_secret() == PASSWORD_PLACEHOLDER
            || self.password.expose_secret().is_empty()
        {
            return Err(ExportError::Config(
                "PASSWORD is not configured.\n\
                 Set PASSWORD to an app password (not your regular password).\n\
                 Generate one under account.microsoft.com/security -> App passwords."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

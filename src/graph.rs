//! Microsoft Graph client for the REST variant.
//!
//! Two operations: resolve a folder display name to its Graph id, and pull
//! a bounded, time-descending page sequence of messages from that folder.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ExportError, Result};

/// Only the columns the export needs; keeps response payloads small.
const MESSAGE_SELECT_FIELDS: &str = "receivedDateTime,from,subject,bodyPreview,isRead";

/// Graph caps $top at 100 for the messages endpoint.
const MAX_PAGE_SIZE: usize = 100;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct MailFolder {
    pub id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FolderPage {
    value: Vec<MailFolder>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// One message as returned by the Graph messages endpoint. Every field is
/// optional; the normalizer substitutes placeholders for what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphMessage {
    #[serde(rename = "receivedDateTime")]
    pub received_date_time: Option<String>,
    pub from: Option<Recipient>,
    pub subject: Option<String>,
    #[serde(rename = "bodyPreview")]
    pub body_preview: Option<String>,
    #[serde(rename = "isRead")]
    pub is_read: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recipient {
    #[serde(rename = "emailAddress")]
    pub email_address: Option<EmailAddress>,
}

impl Recipient {
    /// The bare address, trimmed; None when absent or blank.
    pub fn address(&self) -> Option<&str> {
        self.email_address
            .as_ref()
            .and_then(|email| email.address.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailAddress {
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MessagePage {
    value: Vec<GraphMessage>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

/// Authenticated Graph client scoped to one account ("me").
pub struct GraphClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GraphClient {
    pub fn new(base_url: &str, token: String) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExportError::Connect(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Resolve a folder display name to its Graph id.
    ///
    /// Matching is a case-insensitive exact comparison; when several
    /// folders share a name the first one in provider listing order wins.
    /// An unmatched name falls back to the account inbox with a warning;
    /// `Ok(None)` means neither exists and the caller must abort.
    pub async fn resolve_folder(&self, name: &str) -> Result<Option<String>> {
        let folders = self.list_folders().await?;

        let wanted = name.to_lowercase();
        if let Some(folder) = folders
            .iter()
            .find(|f| f.display_name.to_lowercase() == wanted)
        {
            debug!("Resolved folder '{}' to {}", name, folder.id);
            return Ok(Some(folder.id.clone()));
        }

        warn!("Folder '{}' not found, falling back to inbox", name);
        Ok(folders
            .iter()
            .find(|f| f.display_name.eq_ignore_ascii_case("inbox"))
            .map(|f| f.id.clone()))
    }

    /// List every mail folder on the account, following pagination.
    pub async fn list_folders(&self) -> Result<Vec<MailFolder>> {
        let mut folders = Vec::new();
        let mut url = Some(format!("{}/me/mailFolders", self.base_url));

        while let Some(next) = url {
            let response = self
                .http
                .get(&next)
                .bearer_auth(&self.token)
                .header("accept", "application/json")
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ExportError::Fetch(format!(
                    "folder listing failed (HTTP {}): {}",
                    status,
                    truncate_error_body(&body)
                )));
            }

            let page: FolderPage = response
                .json()
                .await
                .map_err(|e| ExportError::Fetch(format!("invalid folder page: {}", e)))?;

            folders.extend(page.value);
            url = page.next_link;
        }

        Ok(folders)
    }

    /// Fetch up to `limit` messages from a folder, newest first.
    ///
    /// Follows `@odata.nextLink` until the cursor is absent or the limit
    /// is reached. A failed page stops pagination and returns whatever was
    /// accumulated; there is no retry.
    pub async fn fetch_messages(&self, folder_id: &str, limit: usize) -> Result<Vec<GraphMessage>> {
        let endpoint = format!("{}/me/mailFolders/{}/messages", self.base_url, folder_id);
        let mut first_url = reqwest::Url::parse(&endpoint)
            .map_err(|e| ExportError::Fetch(format!("invalid messages URL {}: {}", endpoint, e)))?;
        first_url
            .query_pairs_mut()
            .append_pair("$top", &limit.min(MAX_PAGE_SIZE).to_string())
            .append_pair("$select", MESSAGE_SELECT_FIELDS)
            .append_pair("$orderby", "receivedDateTime desc");

        let mut messages: Vec<GraphMessage> = Vec::new();
        let mut url = Some(first_url.to_string());

        while let Some(next) = url {
            if messages.len() >= limit {
                break;
            }

            let page = match self.fetch_message_page(&next).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Stopping pagination after error, keeping {} messages: {}",
                        messages.len(),
                        e
                    );
                    break;
                }
            };

            messages.extend(page.value);
            url = page.next_link;
            debug!("Retrieved {} messages so far", messages.len());
        }

        messages.truncate(limit);
        Ok(messages)
    }

    async fn fetch_message_page(&self, url: &str) -> Result<MessagePage> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .header("accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExportError::Fetch(format!(
                "message page request failed (HTTP {}): {}",
                status,
                truncate_error_body(&body)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ExportError::Fetch(format!("invalid message page: {}", e)))
    }
}

fn truncate_error_body(body: &str) -> String {
    const MAX_LEN: usize = 200;
    let trimmed = body.trim();
    if trimmed.len() > MAX_LEN {
        format!("{}... (truncated)", &trimmed[..MAX_LEN])
    } else {
        trimmed.to_string()
    }
}
